/*
 *
 *  *
 *  *      Copyright (c) 2018-2025, SnackCloud All rights reserved.
 *  *
 *  *   Redistribution and use in source and binary forms, with or without
 *  *   modification, are permitted provided that the following conditions are met:
 *  *
 *  *   Redistributions of source code must retain the above copyright notice,
 *  *   this list of conditions and the following disclaimer.
 *  *   Redistributions in binary form must reproduce the above copyright
 *  *   notice, this list of conditions and the following disclaimer in the
 *  *   documentation and/or other materials provided with the distribution.
 *  *   Neither the name of the www.snackcloud.cn developer nor the names of its
 *  *   contributors may be used to endorse or promote products derived from
 *  *   this software without specific prior written permission.
 *  *   Author: SnackCloud
 *  *
 *
 */

//! Distributed resource locks with renewable leases.
//!
//! Holders race on an atomic insert-if-absent in shared storage; losers wait
//! for a release notification on a message bus, or for the current record's
//! expiry, whichever comes first. Redis backs both in production and
//! in-memory versions of each are provided for tests and single-process use.

mod bus;
mod clock;
mod config;
mod connection;
mod errors;
mod lock;
mod scripts;
mod storage;
mod util;

pub use bus::*;
pub use clock::*;
pub use config::*;
pub use connection::*;
pub use errors::*;
pub use lock::*;
pub use scripts::*;
pub use storage::*;
pub use util::*;
