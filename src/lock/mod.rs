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
mod lease;
mod manager;
mod multi_lock;
mod retry;
mod stats;
mod wait_registry;

pub use lease::*;
pub use manager::*;
pub use multi_lock::*;
pub use retry::*;
pub use stats::*;
pub use wait_registry::*;

use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Requested lifetime of a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeaseTtl {
    /// The manager's configured default
    #[default]
    Default,
    /// Never expires; must be released explicitly
    Infinite,
    For(Duration),
}

impl From<Duration> for LeaseTtl {
    fn from(ttl: Duration) -> Self {
        LeaseTtl::For(ttl)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    pub ttl: LeaseTtl,
    /// Total time to keep trying; the manager default when `None`
    pub timeout: Option<Duration>,
}

impl AcquireOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: impl Into<LeaseTtl>) -> Self {
        self.ttl = ttl.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Published after a holder really removed its record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockReleased {
    pub resource: String,
    pub holder_id: String,
}

/// Snapshot of a record as seen in the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    pub resource: String,
    pub holder_id: String,
    /// `None` when the record never expires
    pub remaining: Option<Duration>,
}
