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
use std::time::Duration;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LockStats {
    pub acquired: u64,
    pub timeouts: u64,
    pub released: u64,
    pub renewed: u64,
    pub renew_failures: u64,
    pub total_wait_time: Duration,
    pub max_wait_time: Duration,
}

impl LockStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_wait(&mut self, waited: Duration, acquired: bool) {
        if acquired {
            self.acquired += 1;
        } else {
            self.timeouts += 1;
        }
        self.total_wait_time += waited;
        if waited > self.max_wait_time {
            self.max_wait_time = waited;
        }
    }

    pub fn record_release(&mut self) {
        self.released += 1;
    }

    pub fn record_renew(&mut self, renewed: bool) {
        if renewed {
            self.renewed += 1;
        } else {
            self.renew_failures += 1;
        }
    }

    /// Mean wait over every finished acquire call
    pub fn avg_wait_time(&self) -> Duration {
        let attempts = self.acquired + self.timeouts;
        if attempts == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total_wait_time.as_nanos() / u128::from(attempts);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}
