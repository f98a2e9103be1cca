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
use tracing::warn;

use crate::{AsyncLockLease, LeaseTtl, LockResult};

/// Leases on several resources taken together by
/// [`AsyncLockManager::try_acquire_many`](crate::AsyncLockManager::try_acquire_many).
#[derive(Debug)]
pub struct AsyncMultiLock {
    leases: Vec<AsyncLockLease>,
}

impl AsyncMultiLock {
    pub(crate) fn new(leases: Vec<AsyncLockLease>) -> Self {
        Self { leases }
    }

    pub fn leases(&self) -> &[AsyncLockLease] {
        &self.leases
    }

    pub fn resources(&self) -> Vec<&str> {
        self.leases.iter().map(|lease| lease.resource()).collect()
    }

    /// Renews every lease. True only if all of them are still held.
    pub async fn renew(&self, ttl: impl Into<LeaseTtl>) -> LockResult<bool> {
        let ttl = ttl.into();
        let mut all_renewed = true;
        for lease in &self.leases {
            if !lease.renew(ttl).await? {
                warn!(resource = lease.resource(), "Lost lock while renewing multi lock");
                all_renewed = false;
            }
        }
        Ok(all_renewed)
    }

    /// Releases every lease, attempting all of them even if some fail. The
    /// first error is returned.
    pub async fn release(&self) -> LockResult<()> {
        let mut first_error = None;
        for lease in self.leases.iter().rev() {
            if let Err(e) = lease.release().await {
                warn!(resource = lease.resource(), error = %e, "Failed to release lock in multi lock");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn dispose(&self) {
        for lease in self.leases.iter().rev() {
            lease.dispose().await;
        }
    }
}
