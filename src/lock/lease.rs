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
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex as TokioMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{AsyncLockManager, LeaseTtl, LockResult};

/// Proof of holding a resource, handed out by [`AsyncLockManager`].
///
/// Release it explicitly with [`release`](Self::release) or
/// [`dispose`](Self::dispose). A lease dropped while still held is released
/// on a background task when a tokio runtime is around; otherwise the record
/// simply expires.
pub struct AsyncLockLease {
    manager: AsyncLockManager,
    resource: String,
    holder_id: String,
    date_acquired: SystemTime,
    time_waited: Duration,
    renewal_count: AtomicU32,
    released: AtomicBool,
    release_lock: TokioMutex<()>,
}

impl AsyncLockLease {
    pub(crate) fn new(manager: AsyncLockManager, resource: String, holder_id: String, time_waited: Duration) -> Self {
        let date_acquired = manager.clock().now();
        Self {
            manager,
            resource,
            holder_id,
            date_acquired,
            time_waited,
            renewal_count: AtomicU32::new(0),
            released: AtomicBool::new(false),
            release_lock: TokioMutex::new(()),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    pub fn date_acquired(&self) -> SystemTime {
        self.date_acquired
    }

    /// Time spent in `try_acquire` before the lock was taken
    pub fn time_waited(&self) -> Duration {
        self.time_waited
    }

    pub fn renewal_count(&self) -> u32 {
        self.renewal_count.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Extends the lease. `Ok(false)` means the record belongs to someone
    /// else now (or expired), and the lease should be treated as lost.
    pub async fn renew(&self, ttl: impl Into<LeaseTtl>) -> LockResult<bool> {
        if self.is_released() {
            return Ok(false);
        }
        let renewed = self.manager.renew(&self.resource, &self.holder_id, ttl.into()).await?;
        if renewed {
            self.renewal_count.fetch_add(1, Ordering::AcqRel);
        }
        Ok(renewed)
    }

    /// Releases the lock. Further calls, concurrent or not, are no-ops once
    /// one of them succeeded.
    pub async fn release(&self) -> LockResult<()> {
        let _guard = self.release_lock.lock().await;
        if self.is_released() {
            return Ok(());
        }
        self.manager
            .release(&self.resource, &self.holder_id, &CancellationToken::new())
            .await?;
        self.released.store(true, Ordering::Release);
        Ok(())
    }

    /// Like [`release`](Self::release), but only logs failures.
    pub async fn dispose(&self) {
        if let Err(e) = self.release().await {
            warn!(resource = %self.resource, holder_id = %self.holder_id, error = %e, "Failed to release lock");
        }
    }

    /// Remaining lifetime of the record, whoever holds it now.
    pub async fn remaining_time(&self) -> LockResult<Option<Duration>> {
        self.manager.remaining_time(&self.resource).await
    }
}

impl std::fmt::Debug for AsyncLockLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncLockLease")
            .field("resource", &self.resource)
            .field("holder_id", &self.holder_id)
            .field("time_waited", &self.time_waited)
            .field("renewal_count", &self.renewal_count())
            .field("released", &self.is_released())
            .finish()
    }
}

impl Drop for AsyncLockLease {
    fn drop(&mut self) {
        if *self.released.get_mut() || self.manager.is_closed() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(resource = %self.resource, "No runtime to release dropped lease, leaving it to expire");
            return;
        };

        let manager = self.manager.clone();
        let resource = std::mem::take(&mut self.resource);
        let holder_id = std::mem::take(&mut self.holder_id);
        runtime.spawn(async move {
            if let Err(e) = manager.release(&resource, &holder_id, &CancellationToken::new()).await {
                warn!(resource = %resource, holder_id = %holder_id, error = %e, "Failed to release dropped lease");
            }
        });
    }
}
