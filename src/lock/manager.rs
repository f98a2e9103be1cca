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
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::{
    clamp_duration, AcquireOptions, AsyncLockLease, AsyncLockStorage, AsyncMessageBus,
    AsyncMessageListener, AsyncMultiLock, AsyncRedisConnectionManager, AsyncTopic, Clock,
    LeaseTtl, LockConfig, LockError, LockIdGenerator, LockInfo, LockReleased, LockResult,
    LockStats, RedisConfig, RedisLockStorage, RedisMessageBus, RetryPolicy, ScopedLockStorage,
    SystemClock, UuidLockIdGenerator, WaitHandle, WaitRegistry,
};

struct LockManagerInner {
    storage: ScopedLockStorage,
    release_topic: AsyncTopic<LockReleased>,
    registry: Arc<WaitRegistry>,
    config: LockConfig,
    retry: RetryPolicy,
    id_generator: Arc<dyn LockIdGenerator>,
    clock: Arc<dyn Clock>,
    stats: Mutex<LockStats>,
    subscription: TokioMutex<Option<JoinHandle<()>>>,
    is_closed: AtomicBool,
    shutdown: CancellationToken,
}

impl Drop for LockManagerInner {
    fn drop(&mut self) {
        if let Some(handle) = self.subscription.get_mut().take() {
            handle.abort();
        }
    }
}

/// Forwards release notifications to local waiters.
struct ReleaseListener {
    registry: Arc<WaitRegistry>,
}

#[async_trait]
impl AsyncMessageListener<LockReleased> for ReleaseListener {
    async fn on_message(&self, _channel: &str, message: LockReleased) {
        if self.registry.signal(&message.resource) {
            trace!(resource = %message.resource, "Woke local waiters after release");
        }
    }
}

/// Hands out leases on named resources, backed by shared storage.
///
/// Cheap to clone; clones share storage, waiters and the release
/// subscription. Leases keep the manager alive until they are released.
#[derive(Clone)]
pub struct AsyncLockManager {
    inner: Arc<LockManagerInner>,
}

pub struct AsyncLockManagerBuilder {
    storage: Arc<dyn AsyncLockStorage>,
    bus: Arc<dyn AsyncMessageBus>,
    config: LockConfig,
    clock: Arc<dyn Clock>,
    id_generator: Arc<dyn LockIdGenerator>,
}

impl AsyncLockManagerBuilder {
    pub fn config(mut self, config: LockConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id_generator(mut self, id_generator: Arc<dyn LockIdGenerator>) -> Self {
        self.id_generator = id_generator;
        self
    }

    pub fn build(self) -> LockResult<AsyncLockManager> {
        self.config.validate()?;

        let inner = LockManagerInner {
            storage: ScopedLockStorage::new(self.storage, &self.config.scope),
            release_topic: AsyncTopic::new(self.bus, &self.config.release_channel),
            registry: Arc::new(WaitRegistry::new(self.config.max_wait_entries)),
            retry: RetryPolicy::new(self.config.retry.clone()),
            config: self.config,
            id_generator: self.id_generator,
            clock: self.clock,
            stats: Mutex::new(LockStats::new()),
            subscription: TokioMutex::new(None),
            is_closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        };

        Ok(AsyncLockManager { inner: Arc::new(inner) })
    }
}

impl AsyncLockManager {
    pub fn builder(storage: Arc<dyn AsyncLockStorage>, bus: Arc<dyn AsyncMessageBus>) -> AsyncLockManagerBuilder {
        AsyncLockManagerBuilder {
            storage,
            bus,
            config: LockConfig::default(),
            clock: Arc::new(SystemClock),
            id_generator: Arc::new(UuidLockIdGenerator),
        }
    }

    pub fn new(
        storage: Arc<dyn AsyncLockStorage>,
        bus: Arc<dyn AsyncMessageBus>,
        config: LockConfig,
    ) -> LockResult<Self> {
        Self::builder(storage, bus).config(config).build()
    }

    /// Manager over Redis storage and Redis pub/sub sharing one connection pool.
    pub fn connect(redis_config: &RedisConfig, config: LockConfig) -> LockResult<Self> {
        let connection_manager = Arc::new(AsyncRedisConnectionManager::new(redis_config)?);
        Self::new(
            Arc::new(RedisLockStorage::new(connection_manager.clone())),
            Arc::new(RedisMessageBus::new(connection_manager)),
            config,
        )
    }

    pub fn config(&self) -> &LockConfig {
        &self.inner.config
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn wait_registry(&self) -> &Arc<WaitRegistry> {
        &self.inner.registry
    }

    pub fn stats(&self) -> LockStats {
        self.inner.stats.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed.load(Ordering::Acquire)
    }

    /// Acquires with default ttl and timeout.
    pub async fn acquire(&self, resource: &str) -> LockResult<Option<AsyncLockLease>> {
        self.try_acquire(resource, AcquireOptions::default(), &CancellationToken::new()).await
    }

    /// Tries to take `resource` until it succeeds, the acquire timeout
    /// elapses or `cancel` fires.
    ///
    /// Contention, timeout and cancellation all yield `Ok(None)`. Errors are
    /// reserved for invalid arguments, exhaustion of the waiter ceiling and a
    /// closed manager; transient backend failures only cost an attempt.
    pub async fn try_acquire(
        &self,
        resource: &str,
        options: AcquireOptions,
        cancel: &CancellationToken,
    ) -> LockResult<Option<AsyncLockLease>> {
        self.ensure_open()?;
        validate_resource(resource)?;
        let ttl = self.normalize_ttl(options.ttl)?;
        let timeout = options.timeout.unwrap_or(self.inner.config.default_acquire_timeout);

        // One id for the whole call, retries included
        let holder_id = self.inner.id_generator.next_id();
        let started = self.inner.clock.instant();
        let deadline = started.checked_add(timeout);

        let mut wait_handle: Option<WaitHandle> = None;
        let mut attempt: u32 = 0;

        let acquired = loop {
            self.ensure_open()?;
            attempt += 1;

            match self.inner.storage.insert(resource, &holder_id, ttl).await {
                Ok(true) => break true,
                Ok(false) => trace!(resource, attempt, "Lock is held elsewhere"),
                Err(e) if e.is_retryable() => {
                    warn!(resource, attempt, error = %e, "Error acquiring lock, will retry");
                }
                Err(e) => return Err(e),
            }

            if cancel.is_cancelled() {
                debug!(resource, attempt, "Acquire cancelled by caller");
                break false;
            }
            let now = self.inner.clock.instant();
            let remaining = match deadline {
                Some(deadline) if now >= deadline => {
                    debug!(resource, attempt, ?timeout, "Timed out acquiring lock");
                    break false;
                }
                Some(deadline) => deadline - now,
                None => Duration::MAX,
            };

            if wait_handle.is_none() {
                wait_handle = Some(self.inner.registry.register(resource)?);
                self.ensure_subscribed().await;
            }
            let Some(handle) = wait_handle.as_ref() else {
                continue;
            };

            // Armed before the ttl read so a release in between still wakes us
            let notified = handle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let delay = self.wait_delay(resource).await.min(remaining);
            trace!(resource, attempt, ?delay, "Waiting for lock");

            tokio::select! {
                _ = &mut notified => trace!(resource, "Woken by release notification"),
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {}
                _ = self.inner.shutdown.cancelled() => {}
            }
        };

        drop(wait_handle);
        let waited = self.inner.clock.instant().saturating_duration_since(started);
        self.inner.stats.lock().record_wait(waited, acquired);

        if !acquired {
            return Ok(None);
        }

        debug!(resource, holder_id = %holder_id, ?waited, "Acquired lock");
        Ok(Some(AsyncLockLease::new(
            self.clone(),
            resource.to_string(),
            holder_id,
            waited,
        )))
    }

    /// Takes every resource or none of them.
    ///
    /// Resources are taken in sorted order so two callers asking for
    /// overlapping sets cannot deadlock each other; the timeout covers the
    /// whole set.
    pub async fn try_acquire_many(
        &self,
        resources: &[&str],
        options: AcquireOptions,
        cancel: &CancellationToken,
    ) -> LockResult<Option<AsyncMultiLock>> {
        let mut ordered: Vec<&str> = resources.to_vec();
        ordered.sort_unstable();
        ordered.dedup();
        if ordered.is_empty() {
            return Err(LockError::InvalidArgument("At least one resource is required".to_string()));
        }

        let timeout = options.timeout.unwrap_or(self.inner.config.default_acquire_timeout);
        let started = self.inner.clock.instant();
        let mut leases = Vec::with_capacity(ordered.len());

        for resource in ordered {
            let elapsed = self.inner.clock.instant().saturating_duration_since(started);
            let step = AcquireOptions {
                ttl: options.ttl,
                timeout: Some(timeout.saturating_sub(elapsed)),
            };

            match self.try_acquire(resource, step, cancel).await {
                Ok(Some(lease)) => leases.push(lease),
                outcome => {
                    debug!(resource, held = leases.len(), "Could not take every resource, backing out");
                    for lease in &leases {
                        lease.dispose().await;
                    }
                    return outcome.map(|_| None);
                }
            }
        }

        Ok(Some(AsyncMultiLock::new(leases)))
    }

    /// Runs `work` while holding `resource` and releases afterwards.
    /// `Ok(None)` means the lock was not acquired and `work` did not run.
    pub async fn try_using<T, F, Fut>(
        &self,
        resource: &str,
        options: AcquireOptions,
        cancel: &CancellationToken,
        work: F,
    ) -> LockResult<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let Some(lease) = self.try_acquire(resource, options, cancel).await? else {
            return Ok(None);
        };
        let output = work().await;
        lease.dispose().await;
        Ok(Some(output))
    }

    /// Removes the record if `holder_id` still owns it and announces the
    /// release. Losing ownership in the meantime is not an error, and neither
    /// is a backend that keeps failing past the retry budget. Only
    /// cancellation and a closed manager are reported.
    pub async fn release(&self, resource: &str, holder_id: &str, cancel: &CancellationToken) -> LockResult<()> {
        self.ensure_open()?;
        validate_resource(resource)?;

        let storage = &self.inner.storage;
        let outcome = self
            .inner
            .retry
            .run("release", Some(cancel), || storage.remove_if_equal(resource, holder_id))
            .await;
        // The record still lapses at its ttl
        let removed = absorb_exhausted("release", resource, outcome, false)?;

        if !removed {
            debug!(resource, holder_id, "Lock was no longer held, nothing to release");
            return Ok(());
        }

        self.inner.stats.lock().record_release();
        debug!(resource, holder_id, "Released lock");

        let message = LockReleased {
            resource: resource.to_string(),
            holder_id: holder_id.to_string(),
        };
        if let Err(e) = self.inner.release_topic.publish(&message).await {
            // Waiters fall back to polling
            warn!(resource, error = %e, "Failed to publish release notification");
        }
        Ok(())
    }

    /// Extends the lease if `holder_id` still owns it. A backend that keeps
    /// failing reads as `false`, since ownership can no longer be vouched for.
    pub async fn renew(&self, resource: &str, holder_id: &str, ttl: LeaseTtl) -> LockResult<bool> {
        self.ensure_open()?;
        validate_resource(resource)?;
        let ttl = self.normalize_ttl(ttl)?;

        let storage = &self.inner.storage;
        let outcome = self
            .inner
            .retry
            .run("renew", None, || storage.replace_if_equal(resource, holder_id, holder_id, ttl))
            .await;
        let renewed = absorb_exhausted("renew", resource, outcome, false)?;

        self.inner.stats.lock().record_renew(renewed);
        if renewed {
            trace!(resource, holder_id, ?ttl, "Renewed lock");
        } else {
            debug!(resource, holder_id, "Renew failed, lock is no longer held");
        }
        Ok(renewed)
    }

    /// Whether anyone holds `resource` right now. For diagnostics only;
    /// the answer may be stale by the time it is read, and is `false` when
    /// the backend could not be reached.
    pub async fn is_locked(&self, resource: &str) -> LockResult<bool> {
        self.ensure_open()?;
        validate_resource(resource)?;
        let storage = &self.inner.storage;
        let outcome = self
            .inner
            .retry
            .run("is_locked", None, || storage.exists(resource))
            .await;
        absorb_exhausted("is_locked", resource, outcome, false)
    }

    pub async fn get_lock_info(&self, resource: &str) -> LockResult<Option<LockInfo>> {
        self.ensure_open()?;
        validate_resource(resource)?;

        let Some(holder_id) = self.inner.storage.get(resource).await? else {
            return Ok(None);
        };
        let remaining = self
            .inner
            .storage
            .get_expiration(resource)
            .await?
            .filter(|remaining| *remaining != Duration::MAX);

        Ok(Some(LockInfo {
            resource: resource.to_string(),
            holder_id,
            remaining,
        }))
    }

    /// Remaining lifetime of the current record; `None` if unheld or the
    /// record never expires.
    pub async fn remaining_time(&self, resource: &str) -> LockResult<Option<Duration>> {
        self.ensure_open()?;
        validate_resource(resource)?;
        Ok(self
            .inner
            .storage
            .get_expiration(resource)
            .await?
            .filter(|remaining| *remaining != Duration::MAX))
    }

    /// Every held resource in this manager's scope, mapped to its holder.
    pub async fn locked_resources(&self) -> LockResult<HashMap<String, String>> {
        self.ensure_open()?;
        self.inner.storage.get_all_by_prefix("").await
    }

    pub async fn lock_count(&self) -> LockResult<usize> {
        self.ensure_open()?;
        self.inner.storage.count("").await
    }

    /// Stops the manager. Pending and future calls fail with
    /// [`LockError::Closed`]; records already written expire on their own.
    pub async fn close(&self) {
        if self.inner.is_closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown.cancel();
        self.inner.registry.signal_all();
        if let Some(handle) = self.inner.subscription.lock().await.take() {
            handle.abort();
        }
        debug!("Lock manager closed");
    }

    fn ensure_open(&self) -> LockResult<()> {
        if self.is_closed() {
            return Err(LockError::Closed);
        }
        Ok(())
    }

    fn normalize_ttl(&self, ttl: LeaseTtl) -> LockResult<Option<Duration>> {
        match ttl {
            LeaseTtl::Default => Ok(Some(self.inner.config.default_ttl)),
            LeaseTtl::Infinite => Ok(None),
            LeaseTtl::For(ttl) if ttl.is_zero() => {
                Err(LockError::InvalidArgument("Lease ttl must be greater than zero".to_string()))
            }
            LeaseTtl::For(ttl) => Ok(Some(ttl)),
        }
    }

    // How long to sleep before the next attempt when no release is announced
    async fn wait_delay(&self, resource: &str) -> Duration {
        let config = &self.inner.config;
        match self.inner.storage.get_expiration(resource).await {
            Ok(remaining) => clamp_duration(
                remaining.unwrap_or(Duration::ZERO),
                config.min_wait_delay,
                config.max_wait_delay,
            ),
            Err(e) => {
                warn!(resource, error = %e, "Could not read lock expiration");
                config.max_wait_delay
            }
        }
    }

    async fn ensure_subscribed(&self) {
        let mut subscription = self.inner.subscription.lock().await;
        if subscription.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let listener = ReleaseListener {
            registry: self.inner.registry.clone(),
        };
        match self.inner.release_topic.add_listener(listener).await {
            Ok(handle) => {
                debug!(channel = self.inner.release_topic.get_channel_name(), "Subscribed to lock release notifications");
                *subscription = Some(handle);
            }
            Err(e) => {
                // Retried by the next waiter; polling still works meanwhile
                warn!(error = %e, "Failed to subscribe to lock release notifications");
            }
        }
    }
}

// Turns a retryable error that outlasted the retry policy into `fallback`.
fn absorb_exhausted<T>(operation: &str, resource: &str, outcome: LockResult<T>, fallback: T) -> LockResult<T> {
    match outcome {
        Err(e) if e.is_retryable() => {
            error!(operation, resource, error = %e, "Backend kept failing, giving up");
            Ok(fallback)
        }
        other => other,
    }
}

fn validate_resource(resource: &str) -> LockResult<()> {
    if resource.is_empty() {
        return Err(LockError::InvalidArgument("Resource must not be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryLockStorage, InMemoryMessageBus};

    fn manager() -> AsyncLockManager {
        AsyncLockManager::new(
            Arc::new(InMemoryLockStorage::new()),
            Arc::new(InMemoryMessageBus::new()),
            LockConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_rejects_empty_resource() {
        let manager = manager();
        assert!(matches!(manager.acquire("").await, Err(LockError::InvalidArgument(_))));
        assert!(matches!(manager.is_locked("").await, Err(LockError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_rejects_zero_ttl() {
        let manager = manager();
        let options = AcquireOptions::new().with_ttl(Duration::ZERO);
        let result = manager.try_acquire("res", options, &CancellationToken::new()).await;
        assert!(matches!(result, Err(LockError::InvalidArgument(_))));
    }

    #[test]
    fn test_normalize_ttl() {
        let manager = manager();
        assert_eq!(manager.normalize_ttl(LeaseTtl::Default).unwrap(), Some(Duration::from_secs(1200)));
        assert_eq!(manager.normalize_ttl(LeaseTtl::Infinite).unwrap(), None);
        assert_eq!(
            manager.normalize_ttl(LeaseTtl::For(Duration::from_secs(5))).unwrap(),
            Some(Duration::from_secs(5))
        );
    }

    #[tokio::test]
    async fn test_wait_delay_is_clamped() -> LockResult<()> {
        let storage = Arc::new(InMemoryLockStorage::new());
        let manager = AsyncLockManager::new(
            storage.clone(),
            Arc::new(InMemoryMessageBus::new()),
            LockConfig::default(),
        )?;

        assert_eq!(manager.wait_delay("missing").await, Duration::from_millis(50));

        storage.insert("lock:long", "x", Some(Duration::from_secs(600))).await?;
        assert_eq!(manager.wait_delay("long").await, Duration::from_secs(3));

        storage.insert("lock:forever", "x", None).await?;
        assert_eq!(manager.wait_delay("forever").await, Duration::from_secs(3));
        Ok(())
    }

    #[tokio::test]
    async fn test_builder_rejects_invalid_config() {
        let result = AsyncLockManager::builder(
            Arc::new(InMemoryLockStorage::new()),
            Arc::new(InMemoryMessageBus::new()),
        )
        .config(LockConfig::default().with_max_wait_entries(0))
        .build();
        assert!(matches!(result, Err(LockError::ConfigError(_))));
    }

    #[test]
    fn test_absorb_exhausted_keeps_fatal_errors() {
        let transient: LockResult<bool> = Err(LockError::PoolError("down".to_string()));
        assert!(!absorb_exhausted("renew", "res", transient, false).unwrap());

        let cancelled: LockResult<bool> = Err(LockError::Cancelled);
        assert!(matches!(absorb_exhausted("release", "res", cancelled, false), Err(LockError::Cancelled)));

        let closed: LockResult<()> = Err(LockError::Closed);
        assert!(matches!(absorb_exhausted("release", "res", closed, ()), Err(LockError::Closed)));
    }

    #[tokio::test]
    async fn test_closed_manager_rejects_calls() {
        let manager = manager();
        manager.close().await;
        assert!(matches!(manager.acquire("res").await, Err(LockError::Closed)));
        assert!(matches!(manager.renew("res", "id", LeaseTtl::Default).await, Err(LockError::Closed)));
    }
}
