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
mod local;
mod redis;

pub use self::local::*;
pub use self::redis::*;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use crate::LockResult;

/// Atomic key/value contract the lock manager is built on.
///
/// `insert`, `replace_if_equal` and `remove_if_equal` must be atomic across
/// every process sharing the backend. A `ttl` of `None` stores the record
/// without expiration.
#[async_trait]
pub trait AsyncLockStorage: Send + Sync {
    /// Creates the record if absent. Returns false when it already exists.
    async fn insert(&self, key: &str, value: &str, ttl: Option<Duration>) -> LockResult<bool>;

    async fn replace_if_equal(&self, key: &str, expected: &str, value: &str, ttl: Option<Duration>) -> LockResult<bool>;

    async fn remove_if_equal(&self, key: &str, expected: &str) -> LockResult<bool>;

    /// Remaining time to live; `None` if absent, `Duration::MAX` if the
    /// record never expires.
    async fn get_expiration(&self, key: &str) -> LockResult<Option<Duration>>;

    async fn exists(&self, key: &str) -> LockResult<bool>;

    async fn get(&self, key: &str) -> LockResult<Option<String>>;

    async fn get_all_by_prefix(&self, prefix: &str) -> LockResult<HashMap<String, String>>;

    async fn count(&self, prefix: &str) -> LockResult<usize>;
}

/// Puts every key under a fixed prefix so several lock namespaces can share
/// one physical backend.
#[derive(Clone)]
pub struct ScopedLockStorage {
    inner: Arc<dyn AsyncLockStorage>,
    scope: String,
}

impl ScopedLockStorage {
    pub fn new(inner: Arc<dyn AsyncLockStorage>, scope: &str) -> Self {
        Self {
            inner,
            scope: scope.to_string(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn inner(&self) -> &Arc<dyn AsyncLockStorage> {
        &self.inner
    }

    fn scoped_key(&self, key: &str) -> String {
        format!("{}{}", self.scope, key)
    }
}

#[async_trait]
impl AsyncLockStorage for ScopedLockStorage {
    async fn insert(&self, key: &str, value: &str, ttl: Option<Duration>) -> LockResult<bool> {
        self.inner.insert(&self.scoped_key(key), value, ttl).await
    }

    async fn replace_if_equal(&self, key: &str, expected: &str, value: &str, ttl: Option<Duration>) -> LockResult<bool> {
        self.inner.replace_if_equal(&self.scoped_key(key), expected, value, ttl).await
    }

    async fn remove_if_equal(&self, key: &str, expected: &str) -> LockResult<bool> {
        self.inner.remove_if_equal(&self.scoped_key(key), expected).await
    }

    async fn get_expiration(&self, key: &str) -> LockResult<Option<Duration>> {
        self.inner.get_expiration(&self.scoped_key(key)).await
    }

    async fn exists(&self, key: &str) -> LockResult<bool> {
        self.inner.exists(&self.scoped_key(key)).await
    }

    async fn get(&self, key: &str) -> LockResult<Option<String>> {
        self.inner.get(&self.scoped_key(key)).await
    }

    async fn get_all_by_prefix(&self, prefix: &str) -> LockResult<HashMap<String, String>> {
        let entries = self.inner.get_all_by_prefix(&self.scoped_key(prefix)).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(self.scope.as_str())
                    .map(|stripped| (stripped.to_string(), value))
            })
            .collect())
    }

    async fn count(&self, prefix: &str) -> LockResult<usize> {
        self.inner.count(&self.scoped_key(prefix)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scoped_storage_prefixes_keys() -> LockResult<()> {
        let backend = Arc::new(InMemoryLockStorage::new());
        let scoped = ScopedLockStorage::new(backend.clone(), "lock:");

        assert!(scoped.insert("job:1", "holder-a", None).await?);
        assert_eq!(backend.get("lock:job:1").await?, Some("holder-a".to_string()));
        assert!(!backend.exists("job:1").await?);
        assert!(scoped.exists("job:1").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_scoped_storage_strips_prefix_on_enumeration() -> LockResult<()> {
        let backend = Arc::new(InMemoryLockStorage::new());
        let locks = ScopedLockStorage::new(backend.clone(), "lock:");
        let other = ScopedLockStorage::new(backend.clone(), "other:");

        locks.insert("job:1", "a", None).await?;
        locks.insert("job:2", "b", None).await?;
        locks.insert("report", "c", None).await?;
        other.insert("job:3", "d", None).await?;

        let jobs = locks.get_all_by_prefix("job:").await?;
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs.get("job:1"), Some(&"a".to_string()));
        assert_eq!(jobs.get("job:2"), Some(&"b".to_string()));

        assert_eq!(locks.count("").await?, 3);
        assert_eq!(other.count("").await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_namespaces_do_not_collide() -> LockResult<()> {
        let backend = Arc::new(InMemoryLockStorage::new());
        let first = ScopedLockStorage::new(backend.clone(), "a:");
        let second = ScopedLockStorage::new(backend, "b:");

        assert!(first.insert("shared", "x", None).await?);
        assert!(second.insert("shared", "y", None).await?);
        assert!(!second.remove_if_equal("shared", "x").await?);
        assert!(first.remove_if_equal("shared", "x").await?);
        assert!(second.exists("shared").await?);
        Ok(())
    }
}
