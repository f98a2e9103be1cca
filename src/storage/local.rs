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

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::{AsyncLockStorage, LockResult};

struct StoredValue {
    value: String,
    expiry: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expiry.map_or(true, |expiry| expiry > now)
    }
}

/// Process-local lock storage.
///
/// Expiry is evaluated lazily against tokio's clock, so a paused test runtime
/// controls when leases lapse. Only useful when every contender lives in the
/// same process.
#[derive(Default)]
pub struct InMemoryLockStorage {
    entries: Mutex<HashMap<String, StoredValue>>,
}

impl InMemoryLockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired records. Reads already ignore them; this only frees memory.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, stored| stored.is_live(now));
        before - entries.len()
    }

    fn expiry_for(ttl: Option<Duration>) -> Option<Instant> {
        ttl.and_then(|ttl| Instant::now().checked_add(ttl))
    }

    fn live_value(entries: &mut HashMap<String, StoredValue>, key: &str) -> Option<String> {
        let now = Instant::now();
        match entries.get(key) {
            Some(stored) if stored.is_live(now) => Some(stored.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl AsyncLockStorage for InMemoryLockStorage {
    async fn insert(&self, key: &str, value: &str, ttl: Option<Duration>) -> LockResult<bool> {
        let mut entries = self.entries.lock();
        if Self::live_value(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expiry: Self::expiry_for(ttl),
            },
        );
        Ok(true)
    }

    async fn replace_if_equal(&self, key: &str, expected: &str, value: &str, ttl: Option<Duration>) -> LockResult<bool> {
        let mut entries = self.entries.lock();
        if Self::live_value(&mut entries, key).as_deref() != Some(expected) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expiry: Self::expiry_for(ttl),
            },
        );
        Ok(true)
    }

    async fn remove_if_equal(&self, key: &str, expected: &str) -> LockResult<bool> {
        let mut entries = self.entries.lock();
        if Self::live_value(&mut entries, key).as_deref() != Some(expected) {
            return Ok(false);
        }
        entries.remove(key);
        Ok(true)
    }

    async fn get_expiration(&self, key: &str) -> LockResult<Option<Duration>> {
        let now = Instant::now();
        let entries = self.entries.lock();
        Ok(entries
            .get(key)
            .filter(|stored| stored.is_live(now))
            .map(|stored| match stored.expiry {
                Some(expiry) => expiry.saturating_duration_since(now),
                None => Duration::MAX,
            }))
    }

    async fn exists(&self, key: &str) -> LockResult<bool> {
        let mut entries = self.entries.lock();
        Ok(Self::live_value(&mut entries, key).is_some())
    }

    async fn get(&self, key: &str) -> LockResult<Option<String>> {
        let mut entries = self.entries.lock();
        Ok(Self::live_value(&mut entries, key))
    }

    async fn get_all_by_prefix(&self, prefix: &str) -> LockResult<HashMap<String, String>> {
        let now = Instant::now();
        let entries = self.entries.lock();
        Ok(entries
            .iter()
            .filter(|(key, stored)| key.starts_with(prefix) && stored.is_live(now))
            .map(|(key, stored)| (key.clone(), stored.value.clone()))
            .collect())
    }

    async fn count(&self, prefix: &str) -> LockResult<usize> {
        let now = Instant::now();
        let entries = self.entries.lock();
        Ok(entries
            .iter()
            .filter(|(key, stored)| key.starts_with(prefix) && stored.is_live(now))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_is_exclusive() -> LockResult<()> {
        let storage = InMemoryLockStorage::new();
        assert!(storage.insert("res", "a", Some(Duration::from_secs(5))).await?);
        assert!(!storage.insert("res", "b", Some(Duration::from_secs(5))).await?);
        assert_eq!(storage.get("res").await?, Some("a".to_string()));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_expire() -> LockResult<()> {
        let storage = InMemoryLockStorage::new();
        storage.insert("res", "a", Some(Duration::from_secs(1))).await?;

        let remaining = storage.get_expiration("res").await?.unwrap();
        assert!(remaining <= Duration::from_secs(1));

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert!(!storage.exists("res").await?);
        assert_eq!(storage.get_expiration("res").await?, None);
        assert!(storage.insert("res", "b", None).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_compare_and_swap_requires_current_value() -> LockResult<()> {
        let storage = InMemoryLockStorage::new();
        storage.insert("res", "a", None).await?;

        assert!(!storage.replace_if_equal("res", "b", "b", None).await?);
        assert!(!storage.remove_if_equal("res", "b").await?);
        assert!(storage.replace_if_equal("res", "a", "a", Some(Duration::from_secs(3))).await?);
        assert!(storage.remove_if_equal("res", "a").await?);
        assert!(!storage.exists("res").await?);
        assert!(!storage.remove_if_equal("res", "a").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_persistent_record_reports_max_expiration() -> LockResult<()> {
        let storage = InMemoryLockStorage::new();
        storage.insert("res", "a", None).await?;
        assert_eq!(storage.get_expiration("res").await?, Some(Duration::MAX));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() -> LockResult<()> {
        let storage = InMemoryLockStorage::new();
        storage.insert("short", "a", Some(Duration::from_millis(10))).await?;
        storage.insert("long", "b", None).await?;
        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(storage.purge_expired(), 1);
        assert_eq!(storage.count("").await?, 1);
        Ok(())
    }
}
