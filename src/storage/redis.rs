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
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;

use crate::{num_milliseconds, scripts, AsyncLockStorage, AsyncRedisConnectionManager, LockResult};

const SCAN_BATCH_SIZE: usize = 200;

/// Lock records as plain string keys holding the holder id, expiring via
/// `PEXPIRE` semantics.
///
/// Prefix enumeration uses `SCAN`; against a cluster it only sees the node
/// the connection routes to, which is acceptable for diagnostics.
#[derive(Clone)]
pub struct RedisLockStorage {
    connection_manager: Arc<AsyncRedisConnectionManager>,
}

impl RedisLockStorage {
    pub fn new(connection_manager: Arc<AsyncRedisConnectionManager>) -> Self {
        Self { connection_manager }
    }

    pub fn connection_manager(&self) -> Arc<AsyncRedisConnectionManager> {
        self.connection_manager.clone()
    }

    // Redis rejects PX 0, so sub-millisecond leases round up
    fn ttl_millis(ttl: Duration) -> u64 {
        num_milliseconds(&ttl).max(1)
    }

    async fn scan_keys(&self, prefix: &str) -> LockResult<Vec<String>> {
        let mut conn = self.connection_manager.get_connection().await?;
        let pattern = format!("{}*", escape_glob(prefix));
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH_SIZE)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

#[async_trait]
impl AsyncLockStorage for RedisLockStorage {
    async fn insert(&self, key: &str, value: &str, ttl: Option<Duration>) -> LockResult<bool> {
        let mut conn = self.connection_manager.get_connection().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(Self::ttl_millis(ttl));
        }

        let reply: Option<String> = cmd.query_async(&mut conn).await?;
        Ok(reply.is_some())
    }

    async fn replace_if_equal(&self, key: &str, expected: &str, value: &str, ttl: Option<Duration>) -> LockResult<bool> {
        let mut conn = self.connection_manager.get_connection().await?;
        let ttl_ms = ttl.map_or(0, Self::ttl_millis);

        let replaced: i64 = scripts::REPLACE_IF_EQUAL_SCRIPT
            .key(key)
            .arg(expected)
            .arg(value)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await?;

        Ok(replaced == 1)
    }

    async fn remove_if_equal(&self, key: &str, expected: &str) -> LockResult<bool> {
        let mut conn = self.connection_manager.get_connection().await?;

        let removed: i64 = scripts::REMOVE_IF_EQUAL_SCRIPT
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;

        Ok(removed > 0)
    }

    async fn get_expiration(&self, key: &str) -> LockResult<Option<Duration>> {
        let mut conn = self.connection_manager.get_connection().await?;
        let ttl_ms: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;

        Ok(match ttl_ms {
            -2 => None,
            -1 => Some(Duration::MAX),
            ms => Some(Duration::from_millis(ms.max(0).unsigned_abs())),
        })
    }

    async fn exists(&self, key: &str) -> LockResult<bool> {
        let mut conn = self.connection_manager.get_connection().await?;
        let exists: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(exists > 0)
    }

    async fn get(&self, key: &str) -> LockResult<Option<String>> {
        let mut conn = self.connection_manager.get_connection().await?;
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn get_all_by_prefix(&self, prefix: &str) -> LockResult<HashMap<String, String>> {
        let keys = self.scan_keys(prefix).await?;
        let mut conn = self.connection_manager.get_connection().await?;
        let mut result = HashMap::with_capacity(keys.len());

        // One GET per key; records may live in different cluster slots
        for key in keys {
            let value: Option<String> = redis::cmd("GET").arg(&key).query_async(&mut conn).await?;
            if let Some(value) = value {
                result.insert(key, value);
            }
        }

        Ok(result)
    }

    async fn count(&self, prefix: &str) -> LockResult<usize> {
        Ok(self.scan_keys(prefix).await?.len())
    }
}

fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("lock:"), "lock:");
        assert_eq!(escape_glob("a*b?[c]"), "a\\*b\\?\\[c\\]");
    }

    #[test]
    fn test_ttl_millis_rounds_up() {
        assert_eq!(RedisLockStorage::ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(RedisLockStorage::ttl_millis(Duration::from_secs(5)), 5000);
    }
}
