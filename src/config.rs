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
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{LockError, LockResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConnectionMode {
    SingleServer {
        url: String,
    },
    Cluster {
        node_addresses: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection mode
    pub connection_mode: ConnectionMode,
    /// Connection pool size
    pub pool_size: u32,
    /// Connection timeout time
    pub connection_timeout: Duration,
    /// Response timeout time
    pub response_timeout: Duration,
    /// User name
    pub username: Option<String>,
    /// PASSWORD
    pub password: Option<String>,
    /// Database number
    pub database: Option<i64>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            connection_mode: ConnectionMode::SingleServer { url: "redis://127.0.0.1:6379".to_string() },
            pool_size: 10,
            connection_timeout: Duration::from_secs(3),
            response_timeout: Duration::from_secs(3),
            username: None,
            password: None,
            database: Some(0),
        }
    }
}

impl RedisConfig {
    pub fn single_server(address: &str) -> Self {
        Self {
            connection_mode: ConnectionMode::SingleServer { url: address.to_string() },
            ..Default::default()
        }
    }

    pub fn cluster(node_addresses: Vec<String>) -> Self {
        Self {
            connection_mode: ConnectionMode::Cluster { node_addresses },
            ..Default::default()
        }
    }

    pub fn with_pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn with_database(mut self, db: i64) -> Self {
        self.database = Some(db);
        self
    }

    pub fn validate(&self) -> LockResult<()> {
        if self.pool_size == 0 {
            return Err(LockError::ConfigError("Pool size must be greater than 0".to_string()));
        }
        if self.connection_timeout.is_zero() {
            return Err(LockError::ConfigError("Connection timeout must be greater than 0".to_string()));
        }
        match &self.connection_mode {
            ConnectionMode::SingleServer { url } if url.is_empty() => {
                Err(LockError::ConfigError("Redis url must not be empty".to_string()))
            }
            ConnectionMode::Cluster { node_addresses } if node_addresses.is_empty() => {
                Err(LockError::ConfigError("Cluster needs at least one node address".to_string()))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffStrategyConfig {
    Linear,
    Exponential,
    Fixed,
}

impl Default for BackoffStrategyConfig {
    fn default() -> Self {
        Self::Exponential
    }
}

/// Retry policy for release, renew and existence checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_strategy: BackoffStrategyConfig,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Random spread applied to each delay, in milliseconds
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            backoff_strategy: BackoffStrategyConfig::Exponential,
            initial_backoff_ms: 50,
            max_backoff_ms: 2000,
            jitter_ms: 25,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_backoff_strategy(mut self, strategy: BackoffStrategyConfig) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    pub fn with_backoff(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.initial_backoff_ms = initial_ms;
        self.max_backoff_ms = max_ms;
        self
    }

    pub fn with_jitter(mut self, jitter_ms: u64) -> Self {
        self.jitter_ms = jitter_ms;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Prefix composed onto every resource before it reaches the backend
    pub scope: String,
    /// Channel carrying release notifications
    pub release_channel: String,
    /// Lease length used when the caller does not pick one
    pub default_ttl: Duration,
    /// Total time an acquire call may wait
    pub default_acquire_timeout: Duration,
    /// Shortest pause between acquire attempts
    pub min_wait_delay: Duration,
    /// Longest pause between acquire attempts when no release is announced
    pub max_wait_delay: Duration,
    /// Ceiling on distinct resources with local waiters
    pub max_wait_entries: usize,
    pub retry: RetryConfig,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            scope: "lock:".to_string(),
            release_channel: "lock:released".to_string(),
            default_ttl: Duration::from_secs(20 * 60),
            default_acquire_timeout: Duration::from_secs(30),
            min_wait_delay: Duration::from_millis(50),
            max_wait_delay: Duration::from_secs(3),
            max_wait_entries: 10_000,
            retry: RetryConfig::default(),
        }
    }
}

impl LockConfig {
    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = scope.to_string();
        self
    }

    pub fn with_release_channel(mut self, channel: &str) -> Self {
        self.release_channel = channel.to_string();
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_default_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.default_acquire_timeout = timeout;
        self
    }

    pub fn with_wait_delay(mut self, min: Duration, max: Duration) -> Self {
        self.min_wait_delay = min;
        self.max_wait_delay = max;
        self
    }

    pub fn with_max_wait_entries(mut self, limit: usize) -> Self {
        self.max_wait_entries = limit;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> LockResult<()> {
        if self.release_channel.is_empty() {
            return Err(LockError::ConfigError("Release channel must not be empty".to_string()));
        }
        if self.default_ttl.is_zero() {
            return Err(LockError::ConfigError("Default ttl must be greater than 0".to_string()));
        }
        if self.min_wait_delay.is_zero() || self.min_wait_delay > self.max_wait_delay {
            return Err(LockError::ConfigError(format!(
                "Wait delay bounds are invalid: min {:?}, max {:?}",
                self.min_wait_delay, self.max_wait_delay
            )));
        }
        if self.max_wait_entries == 0 {
            return Err(LockError::ConfigError("Max wait entries must be greater than 0".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(LockError::ConfigError("Retry attempts must be greater than 0".to_string()));
        }
        Ok(())
    }
}
