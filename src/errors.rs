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

use redis::RedisError;
use thiserror::Error;

pub type LockResult<T> = std::result::Result<T, LockError>;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Redis error: {0}")]
    RedisError(#[from] RedisError),

    #[error("Connection pool error: {0}")]
    PoolError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Subscription error: {0}")]
    SubscriptionError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Too many resources are being waited on (limit {limit})")]
    TooManyWaitedResources { limit: usize },

    #[error("Lock manager has been closed")]
    Closed,

    #[error("Operation cancelled")]
    Cancelled,
}

impl LockError {
    /// Whether a retry loop may try the same backend operation again.
    ///
    /// Backend and transport failures are transient; closed managers, caller
    /// mistakes and exhausted limits are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            LockError::RedisError(_)
            | LockError::PoolError(_)
            | LockError::SerializationError(_)
            | LockError::DeserializationError(_)
            | LockError::SubscriptionError(_) => true,
            LockError::InvalidArgument(_)
            | LockError::ConfigError(_)
            | LockError::TooManyWaitedResources { .. }
            | LockError::Closed
            | LockError::Cancelled => false,
        }
    }
}

impl From<deadpool::managed::PoolError<RedisError>> for LockError {
    fn from(err: deadpool::managed::PoolError<RedisError>) -> Self {
        LockError::PoolError(err.to_string())
    }
}

impl From<deadpool::managed::BuildError> for LockError {
    fn from(err: deadpool::managed::BuildError) -> Self {
        LockError::PoolError(err.to_string())
    }
}

impl From<serde_json::Error> for LockError {
    fn from(err: serde_json::Error) -> Self {
        LockError::SerializationError(err.to_string())
    }
}
