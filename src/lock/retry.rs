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
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{jitter_delay, BackoffStrategyConfig, LockError, LockResult, RetryConfig};

/// Bounded retries for short backend operations. Only errors that report
/// themselves as retryable are tried again.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Delay before attempt `attempt + 1`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let initial = self.config.initial_backoff_ms;
        let step = u64::from(attempt.max(1));
        let millis = match self.config.backoff_strategy {
            BackoffStrategyConfig::Fixed => initial,
            BackoffStrategyConfig::Linear => initial.saturating_mul(step),
            BackoffStrategyConfig::Exponential => {
                let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
                initial.saturating_mul(factor)
            }
        };
        Duration::from_millis(millis.min(self.config.max_backoff_ms))
    }

    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: Option<&CancellationToken>,
        mut f: F,
    ) -> LockResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LockResult<T>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let e = match f().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !e.is_retryable() {
                return Err(e);
            }
            if attempt >= max_attempts {
                debug!(operation, attempt, error = %e, "Retry attempts exhausted");
                return Err(e);
            }

            let delay = jitter_delay(self.backoff(attempt), self.config.jitter_ms);
            warn!(operation, attempt, ?delay, error = %e, "Backend operation failed, retrying");

            match cancel {
                Some(cancel) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(LockError::Cancelled),
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
    }
}
