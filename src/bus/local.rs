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
use std::sync::atomic::{AtomicBool, Ordering};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::{AsyncMessageBus, LockResult};

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// In-process bus built on broadcast channels.
///
/// Slow subscribers that fall more than the channel capacity behind skip the
/// missed messages, matching the lossy contract of the Redis bus.
pub struct InMemoryMessageBus {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    capacity: usize,
    // Lets tests simulate a bus that silently drops everything
    muted: AtomicBool,
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl InMemoryMessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            muted: AtomicBool::new(false),
        }
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .lock()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

#[async_trait]
impl AsyncMessageBus for InMemoryMessageBus {
    async fn publish(&self, channel: &str, payload: String) -> LockResult<u64> {
        if self.muted.load(Ordering::SeqCst) {
            debug!(channel, "Bus muted, dropping message");
            return Ok(0);
        }
        // An error only means nobody is listening
        let receivers = self.sender(channel).send(payload).unwrap_or(0);
        Ok(receivers as u64)
    }

    async fn subscribe(&self, channel: &str) -> LockResult<BoxStream<'static, String>> {
        let receiver = self.sender(channel).subscribe();
        Ok(BroadcastStream::new(receiver)
            .filter_map(|item| async move { item.ok() })
            .boxed())
    }
}
