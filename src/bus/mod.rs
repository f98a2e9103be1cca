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

use std::marker::PhantomData;
use std::sync::Arc;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::{LockError, LockResult};

/// Best-effort publish/subscribe transport carrying string payloads.
///
/// Delivery may be lossy; consumers must tolerate missed messages.
#[async_trait]
pub trait AsyncMessageBus: Send + Sync {
    /// Returns the number of subscribers that received the message, if known.
    async fn publish(&self, channel: &str, payload: String) -> LockResult<u64>;

    /// The stream ends when the underlying subscription is lost.
    async fn subscribe(&self, channel: &str) -> LockResult<BoxStream<'static, String>>;
}

/// Asynchronous message listener characteristics
#[async_trait]
pub trait AsyncMessageListener<V>: Send + Sync + 'static
where
    V: DeserializeOwned + Send + Sync + 'static,
{
    async fn on_message(&self, channel: &str, message: V);
}

/// A typed channel on a message bus, JSON encoded.
pub struct AsyncTopic<V> {
    bus: Arc<dyn AsyncMessageBus>,
    channel: String,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Clone for AsyncTopic<V> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
            channel: self.channel.clone(),
            _marker: PhantomData,
        }
    }
}

impl<V> AsyncTopic<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(bus: Arc<dyn AsyncMessageBus>, channel: &str) -> Self {
        Self {
            bus,
            channel: channel.to_string(),
            _marker: PhantomData,
        }
    }

    pub fn get_channel_name(&self) -> &str {
        &self.channel
    }

    pub async fn publish(&self, message: &V) -> LockResult<u64> {
        let payload = serde_json::to_string(message)?;
        self.bus.publish(&self.channel, payload).await
    }

    /// Subscribes and dispatches every decodable message to `listener` on a
    /// background task. Undecodable payloads are logged and skipped.
    pub async fn add_listener<L>(&self, listener: L) -> LockResult<JoinHandle<()>>
    where
        L: AsyncMessageListener<V>,
    {
        let mut stream = self.bus.subscribe(&self.channel).await?;
        let channel = self.channel.clone();

        let handle = tokio::spawn(async move {
            while let Some(payload) = stream.next().await {
                match serde_json::from_str::<V>(&payload) {
                    Ok(message) => listener.on_message(&channel, message).await,
                    Err(e) => warn!(channel = %channel, error = %e, "Failed to deserialize message"),
                }
            }
            warn!(channel = %channel, "Subscription stream ended");
        });

        Ok(handle)
    }

    /// Subscribes and yields decoded messages.
    pub async fn subscribe_as_stream(&self) -> LockResult<BoxStream<'static, LockResult<V>>> {
        let stream = self.bus.subscribe(&self.channel).await?;
        Ok(stream
            .map(|payload| {
                serde_json::from_str::<V>(&payload)
                    .map_err(|e| LockError::DeserializationError(e.to_string()))
            })
            .boxed())
    }
}
