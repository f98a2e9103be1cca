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
use std::sync::Arc;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::{AsyncMessageBus, AsyncRedisConnectionManager, LockResult};

/// Redis `PUBLISH`/`SUBSCRIBE` transport. Each subscription owns a dedicated
/// connection that is dropped together with the returned stream.
#[derive(Clone)]
pub struct RedisMessageBus {
    connection_manager: Arc<AsyncRedisConnectionManager>,
}

impl RedisMessageBus {
    pub fn new(connection_manager: Arc<AsyncRedisConnectionManager>) -> Self {
        Self { connection_manager }
    }
}

#[async_trait]
impl AsyncMessageBus for RedisMessageBus {
    async fn publish(&self, channel: &str, payload: String) -> LockResult<u64> {
        let mut conn = self.connection_manager.get_connection().await?;
        let receivers: u64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> LockResult<BoxStream<'static, String>> {
        let mut pubsub = self.connection_manager.get_pubsub().await?;
        pubsub.subscribe(channel).await?;
        debug!(channel, "Subscribed to channel");

        let channel = channel.to_string();
        Ok(pubsub
            .into_on_message()
            .filter_map(move |msg| {
                let payload = msg.get_payload::<String>();
                let channel = channel.clone();
                async move {
                    match payload {
                        Ok(payload) => Some(payload),
                        Err(e) => {
                            warn!(channel = %channel, error = %e, "Dropping non-text pub/sub payload");
                            None
                        }
                    }
                }
            })
            .boxed())
    }
}
