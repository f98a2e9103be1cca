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
use deadpool::managed::Metrics;
use deadpool::Runtime;
use redis::aio::ConnectionLike as AsyncConnectionLike;
use redis::cluster::{ClusterClient, ClusterClientBuilder};
use redis::cluster_async::ClusterConnection;
use redis::{Client, ConnectionInfo, IntoConnectionInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::config::{ConnectionMode, RedisConfig};
use crate::errors::{LockError, LockResult};
use crate::ConnectionType;

// Asynchronous connection pool type alias
type AsyncRedisPool = deadpool::managed::Pool<AsyncSingleRedisConnectionManager>;
type AsyncClusterPool = deadpool::managed::Pool<AsyncClusterConnectionManager>;

// Asynchronous connection enumeration
pub enum AsyncRedisConnection {
    Single(deadpool::managed::Object<AsyncSingleRedisConnectionManager>),
    Cluster(deadpool::managed::Object<AsyncClusterConnectionManager>),
}

impl AsyncConnectionLike for AsyncRedisConnection {
    fn req_packed_command<'a>(
        &'a mut self,
        cmd: &'a redis::Cmd,
    ) -> redis::RedisFuture<'a, redis::Value> {
        match self {
            AsyncRedisConnection::Single(conn) => conn.req_packed_command(cmd),
            AsyncRedisConnection::Cluster(conn) => conn.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a redis::Pipeline,
        offset: usize,
        count: usize,
    ) -> redis::RedisFuture<'a, Vec<redis::Value>> {
        match self {
            AsyncRedisConnection::Single(conn) => conn.req_packed_commands(cmd, offset, count),
            AsyncRedisConnection::Cluster(conn) => conn.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            AsyncRedisConnection::Single(conn) => conn.get_db(),
            AsyncRedisConnection::Cluster(conn) => conn.get_db(),
        }
    }
}

pub struct AsyncSingleRedisConnectionManager {
    client: Client,
}

#[async_trait::async_trait]
impl deadpool::managed::Manager for AsyncSingleRedisConnectionManager {
    type Type = redis::aio::MultiplexedConnection;
    type Error = redis::RedisError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        // The database is selected through the connection info
        self.client.get_multiplexed_async_connection().await
    }

    async fn recycle(&self, conn: &mut Self::Type, _metrics: &Metrics) -> deadpool::managed::RecycleResult<Self::Error> {
        match redis::cmd("PING").query_async::<String>(conn).await {
            Ok(pong) if pong == "PONG" => Ok(()),
            Ok(_) => Err(deadpool::managed::RecycleError::Message("Invalid PONG response".into())),
            Err(e) => Err(deadpool::managed::RecycleError::Backend(e)),
        }
    }
}

pub struct AsyncClusterConnectionManager {
    client: ClusterClient,
}

#[async_trait::async_trait]
impl deadpool::managed::Manager for AsyncClusterConnectionManager {
    type Type = ClusterConnection;
    type Error = redis::RedisError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        self.client.get_async_connection().await
    }

    async fn recycle(&self, conn: &mut Self::Type, _metrics: &Metrics) -> deadpool::managed::RecycleResult<Self::Error> {
        match redis::cmd("PING").query_async::<String>(conn).await {
            Ok(pong) if pong == "PONG" => Ok(()),
            Ok(_) => Err(deadpool::managed::RecycleError::Message("Invalid PONG response".into())),
            Err(e) => Err(deadpool::managed::RecycleError::Backend(e)),
        }
    }
}

/// Pooled Redis connections plus a plain client for dedicated pub/sub
/// connections, which cannot be multiplexed.
pub struct AsyncRedisConnectionManager {
    config: RedisConfig,
    single_pool: Option<AsyncRedisPool>,
    cluster_pool: Option<AsyncClusterPool>,
    // Pub/sub goes to one node; cluster PUBLISH is broadcast to every node
    pubsub_client: Client,
    is_closed: AtomicBool,
}

impl AsyncRedisConnectionManager {
    pub fn new(config: &RedisConfig) -> LockResult<Self> {
        config.validate()?;

        match &config.connection_mode {
            ConnectionMode::SingleServer { url } => {
                let info = Self::build_connection_info(url, config)?;
                let client = Client::open(info.clone())?;
                let pool = Self::create_pool(AsyncSingleRedisConnectionManager { client }, config)?;

                Ok(Self {
                    config: config.clone(),
                    single_pool: Some(pool),
                    cluster_pool: None,
                    pubsub_client: Client::open(info)?,
                    is_closed: AtomicBool::new(false),
                })
            }
            ConnectionMode::Cluster { node_addresses } => {
                let client = Self::create_cluster_client(node_addresses, config)?;
                let pool = Self::create_pool(AsyncClusterConnectionManager { client }, config)?;
                let info = Self::build_connection_info(&node_addresses[0], config)?;

                Ok(Self {
                    config: config.clone(),
                    single_pool: None,
                    cluster_pool: Some(pool),
                    pubsub_client: Client::open(info)?,
                    is_closed: AtomicBool::new(false),
                })
            }
        }
    }

    fn create_pool<M>(manager: M, config: &RedisConfig) -> LockResult<deadpool::managed::Pool<M>>
    where
        M: deadpool::managed::Manager,
    {
        let pool = deadpool::managed::Pool::builder(manager)
            .max_size(config.pool_size as usize)
            .timeouts(deadpool::managed::Timeouts {
                wait: Some(config.connection_timeout),
                create: Some(config.connection_timeout),
                recycle: Some(Duration::from_secs(5)),
            })
            .runtime(Runtime::Tokio1)
            .build()?;

        Ok(pool)
    }

    fn create_cluster_client(node_addresses: &[String], config: &RedisConfig) -> LockResult<ClusterClient> {
        let mut builder = ClusterClientBuilder::new(node_addresses.to_vec());

        if let Some(username) = &config.username {
            builder = builder.username(username.clone());
        }
        if let Some(password) = &config.password {
            builder = builder.password(password.clone());
        }

        builder = builder.response_timeout(config.response_timeout);
        builder = builder.connection_timeout(config.connection_timeout);

        Ok(builder.build()?)
    }

    fn build_connection_info(url: &str, config: &RedisConfig) -> LockResult<ConnectionInfo> {
        let mut conn_info: ConnectionInfo = url.into_connection_info()?;

        if let Some(username) = &config.username {
            conn_info.redis.username = Some(username.clone());
        }
        if let Some(password) = &config.password {
            conn_info.redis.password = Some(password.clone());
        }
        if let Some(db) = config.database {
            conn_info.redis.db = db;
        }
        Ok(conn_info)
    }

    pub fn connection_type(&self) -> ConnectionType {
        match self.config.connection_mode {
            ConnectionMode::SingleServer { .. } => ConnectionType::Single,
            ConnectionMode::Cluster { .. } => ConnectionType::Cluster,
        }
    }

    pub async fn get_connection(&self) -> LockResult<AsyncRedisConnection> {
        if self.is_closed.load(Ordering::Acquire) {
            return Err(LockError::Closed);
        }

        if let Some(pool) = &self.single_pool {
            return Ok(AsyncRedisConnection::Single(pool.get().await?));
        }
        if let Some(pool) = &self.cluster_pool {
            return Ok(AsyncRedisConnection::Cluster(pool.get().await?));
        }
        Err(LockError::ConfigError("No connection pool configured".to_string()))
    }

    /// Opens a fresh connection in subscriber mode.
    pub async fn get_pubsub(&self) -> LockResult<redis::aio::PubSub> {
        if self.is_closed.load(Ordering::Acquire) {
            return Err(LockError::Closed);
        }
        Ok(self.pubsub_client.get_async_pubsub().await?)
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        if self.is_closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pool) = &self.single_pool {
            pool.close();
        }
        if let Some(pool) = &self.cluster_pool {
            pool.close();
        }
        debug!("Redis connection manager closed");
    }
}
