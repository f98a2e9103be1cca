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
//! Runs against a live Redis. Set `REDIS_URL` and pass `--ignored`.
use std::sync::Arc;
use std::time::Duration;
use redisson_lease::{
    get_lock_id, AcquireOptions, AsyncLockManager, AsyncLockStorage, AsyncRedisConnectionManager,
    LeaseTtl, LockConfig, LockResult, RedisConfig, RedisLockStorage,
};
use tokio_util::sync::CancellationToken;

fn redis_config() -> RedisConfig {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    RedisConfig::single_server(&url).with_pool_size(4)
}

// Fresh scope per test so parallel runs do not collide
fn lock_config() -> LockConfig {
    let scope = format!("lease-test:{}:", get_lock_id());
    let channel = format!("{}released", scope);
    LockConfig::default().with_scope(&scope).with_release_channel(&channel)
}

#[tokio::test]
#[ignore]
async fn test_redis_storage_cas() -> LockResult<()> {
    let connection_manager = Arc::new(AsyncRedisConnectionManager::new(&redis_config())?);
    let storage = RedisLockStorage::new(connection_manager);
    let key = format!("lease-test:{}", get_lock_id());

    assert!(storage.insert(&key, "a", Some(Duration::from_secs(5))).await?);
    assert!(!storage.insert(&key, "b", Some(Duration::from_secs(5))).await?);

    assert!(!storage.replace_if_equal(&key, "b", "b", None).await?);
    assert!(storage.replace_if_equal(&key, "a", "a", None).await?);
    assert_eq!(storage.get_expiration(&key).await?, Some(Duration::MAX));

    assert!(!storage.remove_if_equal(&key, "b").await?);
    assert!(storage.remove_if_equal(&key, "a").await?);
    assert_eq!(storage.get_expiration(&key).await?, None);
    assert!(!storage.exists(&key).await?);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_redis_lock_round_trip() -> LockResult<()> {
    let manager = AsyncLockManager::connect(&redis_config(), lock_config())?;

    let lease = manager
        .try_acquire("job:42", AcquireOptions::new().with_ttl(Duration::from_secs(5)), &CancellationToken::new())
        .await?
        .unwrap();
    assert!(manager.is_locked("job:42").await?);
    assert_eq!(manager.lock_count().await?, 1);

    let contender = manager
        .try_acquire("job:42", AcquireOptions::new().with_timeout(Duration::from_millis(50)), &CancellationToken::new())
        .await?;
    assert!(contender.is_none());

    assert!(lease.renew(LeaseTtl::Default).await?);
    lease.release().await?;
    assert!(!manager.is_locked("job:42").await?);

    manager.close().await;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_redis_release_wakes_other_manager() -> LockResult<()> {
    let config = lock_config();
    let holder_side = AsyncLockManager::connect(&redis_config(), config.clone())?;
    let waiter_side = AsyncLockManager::connect(&redis_config(), config)?;

    let holder = holder_side
        .try_acquire("res", AcquireOptions::new().with_ttl(LeaseTtl::Infinite), &CancellationToken::new())
        .await?
        .unwrap();

    let releaser = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        holder.release().await
    });

    let lease = waiter_side
        .try_acquire("res", AcquireOptions::new().with_timeout(Duration::from_secs(10)), &CancellationToken::new())
        .await?
        .unwrap();
    releaser.await.unwrap()?;

    assert!(lease.time_waited() < Duration::from_secs(3));
    lease.release().await?;

    holder_side.close().await;
    waiter_side.close().await;
    Ok(())
}
