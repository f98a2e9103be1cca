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
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;
use redisson_lease::{
    AcquireOptions, AsyncLockManager, InMemoryLockStorage, InMemoryMessageBus, LockConfig, WaitRegistry,
};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

fn create_manager() -> AsyncLockManager {
    AsyncLockManager::new(
        Arc::new(InMemoryLockStorage::new()),
        Arc::new(InMemoryMessageBus::new()),
        LockConfig::default(),
    )
    .unwrap()
}

fn bench_uncontended(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let manager = &create_manager();

    c.bench_function("acquire_release", |b| {
        b.to_async(&runtime).iter(move || async move {
            let lease = manager.acquire("bench:lock").await.unwrap().unwrap();
            lease.release().await.unwrap();
        });
    });

    c.bench_function("acquire_renew_release", |b| {
        b.to_async(&runtime).iter(move || async move {
            let lease = manager.acquire("bench:renew").await.unwrap().unwrap();
            lease.renew(Duration::from_secs(30)).await.unwrap();
            lease.release().await.unwrap();
        });
    });
}

fn bench_contended(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("contended");
    group.sample_size(10);

    for contenders in [2usize, 8, 32] {
        group.bench_with_input(
            BenchmarkId::new("contenders", contenders),
            &contenders,
            |b, &contenders| {
                let manager = create_manager();
                b.to_async(&runtime).iter(|| {
                    let manager = manager.clone();
                    async move {
                        let tasks: Vec<_> = (0..contenders)
                            .map(|_| {
                                let manager = manager.clone();
                                tokio::spawn(async move {
                                    let options = AcquireOptions::new().with_timeout(Duration::from_secs(30));
                                    let lease = manager
                                        .try_acquire("bench:shared", options, &CancellationToken::new())
                                        .await
                                        .unwrap()
                                        .unwrap();
                                    lease.release().await.unwrap();
                                })
                            })
                            .collect();
                        for task in tasks {
                            task.await.unwrap();
                        }
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_wait_registry(c: &mut Criterion) {
    let registry = Arc::new(WaitRegistry::new(10_000));

    c.bench_function("wait_registry_register_drop", |b| {
        b.iter(|| {
            let handle = registry.register("bench:res").unwrap();
            drop(handle);
        });
    });
}

criterion_group!(
    benches,
    bench_uncontended,
    bench_contended,
    bench_wait_registry
);
criterion_main!(benches);
