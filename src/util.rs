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
use std::time::Duration;
use rand::Rng;
use uuid::Uuid;

/// Source of holder ids. Every id must be unique across all processes
/// sharing a backend, since it is the value compared by renew and release.
pub trait LockIdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidLockIdGenerator;

impl LockIdGenerator for UuidLockIdGenerator {
    fn next_id(&self) -> String {
        get_lock_id()
    }
}

pub fn get_lock_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn num_milliseconds(duration: &Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub fn clamp_duration(value: Duration, min: Duration, max: Duration) -> Duration {
    value.max(min).min(max)
}

pub fn jitter_delay(base_delay: Duration, jitter_ms: u64) -> Duration {
    if jitter_ms == 0 {
        return base_delay;
    }
    let mut rng = rand::thread_rng();
    let jitter = Duration::from_millis(rng.gen_range(0..=jitter_ms));
    if rng.gen_bool(0.5) {
        base_delay + jitter
    } else {
        base_delay - jitter.min(base_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_lock_ids_are_unique() {
        let generator = UuidLockIdGenerator;
        let ids: HashSet<String> = (0..1000).map(|_| generator.next_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_clamp_duration() {
        let min = Duration::from_millis(50);
        let max = Duration::from_secs(3);
        assert_eq!(clamp_duration(Duration::ZERO, min, max), min);
        assert_eq!(clamp_duration(Duration::from_secs(60), min, max), max);
        assert_eq!(clamp_duration(Duration::MAX, min, max), max);
        assert_eq!(clamp_duration(Duration::from_millis(700), min, max), Duration::from_millis(700));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let base = Duration::from_millis(100);
        for _ in 0..100 {
            let delay = jitter_delay(base, 20);
            assert!(delay >= Duration::from_millis(80) && delay <= Duration::from_millis(120));
        }
        assert_eq!(jitter_delay(base, 0), base);
    }

    #[test]
    fn test_num_milliseconds_saturates() {
        assert_eq!(num_milliseconds(&Duration::from_secs(2)), 2000);
        assert_eq!(num_milliseconds(&Duration::MAX), u64::MAX);
    }
}
