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
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use crate::{LockError, LockResult};

struct WaitEntry {
    notify: Arc<Notify>,
    waiters: usize,
}

/// Local waiters per resource, sharing one wake signal.
///
/// An entry lives exactly as long as at least one [`WaitHandle`] for its
/// resource does. Creation, counting and removal all happen under one mutex.
pub struct WaitRegistry {
    entries: Mutex<HashMap<String, WaitEntry>>,
    max_entries: usize,
}

impl WaitRegistry {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries,
        }
    }

    /// Joins the waiters of `resource`, creating its entry on first use.
    ///
    /// Fails with [`LockError::TooManyWaitedResources`] when a new entry
    /// would exceed the configured ceiling.
    pub fn register(self: &Arc<Self>, resource: &str) -> LockResult<WaitHandle> {
        let mut entries = self.entries.lock();

        let notify = match entries.get_mut(resource) {
            Some(entry) => {
                entry.waiters += 1;
                entry.notify.clone()
            }
            None => {
                if entries.len() >= self.max_entries {
                    return Err(LockError::TooManyWaitedResources { limit: self.max_entries });
                }
                let notify = Arc::new(Notify::new());
                entries.insert(
                    resource.to_string(),
                    WaitEntry {
                        notify: notify.clone(),
                        waiters: 1,
                    },
                );
                notify
            }
        };

        Ok(WaitHandle {
            registry: self.clone(),
            resource: resource.to_string(),
            notify,
        })
    }

    /// Wakes every current waiter of `resource`. Returns false when nobody
    /// in this process waits on it.
    pub fn signal(&self, resource: &str) -> bool {
        let notify = self.entries.lock().get(resource).map(|entry| entry.notify.clone());
        match notify {
            Some(notify) => {
                notify.notify_waiters();
                true
            }
            None => false,
        }
    }

    pub fn signal_all(&self) {
        let notifies: Vec<Arc<Notify>> = self
            .entries
            .lock()
            .values()
            .map(|entry| entry.notify.clone())
            .collect();
        for notify in notifies {
            notify.notify_waiters();
        }
    }

    /// Number of resources that currently have local waiters.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn waiters(&self, resource: &str) -> usize {
        self.entries.lock().get(resource).map_or(0, |entry| entry.waiters)
    }

    fn unregister(&self, resource: &str, notify: &Arc<Notify>) {
        let mut entries = self.entries.lock();
        let remove = match entries.get_mut(resource) {
            // A different instance means ours is already gone
            Some(entry) if Arc::ptr_eq(&entry.notify, notify) => {
                entry.waiters = entry.waiters.saturating_sub(1);
                entry.waiters == 0
            }
            _ => false,
        };
        if remove {
            entries.remove(resource);
        }
    }
}

/// Membership of one acquire call in a resource's waiter group. Dropping it
/// leaves the group.
pub struct WaitHandle {
    registry: Arc<WaitRegistry>,
    resource: String,
    notify: Arc<Notify>,
}

impl WaitHandle {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// A wake-up future. Call `enable` on it before doing work that could
    /// race with a release, so the signal is not missed.
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}

impl Drop for WaitHandle {
    fn drop(&mut self) {
        self.registry.unregister(&self.resource, &self.notify);
    }
}
