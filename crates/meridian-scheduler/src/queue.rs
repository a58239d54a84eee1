//! Deduplicating work queue of dirty application keys.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;
use tokio::sync::Notify;

use meridian_api::AppKey;

#[derive(Debug, Default)]
struct QueueInner {
    /// Keys waiting to be picked up, in arrival order.
    ready: VecDeque<AppKey>,
    /// Membership index for `ready`.
    queued: HashSet<AppKey>,
    /// Keys a worker is currently processing.
    in_flight: HashSet<AppKey>,
    /// Keys dirtied while in flight; re-queued on completion.
    dirtied: HashSet<AppKey>,
}

/// Work queue feeding dirty application keys to the sync workers.
///
/// Enqueues deduplicate: a key already waiting is not added twice, and a
/// key enqueued while a worker is processing it coalesces into a single
/// re-run after that worker calls [`done`](Self::done). This gives the
/// per-key serialisation the sync pass requires.
#[derive(Debug, Default)]
pub struct SyncQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl SyncQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an application dirty.
    pub fn enqueue(&self, key: AppKey) {
        let mut inner = self.inner.lock();
        if inner.in_flight.contains(&key) {
            inner.dirtied.insert(key);
            return;
        }
        if inner.queued.insert(key.clone()) {
            inner.ready.push_back(key);
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Wait for the next dirty key and mark it in flight.
    pub async fn next(&self) -> AppKey {
        loop {
            if let Some(key) = self.try_next() {
                return key;
            }
            self.notify.notified().await;
        }
    }

    /// Pop the next dirty key without waiting.
    pub fn try_next(&self) -> Option<AppKey> {
        let mut inner = self.inner.lock();
        let key = inner.ready.pop_front()?;
        inner.queued.remove(&key);
        inner.in_flight.insert(key.clone());
        Some(key)
    }

    /// Report that processing of a key finished.
    ///
    /// If the key was dirtied while in flight it goes straight back on
    /// the queue.
    pub fn done(&self, key: &AppKey) {
        let mut inner = self.inner.lock();
        inner.in_flight.remove(key);
        if inner.dirtied.remove(key) && inner.queued.insert(key.clone()) {
            inner.ready.push_back(key.clone());
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Number of keys waiting (not counting in-flight keys).
    pub fn len(&self) -> usize {
        self.inner.lock().ready.len()
    }

    /// True when no keys are waiting.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().ready.is_empty()
    }
}
