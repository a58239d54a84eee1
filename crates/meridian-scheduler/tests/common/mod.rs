//! Shared harness for scheduler integration tests.

pub mod fixtures;

use std::sync::Arc;

use meridian_api::AppKey;
use meridian_scheduler::{
    MockPodManager, MockSessionManager, PoolRegistry, SessionScheduler, SyncConfig, SyncQueue,
};

/// A scheduler wired to mock collaborators.
pub struct TestScheduler {
    pub scheduler: Arc<SessionScheduler>,
    pub pools: Arc<PoolRegistry>,
    pub sessions: Arc<MockSessionManager>,
    pub pods: Arc<MockPodManager>,
    pub queue: Arc<SyncQueue>,
}

impl TestScheduler {
    pub fn new() -> Self {
        let pools = Arc::new(PoolRegistry::new());
        let sessions = Arc::new(MockSessionManager::new());
        let pods = Arc::new(MockPodManager::new());
        let queue = Arc::new(SyncQueue::new());
        let scheduler = Arc::new(SessionScheduler::new(
            Arc::clone(&pools),
            sessions.clone(),
            pods.clone(),
            Arc::clone(&queue),
            SyncConfig::default(),
        ));
        Self {
            scheduler,
            pools,
            sessions,
            pods,
            queue,
        }
    }

    /// The application key most fixtures use.
    pub fn app_key(&self) -> AppKey {
        "default/echo".parse().unwrap()
    }

    /// Drain the work queue without running syncs.
    pub fn drain_queue(&self) {
        while let Some(key) = self.queue.try_next() {
            self.queue.done(&key);
        }
    }
}

impl Default for TestScheduler {
    fn default() -> Self {
        Self::new()
    }
}
