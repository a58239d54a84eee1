//! Background worker running the sync loop and housekeeping timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::SchedulerConfig;
use crate::queue::SyncQueue;
use crate::scheduler::SessionScheduler;

/// Runs the scheduler's background loops until shutdown.
///
/// A fixed set of sync workers drains the queue; the queue's in-flight
/// tracking guarantees at most one pass per application key at a time.
/// A separate timer task fires the housekeeping sweep.
pub struct SchedulerWorker {
    scheduler: Arc<SessionScheduler>,
    config: SchedulerConfig,
}

impl SchedulerWorker {
    /// Create a new worker over a scheduler.
    #[must_use]
    pub fn new(scheduler: Arc<SessionScheduler>, config: SchedulerConfig) -> Self {
        Self { scheduler, config }
    }

    /// Run until shutdown is signalled.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        info!(
            workers = self.config.sync.workers,
            housekeeping_secs = self.config.housekeeping.interval.as_secs(),
            "starting session scheduler worker"
        );

        let mut handles = Vec::new();
        for worker_id in 0..self.config.sync.workers.max(1) {
            handles.push(tokio::spawn(sync_loop(
                worker_id,
                Arc::clone(&self.scheduler),
                self.config.sync.retry_delay,
                shutdown.clone(),
            )));
        }
        handles.push(tokio::spawn(housekeeping_loop(
            Arc::clone(&self.scheduler),
            self.config.housekeeping.interval,
            shutdown.clone(),
        )));

        for handle in handles {
            let _ = handle.await;
        }
        info!("session scheduler worker stopped");
    }
}

impl std::fmt::Debug for SchedulerWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerWorker").finish_non_exhaustive()
    }
}

async fn sync_loop(
    worker_id: usize,
    scheduler: Arc<SessionScheduler>,
    retry_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let queue = Arc::clone(scheduler.queue());
    loop {
        tokio::select! {
            key = queue.next() => {
                if let Err(e) = scheduler.sync_application_sessions(&key).await {
                    warn!(worker = worker_id, application = %key, error = %e, "session sync failed");
                    requeue_later(Arc::clone(&queue), key.clone(), retry_delay);
                }
                queue.done(&key);
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Re-enqueue a failed key after a delay, off the worker's own loop.
fn requeue_later(queue: Arc<SyncQueue>, key: meridian_api::AppKey, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        queue.enqueue(key);
    });
}

async fn housekeeping_loop(
    scheduler: Arc<SessionScheduler>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // Skip the immediate first tick.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                scheduler.session_house_keeping().await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{MockPodManager, MockSessionManager};
    use crate::registry::PoolRegistry;

    #[tokio::test]
    async fn worker_stops_on_shutdown() {
        let queue = Arc::new(SyncQueue::new());
        let scheduler = Arc::new(SessionScheduler::new(
            Arc::new(PoolRegistry::new()),
            Arc::new(MockSessionManager::new()),
            Arc::new(MockPodManager::new()),
            queue,
            crate::config::SyncConfig::default(),
        ));
        let worker = SchedulerWorker::new(scheduler, SchedulerConfig::default());

        let (tx, rx) = watch::channel(false);
        let run = tokio::spawn(async move { worker.run(rx).await });

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("worker should stop promptly")
            .unwrap();
    }
}
