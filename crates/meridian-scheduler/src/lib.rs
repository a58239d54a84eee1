//! Meridian application-session scheduler.
//!
//! The scheduler binds pending sessions to idle pre-warmed pods, drives
//! the session state machine in cooperation with remote node agents,
//! enforces timeouts, and reconciles observed state back toward the
//! user-declared intent. It is responsible for:
//!
//! - **Pools**: a per-application in-memory index of sessions and pods
//! - **Reconciliation**: applying watch events and node session reports
//! - **Binding**: assigning pending sessions to idle pods
//! - **Timeouts and cleanup**: ageing out stale sessions, tearing down
//!   sessions of dead pods and deleted applications
//!
//! # Architecture
//!
//! Event handlers mutate the owning pool and mark the application dirty
//! in a deduplicating work queue. Sync workers drain the queue, one pass
//! in flight per application key, reading pool state and emitting
//! open/close/status calls to the external session and pod managers. A
//! timer fires the housekeeping sweep. Authoritative state lives in the
//! external API store and on nodes; every pool is a reconstructable
//! cache.
//!
//! # Example
//!
//! ```ignore
//! use meridian_scheduler::{
//!     PoolRegistry, SchedulerConfig, SchedulerWorker, SessionScheduler, SyncQueue,
//! };
//!
//! let config = SchedulerConfig::load()?;
//! let scheduler = Arc::new(SessionScheduler::new(
//!     Arc::new(PoolRegistry::new()),
//!     session_manager,
//!     pod_manager,
//!     Arc::new(SyncQueue::new()),
//!     config.sync.clone(),
//! ));
//! SchedulerWorker::new(scheduler, config).run(shutdown).await;
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod pool;
pub mod queue;
pub mod reconciler;
pub mod registry;
pub mod scheduler;
pub mod worker;

mod housekeeping;

// Re-export main types
pub use config::{
    HousekeepingConfig, SchedulerConfig, SyncConfig, DEFAULT_SESSION_OPEN_TIMEOUT,
    DEFAULT_SESSION_PENDING_TIMEOUT,
};
pub use error::{Result, SchedulerError};
pub use manager::{MockPodManager, MockSessionManager, PodManager, SessionCall, SessionManager};
pub use pool::{ApplicationPool, PoolPod, SessionBands, SessionSummary};
pub use queue::SyncQueue;
pub use reconciler::SessionEvent;
pub use registry::PoolRegistry;
pub use scheduler::SessionScheduler;
pub use worker::SchedulerWorker;
