//! Periodic timeout sweep and event-driven cleanup.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use meridian_api::{AppKey, SessionState};

use crate::error::{Result, SchedulerError};
use crate::pool::ApplicationPool;
use crate::scheduler::{next_status, SessionScheduler};

impl SessionScheduler {
    /// Sweep every pool and time out sessions past their open deadline.
    ///
    /// An idempotent safety net behind the sync loop's own timeout
    /// phase: a session the sync pass already marked is gone from the
    /// pool before the next sweep sees it.
    pub async fn session_house_keeping(&self) {
        let now = Utc::now();
        for pool in self.pools.pool_list() {
            let bands = pool.group_sessions_by_state(now);
            for session in &bands.timeout {
                debug!(
                    application = %pool.app_key(),
                    session = %session.name,
                    "timing out stale session"
                );
                if let Err(e) = self
                    .change_session_status(session, SessionState::Timeout)
                    .await
                {
                    warn!(session = %session.name, error = %e, "failed to time out session");
                }
            }
        }
    }

    /// Clean up sessions of a pod that disappeared unexpectedly.
    ///
    /// The sessions leave the pool immediately; their terminal statuses
    /// (Closed for live ones, Closing included, Timeout for pending)
    /// are persisted off-path. The node is not contacted: nothing is
    /// left there to close.
    pub async fn cleanup_session_on_deleted_pod(&self, pool: &ApplicationPool, pod_name: &str) {
        info!(
            application = %pool.app_key(),
            pod = %pod_name,
            "cleaning up sessions of deleted pod"
        );
        let mut orphaned = Vec::new();
        for session in pool.sessions_on_pod(pod_name) {
            info!(session = %session.name, "removing session of deleted pod");
            pool.remove_session(&session);
            orphaned.push(session);
        }
        pool.remove_pod(pod_name);

        // The pool no longer holds these sessions, so persisting their
        // fate cannot affect the next sync.
        let manager = Arc::clone(&self.session_manager);
        let deadline = self.config.call_deadline;
        tokio::spawn(async move {
            for session in orphaned {
                // A Closing session counts too: the node report that
                // would have finished it is never coming.
                let state = if session.is_live() {
                    SessionState::Closed
                } else if session.is_pending() {
                    SessionState::Timeout
                } else {
                    continue;
                };
                let new_status = next_status(&session, state);
                let persist = manager.update_session_status(&session, &new_status);
                match tokio::time::timeout(deadline, persist).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(session = %session.name, error = %e, "failed to persist status of orphaned session");
                    }
                    Err(_) => {
                        warn!(session = %session.name, "timed out persisting status of orphaned session");
                    }
                }
            }
        });
    }

    /// Tear down the sessions of an application entering deletion.
    ///
    /// Pending sessions time out and leave the pool; open sessions are
    /// closed and linger until the node reports them Closed. Errors are
    /// aggregated so one session cannot stall the teardown.
    pub async fn cleanup_session_of_application(&self, app_key: &AppKey) -> Result<()> {
        info!(application = %app_key, "deleting all sessions of application");
        let Some(pool) = self.pools.get_pool(app_key) else {
            return Ok(());
        };

        let mut errors: Vec<String> = Vec::new();
        for session in pool.session_list() {
            if let Err(e) = self.delete_application_session(app_key, &session).await {
                warn!(session = %session.name, error = %e, "failed to delete session");
                errors.push(e.to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchedulerError::Partial {
                op: "application session cleanup",
                errors,
            })
        }
    }
}
