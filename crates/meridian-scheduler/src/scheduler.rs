//! The session scheduler and its per-application sync pass.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use meridian_api::{AccessEndPoint, AppKey, ApplicationSession, PodSnapshot, SessionState, SessionStatus};

use crate::config::SyncConfig;
use crate::error::{Result, SchedulerError};
use crate::manager::{PodManager, SessionManager};
use crate::queue::SyncQueue;
use crate::registry::PoolRegistry;

/// Drives application sessions through their lifecycle.
///
/// One scheduler instance serves every application; callers serialise
/// [`sync_application_sessions`](Self::sync_application_sessions) per
/// application key (the worker loop guarantees one pass in flight per
/// key). Pool mutation happens in bounded critical sections; external
/// calls are made with no lock held and carry the configured deadline.
pub struct SessionScheduler {
    pub(crate) pools: Arc<PoolRegistry>,
    pub(crate) session_manager: Arc<dyn SessionManager>,
    pub(crate) pod_manager: Arc<dyn PodManager>,
    pub(crate) queue: Arc<SyncQueue>,
    pub(crate) config: SyncConfig,
}

impl SessionScheduler {
    /// Create a scheduler over the given collaborators.
    pub fn new(
        pools: Arc<PoolRegistry>,
        session_manager: Arc<dyn SessionManager>,
        pod_manager: Arc<dyn PodManager>,
        queue: Arc<SyncQueue>,
        config: SyncConfig,
    ) -> Self {
        Self {
            pools,
            session_manager,
            pod_manager,
            queue,
            config,
        }
    }

    /// The pool registry this scheduler reconciles.
    #[must_use]
    pub fn pools(&self) -> &Arc<PoolRegistry> {
        &self.pools
    }

    /// The work queue feeding dirty application keys.
    #[must_use]
    pub fn queue(&self) -> &Arc<SyncQueue> {
        &self.queue
    }

    /// Mark an application dirty for the sync loop.
    pub fn enqueue_application(&self, app_key: AppKey) {
        self.queue.enqueue(app_key);
    }

    /// Run one sync pass for an application.
    ///
    /// Phases run bind, then timeout, then delete, so a session that
    /// just aged out is not wastefully bound first and a session bound
    /// in this pass is not simultaneously deleted. Individual failures
    /// are collected and the pass keeps going.
    pub async fn sync_application_sessions(&self, app_key: &AppKey) -> Result<()> {
        let Some(pool) = self.pools.get_pool(app_key) else {
            return Ok(());
        };

        let idle_pods = self.pod_manager.list_idle_running_pods(app_key).await;
        let bands = pool.group_sessions_by_state(Utc::now());
        info!(
            application = %app_key,
            pending = bands.pending.len(),
            active = bands.active.len(),
            deleting = bands.deleting.len(),
            timeout = bands.timeout.len(),
            idle_pods = idle_pods.len(),
            "syncing application sessions"
        );

        let mut errors: Vec<String> = Vec::new();

        // Bind phase. Walk idle pods in classifier order, consuming
        // pending sessions in band order. A failed bind moves on to the
        // next pod, not the next session: the pod may refuse other
        // sessions too, while the session stays eligible.
        let mut next_pending = 0;
        for pod in &idle_pods {
            if next_pending == bands.pending.len() {
                break;
            }
            // One session per pod. The classifier believes the pod is
            // idle; the pool knows about binds from this very pass.
            if pool.pod_session_count(&pod.name) > 0 {
                continue;
            }
            let session = &bands.pending[next_pending];
            match self.bind_session_to_pod(app_key, pod, session).await {
                Ok(bound) => {
                    pool.record_binding(&pod.name, bound);
                    next_pending += 1;
                }
                Err(e) => {
                    warn!(
                        application = %app_key,
                        session = %session.name,
                        pod = %pod.name,
                        error = %e,
                        "failed to open session on pod"
                    );
                    errors.push(e.to_string());
                }
            }
        }

        // Timeout phase. The session leaves the pool when the resulting
        // status-update event comes back through the reconciler.
        for session in &bands.timeout {
            if let Err(e) = self
                .change_session_status(session, SessionState::Timeout)
                .await
            {
                warn!(session = %session.name, error = %e, "failed to time out session");
                errors.push(e.to_string());
            }
        }

        // Deletion phase.
        for session in &bands.deleting {
            if let Err(e) = self.delete_application_session(app_key, session).await {
                warn!(session = %session.name, error = %e, "failed to delete session");
                errors.push(e.to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchedulerError::Partial {
                op: "session sync",
                errors,
            })
        }
    }

    /// Assign a pending session to an idle pod.
    ///
    /// Builds the Starting status with the pod's endpoints and ships it
    /// via the session manager. The updated session is returned for the
    /// caller to record; on error nothing is written, so the session
    /// stays Pending for the next pass. Pending to Starting is never
    /// persisted here: the node reports it back, and a control plane
    /// that crashes in between simply rebinds (open is idempotent per
    /// pod and session uid).
    pub(crate) async fn bind_session_to_pod(
        &self,
        app_key: &AppKey,
        pod: &PodSnapshot,
        session: &ApplicationSession,
    ) -> Result<ApplicationSession> {
        info!(
            application = %app_key,
            pod = %pod.name,
            session = %session.name,
            "assigning session to pod"
        );
        let mut bound = session.clone();
        bound.status.session_status = SessionState::Starting;
        for port in pod.host_ports() {
            bound.status.access_end_points.push(AccessEndPoint {
                protocol: port.protocol,
                ip_address: port.host_ip.clone(),
                port: port.host_port,
            });
        }
        bound.status.pod_reference = Some(pod.name.clone());

        self.with_deadline(
            "open_session",
            self.session_manager.open_session(pod, &bound),
        )
        .await?;
        Ok(bound)
    }

    /// Process one deleting-banded session.
    ///
    /// Open sessions are closed and kept pooled until the node reports
    /// back. Pending sessions are marked Timeout. Anything else is
    /// already terminal or closing and is dropped from the pool.
    pub async fn delete_application_session(
        &self,
        app_key: &AppKey,
        session: &ApplicationSession,
    ) -> Result<()> {
        let Some(pool) = self.pools.get_pool(app_key) else {
            return Ok(());
        };

        if session.is_open() {
            return self.close_application_session(session).await;
        } else if session.is_pending() {
            self.change_session_status(session, SessionState::Timeout)
                .await?;
        }

        pool.remove_session(session);
        Ok(())
    }

    /// Request close of an open session.
    ///
    /// The in-memory state moves to Closing up front so the close is
    /// not re-issued every sync; if the node reports a different status
    /// the close will be issued again (close is idempotent). When the
    /// pod is unknown, as can happen mid-restart before pods are fully
    /// reported, the session is marked Closed directly and the client
    /// must resubmit.
    pub async fn close_application_session(&self, session: &ApplicationSession) -> Result<()> {
        info!(session = %session.name, "closing application session");
        if !session.is_open() {
            return Ok(());
        }
        let Some(pod_name) = session.status.pod_reference.clone() else {
            return Ok(());
        };

        match self.pod_manager.find_pod(&pod_name).await {
            Some(pod) => {
                let mut closing = session.clone();
                closing.status.session_status = SessionState::Closing;
                if let Ok(app_key) = self.session_app_key(session) {
                    if let Some(pool) = self.pools.get_pool(&app_key) {
                        pool.set_session_state(&session.uid, SessionState::Closing);
                    }
                }
                self.with_deadline(
                    "close_session",
                    self.session_manager.close_session(&pod, &closing),
                )
                .await
            }
            None => {
                self.change_session_status(session, SessionState::Closed)
                    .await
            }
        }
    }

    /// Persist a status change for a session.
    pub(crate) async fn change_session_status(
        &self,
        session: &ApplicationSession,
        state: SessionState,
    ) -> Result<()> {
        let new_status = next_status(session, state);
        self.with_deadline(
            "update_session_status",
            self.session_manager.update_session_status(session, &new_status),
        )
        .await
    }

    pub(crate) async fn with_deadline<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.call_deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(SchedulerError::DeadlineExceeded(op)),
        }
    }
}

impl std::fmt::Debug for SessionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionScheduler").finish_non_exhaustive()
    }
}

/// Build the status for a session entering `state`.
///
/// Entry into a terminal state releases the client session list so the
/// object can be hard deleted, and first entry into Closed stamps the
/// close time.
pub(crate) fn next_status(session: &ApplicationSession, state: SessionState) -> SessionStatus {
    let mut status = session.status.clone();
    status.session_status = state;
    if state.is_terminal() {
        status.client_sessions.clear();
        if state == SessionState::Closed && status.close_time.is_none() {
            status.close_time = Some(Utc::now());
        }
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_api::{SessionSpec, SessionUid};

    fn session(state: SessionState) -> ApplicationSession {
        ApplicationSession {
            uid: SessionUid::new("u1"),
            name: "default/sess-1".to_owned(),
            spec: SessionSpec::default(),
            status: SessionStatus {
                session_status: state,
                client_sessions: vec!["client-1".to_owned()],
                ..SessionStatus::default()
            },
            creation_timestamp: Utc::now(),
            deletion_timestamp: None,
        }
    }

    #[test]
    fn terminal_status_clears_clients() {
        let status = next_status(&session(SessionState::Available), SessionState::Timeout);
        assert_eq!(status.session_status, SessionState::Timeout);
        assert!(status.client_sessions.is_empty());
        assert!(status.close_time.is_none());
    }

    #[test]
    fn closed_status_stamps_close_time_once() {
        let status = next_status(&session(SessionState::Closing), SessionState::Closed);
        assert!(status.close_time.is_some());

        let mut already_closed = session(SessionState::Closing);
        already_closed.status.close_time = status.close_time;
        let again = next_status(&already_closed, SessionState::Closed);
        assert_eq!(again.close_time, status.close_time);
    }

    #[test]
    fn non_terminal_status_keeps_clients() {
        let status = next_status(&session(SessionState::Available), SessionState::Closing);
        assert_eq!(status.client_sessions.len(), 1);
    }
}
