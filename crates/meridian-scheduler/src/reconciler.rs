//! Event ingress: session watch events and node session reports.
//!
//! These handlers keep the application pools converging toward the
//! latest known ground truth. Watch events carry user intent; node
//! reports carry authoritative status. Handlers mutate the owning pool
//! and mark the application dirty for the sync loop.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use meridian_api::{AppKey, ApplicationSession, PodSnapshot, SessionState};

use crate::error::Result;
use crate::scheduler::SessionScheduler;

/// A session report arriving from a node via the session manager
/// ingress.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    /// The pod hosting (or having hosted) the session.
    pub pod: PodSnapshot,
    /// The session with node-reported status.
    pub session: ApplicationSession,
}

impl SessionScheduler {
    /// Resolve the owning application key of a session.
    pub fn session_app_key(&self, session: &ApplicationSession) -> Result<AppKey> {
        Ok(AppKey::parse(&session.spec.application_name)?)
    }

    /// Handle a session creation event from the watch stream.
    pub async fn on_session_add(&self, session: &ApplicationSession) {
        if session.deletion_requested() {
            self.on_session_delete(session.clone()).await;
            return;
        }
        let app_key = match self.session_app_key(session) {
            Ok(key) => key,
            Err(e) => {
                error!(session = %session.name, error = %e, "cannot resolve application key");
                self.close_invalid_session(session).await;
                return;
            }
        };
        info!(application = %app_key, session = %session.name, "application session created");
        self.update_session_pool(&app_key, session.clone(), false);
        self.queue.enqueue(app_key);
    }

    /// Handle a session update event from the watch stream.
    ///
    /// The pool's cached copy, when present, is preferred over the watch
    /// stream's old snapshot: node reports land in the pool ahead of the
    /// stream. The application is only re-queued when deletion was newly
    /// requested or the status changed.
    pub async fn on_session_update(&self, old: &ApplicationSession, new: &ApplicationSession) {
        if old == new {
            return;
        }
        let app_key = match self.session_app_key(new) {
            Ok(key) => key,
            Err(e) => {
                error!(session = %new.name, error = %e, "cannot resolve application key");
                self.close_invalid_session(new).await;
                return;
            }
        };

        let pool = self.pools.get_or_create_pool(&app_key);
        let effective_old = pool.get_session(&new.uid).unwrap_or_else(|| old.clone());

        self.update_session_pool(&app_key, new.clone(), false);

        let newly_deleting = new.deletion_requested() && !effective_old.deletion_requested();
        if newly_deleting || effective_old.status != new.status {
            info!(
                application = %app_key,
                session = %new.name,
                status = %new.status.session_status,
                deleting = new.deletion_requested(),
                "application session updated"
            );
            self.queue.enqueue(app_key);
        }
    }

    /// Handle a session deletion event from the watch stream.
    pub async fn on_session_delete(&self, mut session: ApplicationSession) {
        if session.deletion_timestamp.is_none() {
            session.deletion_timestamp = Some(Utc::now());
        }
        let app_key = match self.session_app_key(&session) {
            Ok(key) => key,
            Err(e) => {
                error!(session = %session.name, error = %e, "cannot resolve application key");
                return;
            }
        };
        info!(
            application = %app_key,
            session = %session.name,
            status = %session.status.session_status,
            "application session deleted"
        );
        self.update_session_pool(&app_key, session, true);
        self.queue.enqueue(app_key);
    }

    /// Handle a session report from a node.
    ///
    /// The node is authoritative for status: the report is applied
    /// unconditionally and persisted asynchronously as a blind write
    /// against the cached-old snapshot (the persist layer drops stale
    /// writes by resource version). A Closed report for a
    /// kill-on-close session also terminates the pod.
    pub async fn on_session_event_from_node(&self, event: &SessionEvent) -> Result<()> {
        let session = &event.session;
        let new_status = session.status.clone();
        let app_key = self.session_app_key(session)?;
        let cached = self
            .pools
            .get_pool(&app_key)
            .and_then(|pool| pool.get_session(&session.uid));

        match cached {
            None => {
                if session.is_terminal() {
                    self.on_session_delete(session.clone()).await;
                } else {
                    self.on_session_add(session).await;
                }
            }
            Some(old_copy) => {
                self.on_session_update(&old_copy, session).await;
                // Blind write off the event path; the persist layer
                // drops stale writes by resource version.
                let manager = Arc::clone(&self.session_manager);
                let persisted_status = new_status.clone();
                tokio::spawn(async move {
                    if let Err(e) = manager
                        .update_session_status(&old_copy, &persisted_status)
                        .await
                    {
                        warn!(
                            session = %old_copy.name,
                            error = %e,
                            "failed to persist node-reported session status"
                        );
                    }
                });
            }
        }

        if session.spec.kill_instance_when_session_closed
            && new_status.session_status == SessionState::Closed
            && !event.pod.terminating
        {
            info!(
                pod = %event.pod.name,
                session = %session.name,
                "terminating pod whose session closed"
            );
            self.pod_manager.terminate_pod(&event.pod).await?;
        }
        Ok(())
    }

    /// Apply a session to its pool.
    ///
    /// Terminal sessions leave the pool (unlinking their pod). Live
    /// sessions are upserted. A deleted-but-not-terminal session, where
    /// the delete raced ahead of the node's status, gets its deletion
    /// timestamp stamped on the cached copy and stays pooled until a
    /// later update turns terminal.
    pub(crate) fn update_session_pool(
        &self,
        app_key: &AppKey,
        session: ApplicationSession,
        deleted: bool,
    ) {
        let pool = self.pools.get_or_create_pool(app_key);
        if session.is_terminal() {
            pool.remove_session(&session);
        } else if !deleted {
            pool.upsert_session(session);
        } else {
            let at = session.deletion_timestamp.unwrap_or_else(Utc::now);
            pool.stamp_deletion(&session.uid, at);
        }
    }

    /// Best-effort close for a session whose application key is
    /// unresolvable.
    async fn close_invalid_session(&self, session: &ApplicationSession) {
        if !session.is_open() {
            return;
        }
        if let Err(e) = self.close_application_session(session).await {
            warn!(session = %session.name, error = %e, "failed to close orphaned session");
        }
    }
}
