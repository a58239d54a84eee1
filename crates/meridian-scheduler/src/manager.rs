//! External collaborator interfaces.
//!
//! The scheduler sees the rest of the system through two traits: the
//! session manager, which persists status and carries open/close RPCs to
//! nodes, and the pod manager, which owns pod lifecycle and lookups.
//! Both are long-running calls from the scheduler's perspective and are
//! always invoked with no pool lock held.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use meridian_api::{
    AccessEndPoint, AppKey, ApplicationSession, PodSnapshot, SessionState, SessionStatus,
    SessionUid,
};

use crate::error::{Result, SchedulerError};

/// Ships session lifecycle operations to nodes and persists status.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Ship a Starting session with its endpoints to a pod's node.
    ///
    /// Idempotent for the same `(pod, session uid)` pair; a duplicate
    /// open after a lost acknowledgement is harmless.
    async fn open_session(&self, pod: &PodSnapshot, session: &ApplicationSession) -> Result<()>;

    /// Request close of a session on a pod's node. Idempotent; the node
    /// reports back the terminal status.
    async fn close_session(&self, pod: &PodSnapshot, session: &ApplicationSession) -> Result<()>;

    /// Persist a status change against an old snapshot.
    ///
    /// The snapshot pair lets the persist layer detect conflicts by
    /// resource version and drop stale writes; callers treat this as a
    /// blind write.
    async fn update_session_status(
        &self,
        old: &ApplicationSession,
        new_status: &SessionStatus,
    ) -> Result<()>;
}

/// Owns pod lifecycle and lookups.
#[async_trait]
pub trait PodManager: Send + Sync {
    /// Look up a pod by name.
    async fn find_pod(&self, name: &str) -> Option<PodSnapshot>;

    /// Terminate a pod.
    async fn terminate_pod(&self, pod: &PodSnapshot) -> Result<()>;

    /// The running pods of an application with no session assigned, in a
    /// stable order.
    async fn list_idle_running_pods(&self, app_key: &AppKey) -> Vec<PodSnapshot>;
}

/// A call recorded by [`MockSessionManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    /// An `open_session` call.
    Open {
        /// Target pod name.
        pod: String,
        /// Session uid.
        uid: SessionUid,
        /// Session state carried in the request.
        state: SessionState,
        /// Endpoints carried in the request.
        endpoints: Vec<AccessEndPoint>,
    },
    /// A `close_session` call.
    Close {
        /// Target pod name.
        pod: String,
        /// Session uid.
        uid: SessionUid,
    },
    /// An `update_session_status` call.
    UpdateStatus {
        /// Session uid.
        uid: SessionUid,
        /// State being persisted.
        state: SessionState,
    },
}

/// Recording session manager for tests.
#[derive(Debug, Default)]
pub struct MockSessionManager {
    calls: Mutex<Vec<SessionCall>>,
    fail_open_on: Mutex<HashSet<String>>,
}

impl MockSessionManager {
    /// Create a mock that accepts every call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `open_session` fail for a given pod.
    pub fn fail_open_on(&self, pod_name: impl Into<String>) {
        self.fail_open_on.lock().insert(pod_name.into());
    }

    /// All calls recorded so far.
    pub fn calls(&self) -> Vec<SessionCall> {
        self.calls.lock().clone()
    }

    /// Status updates recorded for a session, in order.
    pub fn status_updates(&self, uid: &SessionUid) -> Vec<SessionState> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                SessionCall::UpdateStatus { uid: u, state } if u == uid => Some(*state),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl SessionManager for MockSessionManager {
    async fn open_session(&self, pod: &PodSnapshot, session: &ApplicationSession) -> Result<()> {
        self.calls.lock().push(SessionCall::Open {
            pod: pod.name.clone(),
            uid: session.uid.clone(),
            state: session.status.session_status,
            endpoints: session.status.access_end_points.clone(),
        });
        if self.fail_open_on.lock().contains(&pod.name) {
            return Err(SchedulerError::session_manager(format!(
                "open rejected by {}",
                pod.name
            )));
        }
        Ok(())
    }

    async fn close_session(&self, pod: &PodSnapshot, session: &ApplicationSession) -> Result<()> {
        self.calls.lock().push(SessionCall::Close {
            pod: pod.name.clone(),
            uid: session.uid.clone(),
        });
        Ok(())
    }

    async fn update_session_status(
        &self,
        old: &ApplicationSession,
        new_status: &SessionStatus,
    ) -> Result<()> {
        self.calls.lock().push(SessionCall::UpdateStatus {
            uid: old.uid.clone(),
            state: new_status.session_status,
        });
        Ok(())
    }
}

/// In-memory pod manager for tests.
#[derive(Debug, Default)]
pub struct MockPodManager {
    pods: Mutex<HashMap<String, PodSnapshot>>,
    idle: Mutex<HashMap<AppKey, Vec<String>>>,
    terminated: Mutex<Vec<String>>,
}

impl MockPodManager {
    /// Create a mock with no pods.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pod.
    pub fn insert_pod(&self, pod: PodSnapshot) {
        self.pods.lock().insert(pod.name.clone(), pod);
    }

    /// Remove a pod, simulating unexpected disappearance.
    pub fn remove_pod(&self, name: &str) {
        self.pods.lock().remove(name);
        for names in self.idle.lock().values_mut() {
            names.retain(|n| n != name);
        }
    }

    /// Declare which pods the classifier reports idle-running for an
    /// application, in order.
    pub fn set_idle_running(&self, app_key: &AppKey, names: Vec<&str>) {
        self.idle
            .lock()
            .insert(app_key.clone(), names.into_iter().map(String::from).collect());
    }

    /// Names of pods terminated via [`PodManager::terminate_pod`].
    pub fn terminated(&self) -> Vec<String> {
        self.terminated.lock().clone()
    }
}

#[async_trait]
impl PodManager for MockPodManager {
    async fn find_pod(&self, name: &str) -> Option<PodSnapshot> {
        self.pods.lock().get(name).cloned()
    }

    async fn terminate_pod(&self, pod: &PodSnapshot) -> Result<()> {
        self.terminated.lock().push(pod.name.clone());
        self.pods.lock().remove(&pod.name);
        Ok(())
    }

    async fn list_idle_running_pods(&self, app_key: &AppKey) -> Vec<PodSnapshot> {
        let names = self.idle.lock().get(app_key).cloned().unwrap_or_default();
        let pods = self.pods.lock();
        names
            .iter()
            .filter_map(|name| pods.get(name))
            .filter(|pod| pod.running && !pod.terminating)
            .cloned()
            .collect()
    }
}
