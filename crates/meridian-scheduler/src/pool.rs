//! Per-application session and pod index.
//!
//! The pool is the scheduler's in-memory working set for one
//! application: the sessions it knows about, the pods sessions are bound
//! to, and the summary and grouping queries the sync loop runs over
//! them. One reader-writer lock guards both maps; readers proceed
//! concurrently, writers exclude all. The lock is never held across an
//! external call.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use meridian_api::{AppKey, ApplicationSession, SessionState, SessionUid};

/// A pod as tracked inside a pool: its name plus the sessions bound to
/// it. The set is sized for one session per pod today, but the model
/// permits more so the policy can be relaxed at the bind site alone.
#[derive(Debug, Clone, Default)]
pub struct PoolPod {
    /// Session uids currently bound to the pod.
    pub sessions: HashSet<SessionUid>,
}

/// Counts of pool sessions per state.
///
/// A session with a deletion timestamp counts as deleting and nothing
/// else; an Unspecified status counts as pending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Unassigned sessions (Unspecified or Pending).
    pub pending: usize,
    /// Sessions shipped to a pod, not yet up.
    pub starting: usize,
    /// Available sessions with no client attached.
    pub idle: usize,
    /// Sessions with a client attached.
    pub in_use: usize,
    /// Timed-out sessions.
    pub timeout: usize,
    /// Closed sessions.
    pub closed: usize,
    /// Sessions with deletion requested.
    pub deleting: usize,
}

impl SessionSummary {
    /// Total sessions counted.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.pending
            + self.starting
            + self.idle
            + self.in_use
            + self.timeout
            + self.closed
            + self.deleting
    }
}

/// The five disjoint bands the sync loop partitions sessions into.
#[derive(Debug, Clone, Default)]
pub struct SessionBands {
    /// Unassigned and still within the open deadline.
    pub pending: Vec<ApplicationSession>,
    /// Deletion requested and not already closing.
    pub deleting: Vec<ApplicationSession>,
    /// Close in flight, waiting for the node to confirm.
    pub closing: Vec<ApplicationSession>,
    /// Past the open deadline without becoming available.
    pub timeout: Vec<ApplicationSession>,
    /// Live on a pod: Starting within deadline, Available, or InUse.
    pub active: Vec<ApplicationSession>,
}

#[derive(Debug, Default)]
struct PoolInner {
    sessions: HashMap<SessionUid, ApplicationSession>,
    pods: HashMap<String, PoolPod>,
}

/// Per-application working set of sessions and pods.
#[derive(Debug)]
pub struct ApplicationPool {
    app_key: AppKey,
    inner: RwLock<PoolInner>,
}

impl ApplicationPool {
    /// Create an empty pool for an application.
    #[must_use]
    pub fn new(app_key: AppKey) -> Self {
        Self {
            app_key,
            inner: RwLock::new(PoolInner::default()),
        }
    }

    /// The owning application key.
    #[must_use]
    pub fn app_key(&self) -> &AppKey {
        &self.app_key
    }

    /// Look up a session by uid.
    pub fn get_session(&self, uid: &SessionUid) -> Option<ApplicationSession> {
        self.inner.read().sessions.get(uid).cloned()
    }

    /// Number of sessions in the pool.
    pub fn session_len(&self) -> usize {
        self.inner.read().sessions.len()
    }

    /// A stable snapshot of all sessions.
    pub fn session_list(&self) -> Vec<ApplicationSession> {
        self.inner.read().sessions.values().cloned().collect()
    }

    /// Look up a pod entry by name.
    pub fn get_pod(&self, name: &str) -> Option<PoolPod> {
        self.inner.read().pods.get(name).cloned()
    }

    /// Ensure a pod entry exists.
    pub fn add_pod(&self, name: &str) {
        self.inner.write().pods.entry(name.to_owned()).or_default();
    }

    /// Drop a pod entry. Sessions referring to it are untouched.
    pub fn remove_pod(&self, name: &str) {
        self.inner.write().pods.remove(name);
    }

    /// Number of sessions bound to a pod; zero when the pod is unknown.
    pub fn pod_session_count(&self, name: &str) -> usize {
        self.inner
            .read()
            .pods
            .get(name)
            .map_or(0, |p| p.sessions.len())
    }

    /// Sessions whose pod reference names the given pod.
    pub fn sessions_on_pod(&self, name: &str) -> Vec<ApplicationSession> {
        self.inner
            .read()
            .sessions
            .values()
            .filter(|s| s.status.pod_reference.as_deref() == Some(name))
            .cloned()
            .collect()
    }

    /// Insert or replace a non-terminal session, registering its pod
    /// reference if it has one.
    ///
    /// The first time a session is recorded as Available its
    /// `available_time` is stamped.
    pub fn upsert_session(&self, mut session: ApplicationSession) {
        debug_assert!(!session.is_terminal(), "terminal sessions never enter the pool");
        if session.status.session_status == SessionState::Available
            && session.status.available_time.is_none()
        {
            session.status.available_time = Some(Utc::now());
        }
        let mut inner = self.inner.write();
        if let Some(pod_name) = session.status.pod_reference.clone() {
            inner
                .pods
                .entry(pod_name)
                .or_default()
                .sessions
                .insert(session.uid.clone());
        }
        inner.sessions.insert(session.uid.clone(), session);
    }

    /// Remove a session, unlinking it from its pod entry if present.
    ///
    /// Performed under a single write-lock acquisition so a terminal
    /// session is never observable in the pool.
    pub fn remove_session(&self, session: &ApplicationSession) {
        let mut inner = self.inner.write();
        if let Some(pod_name) = session.status.pod_reference.as_deref() {
            if let Some(pod) = inner.pods.get_mut(pod_name) {
                pod.sessions.remove(&session.uid);
            }
        }
        inner.sessions.remove(&session.uid);
    }

    /// Record a successful bind: store the updated session and add its
    /// uid to the pod's session set, atomically.
    pub fn record_binding(&self, pod_name: &str, session: ApplicationSession) {
        let mut inner = self.inner.write();
        inner
            .pods
            .entry(pod_name.to_owned())
            .or_default()
            .sessions
            .insert(session.uid.clone());
        inner.sessions.insert(session.uid.clone(), session);
    }

    /// Stamp a deletion timestamp on the cached copy if it has none.
    ///
    /// Used when a delete event races ahead of the status the node has
    /// yet to report; the session stays pooled until a later update
    /// moves it to a terminal state.
    pub fn stamp_deletion(&self, uid: &SessionUid, at: DateTime<Utc>) -> bool {
        let mut inner = self.inner.write();
        match inner.sessions.get_mut(uid) {
            Some(cached) if cached.deletion_timestamp.is_none() => {
                cached.deletion_timestamp = Some(at);
                true
            }
            _ => false,
        }
    }

    /// Overwrite the in-memory state of a pooled session.
    ///
    /// In-memory only; the node report carrying the same transition is
    /// what gets persisted.
    pub fn set_session_state(&self, uid: &SessionUid, state: SessionState) {
        let mut inner = self.inner.write();
        if let Some(cached) = inner.sessions.get_mut(uid) {
            cached.status.session_status = state;
        }
    }

    /// Count sessions per state.
    pub fn summarise(&self) -> SessionSummary {
        let mut summary = SessionSummary::default();
        for session in self.session_list() {
            if session.deletion_requested() {
                summary.deleting += 1;
                continue;
            }
            match session.status.session_status {
                SessionState::Starting => summary.starting += 1,
                SessionState::Available => summary.idle += 1,
                SessionState::InUse => summary.in_use += 1,
                SessionState::Closed => summary.closed += 1,
                SessionState::Timeout => summary.timeout += 1,
                // Unspecified, Pending and anything else count as
                // pending.
                _ => summary.pending += 1,
            }
        }
        summary
    }

    /// Sum of live sessions and the pending count, for scaling callers.
    pub fn total_and_pending_sessions(&self) -> (usize, usize) {
        let summary = self.summarise();
        (
            summary.idle + summary.in_use + summary.pending + summary.starting + summary.deleting,
            summary.pending,
        )
    }

    /// Partition the session snapshot into the five sync bands.
    ///
    /// Precedence: closing, then deleting, then timeout, then pending or
    /// active. A session is timeout-banded when it is Unspecified,
    /// Pending or Starting and its open deadline has passed.
    pub fn group_sessions_by_state(&self, now: DateTime<Utc>) -> SessionBands {
        let mut bands = SessionBands::default();
        for session in self.session_list() {
            if session.status.session_status == SessionState::Closing {
                bands.closing.push(session);
            } else if session.deletion_requested() {
                bands.deleting.push(session);
            } else if session.is_pending() {
                if session.open_timed_out(now) {
                    bands.timeout.push(session);
                } else {
                    bands.pending.push(session);
                }
            } else if session.status.session_status == SessionState::Starting {
                if session.open_timed_out(now) {
                    bands.timeout.push(session);
                } else {
                    bands.active.push(session);
                }
            } else if session.is_open() {
                bands.active.push(session);
            }
        }
        bands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use meridian_api::{SessionSpec, SessionStatus};

    fn app_key() -> AppKey {
        "default/echo".parse().unwrap()
    }

    fn session(uid: &str, state: SessionState) -> ApplicationSession {
        ApplicationSession {
            uid: SessionUid::new(uid),
            name: format!("default/{uid}"),
            spec: SessionSpec {
                application_name: "default/echo".to_owned(),
                open_timeout_seconds: 10,
                ..SessionSpec::default()
            },
            status: SessionStatus {
                session_status: state,
                ..SessionStatus::default()
            },
            creation_timestamp: Utc::now(),
            deletion_timestamp: None,
        }
    }

    fn bound_session(uid: &str, state: SessionState, pod: &str) -> ApplicationSession {
        let mut s = session(uid, state);
        s.status.pod_reference = Some(pod.to_owned());
        s
    }

    #[test]
    fn upsert_and_get() {
        let pool = ApplicationPool::new(app_key());
        pool.upsert_session(session("u1", SessionState::Pending));

        assert_eq!(pool.session_len(), 1);
        let cached = pool.get_session(&SessionUid::new("u1")).unwrap();
        assert_eq!(cached.status.session_status, SessionState::Pending);
    }

    #[test]
    fn upsert_registers_pod_reference() {
        let pool = ApplicationPool::new(app_key());
        pool.upsert_session(bound_session("u1", SessionState::Starting, "pod-1"));

        let pod = pool.get_pod("pod-1").unwrap();
        assert!(pod.sessions.contains(&SessionUid::new("u1")));
        assert_eq!(pool.pod_session_count("pod-1"), 1);
    }

    #[test]
    fn upsert_stamps_available_time_once() {
        let pool = ApplicationPool::new(app_key());
        pool.upsert_session(bound_session("u1", SessionState::Available, "pod-1"));

        let first = pool
            .get_session(&SessionUid::new("u1"))
            .unwrap()
            .status
            .available_time
            .expect("available_time stamped on first Available");

        // A re-upsert of the stamped copy keeps the original time.
        let cached = pool.get_session(&SessionUid::new("u1")).unwrap();
        pool.upsert_session(cached);
        let second = pool
            .get_session(&SessionUid::new("u1"))
            .unwrap()
            .status
            .available_time
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn remove_session_unlinks_pod() {
        let pool = ApplicationPool::new(app_key());
        let s = bound_session("u1", SessionState::Available, "pod-1");
        pool.upsert_session(s.clone());

        pool.remove_session(&s);
        assert_eq!(pool.session_len(), 0);
        assert_eq!(pool.pod_session_count("pod-1"), 0);
    }

    #[test]
    fn stamp_deletion_only_when_unset() {
        let pool = ApplicationPool::new(app_key());
        pool.upsert_session(session("u1", SessionState::Pending));

        let at = Utc::now();
        assert!(pool.stamp_deletion(&SessionUid::new("u1"), at));
        assert!(!pool.stamp_deletion(&SessionUid::new("u1"), at + ChronoDuration::seconds(5)));

        let cached = pool.get_session(&SessionUid::new("u1")).unwrap();
        assert_eq!(cached.deletion_timestamp, Some(at));
    }

    #[test]
    fn summary_counts_sum_to_session_len() {
        let pool = ApplicationPool::new(app_key());
        pool.upsert_session(session("u1", SessionState::Pending));
        pool.upsert_session(session("u2", SessionState::Unspecified));
        pool.upsert_session(bound_session("u3", SessionState::Starting, "pod-1"));
        pool.upsert_session(bound_session("u4", SessionState::Available, "pod-2"));
        pool.upsert_session(bound_session("u5", SessionState::InUse, "pod-3"));
        let mut deleting = session("u6", SessionState::Pending);
        deleting.deletion_timestamp = Some(Utc::now());
        pool.upsert_session(deleting);

        let summary = pool.summarise();
        assert_eq!(summary.total(), pool.session_len());
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.starting, 1);
        assert_eq!(summary.idle, 1);
        assert_eq!(summary.in_use, 1);
        assert_eq!(summary.deleting, 1);
    }

    #[test]
    fn deleting_sessions_count_only_as_deleting() {
        let pool = ApplicationPool::new(app_key());
        let mut s = bound_session("u1", SessionState::Available, "pod-1");
        s.deletion_timestamp = Some(Utc::now());
        pool.upsert_session(s);

        let summary = pool.summarise();
        assert_eq!(summary.deleting, 1);
        assert_eq!(summary.idle, 0);
    }

    #[test]
    fn total_and_pending() {
        let pool = ApplicationPool::new(app_key());
        pool.upsert_session(session("u1", SessionState::Pending));
        pool.upsert_session(bound_session("u2", SessionState::Available, "pod-1"));

        assert_eq!(pool.total_and_pending_sessions(), (2, 1));
    }

    #[test]
    fn group_bands_are_disjoint() {
        let pool = ApplicationPool::new(app_key());
        pool.upsert_session(session("pending", SessionState::Pending));
        pool.upsert_session(bound_session("starting", SessionState::Starting, "pod-1"));
        pool.upsert_session(bound_session("closing", SessionState::Closing, "pod-2"));
        let mut deleting = bound_session("deleting", SessionState::Available, "pod-3");
        deleting.deletion_timestamp = Some(Utc::now());
        pool.upsert_session(deleting);
        let mut stale = session("stale", SessionState::Pending);
        stale.creation_timestamp = Utc::now() - ChronoDuration::seconds(30);
        pool.upsert_session(stale);

        let bands = pool.group_sessions_by_state(Utc::now());
        assert_eq!(bands.pending.len(), 1);
        assert_eq!(bands.active.len(), 1);
        assert_eq!(bands.closing.len(), 1);
        assert_eq!(bands.deleting.len(), 1);
        assert_eq!(bands.timeout.len(), 1);
        assert_eq!(bands.timeout[0].uid, SessionUid::new("stale"));
    }

    #[test]
    fn closing_wins_over_deleting() {
        let pool = ApplicationPool::new(app_key());
        let mut s = bound_session("u1", SessionState::Closing, "pod-1");
        s.deletion_timestamp = Some(Utc::now());
        pool.upsert_session(s);

        let bands = pool.group_sessions_by_state(Utc::now());
        assert_eq!(bands.closing.len(), 1);
        assert!(bands.deleting.is_empty());
    }

    #[test]
    fn starting_past_deadline_is_timeout_banded() {
        let pool = ApplicationPool::new(app_key());
        let mut s = bound_session("u1", SessionState::Starting, "pod-1");
        s.creation_timestamp = Utc::now() - ChronoDuration::seconds(60);
        pool.upsert_session(s);

        let bands = pool.group_sessions_by_state(Utc::now());
        assert_eq!(bands.timeout.len(), 1);
        assert!(bands.active.is_empty());
    }

    #[test]
    fn session_list_is_a_snapshot() {
        let pool = ApplicationPool::new(app_key());
        pool.upsert_session(session("u1", SessionState::Pending));

        let snapshot = pool.session_list();
        pool.upsert_session(session("u2", SessionState::Pending));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(pool.session_len(), 2);
    }
}
