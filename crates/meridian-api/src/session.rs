//! Application sessions and the session state machine.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pod::Protocol;

/// Default time allowed for a session to go from creation to Available.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Default grace period granted to clients when a session is closed.
pub const DEFAULT_CLOSE_GRACE_PERIOD_SECONDS: u32 = 60;

/// Stable, globally unique session identifier.
///
/// The uid is assigned at creation and never reused; it is the key for
/// all scheduler-side bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionUid(String);

impl SessionUid {
    /// Create a uid from an existing identifier.
    #[must_use]
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    /// The uid as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SessionUid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionUid {
    fn from(uid: &str) -> Self {
        Self(uid.to_owned())
    }
}

/// Session lifecycle states.
///
/// Nodes are authoritative for everything between `Starting` and
/// `Closed`; the control plane only originates `Starting` (bind, in
/// memory), `Timeout` and `Closed` (cleanup). `Closed` and `Timeout` are
/// terminal and absorbing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Status not yet reported; treated as pending.
    #[default]
    Unspecified,
    /// Waiting to be assigned a pod.
    Pending,
    /// Sent to a pod, waiting for the node to report it up.
    Starting,
    /// Running on a pod, no client attached yet.
    Available,
    /// Running on a pod with a client attached.
    InUse,
    /// Close requested, waiting for the node to confirm.
    Closing,
    /// Closed on the node. Terminal.
    Closed,
    /// Never became available in time. Terminal.
    Timeout,
}

impl SessionState {
    /// The state name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "Unspecified",
            Self::Pending => "Pending",
            Self::Starting => "Starting",
            Self::Available => "Available",
            Self::InUse => "InUse",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
            Self::Timeout => "Timeout",
        }
    }

    /// True for sessions not yet assigned to a pod.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Unspecified | Self::Pending)
    }

    /// True for sessions live (or going live) on a pod.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Starting | Self::Available | Self::InUse)
    }

    /// True for sessions with presence on a pod, including ones still
    /// winding down. Broader than [`is_open`](Self::is_open): a Closing
    /// session no longer accepts clients but its record still tracks
    /// the pod.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(
            self,
            Self::Starting | Self::Available | Self::InUse | Self::Closing
        )
    }

    /// True for absorbing states; a terminal session is never resurrected.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Timeout)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "Unspecified" => Ok(Self::Unspecified),
            "Pending" => Ok(Self::Pending),
            "Starting" => Ok(Self::Starting),
            "Available" => Ok(Self::Available),
            "InUse" => Ok(Self::InUse),
            "Closing" => Ok(Self::Closing),
            "Closed" => Ok(Self::Closed),
            "Timeout" => Ok(Self::Timeout),
            _ => Err(format!("unknown session state: {s}")),
        }
    }
}

/// A network endpoint a client can attach to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEndPoint {
    /// Transport protocol.
    pub protocol: Protocol,
    /// Host IP address of the pod's exposed port.
    pub ip_address: String,
    /// Host port.
    pub port: u16,
}

/// Desired state of a session, declared by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionSpec {
    /// Owning application as `namespace/name`. Validated at reconcile
    /// time, not at deserialisation.
    pub application_name: String,
    /// Opaque payload handed to the application instance on open.
    pub session_data: String,
    /// Terminate the pod once this session closes.
    pub kill_instance_when_session_closed: bool,
    /// Grace period before a close is forced, in seconds.
    pub close_grace_period_seconds: Option<u32>,
    /// Time allowed to reach Available, in seconds. Zero means the
    /// default of [`DEFAULT_OPEN_TIMEOUT`].
    pub open_timeout_seconds: u32,
}

impl Default for SessionSpec {
    fn default() -> Self {
        Self {
            application_name: String::new(),
            session_data: String::new(),
            kill_instance_when_session_closed: false,
            close_grace_period_seconds: Some(DEFAULT_CLOSE_GRACE_PERIOD_SECONDS),
            open_timeout_seconds: 0,
        }
    }
}

/// Observed state of a session, reported by nodes and the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionStatus {
    /// Current lifecycle state.
    pub session_status: SessionState,
    /// Name of the pod this session is bound to, if any.
    pub pod_reference: Option<String>,
    /// Endpoints the client can attach to once the session is up.
    pub access_end_points: Vec<AccessEndPoint>,
    /// Identifiers of clients currently attached.
    pub client_sessions: Vec<String>,
    /// When the session first became Available.
    pub available_time: Option<DateTime<Utc>>,
    /// When the session first closed.
    pub close_time: Option<DateTime<Utc>>,
}

/// A client-initiated attachment request, bound to at most one pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSession {
    /// Stable unique identifier; the pool key.
    pub uid: SessionUid,
    /// Object name, `namespace/name`, used for logging only.
    pub name: String,
    /// Declared intent.
    pub spec: SessionSpec,
    /// Observed state.
    #[serde(default)]
    pub status: SessionStatus,
    /// When the session object was created.
    pub creation_timestamp: DateTime<Utc>,
    /// Set when deletion is requested. Monotonic: once set, never
    /// cleared.
    #[serde(default)]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ApplicationSession {
    /// True for sessions not yet assigned to a pod.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.status.session_status.is_pending()
    }

    /// True for sessions live (or going live) on a pod.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.status.session_status.is_open()
    }

    /// True for sessions with presence on a pod, including Closing.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.status.session_status.is_live()
    }

    /// True once the session has entered an absorbing state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.session_status.is_terminal()
    }

    /// True once deletion has been requested.
    #[must_use]
    pub const fn deletion_requested(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// The effective open timeout for this session.
    #[must_use]
    pub fn open_timeout(&self) -> Duration {
        if self.spec.open_timeout_seconds > 0 {
            Duration::from_secs(u64::from(self.spec.open_timeout_seconds))
        } else {
            DEFAULT_OPEN_TIMEOUT
        }
    }

    /// Absolute deadline by which this session must become Available.
    ///
    /// Expressed as an absolute instant so that repeated evaluations
    /// across syncs agree.
    #[must_use]
    pub fn open_deadline(&self) -> DateTime<Utc> {
        self.creation_timestamp
            + chrono::Duration::from_std(self.open_timeout())
                .unwrap_or_else(|_| chrono::Duration::seconds(0))
    }

    /// True once the open deadline has passed.
    #[must_use]
    pub fn open_timed_out(&self, now: DateTime<Utc>) -> bool {
        now > self.open_deadline()
    }
}
