//! Error types for the session scheduler.

use thiserror::Error;

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Scheduler errors.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The session names an application that is not a valid
    /// `namespace/name` key.
    #[error("invalid application key: {0}")]
    InvalidApplicationKey(#[from] meridian_api::KeyError),

    /// A session manager call failed.
    #[error("session manager error: {0}")]
    SessionManager(String),

    /// A pod manager call failed.
    #[error("pod manager error: {0}")]
    PodManager(String),

    /// An external call exceeded its ambient deadline.
    #[error("deadline exceeded calling {0}")]
    DeadlineExceeded(&'static str),

    /// Some sessions failed during a multi-session pass. The pass keeps
    /// going past individual failures so one bad session does not stall
    /// its application.
    #[error("{op}: some sessions failed: {errors:?}")]
    Partial {
        /// The pass that partially failed.
        op: &'static str,
        /// Collected per-session error messages.
        errors: Vec<String>,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// Create a session manager error.
    #[must_use]
    pub fn session_manager(msg: impl Into<String>) -> Self {
        Self::SessionManager(msg.into())
    }

    /// Create a pod manager error.
    #[must_use]
    pub fn pod_manager(msg: impl Into<String>) -> Self {
        Self::PodManager(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
