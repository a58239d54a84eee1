//! Resource model shared between the Meridian control plane and node agents.
//!
//! This crate defines the data types the session scheduler operates on:
//!
//! - **Application keys**: validated `namespace/name` identifiers used to
//!   shard all other state
//! - **Sessions**: client-initiated attachment requests and their observed
//!   status, including the session state machine
//! - **Pods**: the control plane's snapshot of a remote execution instance
//!
//! Types here are pure data plus predicates. Authoritative state lives in
//! the external API store and on nodes; everything in this crate is a
//! reconstructable view of it.

mod key;
mod pod;
mod session;

pub use key::{AppKey, KeyError};
pub use pod::{ContainerPort, ContainerSpec, PodSnapshot, Protocol};
pub use session::{
    AccessEndPoint, ApplicationSession, SessionSpec, SessionState, SessionStatus, SessionUid,
    DEFAULT_CLOSE_GRACE_PERIOD_SECONDS, DEFAULT_OPEN_TIMEOUT,
};
