//! Session error types
//!
//! [`SessionError`] covers requests rejected synchronously by a precondition
//! check; nothing changes and no event is emitted. [`LinkError`] is reported
//! by the BLE stack after the fact and always reaches the subscriber as
//! [`SessionEvent::Error`](crate::domain::models::SessionEvent::Error).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("a scan is already in progress")]
    AlreadyScanning,

    #[error("scan target must not be empty")]
    EmptyTarget,

    #[error("a device link is active; end the trip before scanning again")]
    LinkActive,

    #[error("no target device has been found")]
    NoTarget,

    #[error("target device was superseded by a newer discovery")]
    StaleTarget,

    #[error("session is not command-ready")]
    NotReady,

    #[error("an event subscriber is already attached")]
    AlreadySubscribed,

    #[error("session has been shut down")]
    Closed,
}

/// Failure reported by the platform for a connect, disconnect or write
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("link error: {reason}")]
pub struct LinkError {
    pub reason: String,
}

impl LinkError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
