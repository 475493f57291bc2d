//! Error types for session and dispatch operations.

use crate::host::OwnerId;
use std::any::Any;
use thiserror::Error;

/// Usage-contract violations. Both variants are fatal to the caller and never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    /// A session was requested for an owner the host has already disabled.
    #[error("Cannot start a task session for owner '{owner}': the owner is disabled")]
    SessionOnDisabledOwner { owner: OwnerId },

    /// An event was fired from a thread that does not match its synchronicity.
    #[error("Event '{event}' must be fired {expected}")]
    WrongThread { event: String, expected: &'static str },
}

/// Result type for scheduling operations.
pub type SchedulingResult<T> = Result<T, SchedulingError>;

/// Cancellation signal carried as a task outcome.
///
/// A task body that returns this error, directly or anywhere in its cause
/// chain, ends as cancelled rather than failed.
#[derive(Error, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[error("Task was cancelled")]
pub struct TaskCancelled;

/// A task body panicked. The panic is caught at the task boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Task panicked: {message}")]
pub struct TaskPanicked {
    pub message: String,
}

impl TaskPanicked {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }
}

/// Whether `error` is a cancellation signal.
pub fn is_cancellation(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| cause.is::<TaskCancelled>())
}
