//! Root failure boundary of a session.
//!
//! Every task launched through a session reports its failure here instead of
//! propagating it, so one failing task never cancels its siblings or the
//! session scope.

use crate::error::is_cancellation;
use crate::host::{Host, OwnerId, Runnable, TaskExceptionEvent};
use std::sync::Arc;
use tickweave_config::CancellationLevel;

/// Converts unhandled task failures into a host notification and an error log.
pub struct FailureBoundary {
    owner: OwnerId,
    host: Arc<dyn Host>,
    cancellation_level: CancellationLevel,
}

impl FailureBoundary {
    pub fn new(owner: OwnerId, host: Arc<dyn Host>, cancellation_level: CancellationLevel) -> Self {
        Self {
            owner,
            host,
            cancellation_level,
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Handle a task failure.
    ///
    /// Cancellations are logged at the configured low level. Anything else is
    /// delivered to the host as a cancellable [`TaskExceptionEvent`] on the
    /// next tick and logged at error level unless the host cancels the event.
    pub fn report(&self, error: anyhow::Error) {
        if is_cancellation(&error) {
            self.log_cancellation(&error);
            return;
        }

        if !self.host.is_owner_enabled(&self.owner) {
            // The host scheduler is gone; the notification cannot be delivered.
            tracing::error!(owner = %self.owner, "unhandled failure in task after owner was disabled: {:#}", error);
            return;
        }

        let host = Arc::clone(&self.host);
        let owner = self.owner.clone();
        let notify = Runnable::labelled("tickweave-task-exception", move || {
            let mut event = TaskExceptionEvent::new(&owner, &error);
            host.fire_exception_event(&mut event);
            if !event.is_cancelled() {
                tracing::error!(owner = %owner, "unhandled failure in task: {:#}", error);
            }
        });

        match self.host.regions() {
            Some(regions) => regions.schedule_global(&self.owner, notify),
            None => {
                self.host.schedule_next_tick(&self.owner, notify);
            }
        }
    }

    fn log_cancellation(&self, error: &anyhow::Error) {
        match self.cancellation_level {
            CancellationLevel::Trace => tracing::trace!(owner = %self.owner, "task cancelled: {}", error),
            CancellationLevel::Debug => tracing::debug!(owner = %self.owner, "task cancelled: {}", error),
            CancellationLevel::Info => tracing::info!(owner = %self.owner, "task cancelled: {}", error),
        }
    }
}

impl std::fmt::Debug for FailureBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureBoundary")
            .field("owner", &self.owner)
            .field("cancellation_level", &self.cancellation_level)
            .finish_non_exhaustive()
    }
}
