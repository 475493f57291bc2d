use std::sync::atomic::{AtomicBool, Ordering};

/// An event fired through the host.
pub trait Event: Send + Sync + 'static {
    fn event_name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Asynchronous events are fired off the tick threads and their listeners
    /// default to the worker pool.
    fn is_asynchronous(&self) -> bool {
        false
    }

    /// The event's cancellation flag, if it can be cancelled.
    fn cancellable(&self) -> Option<&dyn Cancellable> {
        None
    }
}

/// Cancellation capability shared by listeners of one event.
pub trait Cancellable: Send + Sync {
    fn is_cancelled(&self) -> bool;
    fn set_cancelled(&self, cancelled: bool);
}

/// Thread-safe cancellation flag to embed in event types.
#[derive(Debug, Default)]
pub struct CancelFlag(AtomicBool);

impl CancelFlag {
    pub fn new(cancelled: bool) -> Self {
        Self(AtomicBool::new(cancelled))
    }
}

impl Cancellable for CancelFlag {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn set_cancelled(&self, cancelled: bool) {
        self.0.store(cancelled, Ordering::Release);
    }
}

/// Listener priority. Lower priorities run first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventPriority {
    Lowest,
    Low,
    #[default]
    Normal,
    High,
    Highest,
    /// Observes the final outcome. Should not modify the event.
    Monitor,
}

impl EventPriority {
    pub fn value(&self) -> u8 {
        *self as u8
    }
}

/// How the listeners of one fire are executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EventExecutionMode {
    #[default]
    Concurrent,
    Consecutive,
}
