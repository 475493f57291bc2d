//! Task machinery: a small executor that polls each task on whatever thread
//! its dispatcher picks.
//!
//! A task is polled by at most one thread at a time. A wake that arrives while
//! the task is being polled is recorded and produces exactly one re-poll,
//! routed through the task's dispatcher again.

mod block_on;
mod handle;
mod raw;
mod scope;
mod timer;

pub use handle::{join_all, TaskHandle};
pub use timer::Delay;

pub(crate) use block_on::{block_on, ParkState};
pub(crate) use scope::TaskScope;
pub(crate) use timer::Timer;

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a launched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Create a new unique task ID.
    pub fn new() -> Self {
        Self(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Observable lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Launched lazily and not started yet.
    New,
    Active,
    Completed,
    Cancelled,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Cancelled | TaskState::Failed
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskState::New => "new",
            TaskState::Active => "active",
            TaskState::Completed => "completed",
            TaskState::Cancelled => "cancelled",
            TaskState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a launched task takes its first step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StartMode {
    /// Ask the dispatcher. Runs inline if the current thread already satisfies it.
    #[default]
    Default,
    /// Do nothing until [`TaskHandle::start`] or [`TaskHandle::join`].
    Lazy,
    /// Poll once on the calling thread, then follow the dispatcher. Launched
    /// from inside another task's poll, the first poll waits until that task
    /// yields.
    Undispatched,
}

thread_local! {
    static INTERNAL_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Flag the current thread as one of the crate's own background threads.
pub(crate) fn mark_internal_thread() {
    INTERNAL_THREAD.with(|flag| flag.set(true));
}

/// Whether the current thread is a crate background thread (timer, wakeup).
pub(crate) fn on_internal_thread() -> bool {
    INTERNAL_THREAD.with(|flag| flag.get())
}
