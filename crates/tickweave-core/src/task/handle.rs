use super::raw::RawTask;
use super::{StartMode, TaskId, TaskState};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Cancellable, awaitable reference to one launched task.
///
/// Cloning a handle yields another reference to the same task.
#[derive(Clone)]
pub struct TaskHandle {
    id: TaskId,
    status: watch::Receiver<TaskState>,
    raw: Option<Arc<RawTask>>,
}

impl TaskHandle {
    pub(crate) fn from_raw(raw: &Arc<RawTask>) -> Self {
        Self {
            id: raw.id(),
            status: raw.subscribe(),
            raw: Some(Arc::clone(raw)),
        }
    }

    /// A handle that is already cancelled. Returned for launches on a disposed session.
    pub fn cancelled() -> Self {
        let (_, status) = watch::channel(TaskState::Cancelled);
        Self {
            id: TaskId::new(),
            status,
            raw: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn state(&self) -> TaskState {
        *self.status.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.state() == TaskState::Active
    }

    pub fn is_completed(&self) -> bool {
        self.state() == TaskState::Completed
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    pub fn is_failed(&self) -> bool {
        self.state() == TaskState::Failed
    }

    /// Whether the task reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Cancel this task only. Siblings and the owning scope are unaffected.
    pub fn cancel(&self) {
        if let Some(raw) = &self.raw {
            raw.cancel();
        }
    }

    /// Start a lazily launched task. No-op otherwise.
    pub fn start(&self) {
        if let Some(raw) = &self.raw {
            raw.start(StartMode::Default);
        }
    }

    /// Wait for the terminal state, starting a lazy task first.
    pub async fn join(&self) -> TaskState {
        self.start();
        let mut status = self.status.clone();
        let terminal = status.wait_for(TaskState::is_terminal).await.map(|s| *s);
        // A closed channel means the task was dropped without finishing.
        terminal.unwrap_or(TaskState::Cancelled)
    }

    /// Block the calling thread until the terminal state.
    ///
    /// Never call this on the thread the task needs to resume on.
    pub fn join_blocking(&self) -> TaskState {
        futures::executor::block_on(self.join())
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Wait for every handle and return their terminal states in input order.
pub async fn join_all(handles: &[TaskHandle]) -> Vec<TaskState> {
    futures::future::join_all(handles.iter().map(TaskHandle::join)).await
}
