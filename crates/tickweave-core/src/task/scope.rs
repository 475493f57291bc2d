use super::raw::{RawTask, TaskFuture};
use super::{StartMode, TaskHandle, TaskId};
use crate::dispatch::{DispatchContext, Dispatcher};
use crate::failure::FailureBoundary;
use crate::host::OwnerId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Supervising task group: a failed child never cancels its siblings, but
/// cancelling the scope cancels every outstanding child.
pub(crate) struct TaskScope {
    owner: OwnerId,
    tasks: DashMap<TaskId, Arc<RawTask>>,
    active: AtomicBool,
}

impl TaskScope {
    pub(crate) fn new(owner: OwnerId) -> Arc<Self> {
        Arc::new(Self {
            owner,
            tasks: DashMap::new(),
            active: AtomicBool::new(true),
        })
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn spawn(
        self: &Arc<Self>,
        future: TaskFuture,
        dispatcher: Arc<dyn Dispatcher>,
        context: DispatchContext,
        boundary: Arc<FailureBoundary>,
        start: StartMode,
    ) -> TaskHandle {
        if !self.is_active() {
            return TaskHandle::cancelled();
        }

        let raw = RawTask::new(future, dispatcher, context, boundary, Arc::downgrade(self));
        let handle = TaskHandle::from_raw(&raw);
        self.tasks.insert(raw.id(), Arc::clone(&raw));

        // Lost a race with cancel_all.
        if !self.is_active() {
            raw.cancel();
            return handle;
        }

        if start != StartMode::Lazy {
            raw.start(start);
        }
        handle
    }

    pub(crate) fn remove(&self, id: TaskId) {
        self.tasks.remove(&id);
    }

    /// Deactivate the scope and cancel every outstanding task.
    pub(crate) fn cancel_all(&self) -> usize {
        self.active.store(false, Ordering::Release);
        let outstanding: Vec<Arc<RawTask>> = self
            .tasks
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for task in &outstanding {
            task.cancel();
        }
        if !outstanding.is_empty() {
            tracing::debug!(owner = %self.owner, count = outstanding.len(), "cancelled outstanding tasks");
        }
        outstanding.len()
    }
}
