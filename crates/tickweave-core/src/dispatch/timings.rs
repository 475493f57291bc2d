use crate::host::{Host, HostTaskId, OwnerId, Runnable};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Named profiling wrapper for main-thread continuations.
///
/// Each submitted continuation is queued here and the wrapper itself is
/// scheduled under its name; every scheduled run executes exactly one queued
/// continuation, so host-side profiling attributes the time to this name.
#[derive(Debug)]
pub struct TaskTimings {
    name: Arc<str>,
    queue: Mutex<VecDeque<Runnable>>,
}

impl TaskTimings {
    pub fn new(name: impl Into<Arc<str>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            queue: Mutex::new(VecDeque::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Continuations queued but not yet run.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    pub(crate) fn submit(self: &Arc<Self>, host: &dyn Host, owner: &OwnerId, task: Runnable) -> HostTaskId {
        self.queue.lock().push_back(task);
        let timings = Arc::clone(self);
        host.schedule_next_tick(
            owner,
            Runnable::labelled(Arc::clone(&self.name), move || timings.run_one()),
        )
    }

    fn run_one(&self) {
        let next = self.queue.lock().pop_front();
        if let Some(task) = next {
            task.run();
        }
    }
}

/// Records every host task id the main dispatcher obtains for one task.
#[derive(Debug, Default)]
pub struct HostTaskTracker {
    ids: Mutex<Vec<HostTaskId>>,
}

impl HostTaskTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn record(&self, id: HostTaskId) {
        self.ids.lock().push(id);
    }

    pub fn ids(&self) -> Vec<HostTaskId> {
        self.ids.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.lock().is_empty()
    }
}
