use super::{DispatchContext, Dispatcher};
use crate::host::{Host, Runnable};
use crate::task::on_internal_thread;
use std::sync::Arc;

/// Moves tasks off every thread that must stay responsive: the main thread,
/// region threads and the crate's own timer and wakeup threads. On any other
/// thread (a worker) the task keeps running inline.
pub struct WorkerPoolDispatcher {
    host: Arc<dyn Host>,
}

impl WorkerPoolDispatcher {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }
}

impl Dispatcher for WorkerPoolDispatcher {
    fn name(&self) -> &'static str {
        "worker-pool"
    }

    fn can_resume(&self, ctx: &DispatchContext) -> bool {
        self.host.is_owner_enabled(&ctx.owner)
    }

    fn is_dispatch_needed(&self, ctx: &DispatchContext) -> bool {
        self.host.is_owner_enabled(&ctx.owner)
            && (self.host.is_main_thread() || self.host.is_tick_thread() || on_internal_thread())
    }

    fn dispatch(&self, ctx: &DispatchContext, task: Runnable) {
        if !self.host.is_owner_enabled(&ctx.owner) {
            return;
        }
        self.host.schedule_on_worker_pool(&ctx.owner, task);
    }
}
