use super::{DispatchContext, Dispatcher};
use crate::host::{Host, Runnable};
use crate::wakeup::WakeupBridge;
use std::sync::Arc;

/// Keeps tasks on the host's main thread.
pub struct MainThreadDispatcher {
    host: Arc<dyn Host>,
    wakeup: Arc<WakeupBridge>,
}

impl MainThreadDispatcher {
    pub fn new(host: Arc<dyn Host>, wakeup: Arc<WakeupBridge>) -> Self {
        Self { host, wakeup }
    }
}

impl Dispatcher for MainThreadDispatcher {
    fn name(&self) -> &'static str {
        "main"
    }

    fn can_resume(&self, ctx: &DispatchContext) -> bool {
        self.host.is_owner_enabled(&ctx.owner)
    }

    fn is_dispatch_needed(&self, ctx: &DispatchContext) -> bool {
        self.host.is_owner_enabled(&ctx.owner) && !self.host.is_main_thread()
    }

    fn dispatch(&self, ctx: &DispatchContext, task: Runnable) {
        if !self.host.is_owner_enabled(&ctx.owner) {
            return;
        }

        let host_task = match &ctx.timings {
            Some(timings) => timings.submit(self.host.as_ref(), &ctx.owner, task),
            None => self.host.schedule_next_tick(&ctx.owner, task),
        };
        if let Some(tracker) = &ctx.tracker {
            tracker.record(host_task);
        }

        self.wakeup.ensure_wakeup();
    }
}
