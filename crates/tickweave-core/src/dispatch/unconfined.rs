use super::{DispatchContext, Dispatcher};
use crate::host::Runnable;

/// Never hands off: the task resumes on whichever thread woke it.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfinedDispatcher;

impl Dispatcher for UnconfinedDispatcher {
    fn name(&self) -> &'static str {
        "unconfined"
    }

    fn is_dispatch_needed(&self, _ctx: &DispatchContext) -> bool {
        false
    }

    fn dispatch(&self, _ctx: &DispatchContext, task: Runnable) {
        task.run();
    }
}
