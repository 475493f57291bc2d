//! Thread-affinity-aware dispatchers.
//!
//! Every time a task resumes, its dispatcher decides whether the current
//! thread already satisfies the task's affinity. If it does the task keeps
//! running inline with no scheduler round trip; otherwise the continuation is
//! handed to the host scheduler. Running inline is what lets a task started on
//! the main thread observe and mutate host state (e.g. a cancellable event)
//! within the same tick, up to its first suspension point.

mod main;
mod regional;
mod timings;
mod unconfined;
mod worker;

pub use main::MainThreadDispatcher;
pub use regional::{EntityDispatcher, GlobalRegionDispatcher, RegionDispatcher};
pub use timings::{HostTaskTracker, TaskTimings};
pub use unconfined::UnconfinedDispatcher;
pub use worker::WorkerPoolDispatcher;

use crate::host::{EntityHandle, OwnerId, RegionKey, Runnable};
use std::fmt;
use std::sync::Arc;

/// Execution context a task should run on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DispatchTarget {
    MainThread,
    WorkerPool,
    /// The global region of a regionized host.
    GlobalRegion,
    Region(RegionKey),
    Entity(EntityHandle),
    /// Resume on whichever thread wakes the task.
    Unconfined,
}

impl fmt::Display for DispatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchTarget::MainThread => f.write_str("main"),
            DispatchTarget::WorkerPool => f.write_str("worker-pool"),
            DispatchTarget::GlobalRegion => f.write_str("global-region"),
            DispatchTarget::Region(region) => write!(f, "region {region}"),
            DispatchTarget::Entity(entity) => write!(f, "{entity}"),
            DispatchTarget::Unconfined => f.write_str("unconfined"),
        }
    }
}

/// Per-task data every resumption carries to its dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub owner: OwnerId,
    /// Profiling label the main dispatcher routes continuations through.
    pub timings: Option<Arc<TaskTimings>>,
    /// Collects the host task ids obtained for this task.
    pub tracker: Option<Arc<HostTaskTracker>>,
}

impl DispatchContext {
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            timings: None,
            tracker: None,
        }
    }
}

/// Decides where a task's continuation runs.
pub trait Dispatcher: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// False once the continuation must never run again, e.g. because the
    /// owner was disabled. The continuation is then dropped without error.
    fn can_resume(&self, ctx: &DispatchContext) -> bool {
        let _ = ctx;
        true
    }

    /// Whether the continuation must be handed off instead of running inline.
    fn is_dispatch_needed(&self, ctx: &DispatchContext) -> bool;

    fn dispatch(&self, ctx: &DispatchContext, task: Runnable);
}
