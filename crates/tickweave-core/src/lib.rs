//! # Tickweave Core
//!
//! Per-owner task sessions for tick-driven hosts such as game servers.
//!
//! A host runs most of its logic on a single main thread that advances in
//! ticks, plus a worker pool for blocking work and, on regionized hosts, one
//! execution unit per spatial region. Tickweave lets extensions ("owners")
//! write async task chains that hop between those contexts without breaking
//! the host's single-writer guarantees:
//!
//! - [`Session`] owns a supervising task scope per owner, the dispatcher set
//!   and the [`FailureBoundary`].
//! - [`dispatch`] holds the affinity-aware dispatchers. A task that is already
//!   on the right thread keeps running inline; otherwise it is handed to the
//!   host scheduler.
//! - [`WakeupBridge`] keeps a main thread that blocks during startup live.
//! - [`events`] dispatches prioritized listeners in concurrent or consecutive
//!   mode.
//! - [`command`] adapts async command callbacks to synchronous host callbacks.
//!
//! ```rust,ignore
//! use tickweave_core::{DispatchTarget, OwnerId, SessionRegistry, StartMode};
//!
//! let registry = SessionRegistry::new(host, SchedulerConfig::default());
//! let session = registry.get_or_create(&OwnerId::new("my-plugin"))?;
//!
//! let inner = session.clone();
//! session.launch(DispatchTarget::MainThread, StartMode::Default, async move {
//!     let data = inner
//!         .with_context(DispatchTarget::WorkerPool, async { load_from_disk() })
//!         .await?;
//!     apply_on_main_thread(data);
//!     Ok(())
//! });
//! ```

pub mod command;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod failure;
pub mod host;
pub mod registry;
pub mod session;
pub mod task;
pub mod test_support;
pub mod wakeup;

pub use command::{CommandBridge, CommandInvocation, HostCommandCallback, HostTabCompleter};
pub use dispatch::{
    DispatchContext, DispatchTarget, Dispatcher, HostTaskTracker, TaskTimings,
};
pub use error::{is_cancellation, SchedulingError, SchedulingResult, TaskCancelled, TaskPanicked};
pub use events::{
    CancelFlag, Cancellable, Event, EventExecutionMode, EventPriority, HandlerKind,
    ListenerRegistration,
};
pub use failure::FailureBoundary;
pub use host::{
    EntityHandle, Host, HostTaskId, OwnerId, RegionKey, RegionScheduler, Runnable,
    TaskExceptionEvent,
};
pub use registry::SessionRegistry;
pub use session::{LaunchOptions, Session};
pub use task::{join_all, Delay, StartMode, TaskHandle, TaskId, TaskState};
pub use wakeup::WakeupBridge;

pub use tickweave_config::{SchedulerConfig, ShutdownStrategy};
