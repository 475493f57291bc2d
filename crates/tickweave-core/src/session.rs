//! Per-owner task session.
//!
//! A [`Session`] is the composition root for one owner: it owns the
//! supervising task scope, the failure boundary, the wakeup bridge and the
//! lazily built dispatchers. Sessions are created through
//! [`SessionRegistry`](crate::SessionRegistry).

use crate::dispatch::{
    DispatchContext, DispatchTarget, Dispatcher, EntityDispatcher, GlobalRegionDispatcher,
    HostTaskTracker, MainThreadDispatcher, RegionDispatcher, TaskTimings, UnconfinedDispatcher,
    WorkerPoolDispatcher,
};
use crate::error::{TaskCancelled, TaskPanicked};
use crate::failure::FailureBoundary;
use crate::host::{Host, OwnerId};
use crate::task::{block_on, Delay, StartMode, TaskHandle, TaskScope, Timer};
use crate::wakeup::WakeupBridge;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tickweave_config::{SchedulerConfig, ShutdownStrategy};

/// Where and how a task is launched.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub target: DispatchTarget,
    pub start: StartMode,
    pub timings: Option<Arc<TaskTimings>>,
    pub tracker: Option<Arc<HostTaskTracker>>,
}

impl LaunchOptions {
    pub fn new(target: DispatchTarget) -> Self {
        Self {
            target,
            start: StartMode::Default,
            timings: None,
            tracker: None,
        }
    }

    pub fn start(mut self, start: StartMode) -> Self {
        self.start = start;
        self
    }

    pub fn timings(mut self, timings: Arc<TaskTimings>) -> Self {
        self.timings = Some(timings);
        self
    }

    pub fn tracker(mut self, tracker: Arc<HostTaskTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }
}

/// One owner's task scope and dispatcher set.
pub struct Session {
    owner: OwnerId,
    host: Arc<dyn Host>,
    config: Arc<SchedulerConfig>,
    scope: Arc<TaskScope>,
    boundary: Arc<FailureBoundary>,
    wakeup: Arc<WakeupBridge>,
    timer: Arc<Timer>,
    main: OnceLock<Arc<dyn Dispatcher>>,
    worker: OnceLock<Arc<dyn Dispatcher>>,
    global: OnceLock<Arc<dyn Dispatcher>>,
    unconfined: Arc<dyn Dispatcher>,
    shutdown_strategy: Mutex<ShutdownStrategy>,
    disposed: AtomicBool,
    startup_depth: AtomicUsize,
}

impl Session {
    pub(crate) fn new(
        owner: OwnerId,
        host: Arc<dyn Host>,
        config: Arc<SchedulerConfig>,
        timer: Arc<Timer>,
    ) -> Self {
        let boundary = Arc::new(FailureBoundary::new(
            owner.clone(),
            Arc::clone(&host),
            config.logging.cancellation_level,
        ));
        let wakeup = Arc::new(WakeupBridge::new(
            owner.clone(),
            Arc::clone(&host),
            config.wakeup.clone(),
        ));

        tracing::debug!(owner = %owner, "task session created");
        Self {
            scope: TaskScope::new(owner.clone()),
            shutdown_strategy: Mutex::new(config.shutdown_strategy),
            owner,
            host,
            config,
            boundary,
            wakeup,
            timer,
            main: OnceLock::new(),
            worker: OnceLock::new(),
            global: OnceLock::new(),
            unconfined: Arc::new(UnconfinedDispatcher),
            disposed: AtomicBool::new(false),
            startup_depth: AtomicUsize::new(0),
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn boundary(&self) -> &Arc<FailureBoundary> {
        &self.boundary
    }

    pub fn wakeup(&self) -> &Arc<WakeupBridge> {
        &self.wakeup
    }

    /// Launch `body` on `target`.
    ///
    /// On a disposed session this returns an already cancelled handle.
    pub fn launch<F>(&self, target: DispatchTarget, start: StartMode, body: F) -> TaskHandle
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.launch_with(LaunchOptions::new(target).start(start), body)
    }

    pub fn launch_with<F>(&self, options: LaunchOptions, body: F) -> TaskHandle
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if self.is_disposed() {
            return TaskHandle::cancelled();
        }

        let context = DispatchContext {
            owner: self.owner.clone(),
            timings: options.timings,
            tracker: options.tracker,
        };
        self.scope.spawn(
            Box::pin(body),
            self.dispatcher(&options.target),
            context,
            Arc::clone(&self.boundary),
            options.start,
        )
    }

    /// Run `future` on `target` and return its output to the caller, which
    /// then resumes on its own dispatcher.
    ///
    /// Runs inline if the current thread already satisfies `target`. Dropping
    /// the returned future cancels the sub-task. A cancelled sub-task yields
    /// [`TaskCancelled`], a panicking one [`TaskPanicked`].
    pub async fn with_context<T, F>(&self, target: DispatchTarget, future: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let (tx, rx) = futures::channel::oneshot::channel();
        let child = self.launch(target, StartMode::Default, async move {
            let outcome = AssertUnwindSafe(future).catch_unwind().await;
            let _ = tx.send(outcome);
            Ok(())
        });
        let _guard = CancelOnDrop(child);

        match rx.await {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => Err(TaskPanicked::from_payload(payload).into()),
            Err(_) => Err(TaskCancelled.into()),
        }
    }

    /// Suspend for `duration`. The task resumes on its own dispatcher.
    pub fn delay(&self, duration: Duration) -> Delay {
        self.timer.delay(duration)
    }

    /// Suspend for `ticks` host ticks.
    pub fn delay_ticks(&self, ticks: u64) -> Delay {
        self.delay(self.ticks(ticks))
    }

    /// Duration of `ticks` host ticks.
    pub fn ticks(&self, ticks: u64) -> Duration {
        self.config.timing.ticks(ticks)
    }

    /// Block the calling thread on `future` with heartbeat manipulation
    /// enabled for the duration of the call.
    ///
    /// Meant for an owner's synchronous startup routine on the main thread:
    /// tasks that need the main thread keep making progress while it is blocked.
    /// Calls may nest; manipulation stays on until the outermost one returns.
    pub fn block_on_startup<F: Future>(&self, future: F) -> F::Output {
        struct Leave<'a>(&'a Session);
        impl Drop for Leave<'_> {
            fn drop(&mut self) {
                if self.0.startup_depth.fetch_sub(1, Ordering::AcqRel) == 1 {
                    self.0.wakeup.set_manipulated_heartbeat(false);
                }
            }
        }

        self.startup_depth.fetch_add(1, Ordering::AcqRel);
        let _leave = Leave(self);
        self.wakeup.set_manipulated_heartbeat(true);
        block_on(self.wakeup.park_state(), future)
    }

    /// Dispatcher for `target`. Regional targets fall back to the main thread
    /// on hosts without a region scheduler.
    pub fn dispatcher(&self, target: &DispatchTarget) -> Arc<dyn Dispatcher> {
        let regionized = self.host.regions().is_some();
        match target {
            DispatchTarget::MainThread => self.main_dispatcher(),
            DispatchTarget::WorkerPool => self.worker_dispatcher(),
            DispatchTarget::Unconfined => Arc::clone(&self.unconfined),
            _ if !regionized => self.main_dispatcher(),
            DispatchTarget::GlobalRegion => self.global_region_dispatcher(),
            DispatchTarget::Region(region) => Arc::new(RegionDispatcher::new(
                Arc::clone(&self.host),
                Arc::clone(&self.wakeup),
                region.clone(),
            )),
            DispatchTarget::Entity(entity) => Arc::new(EntityDispatcher::new(
                Arc::clone(&self.host),
                Arc::clone(&self.wakeup),
                *entity,
            )),
        }
    }

    pub fn main_dispatcher(&self) -> Arc<dyn Dispatcher> {
        Arc::clone(self.main.get_or_init(|| {
            Arc::new(MainThreadDispatcher::new(
                Arc::clone(&self.host),
                Arc::clone(&self.wakeup),
            ))
        }))
    }

    pub fn worker_dispatcher(&self) -> Arc<dyn Dispatcher> {
        Arc::clone(
            self.worker
                .get_or_init(|| Arc::new(WorkerPoolDispatcher::new(Arc::clone(&self.host)))),
        )
    }

    pub fn global_region_dispatcher(&self) -> Arc<dyn Dispatcher> {
        Arc::clone(self.global.get_or_init(|| {
            Arc::new(GlobalRegionDispatcher::new(
                Arc::clone(&self.host),
                Arc::clone(&self.wakeup),
            ))
        }))
    }

    pub fn shutdown_strategy(&self) -> ShutdownStrategy {
        *self.shutdown_strategy.lock()
    }

    pub fn set_shutdown_strategy(&self, strategy: ShutdownStrategy) {
        *self.shutdown_strategy.lock() = strategy;
    }

    pub fn set_manipulated_heartbeat(&self, enabled: bool) {
        self.wakeup.set_manipulated_heartbeat(enabled);
    }

    /// Tasks launched and not yet finished.
    pub fn outstanding_tasks(&self) -> usize {
        self.scope.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Cancel every outstanding task and stop the wakeup bridge. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let cancelled = self.scope.cancel_all();
        self.wakeup.shutdown();
        tracing::debug!(owner = %self.owner, cancelled, "task session disposed");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("owner", &self.owner)
            .field("outstanding_tasks", &self.outstanding_tasks())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

struct CancelOnDrop(TaskHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if !self.0.is_finished() {
            self.0.cancel();
        }
    }
}
