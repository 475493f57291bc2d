use super::{StartMode, TaskId, TaskScope, TaskState};
use crate::dispatch::{DispatchContext, Dispatcher};
use crate::error::{is_cancellation, TaskCancelled, TaskPanicked};
use crate::failure::FailureBoundary;
use crate::host::Runnable;
use futures::future::BoxFuture;
use futures::task::{waker_ref, ArcWake};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::watch;

pub(crate) type TaskFuture = BoxFuture<'static, anyhow::Result<()>>;

thread_local! {
    /// Tasks resumed inline while this thread is already polling a task.
    /// `None` when no task is being polled here.
    static RUN_QUEUE: RefCell<Option<VecDeque<Arc<RawTask>>>> = const { RefCell::new(None) };
}

/// Resets the thread's run queue when the outermost `run` returns or unwinds.
struct DrainGuard;

impl Drop for DrainGuard {
    fn drop(&mut self) {
        RUN_QUEUE.with(|queue| queue.borrow_mut().take());
    }
}

/// Detaches the thread's run queue for the lifetime of the guard, so a
/// blocking wait entered from inside a task poll can still run tasks inline.
pub(crate) struct RunQueueSuspension {
    saved: Option<VecDeque<Arc<RawTask>>>,
}

impl RunQueueSuspension {
    pub(crate) fn new() -> Self {
        Self {
            saved: RUN_QUEUE.with(|queue| queue.borrow_mut().take()),
        }
    }
}

impl Drop for RunQueueSuspension {
    fn drop(&mut self) {
        let saved = self.saved.take();
        RUN_QUEUE.with(|queue| *queue.borrow_mut() = saved);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    New,
    Idle,
    Scheduled,
    Running,
    /// Woken while being polled.
    RunningNotified,
    Done,
}

enum Route {
    Inline,
    Dispatched,
    /// The dispatcher refused to resume. The task stays scheduled forever.
    Suspended,
}

pub(crate) struct RawTask {
    id: TaskId,
    state: Mutex<RunState>,
    cancel_requested: AtomicBool,
    future: Mutex<Option<TaskFuture>>,
    dispatcher: Arc<dyn Dispatcher>,
    context: DispatchContext,
    boundary: Arc<FailureBoundary>,
    scope: Weak<TaskScope>,
    status: watch::Sender<TaskState>,
}

impl RawTask {
    pub(crate) fn new(
        future: TaskFuture,
        dispatcher: Arc<dyn Dispatcher>,
        context: DispatchContext,
        boundary: Arc<FailureBoundary>,
        scope: Weak<TaskScope>,
    ) -> Arc<Self> {
        let (status, _) = watch::channel(TaskState::New);
        Arc::new(Self {
            id: TaskId::new(),
            state: Mutex::new(RunState::New),
            cancel_requested: AtomicBool::new(false),
            future: Mutex::new(Some(future)),
            dispatcher,
            context,
            boundary,
            scope,
            status,
        })
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<TaskState> {
        self.status.subscribe()
    }

    /// Leave the `New` state. No-op for a task that already started or ended.
    pub(crate) fn start(self: &Arc<Self>, mode: StartMode) {
        {
            let mut state = self.state.lock();
            if *state != RunState::New {
                return;
            }
            *state = RunState::Scheduled;
        }
        self.status.send_if_modified(|status| {
            if *status == TaskState::New {
                *status = TaskState::Active;
                true
            } else {
                false
            }
        });

        match mode {
            StartMode::Undispatched => self.run(),
            StartMode::Default | StartMode::Lazy => self.schedule(),
        }
    }

    /// Request cancellation. Takes effect immediately unless the task is being
    /// polled, in which case it is observed when the poll returns pending.
    pub(crate) fn cancel(self: &Arc<Self>) {
        self.cancel_requested.store(true, Ordering::Release);
        let mut state = self.state.lock();
        match *state {
            RunState::New | RunState::Idle | RunState::Scheduled => {
                *state = RunState::Done;
                drop(state);
                self.finish(Err(TaskCancelled.into()));
            }
            RunState::Running | RunState::RunningNotified | RunState::Done => {}
        }
    }

    fn notify(self: &Arc<Self>) {
        let mut state = self.state.lock();
        match *state {
            RunState::Idle => {
                *state = RunState::Scheduled;
                drop(state);
                self.schedule();
            }
            RunState::Running => *state = RunState::RunningNotified,
            _ => {}
        }
    }

    fn schedule(self: &Arc<Self>) {
        if let Route::Inline = self.route() {
            self.run();
        }
    }

    fn route(self: &Arc<Self>) -> Route {
        if !self.dispatcher.can_resume(&self.context) {
            tracing::trace!(
                task_id = %self.id,
                owner = %self.context.owner,
                dispatcher = self.dispatcher.name(),
                "continuation not resumed"
            );
            return Route::Suspended;
        }

        if self.dispatcher.is_dispatch_needed(&self.context) {
            let task = Arc::clone(self);
            self.dispatcher
                .dispatch(&self.context, Runnable::new(move || task.run()));
            Route::Dispatched
        } else {
            Route::Inline
        }
    }

    /// Run the task on this thread.
    ///
    /// The outermost call on a thread polls right away and then drains every
    /// task resumed inline in the meantime. Nested calls only enqueue, so a
    /// chain of inline resumptions never grows the stack.
    pub(crate) fn run(self: &Arc<Self>) {
        let queued = RUN_QUEUE.with(|queue| match queue.borrow_mut().as_mut() {
            Some(pending) => {
                pending.push_back(Arc::clone(self));
                true
            }
            None => false,
        });
        if queued {
            return;
        }

        RUN_QUEUE.with(|queue| *queue.borrow_mut() = Some(VecDeque::new()));
        let _drain = DrainGuard;
        self.poll_task();
        while let Some(next) =
            RUN_QUEUE.with(|queue| queue.borrow_mut().as_mut().and_then(VecDeque::pop_front))
        {
            next.poll_task();
        }
    }

    /// Poll until the task suspends or ends. Only a `Scheduled` task runs;
    /// stale entries return immediately.
    fn poll_task(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if *state != RunState::Scheduled {
                return;
            }
            *state = RunState::Running;
        }

        loop {
            let polled = {
                let mut slot = self.future.lock();
                let Some(future) = slot.as_mut() else {
                    return;
                };
                let waker = waker_ref(self);
                let mut cx = Context::from_waker(&waker);
                catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)))
            };

            let result = match polled {
                Ok(Poll::Ready(result)) => result,
                Err(payload) => Err(TaskPanicked::from_payload(payload).into()),
                Ok(Poll::Pending) => {
                    let mut state = self.state.lock();
                    if self.cancel_requested.load(Ordering::Acquire) {
                        *state = RunState::Done;
                        drop(state);
                        self.finish(Err(TaskCancelled.into()));
                        return;
                    }
                    match *state {
                        RunState::Running => {
                            *state = RunState::Idle;
                            return;
                        }
                        RunState::RunningNotified => {
                            *state = RunState::Scheduled;
                            drop(state);
                            match self.route() {
                                Route::Inline => {
                                    let mut state = self.state.lock();
                                    if *state != RunState::Scheduled {
                                        return;
                                    }
                                    *state = RunState::Running;
                                    continue;
                                }
                                Route::Dispatched | Route::Suspended => return,
                            }
                        }
                        _ => return,
                    }
                }
            };

            *self.state.lock() = RunState::Done;
            self.finish(result);
            return;
        }
    }

    fn finish(&self, result: anyhow::Result<()>) {
        // Dropped outside every lock: the future may own handles whose drop
        // cancels other tasks.
        let future = self.future.lock().take();
        drop(future);

        if let Some(scope) = self.scope.upgrade() {
            scope.remove(self.id);
        }

        let terminal = match &result {
            Ok(()) => TaskState::Completed,
            Err(error) if is_cancellation(error) => TaskState::Cancelled,
            Err(_) => TaskState::Failed,
        };
        if let Err(error) = result {
            self.boundary.report(error);
        }

        self.status.send_if_modified(|status| {
            if status.is_terminal() {
                false
            } else {
                *status = terminal;
                true
            }
        });
    }
}

impl ArcWake for RawTask {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.notify();
    }
}
