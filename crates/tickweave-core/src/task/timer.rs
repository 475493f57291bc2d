use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

/// Shared deadline queue served by one lazily started background thread.
///
/// Expired wakers are woken from the timer thread, so a delayed task resumes
/// through its own dispatcher like any other wake.
pub(crate) struct Timer {
    inner: Arc<TimerInner>,
}

struct TimerInner {
    state: Mutex<TimerState>,
    changed: Condvar,
}

#[derive(Default)]
struct TimerState {
    deadlines: BinaryHeap<Reverse<(Instant, u64)>>,
    wakers: HashMap<u64, Waker>,
    next_entry: u64,
    started: bool,
    shutdown: bool,
}

impl Timer {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(TimerInner {
                state: Mutex::new(TimerState::default()),
                changed: Condvar::new(),
            }),
        }
    }

    pub(crate) fn delay(&self, duration: Duration) -> Delay {
        Delay {
            inner: Arc::clone(&self.inner),
            deadline: Instant::now().checked_add(duration),
            entry: None,
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.inner.state.lock().wakers.len()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.inner.state.lock().shutdown = true;
        self.inner.changed.notify_all();
    }
}

impl TimerInner {
    fn register(self: &Arc<Self>, deadline: Instant, waker: Waker) -> u64 {
        let mut state = self.state.lock();
        let entry = state.next_entry;
        state.next_entry += 1;
        state.deadlines.push(Reverse((deadline, entry)));
        state.wakers.insert(entry, waker);

        if !state.started {
            state.started = true;
            self.spawn_thread(&mut state);
        }
        drop(state);
        self.changed.notify_one();
        entry
    }

    fn spawn_thread(self: &Arc<Self>, state: &mut MutexGuard<'_, TimerState>) {
        let inner = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("tickweave-timer".to_string())
            .spawn(move || {
                super::mark_internal_thread();
                inner.run();
            });
        if let Err(e) = spawned {
            state.started = false;
            tracing::error!(error = %e, "failed to start timer thread");
        }
    }

    fn run(&self) {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                break;
            }

            let now = Instant::now();
            let mut due = Vec::new();
            while let Some(Reverse((deadline, entry))) = state.deadlines.peek().copied() {
                if deadline > now {
                    break;
                }
                state.deadlines.pop();
                // Entries of dropped delays have no waker left.
                if let Some(waker) = state.wakers.remove(&entry) {
                    due.push(waker);
                }
            }

            if !due.is_empty() {
                MutexGuard::unlocked(&mut state, || due.into_iter().for_each(Waker::wake));
                continue;
            }

            match state.deadlines.peek().copied() {
                Some(Reverse((deadline, _))) => {
                    self.changed.wait_until(&mut state, deadline);
                }
                None => self.changed.wait(&mut state),
            }
        }
        tracing::trace!("timer thread stopped");
    }
}

/// Future that completes once its deadline has passed.
///
/// A duration too large to represent as an instant never completes and never
/// registers with the timer. Dropping it before completion unregisters its
/// waker.
pub struct Delay {
    inner: Arc<TimerInner>,
    deadline: Option<Instant>,
    entry: Option<u64>,
}

impl Delay {
    /// `None` if the delay never elapses.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

impl Future for Delay {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let Some(deadline) = self.deadline else {
            return Poll::Pending;
        };
        if Instant::now() >= deadline {
            if let Some(entry) = self.entry.take() {
                self.inner.state.lock().wakers.remove(&entry);
            }
            return Poll::Ready(());
        }

        match self.entry {
            Some(entry) => {
                let mut state = self.inner.state.lock();
                match state.wakers.get_mut(&entry) {
                    Some(waker) => waker.clone_from(cx.waker()),
                    // Fired between the deadline check and here.
                    None => return Poll::Ready(()),
                }
            }
            None => {
                let entry = self.inner.register(deadline, cx.waker().clone());
                self.entry = Some(entry);
            }
        }
        Poll::Pending
    }
}

impl Drop for Delay {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            self.inner.state.lock().wakers.remove(&entry);
        }
    }
}

impl std::fmt::Debug for Delay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delay")
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
