use super::raw::RunQueueSuspension;
use futures::task::{waker, ArcWake};
use parking_lot::{Condvar, Mutex};
use std::future::Future;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, Thread};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No thread is blocked, or the blocked thread is polling.
    Running,
    Parked,
    /// Another thread is acting for the parked one.
    Borrowed,
}

/// Park state of a thread blocked in [`block_on`].
///
/// While the phase is `Borrowed` the blocked thread cannot resume polling, so
/// a helper thread may act on its behalf. Nested `block_on` calls on the same
/// thread share the state.
pub(crate) struct ParkState {
    phase: Mutex<Phase>,
    returned: Condvar,
}

impl Default for ParkState {
    fn default() -> Self {
        Self {
            phase: Mutex::new(Phase::Running),
            returned: Condvar::new(),
        }
    }
}

impl ParkState {
    pub(crate) fn is_parked(&self) -> bool {
        *self.phase.lock() != Phase::Running
    }

    /// Run `f` while the blocked thread is guaranteed to stay parked.
    /// Returns `None` if no thread is parked.
    pub(crate) fn while_parked<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        {
            let mut phase = self.phase.lock();
            if *phase != Phase::Parked {
                return None;
            }
            *phase = Phase::Borrowed;
        }

        struct GiveBack<'a>(&'a ParkState);
        impl Drop for GiveBack<'_> {
            fn drop(&mut self) {
                *self.0.phase.lock() = Phase::Parked;
                self.0.returned.notify_all();
            }
        }

        let _give_back = GiveBack(self);
        Some(f())
    }

    fn park(&self) {
        *self.phase.lock() = Phase::Parked;
    }

    /// Leave the parked phase, waiting out a helper that is still borrowing it.
    fn resume(&self) {
        let mut phase = self.phase.lock();
        while *phase == Phase::Borrowed {
            self.returned.wait(&mut phase);
        }
        *phase = Phase::Running;
    }
}

struct ThreadSignal {
    thread: Thread,
    notified: AtomicBool,
}

impl ArcWake for ThreadSignal {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.notified.store(true, Ordering::Release);
        arc_self.thread.unpark();
    }
}

/// Drive `future` to completion on the calling thread, parking between polls.
///
/// May be nested: an inner call parks on the same state as the outer one.
pub(crate) fn block_on<F: Future>(park: &ParkState, future: F) -> F::Output {
    let _detached = RunQueueSuspension::new();
    let signal = Arc::new(ThreadSignal {
        thread: thread::current(),
        notified: AtomicBool::new(false),
    });
    let waker = waker(Arc::clone(&signal));
    let mut cx = Context::from_waker(&waker);
    let mut future = pin!(future);

    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return output;
        }

        park.park();
        while !signal.notified.swap(false, Ordering::AcqRel) {
            thread::park();
        }
        park.resume();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_block_on_ready_future() {
        let park = ParkState::default();
        assert_eq!(block_on(&park, async { 7 }), 7);
        assert!(!park.is_parked());
    }

    #[test]
    fn test_block_on_wakes_from_other_thread() {
        let park = Arc::new(ParkState::default());
        let (tx, rx) = futures::channel::oneshot::channel::<u32>();

        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tx.send(5).unwrap();
        });
        let value = block_on(&park, rx).unwrap();
        sender.join().unwrap();
        assert_eq!(value, 5);
    }

    #[test]
    fn test_nested_block_on_shares_park_state() {
        let park = Arc::new(ParkState::default());
        let (tx, rx) = futures::channel::oneshot::channel::<u32>();

        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tx.send(3).unwrap();
        });
        let inner_park = Arc::clone(&park);
        let value = block_on(&park, async move { block_on(&inner_park, rx).unwrap() + 1 });
        sender.join().unwrap();

        assert_eq!(value, 4);
        assert!(!park.is_parked());
    }

    #[test]
    fn test_while_parked_runs_only_when_parked() {
        let park = Arc::new(ParkState::default());
        assert!(park.while_parked(|| ()).is_none());

        let (tx, rx) = futures::channel::oneshot::channel::<()>();
        let observer = {
            let park = Arc::clone(&park);
            thread::spawn(move || {
                let mut observed = None;
                for _ in 0..200 {
                    observed = park.while_parked(|| park.is_parked());
                    if observed.is_some() {
                        break;
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                tx.send(()).unwrap();
                observed
            })
        };

        block_on(&park, rx).unwrap();
        assert_eq!(observer.join().unwrap(), Some(true));
    }
}
