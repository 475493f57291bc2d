//! Startup liveness helper.
//!
//! During an owner's startup the host's main thread can be blocked in
//! [`Session::block_on_startup`](crate::Session::block_on_startup) waiting on a
//! task that must resume on that same main thread. The host only drains its
//! main-tick queue on the next natural tick, which never comes. While the
//! manipulated heartbeat is enabled, every main-thread dispatch submits a
//! job to a single background thread; the job waits for the main thread
//! to park and then drives the host heartbeat on its behalf.
//!
//! The heartbeat only runs while the blocked thread is held parked, so the
//! host's single-writer guarantee still holds.

use crate::host::{Host, OwnerId};
use crate::task::{mark_internal_thread, ParkState};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tickweave_config::WakeupConfig;

type WakeupJob = Box<dyn FnOnce() + Send + 'static>;

struct WakeupExecutor {
    jobs: flume::Sender<WakeupJob>,
}

impl WakeupExecutor {
    fn start(owner: &OwnerId) -> std::io::Result<Self> {
        let (jobs, queue) = flume::unbounded::<WakeupJob>();
        thread::Builder::new()
            .name(format!("tickweave-wakeup-{owner}"))
            .spawn(move || {
                mark_internal_thread();
                // Ends once the executor is dropped and the queue is drained.
                while let Ok(job) = queue.recv() {
                    job();
                }
            })?;
        Ok(Self { jobs })
    }
}

/// Per-session heartbeat bridge. Disabled unless a startup call enables it.
pub struct WakeupBridge {
    owner: OwnerId,
    host: Arc<dyn Host>,
    config: WakeupConfig,
    enabled: Arc<AtomicBool>,
    main_thread: Mutex<Option<ThreadId>>,
    executor: Mutex<Option<WakeupExecutor>>,
    park: Arc<ParkState>,
    heartbeats: Arc<AtomicU64>,
}

impl WakeupBridge {
    pub fn new(owner: OwnerId, host: Arc<dyn Host>, config: WakeupConfig) -> Self {
        Self {
            owner,
            host,
            config,
            enabled: Arc::new(AtomicBool::new(false)),
            main_thread: Mutex::new(None),
            executor: Mutex::new(None),
            park: Arc::new(ParkState::default()),
            heartbeats: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_manipulated_heartbeat(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enable or disable heartbeat manipulation. Enabling on the main thread
    /// records it as the thread to keep live.
    pub fn set_manipulated_heartbeat(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        if enabled {
            self.record_main_thread();
        }
        self.ensure_wakeup();
    }

    /// Submit a wakeup job while enabled; otherwise stop the background thread if
    /// one was started. Cheap when disabled.
    pub fn ensure_wakeup(&self) {
        if !self.is_manipulated_heartbeat() {
            if self.executor.lock().take().is_some() {
                tracing::debug!(owner = %self.owner, "wakeup bridge stopped");
            }
            return;
        }

        self.record_main_thread();
        if self.main_thread.lock().is_none() {
            return;
        }

        let mut executor = self.executor.lock();
        if executor.is_none() {
            match WakeupExecutor::start(&self.owner) {
                Ok(started) => {
                    tracing::debug!(owner = %self.owner, "wakeup bridge started");
                    *executor = Some(started);
                }
                Err(e) => {
                    tracing::error!(owner = %self.owner, error = %e, "failed to start wakeup bridge");
                    return;
                }
            }
        }
        if let Some(running) = executor.as_ref() {
            // The receiver only goes away with the executor itself.
            let _ = running.jobs.send(self.wakeup_job());
        }
    }

    /// Disable manipulation and stop the background thread.
    pub fn shutdown(&self) {
        self.enabled.store(false, Ordering::Release);
        self.ensure_wakeup();
    }

    pub fn main_thread(&self) -> Option<ThreadId> {
        *self.main_thread.lock()
    }

    /// Whether the background wakeup thread is currently running.
    pub fn is_running(&self) -> bool {
        self.executor.lock().is_some()
    }

    /// Heartbeats forced so far.
    pub fn heartbeats(&self) -> u64 {
        self.heartbeats.load(Ordering::Relaxed)
    }

    pub(crate) fn park_state(&self) -> &ParkState {
        &self.park
    }

    fn record_main_thread(&self) {
        if self.host.is_main_thread() {
            *self.main_thread.lock() = Some(thread::current().id());
        }
    }

    fn wakeup_job(&self) -> WakeupJob {
        let host = Arc::clone(&self.host);
        let park = Arc::clone(&self.park);
        let enabled = Arc::clone(&self.enabled);
        let heartbeats = Arc::clone(&self.heartbeats);
        let interval = self.config.check_interval();
        let max_checks = self.config.max_checks;

        Box::new(move || {
            for _ in 0..max_checks {
                if !enabled.load(Ordering::Acquire) {
                    return;
                }

                let forced = park.while_parked(|| host.heartbeat()).is_some()
                    || (host.is_main_thread_parked() && {
                        host.heartbeat();
                        true
                    });
                if forced {
                    heartbeats.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                thread::sleep(interval);
            }
        })
    }
}

impl std::fmt::Debug for WakeupBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeupBridge")
            .field("owner", &self.owner)
            .field("enabled", &self.is_manipulated_heartbeat())
            .field("heartbeats", &self.heartbeats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostTaskId, Runnable};
    use crate::test_support::wait_until;
    use std::time::Duration;

    /// Host whose main thread is the thread that built it and which always
    /// reports that thread as parked.
    struct ParkedHost {
        main: ThreadId,
        heartbeats: AtomicU64,
    }

    impl ParkedHost {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                main: thread::current().id(),
                heartbeats: AtomicU64::new(0),
            })
        }
    }

    impl Host for ParkedHost {
        fn is_main_thread(&self) -> bool {
            thread::current().id() == self.main
        }

        fn is_owner_enabled(&self, _owner: &OwnerId) -> bool {
            true
        }

        fn schedule_next_tick(&self, _owner: &OwnerId, _task: Runnable) -> HostTaskId {
            HostTaskId(0)
        }

        fn schedule_on_worker_pool(&self, _owner: &OwnerId, _task: Runnable) -> HostTaskId {
            HostTaskId(0)
        }

        fn heartbeat(&self) {
            self.heartbeats.fetch_add(1, Ordering::SeqCst);
        }

        fn is_main_thread_parked(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_host_parked_check_forces_heartbeat() {
        let host = ParkedHost::new();
        let bridge = WakeupBridge::new(
            OwnerId::new("citizens"),
            host.clone(),
            WakeupConfig::default(),
        );

        bridge.set_manipulated_heartbeat(true);
        assert!(bridge.is_running());
        assert_eq!(bridge.main_thread(), Some(thread::current().id()));
        assert!(wait_until(Duration::from_secs(5), || bridge.heartbeats() == 1));
        assert_eq!(host.heartbeats.load(Ordering::SeqCst), 1);

        bridge.shutdown();
        assert!(!bridge.is_running());
        assert!(!bridge.is_manipulated_heartbeat());
    }

    #[test]
    fn test_running_follows_manipulation_flag() {
        let host = ParkedHost::new();
        let bridge = WakeupBridge::new(OwnerId::new("citizens"), host, WakeupConfig::default());
        assert!(!bridge.is_running());

        bridge.set_manipulated_heartbeat(true);
        assert!(bridge.is_running());
        bridge.set_manipulated_heartbeat(false);
        assert!(!bridge.is_running());
    }

    #[test]
    fn test_enabling_off_main_does_not_start_thread() {
        let host = ParkedHost::new();
        let bridge = Arc::new(WakeupBridge::new(
            OwnerId::new("citizens"),
            host,
            WakeupConfig::default(),
        ));

        let remote = Arc::clone(&bridge);
        thread::spawn(move || remote.set_manipulated_heartbeat(true))
            .join()
            .unwrap();
        assert!(bridge.is_manipulated_heartbeat());
        assert!(!bridge.is_running());
        assert_eq!(bridge.main_thread(), None);
    }
}
