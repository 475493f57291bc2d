use crate::host::{
    EntityHandle, Host, HostTaskId, OwnerId, RegionKey, RegionScheduler, Runnable,
    TaskExceptionEvent,
};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, RwLock};
use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

static HOST_IDS: AtomicU64 = AtomicU64::new(1);

/// Which simulated thread the caller is on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SimThread {
    Main,
    Worker,
    GlobalRegion,
    Region(RegionKey),
    /// Any thread the host does not own.
    Other,
}

thread_local! {
    static ROLE: RefCell<Option<(u64, SimThread)>> = const { RefCell::new(None) };
    static ACTING_MAIN: Cell<Option<u64>> = const { Cell::new(None) };
}

fn run_guarded(job: Runnable) {
    let label = job.label().map(str::to_string);
    if catch_unwind(AssertUnwindSafe(|| job.run())).is_err() {
        tracing::error!(label = ?label, "simulated host job panicked");
    }
}

/// A failure notification the host received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedException {
    pub owner: OwnerId,
    pub message: String,
    pub vetoed: bool,
}

struct MainQueue {
    jobs: Mutex<VecDeque<Runnable>>,
    ready: Condvar,
    shutdown: AtomicBool,
}

/// A single-threaded execution unit fed through a channel.
struct Lane {
    jobs: flume::Sender<Runnable>,
}

impl Lane {
    fn spawn(name: String, host: u64, role: SimThread) -> Self {
        let (jobs, queue) = flume::unbounded::<Runnable>();
        let spawned = thread::Builder::new().name(name).spawn(move || {
            ROLE.with(|slot| *slot.borrow_mut() = Some((host, role)));
            while let Ok(job) = queue.recv() {
                run_guarded(job);
            }
        });
        if let Err(e) = spawned {
            tracing::error!(error = %e, "failed to spawn simulated lane");
        }
        Self { jobs }
    }

    fn send(&self, job: Runnable) {
        let _ = self.jobs.send(job);
    }
}

/// In-process host with a ticking main thread, a worker pool and optional
/// region threads.
pub struct SimulatedHost {
    id: u64,
    main: Arc<MainQueue>,
    workers: Mutex<Option<flume::Sender<Runnable>>>,
    regionized: bool,
    global: Mutex<Option<Lane>>,
    regions: DashMap<RegionKey, Lane>,
    entities: DashMap<EntityHandle, RegionKey>,
    disabled: RwLock<HashSet<OwnerId>>,
    veto_exceptions: AtomicBool,
    exceptions: Mutex<Vec<RecordedException>>,
    main_ticks: AtomicUsize,
    worker_jobs: AtomicUsize,
    heartbeats: AtomicUsize,
    main_labels: Mutex<Vec<String>>,
    next_task: AtomicU64,
}

impl SimulatedHost {
    /// Non-regionized host: regional targets run on the main thread.
    pub fn new() -> Arc<Self> {
        Self::start(false, Duration::from_millis(5), 2)
    }

    /// Regionized host with a global region thread and one thread per region.
    pub fn regionized() -> Arc<Self> {
        Self::start(true, Duration::from_millis(5), 2)
    }

    fn start(regionized: bool, tick: Duration, worker_count: usize) -> Arc<Self> {
        let id = HOST_IDS.fetch_add(1, Ordering::Relaxed);
        let main = Arc::new(MainQueue {
            jobs: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        {
            let main = Arc::clone(&main);
            let spawned = thread::Builder::new()
                .name(format!("sim-main-{id}"))
                .spawn(move || main_loop(id, &main, tick));
            if let Err(e) = spawned {
                tracing::error!(error = %e, "failed to spawn simulated main thread");
            }
        }

        let (workers, queue) = flume::unbounded::<Runnable>();
        for index in 0..worker_count {
            let queue = queue.clone();
            let spawned = thread::Builder::new()
                .name(format!("sim-worker-{id}-{index}"))
                .spawn(move || {
                    ROLE.with(|slot| *slot.borrow_mut() = Some((id, SimThread::Worker)));
                    while let Ok(job) = queue.recv() {
                        run_guarded(job);
                    }
                });
            if let Err(e) = spawned {
                tracing::error!(error = %e, "failed to spawn simulated worker");
            }
        }

        let global = regionized
            .then(|| Lane::spawn(format!("sim-global-{id}"), id, SimThread::GlobalRegion));

        Arc::new(Self {
            id,
            main,
            workers: Mutex::new(Some(workers)),
            regionized,
            global: Mutex::new(global),
            regions: DashMap::new(),
            entities: DashMap::new(),
            disabled: RwLock::new(HashSet::new()),
            veto_exceptions: AtomicBool::new(false),
            exceptions: Mutex::new(Vec::new()),
            main_ticks: AtomicUsize::new(0),
            worker_jobs: AtomicUsize::new(0),
            heartbeats: AtomicUsize::new(0),
            main_labels: Mutex::new(Vec::new()),
            next_task: AtomicU64::new(1),
        })
    }

    /// The simulated thread the caller is on.
    pub fn current_thread(&self) -> SimThread {
        if ACTING_MAIN.with(Cell::get) == Some(self.id) {
            return SimThread::Main;
        }
        ROLE.with(|slot| match slot.borrow().as_ref() {
            Some((host, role)) if *host == self.id => role.clone(),
            _ => SimThread::Other,
        })
    }

    /// Run `f` on the main thread and wait for its result. Runs inline when
    /// already on the main thread. Does not count as a scheduled tick.
    pub fn run_on_main<T, F>(&self, f: F) -> T
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if self.is_main_thread() {
            return f();
        }
        let (tx, rx) = flume::bounded(1);
        self.push_main(Runnable::labelled("run-on-main", move || {
            let _ = tx.send(f());
        }));
        match rx.recv() {
            Ok(value) => value,
            Err(_) => panic!("job passed to run_on_main panicked"),
        }
    }

    /// Wait until every main-thread job queued so far has run.
    pub fn flush_main(&self) {
        self.run_on_main(|| ());
    }

    pub fn disable_owner(&self, owner: &OwnerId) {
        self.disabled.write().insert(owner.clone());
    }

    pub fn enable_owner(&self, owner: &OwnerId) {
        self.disabled.write().remove(owner);
    }

    /// Make the host cancel every failure notification it receives.
    pub fn set_veto_exceptions(&self, veto: bool) {
        self.veto_exceptions.store(veto, Ordering::SeqCst);
    }

    pub fn exceptions(&self) -> Vec<RecordedException> {
        self.exceptions.lock().clone()
    }

    /// Calls to `schedule_next_tick` so far.
    pub fn scheduled_main_ticks(&self) -> usize {
        self.main_ticks.load(Ordering::SeqCst)
    }

    pub fn worker_jobs(&self) -> usize {
        self.worker_jobs.load(Ordering::SeqCst)
    }

    /// Out-of-band heartbeats driven through [`Host::heartbeat`].
    pub fn heartbeats(&self) -> usize {
        self.heartbeats.load(Ordering::SeqCst)
    }

    /// Labels of runnables scheduled on the main thread, in order.
    pub fn main_labels(&self) -> Vec<String> {
        self.main_labels.lock().clone()
    }

    /// Place a new entity in `region`.
    pub fn spawn_entity(&self, region: RegionKey) -> EntityHandle {
        let entity = EntityHandle::random();
        self.entities.insert(entity, region);
        entity
    }

    pub fn move_entity(&self, entity: &EntityHandle, region: RegionKey) {
        self.entities.insert(*entity, region);
    }

    pub fn remove_entity(&self, entity: &EntityHandle) {
        self.entities.remove(entity);
    }

    /// Stop the main loop and every worker and region thread.
    pub fn shutdown(&self) {
        self.main.shutdown.store(true, Ordering::SeqCst);
        self.main.ready.notify_all();
        self.workers.lock().take();
        self.global.lock().take();
        self.regions.clear();
    }

    fn push_main(&self, job: Runnable) {
        self.main.jobs.lock().push_back(job);
        self.main.ready.notify_one();
    }

    fn next_task_id(&self) -> HostTaskId {
        HostTaskId(self.next_task.fetch_add(1, Ordering::Relaxed))
    }

    fn send_to_region(&self, region: &RegionKey, job: Runnable) {
        let lane = self.regions.entry(region.clone()).or_insert_with(|| {
            Lane::spawn(
                format!("sim-region-{}-{region}", self.id),
                self.id,
                SimThread::Region(region.clone()),
            )
        });
        lane.send(job);
    }
}

fn main_loop(id: u64, main: &MainQueue, tick: Duration) {
    ROLE.with(|slot| *slot.borrow_mut() = Some((id, SimThread::Main)));
    loop {
        let batch: Vec<Runnable> = {
            let mut jobs = main.jobs.lock();
            while jobs.is_empty() && !main.shutdown.load(Ordering::SeqCst) {
                main.ready.wait_for(&mut jobs, tick);
            }
            if main.shutdown.load(Ordering::SeqCst) {
                break;
            }
            // Jobs queued while this batch runs belong to the next tick.
            jobs.drain(..).collect()
        };
        for job in batch {
            run_guarded(job);
        }
    }
}

impl Drop for SimulatedHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Host for SimulatedHost {
    fn is_main_thread(&self) -> bool {
        self.current_thread() == SimThread::Main
    }

    fn is_tick_thread(&self) -> bool {
        matches!(
            self.current_thread(),
            SimThread::Main | SimThread::GlobalRegion | SimThread::Region(_)
        )
    }

    fn is_owner_enabled(&self, owner: &OwnerId) -> bool {
        !self.disabled.read().contains(owner)
    }

    fn schedule_next_tick(&self, _owner: &OwnerId, task: Runnable) -> HostTaskId {
        self.main_ticks.fetch_add(1, Ordering::SeqCst);
        if let Some(label) = task.label() {
            self.main_labels.lock().push(label.to_string());
        }
        self.push_main(task);
        self.next_task_id()
    }

    fn schedule_on_worker_pool(&self, _owner: &OwnerId, task: Runnable) -> HostTaskId {
        self.worker_jobs.fetch_add(1, Ordering::SeqCst);
        if let Some(workers) = self.workers.lock().as_ref() {
            let _ = workers.send(task);
        }
        self.next_task_id()
    }

    fn fire_exception_event(&self, event: &mut TaskExceptionEvent<'_>) {
        let vetoed = self.veto_exceptions.load(Ordering::SeqCst);
        if vetoed {
            event.set_cancelled(true);
        }
        self.exceptions.lock().push(RecordedException {
            owner: event.owner().clone(),
            message: format!("{:#}", event.error()),
            vetoed,
        });
    }

    fn regions(&self) -> Option<&dyn RegionScheduler> {
        if self.regionized {
            Some(self)
        } else {
            None
        }
    }

    fn heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
        let batch: Vec<Runnable> = self.main.jobs.lock().drain(..).collect();
        ACTING_MAIN.with(|slot| slot.set(Some(self.id)));
        for job in batch {
            run_guarded(job);
        }
        ACTING_MAIN.with(|slot| slot.set(None));
    }
}

impl RegionScheduler for SimulatedHost {
    fn schedule_global(&self, _owner: &OwnerId, task: Runnable) {
        match self.global.lock().as_ref() {
            Some(lane) => lane.send(task),
            None => self.push_main(task),
        }
    }

    fn schedule_region(&self, _owner: &OwnerId, region: &RegionKey, task: Runnable) {
        self.send_to_region(region, task);
    }

    fn schedule_entity(
        &self,
        _owner: &OwnerId,
        entity: &EntityHandle,
        task: Runnable,
    ) -> Result<(), Runnable> {
        let region = self.entities.get(entity).map(|entry| entry.value().clone());
        match region {
            Some(region) => {
                self.send_to_region(&region, task);
                Ok(())
            }
            None => Err(task),
        }
    }

    fn is_global_thread(&self) -> bool {
        self.current_thread() == SimThread::GlobalRegion
    }

    fn is_region_thread(&self, region: &RegionKey) -> bool {
        self.current_thread() == SimThread::Region(region.clone())
    }

    fn is_entity_thread(&self, entity: &EntityHandle) -> bool {
        let region = self.entities.get(entity).map(|entry| entry.value().clone());
        region.is_some_and(|region| self.current_thread() == SimThread::Region(region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_on_main_executes_on_main_thread() {
        let host = SimulatedHost::new();
        let spy = Arc::clone(&host);
        let on_main = host.run_on_main(move || spy.is_main_thread());
        assert!(on_main);
        assert!(!host.is_main_thread());
        assert_eq!(host.current_thread(), SimThread::Other);
    }

    #[test]
    fn test_worker_pool_runs_off_main() {
        let host = SimulatedHost::new();
        let (tx, rx) = flume::bounded(1);
        let spy = Arc::clone(&host);
        host.schedule_on_worker_pool(
            &OwnerId::new("t"),
            Runnable::new(move || {
                let _ = tx.send(spy.current_thread());
            }),
        );
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), SimThread::Worker);
        assert_eq!(host.worker_jobs(), 1);
    }

    #[test]
    fn test_removed_entity_is_handed_back() {
        let host = SimulatedHost::regionized();
        let owner = OwnerId::new("t");
        let entity = host.spawn_entity(RegionKey::new("world", 0, 0));
        host.remove_entity(&entity);
        let result = host.schedule_entity(&owner, &entity, Runnable::new(|| {}));
        assert!(result.is_err());
    }

    #[test]
    fn test_heartbeat_drains_main_queue_out_of_band() {
        let host = SimulatedHost::new();
        let (blocked_tx, blocked_rx) = flume::bounded::<()>(1);
        let (release_tx, release_rx) = flume::bounded::<()>(1);

        // Occupy the main thread.
        host.push_main(Runnable::new(move || {
            let _ = blocked_tx.send(());
            let _ = release_rx.recv();
        }));
        blocked_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let (tx, rx) = flume::bounded(1);
        let spy = Arc::clone(&host);
        host.schedule_next_tick(
            &OwnerId::new("t"),
            Runnable::new(move || {
                let _ = tx.send(spy.is_main_thread());
            }),
        );
        host.heartbeat();

        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert_eq!(host.heartbeats(), 1);
        release_tx.send(()).unwrap();
    }
}
