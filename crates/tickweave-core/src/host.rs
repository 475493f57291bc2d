//! Host collaborator interfaces.
//!
//! The core never talks to a concrete server. It consumes a [`Host`] that can
//! schedule work on the main thread and worker pool, answer thread-affinity
//! questions and surface unhandled failures, plus an optional
//! [`RegionScheduler`] for hosts that tick regions independently.

use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Identity of an owner (plugin or extension). Cheap to clone.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(Arc<str>);

impl OwnerId {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({})", self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for OwnerId {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// One-shot unit of work handed to a host scheduler.
///
/// The optional label is what host-side profiling attributes the time to.
pub struct Runnable {
    label: Option<Arc<str>>,
    job: Box<dyn FnOnce() + Send + 'static>,
}

impl Runnable {
    pub fn new(job: impl FnOnce() + Send + 'static) -> Self {
        Self {
            label: None,
            job: Box::new(job),
        }
    }

    pub fn labelled(label: impl Into<Arc<str>>, job: impl FnOnce() + Send + 'static) -> Self {
        Self {
            label: Some(label.into()),
            job: Box::new(job),
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn run(self) {
        (self.job)()
    }
}

impl fmt::Debug for Runnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runnable")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Id the host scheduler assigns to a scheduled runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostTaskId(pub u64);

impl fmt::Display for HostTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host-task-{}", self.0)
    }
}

/// A spatial region: a chunk of a world.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionKey {
    pub world: Arc<str>,
    pub chunk_x: i32,
    pub chunk_z: i32,
}

impl RegionKey {
    pub fn new(world: impl Into<Arc<str>>, chunk_x: i32, chunk_z: i32) -> Self {
        Self {
            world: world.into(),
            chunk_x,
            chunk_z,
        }
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{},{}]", self.world, self.chunk_x, self.chunk_z)
    }
}

/// Handle to a host entity. The entity itself may move between regions or be
/// removed at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityHandle(Uuid);

impl EntityHandle {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity-{}", self.0)
    }
}

/// Cancellable notification of an unhandled task failure.
///
/// The host fires it through its own event system. Setting it cancelled
/// suppresses the error log.
#[derive(Debug)]
pub struct TaskExceptionEvent<'a> {
    owner: &'a OwnerId,
    error: &'a anyhow::Error,
    cancelled: bool,
}

impl<'a> TaskExceptionEvent<'a> {
    pub fn new(owner: &'a OwnerId, error: &'a anyhow::Error) -> Self {
        Self {
            owner,
            error,
            cancelled: false,
        }
    }

    pub fn owner(&self) -> &OwnerId {
        self.owner
    }

    pub fn error(&self) -> &anyhow::Error {
        self.error
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

/// Scheduler and environment of a tick-driven host.
pub trait Host: Send + Sync + 'static {
    /// Whether the calling thread is the host's main thread.
    fn is_main_thread(&self) -> bool;

    /// Whether the calling thread ticks game state. Regionized hosts also
    /// return true on region threads.
    fn is_tick_thread(&self) -> bool {
        self.is_main_thread()
    }

    fn is_owner_enabled(&self, owner: &OwnerId) -> bool;

    /// Run `task` once on the main thread at or after the next tick boundary.
    fn schedule_next_tick(&self, owner: &OwnerId, task: Runnable) -> HostTaskId;

    /// Run `task` once on an unspecified worker thread.
    fn schedule_on_worker_pool(&self, owner: &OwnerId, task: Runnable) -> HostTaskId;

    /// Deliver the cancellable failure notification through the host's event system.
    fn fire_exception_event(&self, event: &mut TaskExceptionEvent<'_>) {
        let _ = event;
    }

    /// Region scheduler, if the host ticks regions independently.
    fn regions(&self) -> Option<&dyn RegionScheduler> {
        None
    }

    /// Process pending main-tick work out of band, on the calling thread.
    fn heartbeat(&self) {}

    /// Host-specific check for a main thread parked on task work.
    fn is_main_thread_parked(&self) -> bool {
        false
    }
}

/// Scheduling surface of a regionized host.
///
/// The ownership checks default to false, which makes every regional
/// dispatcher hand off unconditionally.
pub trait RegionScheduler: Send + Sync {
    fn schedule_global(&self, owner: &OwnerId, task: Runnable);

    fn schedule_region(&self, owner: &OwnerId, region: &RegionKey, task: Runnable);

    /// Schedule on the unit that currently owns `entity`. Hands the runnable
    /// back if the entity can no longer be resolved.
    fn schedule_entity(
        &self,
        owner: &OwnerId,
        entity: &EntityHandle,
        task: Runnable,
    ) -> Result<(), Runnable>;

    fn is_global_thread(&self) -> bool {
        false
    }

    fn is_region_thread(&self, region: &RegionKey) -> bool {
        let _ = region;
        false
    }

    fn is_entity_thread(&self, entity: &EntityHandle) -> bool {
        let _ = entity;
        false
    }
}
