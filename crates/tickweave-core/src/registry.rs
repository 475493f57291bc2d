//! Owner-to-session registry.
//!
//! The registry is an explicit object, not a global: a host adapter creates
//! one at startup and hands clones of it to whatever needs sessions.

use crate::error::{SchedulingError, SchedulingResult};
use crate::events::{fire, Event, EventBus, EventExecutionMode, ListenerRegistration};
use crate::host::{Host, OwnerId};
use crate::session::Session;
use crate::task::{TaskHandle, Timer};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tickweave_config::{SchedulerConfig, ShutdownStrategy};

struct RegistryInner {
    host: Arc<dyn Host>,
    config: Arc<SchedulerConfig>,
    sessions: DashMap<OwnerId, Arc<Session>>,
    bus: EventBus,
    timer: Arc<Timer>,
}

/// Shared handle to the session registry. Cloning is cheap.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(host: Arc<dyn Host>, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                host,
                config: Arc::new(config),
                sessions: DashMap::new(),
                bus: EventBus::new(),
                timer: Arc::new(Timer::new()),
            }),
        }
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.inner.host
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub(crate) fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Live session for `owner`, creating it on first access.
    ///
    /// Repeated calls return the same instance until it is disposed. Creating
    /// a session for a disabled owner fails with
    /// [`SchedulingError::SessionOnDisabledOwner`].
    pub fn get_or_create(&self, owner: &OwnerId) -> SchedulingResult<Arc<Session>> {
        match self.inner.sessions.entry(owner.clone()) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_disposed() {
                    return Ok(Arc::clone(entry.get()));
                }
                let session = self.create(owner)?;
                entry.insert(Arc::clone(&session));
                Ok(session)
            }
            Entry::Vacant(entry) => {
                let session = self.create(owner)?;
                entry.insert(Arc::clone(&session));
                Ok(session)
            }
        }
    }

    /// Live session for `owner`, if one exists.
    pub fn get(&self, owner: &OwnerId) -> Option<Arc<Session>> {
        self.inner
            .sessions
            .get(owner)
            .map(|entry| Arc::clone(entry.value()))
            .filter(|session| !session.is_disposed())
    }

    fn create(&self, owner: &OwnerId) -> SchedulingResult<Arc<Session>> {
        if !self.inner.host.is_owner_enabled(owner) {
            return Err(SchedulingError::SessionOnDisabledOwner {
                owner: owner.clone(),
            });
        }
        Ok(Arc::new(Session::new(
            owner.clone(),
            Arc::clone(&self.inner.host),
            Arc::clone(&self.inner.config),
            Arc::clone(&self.inner.timer),
        )))
    }

    /// Dispose the owner's session and forget it. No-op if there is none.
    pub fn dispose(&self, owner: &OwnerId) {
        if let Some((_, session)) = self.inner.sessions.remove(owner) {
            session.dispose();
        }
    }

    /// Host notification that `owner` was disabled.
    ///
    /// Drops the owner's listeners. The session itself is only disposed when
    /// its shutdown strategy is [`ShutdownStrategy::Scheduler`].
    pub fn on_owner_disabled(&self, owner: &OwnerId) {
        let removed = self.inner.bus.unregister_owner(owner);
        if removed > 0 {
            tracing::debug!(owner = %owner, removed, "listeners unregistered");
        }

        let strategy = self.get(owner).map(|session| session.shutdown_strategy());
        if strategy == Some(ShutdownStrategy::Scheduler) {
            self.dispose(owner);
        }
    }

    /// Register listeners for `owner`. Requires a live session for it.
    pub fn register_listener<E: Event>(
        &self,
        owner: &OwnerId,
        registrations: Vec<ListenerRegistration<E>>,
    ) -> SchedulingResult<()> {
        self.get_or_create(owner)?;
        self.inner.bus.register(owner, registrations);
        Ok(())
    }

    /// Remove every listener `owner` registered, for all event types.
    pub fn unregister_listeners(&self, owner: &OwnerId) -> usize {
        self.inner.bus.unregister_owner(owner)
    }

    /// Fire `event` to its listeners in priority order.
    ///
    /// Synchronous events must be fired from a tick thread, asynchronous ones
    /// from any other thread; a mismatch fails with
    /// [`SchedulingError::WrongThread`]. Concurrent mode returns one handle per
    /// launched listener; consecutive mode returns a single handle for the
    /// whole sequence, owned by `firing_owner`'s session.
    pub fn fire_event<E: Event>(
        &self,
        firing_owner: &OwnerId,
        event: Arc<E>,
        mode: EventExecutionMode,
    ) -> SchedulingResult<Vec<TaskHandle>> {
        fire(self, firing_owner, event, mode)
    }

    /// Owners with a live session.
    pub fn owners(&self) -> Vec<OwnerId> {
        self.inner
            .sessions
            .iter()
            .filter(|entry| !entry.value().is_disposed())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Dispose every session. Used when the host shuts down.
    pub fn dispose_all(&self) {
        for owner in self.owners() {
            self.dispose(&owner);
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.inner.sessions.len())
            .finish_non_exhaustive()
    }
}
