//! Dispatchers for regionized hosts.
//!
//! The owning execution unit is resolved on every dispatch, not when the
//! dispatcher is created: regions are ticked independently and entities move
//! between them. Without a region scheduler every variant degenerates to the
//! main thread.

use super::{DispatchContext, Dispatcher};
use crate::host::{EntityHandle, Host, OwnerId, RegionKey, Runnable};
use crate::wakeup::WakeupBridge;
use std::sync::Arc;

fn schedule_on_main(host: &dyn Host, owner: &OwnerId, task: Runnable) {
    host.schedule_next_tick(owner, task);
}

/// Targets the global region, which owns world-independent state.
pub struct GlobalRegionDispatcher {
    host: Arc<dyn Host>,
    wakeup: Arc<WakeupBridge>,
}

impl GlobalRegionDispatcher {
    pub fn new(host: Arc<dyn Host>, wakeup: Arc<WakeupBridge>) -> Self {
        Self { host, wakeup }
    }
}

impl Dispatcher for GlobalRegionDispatcher {
    fn name(&self) -> &'static str {
        "global-region"
    }

    fn can_resume(&self, ctx: &DispatchContext) -> bool {
        self.host.is_owner_enabled(&ctx.owner)
    }

    fn is_dispatch_needed(&self, _ctx: &DispatchContext) -> bool {
        match self.host.regions() {
            Some(regions) => !regions.is_global_thread(),
            None => !self.host.is_main_thread(),
        }
    }

    fn dispatch(&self, ctx: &DispatchContext, task: Runnable) {
        match self.host.regions() {
            Some(regions) => regions.schedule_global(&ctx.owner, task),
            None => schedule_on_main(self.host.as_ref(), &ctx.owner, task),
        }
        self.wakeup.ensure_wakeup();
    }
}

/// Targets the unit that owns one spatial region.
pub struct RegionDispatcher {
    host: Arc<dyn Host>,
    wakeup: Arc<WakeupBridge>,
    region: RegionKey,
}

impl RegionDispatcher {
    pub fn new(host: Arc<dyn Host>, wakeup: Arc<WakeupBridge>, region: RegionKey) -> Self {
        Self {
            host,
            wakeup,
            region,
        }
    }
}

impl Dispatcher for RegionDispatcher {
    fn name(&self) -> &'static str {
        "region"
    }

    fn can_resume(&self, ctx: &DispatchContext) -> bool {
        self.host.is_owner_enabled(&ctx.owner)
    }

    fn is_dispatch_needed(&self, _ctx: &DispatchContext) -> bool {
        match self.host.regions() {
            Some(regions) => !regions.is_region_thread(&self.region),
            None => !self.host.is_main_thread(),
        }
    }

    fn dispatch(&self, ctx: &DispatchContext, task: Runnable) {
        match self.host.regions() {
            Some(regions) => regions.schedule_region(&ctx.owner, &self.region, task),
            None => schedule_on_main(self.host.as_ref(), &ctx.owner, task),
        }
        self.wakeup.ensure_wakeup();
    }
}

/// Targets whichever unit currently owns an entity.
///
/// If the entity is gone the continuation goes to the global region instead
/// of being dropped.
pub struct EntityDispatcher {
    host: Arc<dyn Host>,
    wakeup: Arc<WakeupBridge>,
    entity: EntityHandle,
}

impl EntityDispatcher {
    pub fn new(host: Arc<dyn Host>, wakeup: Arc<WakeupBridge>, entity: EntityHandle) -> Self {
        Self {
            host,
            wakeup,
            entity,
        }
    }
}

impl Dispatcher for EntityDispatcher {
    fn name(&self) -> &'static str {
        "entity"
    }

    fn can_resume(&self, ctx: &DispatchContext) -> bool {
        self.host.is_owner_enabled(&ctx.owner)
    }

    fn is_dispatch_needed(&self, _ctx: &DispatchContext) -> bool {
        match self.host.regions() {
            Some(regions) => !regions.is_entity_thread(&self.entity),
            None => !self.host.is_main_thread(),
        }
    }

    fn dispatch(&self, ctx: &DispatchContext, task: Runnable) {
        match self.host.regions() {
            Some(regions) => {
                if let Err(task) = regions.schedule_entity(&ctx.owner, &self.entity, task) {
                    tracing::debug!(
                        owner = %ctx.owner,
                        entity = %self.entity,
                        "entity no longer scheduled, falling back to the global region"
                    );
                    regions.schedule_global(&ctx.owner, task);
                }
            }
            None => schedule_on_main(self.host.as_ref(), &ctx.owner, task),
        }
        self.wakeup.ensure_wakeup();
    }
}
