use super::registration::ListenerRegistration;
use super::types::Event;
use crate::host::OwnerId;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A registration bound to its owner.
pub(crate) struct RegisteredListener<E: Event> {
    pub(crate) owner: OwnerId,
    pub(crate) registration: ListenerRegistration<E>,
    sequence: u64,
}

/// Baked listener order for one event type.
pub(crate) type ListenerSnapshot<E> = Arc<[Arc<RegisteredListener<E>>]>;

trait ListenerTable: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn remove_owner(&self, owner: &OwnerId) -> usize;
}

struct TypedTable<E: Event> {
    baked: RwLock<ListenerSnapshot<E>>,
}

impl<E: Event> TypedTable<E> {
    fn new() -> Self {
        Self {
            baked: RwLock::new(Arc::from(Vec::new())),
        }
    }

    fn snapshot(&self) -> ListenerSnapshot<E> {
        Arc::clone(&self.baked.read())
    }

    fn replace(&self, mut listeners: Vec<Arc<RegisteredListener<E>>>) {
        // Stable order: priority, then registration order.
        listeners.sort_by_key(|listener| (listener.registration.priority(), listener.sequence));
        *self.baked.write() = Arc::from(listeners);
    }
}

impl<E: Event> ListenerTable for TypedTable<E> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn remove_owner(&self, owner: &OwnerId) -> usize {
        let current = self.snapshot();
        let kept: Vec<_> = current
            .iter()
            .filter(|listener| &listener.owner != owner)
            .cloned()
            .collect();
        let removed = current.len() - kept.len();
        if removed > 0 {
            self.replace(kept);
        }
        removed
    }
}

/// Listener storage keyed by event type.
///
/// Every registration re-bakes the sorted listener list of its event type, so
/// firing only clones a snapshot and never sorts.
pub(crate) struct EventBus {
    tables: RwLock<HashMap<TypeId, Arc<dyn ListenerTable>>>,
    next_sequence: AtomicU64,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            next_sequence: AtomicU64::new(0),
        }
    }

    pub(crate) fn register<E: Event>(&self, owner: &OwnerId, registrations: Vec<ListenerRegistration<E>>) {
        if registrations.is_empty() {
            return;
        }

        let mut tables = self.tables.write();
        let table = tables
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Arc::new(TypedTable::<E>::new()) as Arc<dyn ListenerTable>);
        let Some(table) = table.as_any().downcast_ref::<TypedTable<E>>() else {
            return;
        };

        let mut listeners = table.snapshot().to_vec();
        for registration in registrations {
            tracing::trace!(
                owner = %owner,
                listener = registration.name(),
                priority = ?registration.priority(),
                "listener registered"
            );
            listeners.push(Arc::new(RegisteredListener {
                owner: owner.clone(),
                registration,
                sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
            }));
        }
        table.replace(listeners);
    }

    pub(crate) fn listeners<E: Event>(&self) -> ListenerSnapshot<E> {
        let tables = self.tables.read();
        tables
            .get(&TypeId::of::<E>())
            .and_then(|table| table.as_any().downcast_ref::<TypedTable<E>>())
            .map(TypedTable::snapshot)
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Remove every listener of `owner`. Returns how many were removed.
    pub(crate) fn unregister_owner(&self, owner: &OwnerId) -> usize {
        let tables = self.tables.write();
        tables.values().map(|table| table.remove_owner(owner)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventPriority;

    struct Tick;
    impl Event for Tick {}

    struct Other;
    impl Event for Other {}

    fn names(bus: &EventBus) -> Vec<String> {
        bus.listeners::<Tick>()
            .iter()
            .map(|listener| listener.registration.name().to_string())
            .collect()
    }

    #[test]
    fn test_listeners_baked_by_priority_then_registration_order() {
        let bus = EventBus::new();
        let a = OwnerId::new("a");
        let b = OwnerId::new("b");

        bus.register(
            &a,
            vec![
                ListenerRegistration::<Tick>::plain("a-high", |_| Ok(())).with_priority(EventPriority::High),
                ListenerRegistration::<Tick>::plain("a-normal", |_| Ok(())),
            ],
        );
        bus.register(
            &b,
            vec![
                ListenerRegistration::<Tick>::plain("b-lowest", |_| Ok(())).with_priority(EventPriority::Lowest),
                ListenerRegistration::<Tick>::plain("b-normal", |_| Ok(())),
            ],
        );

        assert_eq!(names(&bus), vec!["b-lowest", "a-normal", "b-normal", "a-high"]);
    }

    #[test]
    fn test_unregister_owner_spans_event_types() {
        let bus = EventBus::new();
        let a = OwnerId::new("a");
        let b = OwnerId::new("b");

        bus.register(&a, vec![ListenerRegistration::<Tick>::plain("a-tick", |_| Ok(()))]);
        bus.register(&a, vec![ListenerRegistration::<Other>::plain("a-other", |_| Ok(()))]);
        bus.register(&b, vec![ListenerRegistration::<Tick>::plain("b-tick", |_| Ok(()))]);

        assert_eq!(bus.unregister_owner(&a), 2);
        assert_eq!(names(&bus), vec!["b-tick"]);
        assert!(bus.listeners::<Other>().is_empty());
        assert_eq!(bus.unregister_owner(&a), 0);
    }

    #[test]
    fn test_unknown_event_type_has_no_listeners() {
        let bus = EventBus::new();
        assert!(bus.listeners::<Tick>().is_empty());
    }
}
