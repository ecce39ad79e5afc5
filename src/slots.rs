//! Registry cache: one slot per declared type, kept in a single map.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::{EntityHandle, EntityId, SessionId, TypeTag};

#[derive(Debug)]
struct Slot {
    type_name: &'static str,
    entity: Option<EntityHandle>,
    session: SessionId,
}

/// Point-in-time view of one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSnapshot {
    pub type_name: &'static str,
    pub entity: Option<EntityId>,
    pub session: SessionId,
}

/// What a slot held when it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Held {
    Empty,
    Live(EntityHandle),
    /// The holder died without a deactivation callback and was just evicted.
    Evicted(EntityHandle),
}

/// Cache map keyed by `TypeId`.
///
/// Only the owning context mutates it, so the mutex is never contended. It is never
/// held while calling into hooks or the host graph.
#[derive(Debug, Default)]
pub(crate) struct SlotTable {
    slots: Mutex<HashMap<TypeId, Slot>>,
}

impl SlotTable {
    fn with_slot<R>(&self, tag: TypeTag, f: impl FnOnce(&mut Slot) -> R) -> R {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        let slot = slots.entry(tag.id()).or_insert_with(|| Slot {
            type_name: tag.name(),
            entity: None,
            session: SessionId::UNINITIALIZED,
        });
        f(slot)
    }

    /// Drops the cached entity if it was validated against another session.
    ///
    /// Returns `true` if a reference was dropped.
    pub(crate) fn sync_session(&self, tag: TypeTag, current: SessionId) -> bool {
        self.with_slot(tag, |slot| {
            if slot.session == current {
                return false;
            }
            slot.session = current;
            slot.entity.take().is_some()
        })
    }

    /// The bound entity. A dead holder is evicted and handed back once as
    /// [`Held::Evicted`].
    pub(crate) fn bound(&self, tag: TypeTag) -> Held {
        self.with_slot(tag, |slot| match slot.entity.take() {
            None => Held::Empty,
            Some(entity) if !entity.is_alive() => Held::Evicted(entity),
            Some(entity) => {
                slot.entity = Some(entity.clone());
                Held::Live(entity)
            }
        })
    }

    /// Binds `entity`. Returns `false` if it already held the slot.
    pub(crate) fn bind(&self, tag: TypeTag, entity: &EntityHandle) -> bool {
        self.with_slot(tag, |slot| {
            if slot.entity.as_ref().is_some_and(|e| e.same_as(entity)) {
                return false;
            }
            slot.entity = Some(entity.clone());
            true
        })
    }

    /// Clears the slot if `entity` holds it.
    pub(crate) fn unbind_if(&self, tag: TypeTag, entity: &EntityHandle) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        match slots.get_mut(&tag.id()) {
            Some(slot) if slot.entity.as_ref().is_some_and(|e| e.same_as(entity)) => {
                slot.entity = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn is_bound(&self, tag: TypeTag) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        slots
            .get(&tag.id())
            .and_then(|slot| slot.entity.as_ref())
            .is_some_and(EntityHandle::is_alive)
    }

    pub(crate) fn snapshot(&self) -> Vec<SlotSnapshot> {
        let slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        let mut out: Vec<SlotSnapshot> = slots
            .values()
            .map(|slot| SlotSnapshot {
                type_name: slot.type_name,
                entity: slot.entity.as_ref().map(EntityHandle::id),
                session: slot.session,
            })
            .collect();
        out.sort_by(|a, b| a.type_name.cmp(b.type_name));
        out
    }

    pub(crate) fn remove(&self, tag: TypeTag) {
        self.slots
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&tag.id());
    }

    pub(crate) fn clear(&self) {
        self.slots
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Policy, Singleton};

    #[derive(Default)]
    struct Lamp;

    impl Singleton for Lamp {
        type Slot = Self;
        const POLICY: Policy = Policy::PERSISTENT;
    }

    fn tag() -> TypeTag {
        TypeTag::of::<Lamp>()
    }

    #[test]
    fn test_slot_created_lazily() {
        let table = SlotTable::default();
        assert!(table.snapshot().is_empty());
        assert_eq!(table.bound(tag()), Held::Empty);
        assert_eq!(table.snapshot().len(), 1);
    }

    #[test]
    fn test_bind_is_idempotent() {
        let table = SlotTable::default();
        let lamp = EntityHandle::new(Lamp);
        assert!(table.bind(tag(), &lamp));
        assert!(!table.bind(tag(), &lamp));
        assert_eq!(table.bound(tag()), Held::Live(lamp));
    }

    #[test]
    fn test_session_change_drops_reference() {
        let table = SlotTable::default();
        let lamp = EntityHandle::new(Lamp);
        let first = SessionId::from_raw(1);
        let second = SessionId::from_raw(2);

        assert!(!table.sync_session(tag(), first));
        table.bind(tag(), &lamp);
        assert!(!table.sync_session(tag(), first));
        assert!(matches!(table.bound(tag()), Held::Live(_)));

        assert!(table.sync_session(tag(), second));
        assert_eq!(table.bound(tag()), Held::Empty);
        assert!(!table.sync_session(tag(), second));
    }

    #[test]
    fn test_dead_entity_is_evicted() {
        let table = SlotTable::default();
        let lamp = EntityHandle::new(Lamp);
        table.bind(tag(), &lamp);

        lamp.mark_destroyed();
        assert!(!table.is_bound(tag()));
        assert_eq!(table.bound(tag()), Held::Evicted(lamp.clone()));
        assert_eq!(table.bound(tag()), Held::Empty);
        assert!(!table.unbind_if(tag(), &lamp));
    }

    #[test]
    fn test_clear_recovers_poisoned_lock() {
        let table = SlotTable::default();
        table.bind(tag(), &EntityHandle::new(Lamp));

        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = table.slots.lock().unwrap();
            panic!("poison the slot map");
        }));
        assert!(table.slots.is_poisoned());

        table.clear();
        assert!(table.snapshot().is_empty());
    }

    #[test]
    fn test_unbind_only_for_holder() {
        let table = SlotTable::default();
        let holder = EntityHandle::new(Lamp);
        let other = EntityHandle::new(Lamp);
        table.bind(tag(), &holder);

        assert!(!table.unbind_if(tag(), &other));
        assert!(table.is_bound(tag()));
        assert!(table.unbind_if(tag(), &holder));
        assert!(!table.is_bound(tag()));
    }

    #[test]
    fn test_snapshot_and_clear() {
        let table = SlotTable::default();
        let lamp = EntityHandle::new(Lamp);
        table.sync_session(tag(), SessionId::from_raw(5));
        table.bind(tag(), &lamp);

        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].entity, Some(lamp.id()));
        assert_eq!(snapshot[0].session, SessionId::from_raw(5));

        table.remove(tag());
        assert!(table.snapshot().is_empty());
        table.bind(tag(), &lamp);
        table.clear();
        assert!(table.snapshot().is_empty());
    }
}
