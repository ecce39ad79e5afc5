//! Type-erased entity handles shared between the host graph and the registry.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::{ObjectGraph, Registry, SessionId, Singleton};

/// Unique identity of one entity instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

static NEXT_ENTITY: AtomicU64 = AtomicU64::new(1);

impl EntityId {
    fn next() -> EntityId {
        EntityId(NEXT_ENTITY.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) const fn from_raw(raw: u64) -> EntityId {
        EntityId(raw)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Explicit type token compared when an entity claims a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    pub fn of<T: 'static>() -> TypeTag {
        TypeTag {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(self) -> TypeId {
        self.id
    }

    /// Full type path, e.g. `my_game::audio::AudioHub`.
    pub fn name(self) -> &'static str {
        self.name
    }

    /// Last path segment, e.g. `AudioHub`. Generic arguments are kept.
    pub fn short_name(self) -> &'static str {
        let path_end = self.name.find('<').unwrap_or(self.name.len());
        match self.name[..path_end].rfind("::") {
            Some(idx) => &self.name[idx + 2..],
            None => self.name,
        }
    }
}

/// Per-instance record of the last session whose soft initialization completed.
#[derive(Debug)]
pub(crate) struct LifecycleMark {
    session: AtomicU64,
    first_bound: AtomicBool,
}

impl LifecycleMark {
    fn new() -> Self {
        Self {
            session: AtomicU64::new(SessionId::UNINITIALIZED.get()),
            first_bound: AtomicBool::new(false),
        }
    }

    pub(crate) fn session(&self) -> SessionId {
        SessionId::from_raw(self.session.load(Ordering::Acquire))
    }

    pub(crate) fn set_session(&self, session: SessionId) {
        self.session.store(session.get(), Ordering::Release);
    }

    /// Returns `true` exactly once per instance.
    pub(crate) fn claim_first_bind(&self) -> bool {
        !self.first_bound.swap(true, Ordering::AcqRel)
    }
}

type ActivateFn = fn(&Registry, &dyn ObjectGraph, &EntityHandle);
type DeactivateFn = fn(&Registry, &EntityHandle);

struct EntityCell {
    id: EntityId,
    tag: TypeTag,
    slot: TypeTag,
    component: Arc<dyn Any + Send + Sync>,
    mark: LifecycleMark,
    alive: AtomicBool,
    activate: ActivateFn,
    deactivate: DeactivateFn,
}

/// Shared handle to one entity living in a host graph.
///
/// Cloning is cheap. Identity is per instance: two handles are equal only if they
/// point at the same entity.
#[derive(Clone)]
pub struct EntityHandle(Arc<EntityCell>);

impl EntityHandle {
    /// Wraps `value` and wires its activation callbacks to the slot it declares.
    pub fn new<C: Singleton>(value: C) -> Self {
        Self(Arc::new(EntityCell {
            id: EntityId::next(),
            tag: TypeTag::of::<C>(),
            slot: TypeTag::of::<C::Slot>(),
            component: Arc::new(value),
            mark: LifecycleMark::new(),
            alive: AtomicBool::new(true),
            activate: activate_slot::<C::Slot>,
            deactivate: deactivate_slot::<C::Slot>,
        }))
    }

    pub fn id(&self) -> EntityId {
        self.0.id
    }

    /// Runtime type of the wrapped value.
    pub fn tag(&self) -> TypeTag {
        self.0.tag
    }

    /// Slot type the value declared.
    pub fn slot(&self) -> TypeTag {
        self.0.slot
    }

    pub fn is_alive(&self) -> bool {
        self.0.alive.load(Ordering::Acquire)
    }

    /// Called by the host when the entity leaves the graph for good.
    pub fn mark_destroyed(&self) {
        self.0.alive.store(false, Ordering::Release);
    }

    /// Returns the value if its runtime type is exactly `T`.
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.0.component.clone().downcast::<T>().ok()
    }

    /// Host activation callback; forwards to the declared slot.
    ///
    /// May be called several times for one activation.
    pub fn notify_activated(&self, registry: &Registry, graph: &dyn ObjectGraph) {
        (self.0.activate)(registry, graph, self)
    }

    /// Host terminal-deactivation callback; forwards to the declared slot.
    pub fn notify_deactivated(&self, registry: &Registry) {
        (self.0.deactivate)(registry, self)
    }

    pub(crate) fn mark(&self) -> &LifecycleMark {
        &self.0.mark
    }

    pub(crate) fn same_as(&self, other: &EntityHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for EntityHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for EntityHandle {}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityHandle")
            .field("id", &self.0.id)
            .field("type", &self.0.tag.short_name())
            .field("alive", &self.is_alive())
            .finish()
    }
}

fn activate_slot<T: Singleton>(
    registry: &Registry,
    graph: &dyn ObjectGraph,
    entity: &EntityHandle,
) {
    registry.on_entity_activated::<T, dyn ObjectGraph>(graph, entity, T::POLICY);
}

fn deactivate_slot<T: Singleton>(registry: &Registry, entity: &EntityHandle) {
    registry.on_entity_deactivated::<T>(entity);
}
