//! The singleton registry: slot cache, session invalidation, placement policy and the
//! per-entity lifecycle state machine.
//!
//! Every decision runs on the owning context. Other contexts are refused at the door
//! by the [`OwnerGuard`] and never reach the cache or the host graph.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use policy_singleton::{Policy, Registry, Scene, Singleton, SingletonHost};
//!
//! #[derive(Default)]
//! struct Settings;
//!
//! impl Singleton for Settings {
//!     type Slot = Self;
//!     const POLICY: Policy = Policy::PERSISTENT;
//! }
//!
//! let scene = Scene::new(Arc::new(Registry::new()));
//! let first = scene.instance::<Settings>().unwrap().unwrap();
//! let again = scene.instance::<Settings>().unwrap().unwrap();
//! assert!(Arc::ptr_eq(&first, &again));
//! ```

use std::sync::Arc;

use crate::diagnostics::{dev_diagnostic, Diagnostics};
use crate::slots::{Held, SlotSnapshot, SlotTable};
use crate::{
    BaseInit, Dispatcher, EntityHandle, ObjectGraph, OwnerGuard, Policy, RegistryEvent,
    SessionClock, SessionId, Singleton, SingletonError, TypeTag, DEV_CHECKS,
};

/// Builder for a [`Registry`].
#[derive(Debug, Clone)]
pub struct RegistryBuilder {
    label: String,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self {
            label: "default".to_string(),
        }
    }
}

impl RegistryBuilder {
    /// Label recorded in every tracing event of this registry.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn build(self) -> Registry {
        let diagnostics = Arc::new(Diagnostics::new(self.label));
        Registry {
            clock: SessionClock::new(),
            guard: OwnerGuard::new(diagnostics.clone()),
            slots: SlotTable::default(),
            diagnostics,
        }
    }
}

enum Lookup<T> {
    Refused,
    Quitting,
    ForeignSlot,
    Found(Arc<T>),
    Missing,
}

/// Owns the session clock, the owner guard and one slot per declared type.
#[derive(Debug)]
pub struct Registry {
    clock: SessionClock,
    guard: OwnerGuard,
    slots: SlotTable,
    diagnostics: Arc<Diagnostics>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn label(&self) -> &str {
        self.diagnostics.label()
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    pub fn guard(&self) -> &OwnerGuard {
        &self.guard
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    // ---------------------------------------------------------------------------------
    // Tracing
    // ---------------------------------------------------------------------------------

    /// Sets a tracing callback invoked for every registry event.
    pub fn set_trace_callback(&self, callback: impl Fn(&RegistryEvent) + Send + Sync + 'static) {
        self.diagnostics.set_trace_callback(callback);
    }

    pub fn clear_trace_callback(&self) {
        self.diagnostics.clear_trace_callback();
    }

    // ---------------------------------------------------------------------------------
    // Session and process lifecycle
    // ---------------------------------------------------------------------------------

    /// Host bring-up, called on the owning context.
    ///
    /// Captures the owner (and `dispatcher`, if any), then begins a play session.
    /// Returns `false` if another context already owns this registry.
    pub fn bring_up(&self, dispatcher: Option<Arc<dyn Dispatcher>>) -> bool {
        if !self.guard.capture_owner(dispatcher) {
            return false;
        }
        self.begin_play_session();
        true
    }

    /// Starts a new play session unless one already started this tick.
    ///
    /// A new session also clears the quitting flag left over from the previous one.
    pub fn begin_play_session(&self) -> bool {
        if !self.guard.validate_owner("BeginPlaySession") {
            return false;
        }
        if !self.clock.advance_if_new_tick() {
            return false;
        }
        self.clock.clear_quitting_flag();
        self.diagnostics.emit(&RegistryEvent::SessionStarted {
            session: self.clock.current_session_id(),
        });
        true
    }

    pub fn notify_quitting(&self) {
        self.clock.notify_quitting();
    }

    pub fn clear_quitting_flag(&self) {
        self.clock.clear_quitting_flag();
    }

    pub fn is_quitting(&self) -> bool {
        self.clock.is_quitting()
    }

    /// Runs `action` on the owning context; see [`OwnerGuard::post_to_owner`].
    pub fn post_to_owner(&self, action: impl FnOnce() + Send + 'static, caller: &str) -> bool {
        self.guard.post_to_owner(action, caller)
    }

    // ---------------------------------------------------------------------------------
    // Access
    // ---------------------------------------------------------------------------------

    /// Returns the instance of `T`, creating one if `T::POLICY` allows it.
    pub fn instance<T, G>(&self, graph: &G) -> Result<Option<Arc<T>>, SingletonError>
    where
        T: Singleton,
        G: ObjectGraph + ?Sized,
    {
        self.instance_with::<T, G>(graph, T::POLICY)
    }

    /// [`Registry::instance`] with an explicit policy.
    ///
    /// `Ok(None)` when the caller is refused, while quitting, and for a missing
    /// placement in release builds. Development builds turn a missing placement into
    /// an error.
    pub fn instance_with<T, G>(
        &self,
        graph: &G,
        policy: Policy,
    ) -> Result<Option<Arc<T>>, SingletonError>
    where
        T: Singleton,
        G: ObjectGraph + ?Sized,
    {
        match self.lookup::<T, G>(graph, policy, "Instance") {
            Lookup::Refused | Lookup::Quitting | Lookup::ForeignSlot => Ok(None),
            Lookup::Found(found) => Ok(Some(found)),
            Lookup::Missing if policy.auto_create_if_missing() => {
                self.auto_create::<T, G>(graph, policy)
            }
            Lookup::Missing if DEV_CHECKS => Err(SingletonError::MissingRequiredPlacement {
                type_name: TypeTag::of::<T>().name(),
            }),
            Lookup::Missing => Ok(None),
        }
    }

    /// Returns the instance of `T` if one is bound or placed. Never creates one.
    pub fn try_get_instance<T, G>(&self, graph: &G) -> Option<Arc<T>>
    where
        T: Singleton,
        G: ObjectGraph + ?Sized,
    {
        self.try_get_instance_with::<T, G>(graph, T::POLICY)
    }

    pub fn try_get_instance_with<T, G>(&self, graph: &G, policy: Policy) -> Option<Arc<T>>
    where
        T: Singleton,
        G: ObjectGraph + ?Sized,
    {
        match self.lookup::<T, G>(graph, policy, "TryGetInstance") {
            Lookup::Found(found) => Some(found),
            Lookup::Refused | Lookup::Quitting | Lookup::ForeignSlot | Lookup::Missing => None,
        }
    }

    fn lookup<T, G>(&self, graph: &G, policy: Policy, caller: &str) -> Lookup<T>
    where
        T: Singleton,
        G: ObjectGraph + ?Sized,
    {
        if !self.guard.validate_owner(caller) {
            return Lookup::Refused;
        }
        if self.clock.is_quitting() {
            return Lookup::Quitting;
        }

        // A type is only ever looked up through its own slot.
        let tag = TypeTag::of::<T>();
        let slot = TypeTag::of::<T::Slot>();
        if slot != tag {
            dev_diagnostic!(
                self.diagnostics,
                RegistryEvent::TypeIdentityMismatch {
                    slot: slot.name(),
                    actual: tag.name(),
                    entity: None,
                }
            );
            return Lookup::ForeignSlot;
        }

        self.sync_session(tag);

        if let Some(found) = self.bound::<T>(tag).and_then(|e| e.downcast::<T>()) {
            return Lookup::Found(found);
        }

        // A placed entity may not have seen its activation callback yet. Driving it
        // here makes it win over auto-create; its late callbacks are no-ops.
        let Some(candidate) = graph.find_active(tag) else {
            return Lookup::Missing;
        };
        self.on_entity_activated::<T, G>(graph, &candidate, policy);
        match self.bound::<T>(tag) {
            Some(bound) if bound.same_as(&candidate) => {
                bound.downcast::<T>().map_or(Lookup::Missing, Lookup::Found)
            }
            _ => Lookup::Missing,
        }
    }

    fn auto_create<T, G>(&self, graph: &G, policy: Policy) -> Result<Option<Arc<T>>, SingletonError>
    where
        T: Singleton,
        G: ObjectGraph + ?Sized,
    {
        let tag = TypeTag::of::<T>();
        if DEV_CHECKS && graph.has_dormant(tag) {
            return Err(SingletonError::DormantInstanceBlocksCreate {
                type_name: tag.name(),
            });
        }

        let entity = EntityHandle::new(T::default());
        graph.spawn_root(tag.short_name(), entity.clone());
        self.diagnostics.emit(&RegistryEvent::AutoCreated {
            type_name: tag.name(),
            entity: entity.id(),
        });

        self.on_entity_activated::<T, G>(graph, &entity, policy);
        Ok(self
            .bound::<T>(tag)
            .filter(|bound| bound.same_as(&entity))
            .and_then(|bound| bound.downcast::<T>()))
    }

    // ---------------------------------------------------------------------------------
    // Host callbacks
    // ---------------------------------------------------------------------------------

    /// Activation callback for an entity claiming the slot of `T`.
    ///
    /// Safe to call repeatedly for one activation; soft initialization runs at most
    /// once per (entity, session). The first entity to activate keeps the slot and
    /// later ones are destroyed.
    pub fn on_entity_activated<T, G>(&self, graph: &G, entity: &EntityHandle, policy: Policy)
    where
        T: Singleton,
        G: ObjectGraph + ?Sized,
    {
        if !self.guard.validate_owner("OnEntityActivated") {
            graph.request_destroy(entity);
            return;
        }
        if !entity.is_alive() {
            return;
        }

        let tag = TypeTag::of::<T>();
        if self.clock.is_quitting() {
            self.diagnostics.emit(&RegistryEvent::RejectedWhileQuitting {
                type_name: tag.name(),
                entity: entity.id(),
            });
            graph.request_destroy(entity);
            return;
        }

        // A newer session wins over whatever the slot held before.
        let session = self.sync_session(tag);

        let typed = match entity.downcast::<T>() {
            Some(typed) if entity.tag() == tag && entity.slot() == tag => typed,
            _ => {
                dev_diagnostic!(
                    self.diagnostics,
                    RegistryEvent::TypeIdentityMismatch {
                        slot: entity.slot().name(),
                        actual: entity.tag().name(),
                        entity: Some(entity.id()),
                    }
                );
                graph.request_destroy(entity);
                return;
            }
        };

        if let Some(holder) = self.bound::<T>(tag) {
            if !holder.same_as(entity) {
                dev_diagnostic!(
                    self.diagnostics,
                    RegistryEvent::DuplicateBinding {
                        type_name: tag.name(),
                        holder: holder.id(),
                        rejected: entity.id(),
                    }
                );
                graph.request_destroy(entity);
                return;
            }
        }

        if self.slots.bind(tag, entity) {
            self.diagnostics.emit(&RegistryEvent::Bound {
                type_name: tag.name(),
                entity: entity.id(),
                session,
            });
        }

        if entity.mark().session() == session {
            return;
        }

        if policy.persist_across_transitions() {
            if !graph.is_root(entity) {
                dev_diagnostic!(
                    self.diagnostics,
                    RegistryEvent::Reparented {
                        type_name: tag.name()
                    }
                );
                graph.detach_to_root(entity);
            }
            graph.keep_across_transitions(entity);
        }

        // Mark before running hooks so re-entrant activation short-circuits.
        entity.mark().set_session(session);
        if entity.mark().claim_first_bind() {
            let mut base = BaseInit::pending();
            typed.on_first_bind(&mut base);
            if DEV_CHECKS && !base.is_completed() {
                self.diagnostics.emit(&RegistryEvent::BaseInitializationSkipped {
                    type_name: tag.name(),
                });
            }
        }
        typed.on_play_session_start();
    }

    /// Terminal deactivation callback.
    ///
    /// Releases the slot and runs `on_unbind` only if `entity` held it.
    pub fn on_entity_deactivated<T: Singleton>(&self, entity: &EntityHandle) {
        if !self.guard.validate_owner("OnEntityDeactivated") {
            return;
        }

        let tag = TypeTag::of::<T>();
        if self.slots.unbind_if(tag, entity) {
            self.release::<T>(tag, entity);
        }
    }

    /// The live holder of the slot. A holder that died before its deactivation
    /// callback arrived is released here, so `on_unbind` still runs exactly once.
    fn bound<T: Singleton>(&self, tag: TypeTag) -> Option<EntityHandle> {
        match self.slots.bound(tag) {
            Held::Live(entity) => Some(entity),
            Held::Evicted(dead) => {
                self.release::<T>(tag, &dead);
                None
            }
            Held::Empty => None,
        }
    }

    fn release<T: Singleton>(&self, tag: TypeTag, entity: &EntityHandle) {
        self.diagnostics.emit(&RegistryEvent::Unbound {
            type_name: tag.name(),
            entity: entity.id(),
        });
        if let Some(typed) = entity.downcast::<T>() {
            typed.on_unbind();
        }
    }

    fn sync_session(&self, tag: TypeTag) -> SessionId {
        let current = self.clock.current_session_id();
        if self.slots.sync_session(tag, current) {
            self.diagnostics.emit(&RegistryEvent::CacheInvalidated {
                type_name: tag.name(),
                session: current,
            });
        }
        current
    }

    // ---------------------------------------------------------------------------------
    // Inspection
    // ---------------------------------------------------------------------------------

    /// Whether the slot of `T` currently holds a live entity.
    ///
    /// Read-only; does not revalidate against the session clock.
    pub fn is_bound<T: Singleton>(&self) -> bool {
        self.slots.is_bound(TypeTag::of::<T>())
    }

    /// All slots created so far, sorted by type name.
    pub fn slots(&self) -> Vec<SlotSnapshot> {
        self.slots.snapshot()
    }

    /// Forgets the slot of `T` without running any hook.
    #[doc(hidden)]
    pub fn reset_slot<T: Singleton>(&self) {
        self.slots.remove(TypeTag::of::<T>());
    }

    /// Forgets every slot without running any hook.
    #[doc(hidden)]
    pub fn reset(&self) {
        self.slots.clear();
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
