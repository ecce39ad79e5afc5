//! In-memory reference host.
//!
//! `Scene` is a small object graph of named containers holding entities. It plays the
//! host's part: it delivers activation callbacks (twice, like an attach followed by an
//! enable), deactivation callbacks on destruction, graph transitions that discard
//! non-persistent containers, and an owner queue drained once per tick.
//!
//! Create it on the context that should own the graph.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    owner_queue, EntityHandle, ObjectGraph, OwnerPump, Registry, Singleton, SingletonHost,
    TypeTag,
};

/// Identity of a container in a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(u64);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container-{}", self.0)
    }
}

#[derive(Debug)]
struct Component {
    handle: EntityHandle,
    enabled: bool,
}

#[derive(Debug)]
struct Container {
    name: String,
    parent: Option<ContainerId>,
    active: bool,
    persistent: bool,
    asset: bool,
    components: Vec<Component>,
}

#[derive(Debug, Default)]
struct SceneState {
    next_id: u64,
    containers: BTreeMap<ContainerId, Container>,
    pending_activation: VecDeque<EntityHandle>,
    pending_destroy: Vec<EntityHandle>,
}

impl SceneState {
    fn insert(&mut self, name: &str, parent: Option<ContainerId>, asset: bool) -> ContainerId {
        self.next_id += 1;
        let id = ContainerId(self.next_id);
        let parent = parent.filter(|p| self.containers.contains_key(p));
        self.containers.insert(
            id,
            Container {
                name: name.to_string(),
                parent,
                active: true,
                persistent: false,
                asset,
                components: Vec::new(),
            },
        );
        id
    }

    fn active_in_hierarchy(&self, id: ContainerId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            match self.containers.get(&current) {
                Some(container) if container.active => cursor = container.parent,
                _ => return false,
            }
        }
        true
    }

    /// Whether the container takes part in the live graph right now.
    fn live(&self, id: ContainerId) -> bool {
        self.containers.get(&id).is_some_and(|c| !c.asset) && self.active_in_hierarchy(id)
    }

    fn locate(&self, entity: &EntityHandle) -> Option<ContainerId> {
        self.containers.iter().find_map(|(id, container)| {
            container
                .components
                .iter()
                .any(|c| c.handle == *entity)
                .then_some(*id)
        })
    }

    fn component(&self, entity: &EntityHandle) -> Option<(ContainerId, &Component)> {
        let id = self.locate(entity)?;
        let component = self.containers[&id]
            .components
            .iter()
            .find(|c| c.handle == *entity)?;
        Some((id, component))
    }

    fn activatable(&self, entity: &EntityHandle) -> bool {
        entity.is_alive()
            && self
                .component(entity)
                .is_some_and(|(id, c)| c.enabled && self.live(id))
    }

    fn subtree(&self, root: ContainerId) -> Vec<ContainerId> {
        let mut out = vec![root];
        let mut i = 0;
        while i < out.len() {
            let parent = out[i];
            out.extend(
                self.containers
                    .iter()
                    .filter(|(_, c)| c.parent == Some(parent))
                    .map(|(id, _)| *id),
            );
            i += 1;
        }
        out
    }

    /// Removes the container and its descendants; returns the entities destroyed.
    fn remove_subtree(&mut self, root: ContainerId) -> Vec<EntityHandle> {
        let mut removed = Vec::new();
        for id in self.subtree(root) {
            if let Some(container) = self.containers.remove(&id) {
                removed.extend(container.components.into_iter().map(|c| c.handle));
            }
        }
        for entity in &removed {
            entity.mark_destroyed();
        }
        removed
    }
}

/// In-memory object graph and host adapter.
pub struct Scene {
    registry: Arc<Registry>,
    state: Mutex<SceneState>,
    pump: OwnerPump,
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("registry", &self.registry.label())
            .field("containers", &self.container_count())
            .finish()
    }
}

impl Scene {
    /// Creates an empty scene owned by the calling context and brings the registry up.
    pub fn new(registry: Arc<Registry>) -> Self {
        let (dispatcher, pump) = owner_queue();
        if !registry.bring_up(Some(Arc::new(dispatcher))) {
            tracing::warn!(
                target: "policy_singleton",
                registry = registry.label(),
                "scene created off the owning context; registry calls from it will be refused"
            );
        }
        Self {
            registry,
            state: Mutex::new(SceneState::default()),
            pump,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn state(&self) -> MutexGuard<'_, SceneState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    // ---------------------------------------------------------------------------------
    // Building the graph
    // ---------------------------------------------------------------------------------

    /// Adds an empty, active root container.
    pub fn spawn(&self, name: &str) -> ContainerId {
        self.state().insert(name, None, false)
    }

    /// Adds an empty, active container under `parent`.
    pub fn spawn_child(&self, name: &str, parent: ContainerId) -> ContainerId {
        self.state().insert(name, Some(parent), false)
    }

    /// Adds a container that lives outside the graph, like a prefab asset.
    pub fn spawn_asset(&self, name: &str) -> ContainerId {
        self.state().insert(name, None, true)
    }

    /// Attaches a default `C` and delivers its activation callbacks right away.
    pub fn add<C: Singleton>(&self, container: ContainerId) -> EntityHandle {
        self.add_value(container, C::default())
    }

    pub fn add_value<C: Singleton>(&self, container: ContainerId, value: C) -> EntityHandle {
        let entity = self.attach(container, value);
        self.deliver_activation(&entity);
        entity
    }

    /// Attaches a default `C` whose activation callbacks wait for the next
    /// [`Scene::flush_activations`] or [`Scene::tick`].
    pub fn place<C: Singleton>(&self, container: ContainerId) -> EntityHandle {
        let entity = self.attach(container, C::default());
        let mut state = self.state();
        if state.activatable(&entity) {
            state.pending_activation.push_back(entity.clone());
        }
        entity
    }

    fn attach<C: Singleton>(&self, container: ContainerId, value: C) -> EntityHandle {
        let entity = EntityHandle::new(value);
        let mut state = self.state();
        match state.containers.get_mut(&container) {
            Some(target) => target.components.push(Component {
                handle: entity.clone(),
                enabled: true,
            }),
            None => entity.mark_destroyed(),
        }
        entity
    }

    /// Attach callback followed by enable callback, skipping the second if the first
    /// destroyed the entity.
    fn deliver_activation(&self, entity: &EntityHandle) {
        for _ in 0..2 {
            if !self.state().activatable(entity) {
                return;
            }
            entity.notify_activated(&self.registry, self);
        }
    }

    /// Delivers queued activation callbacks in placement order.
    pub fn flush_activations(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.state().pending_activation.pop_front();
            let Some(entity) = next else {
                return delivered;
            };
            self.deliver_activation(&entity);
            delivered += 1;
        }
    }

    pub fn set_active(&self, container: ContainerId, active: bool) {
        let woken: Vec<EntityHandle> = {
            let mut state = self.state();
            let Some(target) = state.containers.get_mut(&container) else {
                return;
            };
            target.active = active;
            if !active {
                return;
            }
            state
                .subtree(container)
                .into_iter()
                .flat_map(|id| state.containers[&id].components.iter())
                .map(|c| c.handle.clone())
                .filter(|e| state.activatable(e))
                .collect()
        };
        for entity in woken {
            entity.notify_activated(&self.registry, self);
        }
    }

    pub fn set_enabled(&self, entity: &EntityHandle, enabled: bool) {
        let wake = {
            let mut state = self.state();
            let Some(id) = state.locate(entity) else {
                return;
            };
            if let Some(component) = state
                .containers
                .get_mut(&id)
                .and_then(|c| c.components.iter_mut().find(|c| c.handle == *entity))
            {
                component.enabled = enabled;
            }
            enabled && state.activatable(entity)
        };
        if wake {
            entity.notify_activated(&self.registry, self);
        }
    }

    // ---------------------------------------------------------------------------------
    // Tearing down
    // ---------------------------------------------------------------------------------

    /// Destroys a container, its descendants and their entities.
    pub fn destroy(&self, container: ContainerId) {
        let removed = self.state().remove_subtree(container);
        self.deliver_deactivation(removed);
    }

    /// Destroys a single entity, leaving its container in place.
    pub fn destroy_entity(&self, entity: &EntityHandle) {
        let removed = {
            let mut state = self.state();
            let Some(id) = state.locate(entity) else {
                return;
            };
            if let Some(container) = state.containers.get_mut(&id) {
                container.components.retain(|c| c.handle != *entity);
            }
            entity.mark_destroyed();
            vec![entity.clone()]
        };
        self.deliver_deactivation(removed);
    }

    fn deliver_deactivation(&self, removed: Vec<EntityHandle>) {
        for entity in removed {
            entity.notify_deactivated(&self.registry);
        }
    }

    /// Graph transition: drops every root container not kept across transitions.
    ///
    /// Returns how many root containers were destroyed.
    pub fn transition(&self) -> usize {
        let doomed: Vec<ContainerId> = self
            .state()
            .containers
            .iter()
            .filter(|(_, c)| c.parent.is_none() && !c.persistent && !c.asset)
            .map(|(id, _)| *id)
            .collect();
        for id in &doomed {
            self.destroy(*id);
        }
        doomed.len()
    }

    // ---------------------------------------------------------------------------------
    // Scheduling
    // ---------------------------------------------------------------------------------

    /// One scheduling tick: advance the tick counter, deliver queued activations,
    /// drain the owner queue and carry out destruction requested off the owner.
    pub fn tick(&self) {
        self.registry.clock().on_tick();
        self.flush_activations();
        self.pump.run_pending();

        let doomed = std::mem::take(&mut self.state().pending_destroy);
        for entity in doomed {
            self.destroy_now(&entity);
        }
    }

    /// Soft reset: a new play session without restarting the process.
    pub fn next_play_session(&self) -> bool {
        self.registry.clock().on_tick();
        self.registry.begin_play_session()
    }

    /// Irreversible shutdown begins.
    pub fn quit(&self) {
        self.registry.notify_quitting();
    }

    fn destroy_now(&self, entity: &EntityHandle) {
        let container = self.state().locate(entity);
        match container {
            Some(id) => self.destroy(id),
            None => entity.mark_destroyed(),
        }
    }

    // ---------------------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------------------

    pub fn container_count(&self) -> usize {
        self.state().containers.len()
    }

    pub fn container_of(&self, entity: &EntityHandle) -> Option<ContainerId> {
        self.state().locate(entity)
    }

    pub fn parent_of(&self, container: ContainerId) -> Option<ContainerId> {
        self.state()
            .containers
            .get(&container)
            .and_then(|c| c.parent)
    }

    pub fn name_of(&self, container: ContainerId) -> Option<String> {
        self.state()
            .containers
            .get(&container)
            .map(|c| c.name.clone())
    }

    pub fn is_persistent(&self, container: ContainerId) -> bool {
        self.state()
            .containers
            .get(&container)
            .is_some_and(|c| c.persistent)
    }

    pub fn contains(&self, entity: &EntityHandle) -> bool {
        self.state().locate(entity).is_some()
    }

    /// Live entities of exactly type `C`, active or not.
    pub fn count_of<C: Singleton>(&self) -> usize {
        let tag = TypeTag::of::<C>();
        self.state()
            .containers
            .values()
            .flat_map(|c| c.components.iter())
            .filter(|c| c.handle.tag() == tag && c.handle.is_alive())
            .count()
    }

    /// Owner-queue jobs waiting for the next tick.
    pub fn pending_jobs(&self) -> usize {
        self.pump.pending()
    }
}

impl ObjectGraph for Scene {
    fn find_active(&self, tag: TypeTag) -> Option<EntityHandle> {
        let state = self.state();
        state
            .containers
            .iter()
            .filter(|(id, _)| state.live(**id))
            .flat_map(|(_, c)| c.components.iter())
            .find(|c| c.enabled && c.handle.is_alive() && c.handle.tag() == tag)
            .map(|c| c.handle.clone())
    }

    fn has_dormant(&self, tag: TypeTag) -> bool {
        let state = self.state();
        state
            .containers
            .iter()
            .filter(|(_, c)| !c.asset)
            .any(|(id, c)| {
                c.components.iter().any(|comp| {
                    comp.handle.tag() == tag
                        && comp.handle.is_alive()
                        && (!comp.enabled || !state.active_in_hierarchy(*id))
                })
            })
    }

    fn spawn_root(&self, name: &str, entity: EntityHandle) {
        let mut state = self.state();
        let id = state.insert(name, None, false);
        if let Some(container) = state.containers.get_mut(&id) {
            container.components.push(Component {
                handle: entity,
                enabled: true,
            });
        }
    }

    fn is_root(&self, entity: &EntityHandle) -> bool {
        let state = self.state();
        state
            .locate(entity)
            .and_then(|id| state.containers.get(&id))
            .map_or(true, |c| c.parent.is_none())
    }

    fn detach_to_root(&self, entity: &EntityHandle) {
        let mut state = self.state();
        if let Some(id) = state.locate(entity) {
            if let Some(container) = state.containers.get_mut(&id) {
                container.parent = None;
            }
        }
    }

    fn keep_across_transitions(&self, entity: &EntityHandle) {
        let mut state = self.state();
        if let Some(id) = state.locate(entity) {
            if let Some(container) = state.containers.get_mut(&id) {
                container.persistent = true;
            }
        }
    }

    fn request_destroy(&self, entity: &EntityHandle) {
        if self.registry.guard().is_owner() {
            self.destroy_now(entity);
            return;
        }
        entity.mark_destroyed();
        self.state().pending_destroy.push(entity.clone());
    }
}

impl SingletonHost for Scene {
    fn registry(&self) -> &Registry {
        &self.registry
    }

    fn graph(&self) -> &dyn ObjectGraph {
        self
    }
}
