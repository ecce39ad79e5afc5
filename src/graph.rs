use crate::{EntityHandle, TypeTag};

/// What the registry needs from the host's object graph.
///
/// The registry only calls these from the owning context, with one exception:
/// [`ObjectGraph::request_destroy`] may be called from a refused context and must not
/// assume it runs on the owner.
pub trait ObjectGraph {
    /// First live, active, enabled entity whose runtime type is exactly `tag`.
    ///
    /// Inactive containers, disabled entities and assets outside the graph are skipped.
    fn find_active(&self, tag: TypeTag) -> Option<EntityHandle>;

    /// Whether a live entity of exactly `tag` exists but is inactive or disabled.
    fn has_dormant(&self, tag: TypeTag) -> bool;

    /// Adds a new root container named `name` holding `entity`.
    ///
    /// The registry drives the new entity's activation itself, so hosts may or may not
    /// deliver activation callbacks for it.
    fn spawn_root(&self, name: &str, entity: EntityHandle);

    fn is_root(&self, entity: &EntityHandle) -> bool;

    /// Moves the entity's container to the root of the graph.
    fn detach_to_root(&self, entity: &EntityHandle);

    /// Exempts the entity's container from graph transitions.
    fn keep_across_transitions(&self, entity: &EntityHandle);

    /// Destroys the entity's container, now or at the host's next opportunity.
    fn request_destroy(&self, entity: &EntityHandle);
}
