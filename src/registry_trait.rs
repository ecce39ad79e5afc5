//! Host-facing access trait.
//!
//! The `SingletonHost` trait gives a host adapter the whole public surface of the
//! registry with default implementations, requiring only two accessors: the
//! [`Registry`] it talks to and the [`ObjectGraph`] it exposes.

use std::sync::Arc;

use crate::{ObjectGraph, Policy, Registry, RegistryEvent, Singleton, SingletonError};

/// A host adapter bound to one registry and one object graph.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use policy_singleton::{ObjectGraph, Registry, Scene, SingletonHost};
///
/// struct Game {
///     scene: Scene,
/// }
///
/// impl SingletonHost for Game {
///     fn registry(&self) -> &Registry {
///         self.scene.registry()
///     }
///
///     fn graph(&self) -> &dyn ObjectGraph {
///         &self.scene
///     }
/// }
///
/// let game = Game { scene: Scene::new(Arc::new(Registry::new())) };
/// assert!(!game.is_quitting());
/// ```
pub trait SingletonHost {
    fn registry(&self) -> &Registry;

    fn graph(&self) -> &dyn ObjectGraph;

    // ---------------------------------------------------------------------------------
    // Access
    // ---------------------------------------------------------------------------------

    /// Returns the instance of `T`, creating one if `T::POLICY` allows it.
    ///
    /// # Errors
    ///
    /// Development builds only:
    /// - [`SingletonError::MissingRequiredPlacement`] when nothing is placed and the
    ///   policy forbids auto-create
    /// - [`SingletonError::DormantInstanceBlocksCreate`] when an inactive instance
    ///   exists and the policy would auto-create
    fn instance<T: Singleton>(&self) -> Result<Option<Arc<T>>, SingletonError> {
        self.registry().instance::<T, dyn ObjectGraph>(self.graph())
    }

    /// [`SingletonHost::instance`] with an explicit policy.
    fn instance_with<T: Singleton>(
        &self,
        policy: Policy,
    ) -> Result<Option<Arc<T>>, SingletonError> {
        self.registry().instance_with::<T, dyn ObjectGraph>(self.graph(), policy)
    }

    /// Returns the instance of `T` if one exists. Never creates one.
    fn try_get_instance<T: Singleton>(&self) -> Option<Arc<T>> {
        self.registry().try_get_instance::<T, dyn ObjectGraph>(self.graph())
    }

    fn try_get_instance_with<T: Singleton>(&self, policy: Policy) -> Option<Arc<T>> {
        self.registry().try_get_instance_with::<T, dyn ObjectGraph>(self.graph(), policy)
    }

    /// Whether the slot of `T` holds a live entity, without revalidating it.
    fn is_bound<T: Singleton>(&self) -> bool {
        self.registry().is_bound::<T>()
    }

    // ---------------------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------------------

    fn begin_play_session(&self) -> bool {
        self.registry().begin_play_session()
    }

    fn notify_quitting(&self) {
        self.registry().notify_quitting();
    }

    fn clear_quitting_flag(&self) {
        self.registry().clear_quitting_flag();
    }

    fn is_quitting(&self) -> bool {
        self.registry().is_quitting()
    }

    /// Runs `action` on the owning context, inline if already there.
    fn post_to_owner(&self, action: impl FnOnce() + Send + 'static, caller: &str) -> bool {
        self.registry().post_to_owner(action, caller)
    }

    // ---------------------------------------------------------------------------------
    // Tracing
    // ---------------------------------------------------------------------------------

    fn set_trace_callback(&self, callback: impl Fn(&RegistryEvent) + Send + Sync + 'static) {
        self.registry().set_trace_callback(callback);
    }

    fn clear_trace_callback(&self) {
        self.registry().clear_trace_callback();
    }
}
