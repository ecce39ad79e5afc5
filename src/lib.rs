//! # Policy Singleton
//!
//! A per-type singleton registry for long-lived entities living in a host object graph.
//!
//! Each entity type declares a [`Policy`]: whether its instance survives graph
//! transitions and whether a missing instance may be created on demand. The registry
//! caches one instance per type, invalidates that cache whenever a new play session
//! starts, and confines every decision to a single owning context.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use policy_singleton::{Policy, Registry, Scene, Singleton, SingletonHost};
//!
//! #[derive(Default)]
//! struct Audio;
//!
//! impl Singleton for Audio {
//!     type Slot = Self;
//!     const POLICY: Policy = Policy::PERSISTENT;
//! }
//!
//! // The scene is the host: it owns the graph and captures the calling thread as owner.
//! let scene = Scene::new(Arc::new(Registry::new()));
//!
//! let audio = scene.instance::<Audio>().unwrap().unwrap();
//! scene.transition();
//! assert!(Arc::ptr_eq(&audio, &scene.instance::<Audio>().unwrap().unwrap()));
//! ```
//!
//! ## Main Types
//!
//! - [`Registry`] - slot cache and lifecycle decisions
//! - [`Singleton`] - implemented by entity types
//! - [`ObjectGraph`] - what the registry needs from a host graph
//! - [`SingletonHost`] - access trait for host adapters
//! - [`Scene`] - in-memory reference host
//! - [`define_registry!`] - isolated static registries
//! - [`global`] - process-wide default registry

use std::sync::{Arc, LazyLock};

mod diagnostics;
mod entity;
mod graph;
mod macros;
mod owner;
mod policy;
mod registry;
mod registry_error;
mod registry_event;
mod registry_trait;
mod scene;
mod session;
mod singleton;
mod slots;
pub mod tooling;

pub use diagnostics::{Diagnostics, TraceCallback, DEV_CHECKS};
pub use entity::{EntityHandle, EntityId, TypeTag};
pub use graph::ObjectGraph;
pub use owner::{owner_queue, ContextId, Dispatcher, Job, OwnerGuard, OwnerPump, QueueDispatcher};
pub use policy::Policy;
pub use registry::{Registry, RegistryBuilder};
pub use registry_error::SingletonError;
pub use registry_event::{RegistryEvent, Severity};
pub use registry_trait::SingletonHost;
pub use scene::{ContainerId, Scene};
pub use session::{SessionClock, SessionId};
pub use singleton::{BaseInit, Singleton};
pub use slots::SlotSnapshot;

static GLOBAL: LazyLock<Arc<Registry>> =
    LazyLock::new(|| Arc::new(Registry::builder().label("global").build()));

/// The process-wide default registry.
pub fn global() -> &'static Arc<Registry> {
    &GLOBAL
}
