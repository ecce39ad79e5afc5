use std::fmt;

use crate::{ContextId, EntityId, SessionId};

/// How loudly an event is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Warning,
    Error,
}

/// Events emitted by a registry.
///
/// These events are passed to the tracing callback set via `set_trace_callback` and
/// mirrored to `tracing`. Warning and error events are development diagnostics and
/// are only produced when [`DEV_CHECKS`](crate::DEV_CHECKS) is on.
///
/// # Examples
///
/// ```rust
/// use policy_singleton::RegistryEvent;
///
/// let event = RegistryEvent::Reparented { type_name: "AudioHub" };
/// assert_eq!(event.to_string(), "reparented { type_name: AudioHub }");
/// assert!(event.is_diagnostic());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// An entry point was called from a context that does not own the object graph.
    OwnerViolation {
        caller: String,
        current: ContextId,
        owner: Option<ContextId>,
        reason: Option<&'static str>,
    },

    /// A type claimed a slot it does not own. `entity` is `None` when the claim came
    /// from a lookup rather than an activating entity.
    TypeIdentityMismatch {
        slot: &'static str,
        actual: &'static str,
        entity: Option<EntityId>,
    },

    /// A second entity of the slot type activated while the slot was held.
    DuplicateBinding {
        type_name: &'static str,
        holder: EntityId,
        rejected: EntityId,
    },

    /// A persistent entity was moved to the graph root.
    Reparented { type_name: &'static str },

    /// A first-bind override returned without running the base initialization.
    BaseInitializationSkipped { type_name: &'static str },

    /// A slot was bound to an entity.
    Bound {
        type_name: &'static str,
        entity: EntityId,
        session: SessionId,
    },

    /// A slot released the entity it held.
    Unbound {
        type_name: &'static str,
        entity: EntityId,
    },

    /// No instance existed and one was constructed.
    AutoCreated {
        type_name: &'static str,
        entity: EntityId,
    },

    /// A slot dropped a reference validated against an older session.
    CacheInvalidated {
        type_name: &'static str,
        session: SessionId,
    },

    /// A new play session began.
    SessionStarted { session: SessionId },

    /// An entity activated after shutdown began and was sent to destruction.
    RejectedWhileQuitting {
        type_name: &'static str,
        entity: EntityId,
    },
}

impl RegistryEvent {
    pub fn severity(&self) -> Severity {
        match self {
            RegistryEvent::OwnerViolation { .. }
            | RegistryEvent::TypeIdentityMismatch { .. }
            | RegistryEvent::DuplicateBinding { .. }
            | RegistryEvent::BaseInitializationSkipped { .. } => Severity::Error,
            RegistryEvent::Reparented { .. } => Severity::Warning,
            _ => Severity::Trace,
        }
    }

    /// Type the event is about. For a mismatch this is the claimed slot.
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            RegistryEvent::TypeIdentityMismatch { slot, .. } => Some(*slot),
            RegistryEvent::DuplicateBinding { type_name, .. }
            | RegistryEvent::Reparented { type_name }
            | RegistryEvent::BaseInitializationSkipped { type_name }
            | RegistryEvent::Bound { type_name, .. }
            | RegistryEvent::Unbound { type_name, .. }
            | RegistryEvent::AutoCreated { type_name, .. }
            | RegistryEvent::CacheInvalidated { type_name, .. }
            | RegistryEvent::RejectedWhileQuitting { type_name, .. } => Some(*type_name),
            RegistryEvent::OwnerViolation { .. } | RegistryEvent::SessionStarted { .. } => None,
        }
    }

    /// Entity the event is about. For a duplicate this is the rejected one.
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            RegistryEvent::TypeIdentityMismatch { entity, .. } => *entity,
            RegistryEvent::DuplicateBinding { rejected, .. } => Some(*rejected),
            RegistryEvent::Bound { entity, .. }
            | RegistryEvent::Unbound { entity, .. }
            | RegistryEvent::AutoCreated { entity, .. }
            | RegistryEvent::RejectedWhileQuitting { entity, .. } => Some(*entity),
            _ => None,
        }
    }

    pub fn session(&self) -> Option<SessionId> {
        match self {
            RegistryEvent::Bound { session, .. }
            | RegistryEvent::CacheInvalidated { session, .. }
            | RegistryEvent::SessionStarted { session } => Some(*session),
            _ => None,
        }
    }

    /// True for events that report misuse rather than normal lifecycle progress.
    pub fn is_diagnostic(&self) -> bool {
        self.severity() > Severity::Trace
    }
}

impl fmt::Display for RegistryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryEvent::OwnerViolation {
                caller,
                current,
                owner,
                reason,
            } => {
                write!(f, "{caller} must be called from the owning context")?;
                if let Some(reason) = reason {
                    write!(f, " ({reason})")?;
                }
                match owner {
                    Some(owner) => write!(f, "; current: {current}, owner: {owner}"),
                    None => write!(f, "; current: {current}, owner: none"),
                }
            }
            RegistryEvent::TypeIdentityMismatch {
                slot,
                actual,
                entity,
            } => {
                write!(f, "type mismatch {{ slot: {slot}, actual: {actual}")?;
                match entity {
                    Some(entity) => write!(f, ", entity: {entity} }}"),
                    None => write!(f, " }}"),
                }
            }
            RegistryEvent::DuplicateBinding {
                type_name,
                holder,
                rejected,
            } => {
                write!(
                    f,
                    "duplicate {{ type_name: {type_name}, holder: {holder}, rejected: {rejected} }}"
                )
            }
            RegistryEvent::Reparented { type_name } => {
                write!(f, "reparented {{ type_name: {type_name} }}")
            }
            RegistryEvent::BaseInitializationSkipped { type_name } => {
                write!(f, "base init skipped {{ type_name: {type_name} }}")
            }
            RegistryEvent::Bound {
                type_name,
                entity,
                session,
            } => {
                write!(
                    f,
                    "bound {{ type_name: {type_name}, entity: {entity}, {session} }}"
                )
            }
            RegistryEvent::Unbound { type_name, entity } => {
                write!(f, "unbound {{ type_name: {type_name}, entity: {entity} }}")
            }
            RegistryEvent::AutoCreated { type_name, entity } => {
                write!(f, "auto-created {{ type_name: {type_name}, entity: {entity} }}")
            }
            RegistryEvent::CacheInvalidated { type_name, session } => {
                write!(f, "invalidated {{ type_name: {type_name}, {session} }}")
            }
            RegistryEvent::SessionStarted { session } => write!(f, "Starting {session}"),
            RegistryEvent::RejectedWhileQuitting { type_name, entity } => {
                write!(
                    f,
                    "rejected while quitting {{ type_name: {type_name}, entity: {entity} }}"
                )
            }
        }
    }
}
