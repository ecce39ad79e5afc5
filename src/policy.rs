use std::fmt;

/// Declarative configuration of a singleton slot.
///
/// `persist_across_transitions` moves the entity to the graph root and keeps it alive
/// through graph transitions. `auto_create_if_missing` lets
/// [`Registry::instance`](crate::Registry::instance) construct a container and entity
/// when none is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Policy {
    persist_across_transitions: bool,
    auto_create_if_missing: bool,
}

impl Policy {
    /// Survives transitions and is created on first access.
    pub const PERSISTENT: Policy = Policy::new(true, true);

    /// Lives and dies with its container; must be placed.
    pub const SCOPED_TO_CONTAINER: Policy = Policy::new(false, false);

    pub const fn new(persist_across_transitions: bool, auto_create_if_missing: bool) -> Self {
        Self {
            persist_across_transitions,
            auto_create_if_missing,
        }
    }

    pub const fn persist_across_transitions(self) -> bool {
        self.persist_across_transitions
    }

    pub const fn auto_create_if_missing(self) -> bool {
        self.auto_create_if_missing
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Policy::PERSISTENT => write!(f, "persistent"),
            Policy::SCOPED_TO_CONTAINER => write!(f, "scoped-to-container"),
            Policy {
                persist_across_transitions,
                auto_create_if_missing,
            } => write!(
                f,
                "policy {{ persist: {persist_across_transitions}, auto_create: {auto_create_if_missing} }}"
            ),
        }
    }
}
