//! Tooling-mode boundary adapter.
//!
//! Hosts that keep the process alive between play sessions (an editor, a hot-reload
//! runner) forward their mode transitions here so a quitting flag raised at the end
//! of one session does not poison the next.

use std::fmt;

use crate::Registry;

/// Mode boundaries reported by the tooling host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeTransition {
    /// Play mode is about to start; raised before any entity activates.
    EnteringPlay,
    EnteredPlay,
    ExitingPlay,
    EnteredEdit,
    ExitingEdit,
}

impl ModeTransition {
    /// Whether this boundary clears the quitting flag.
    pub const fn clears_quitting(self) -> bool {
        matches!(
            self,
            ModeTransition::EnteringPlay | ModeTransition::EnteredPlay | ModeTransition::ExitingPlay
        )
    }
}

impl fmt::Display for ModeTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModeTransition::EnteringPlay => "entering-play",
            ModeTransition::EnteredPlay => "entered-play",
            ModeTransition::ExitingPlay => "exiting-play",
            ModeTransition::EnteredEdit => "entered-edit",
            ModeTransition::ExitingEdit => "exiting-edit",
        };
        f.write_str(name)
    }
}

/// Applies a mode boundary to `registry`. Returns `true` if the quitting flag was cleared.
pub fn on_mode_transition(registry: &Registry, transition: ModeTransition) -> bool {
    if !transition.clears_quitting() {
        return false;
    }
    tracing::debug!(
        target: "policy_singleton",
        registry = registry.label(),
        %transition,
        "clearing quitting flag"
    );
    registry.clear_quitting_flag();
    true
}
