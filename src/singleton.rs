use crate::Policy;

/// A long-lived entity type with at most one live instance per registry.
///
/// `Slot` names the slot the type binds into and must be `Self`. A type that declares
/// another type's slot is rejected at activation and cannot be looked up, so a slot
/// is only ever held by an entity of exactly its own type.
///
/// `Default` is the constructor used when the policy auto-creates an instance.
///
/// # Examples
///
/// ```rust
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use policy_singleton::{BaseInit, Policy, Singleton};
///
/// #[derive(Default)]
/// struct Scoreboard {
///     resets: AtomicU32,
/// }
///
/// impl Singleton for Scoreboard {
///     type Slot = Self;
///     const POLICY: Policy = Policy::PERSISTENT;
///
///     fn on_first_bind(&self, base: &mut BaseInit) {
///         base.complete();
///     }
///
///     fn on_play_session_start(&self) {
///         self.resets.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait Singleton: Default + Send + Sync + 'static {
    type Slot: Singleton;

    const POLICY: Policy;

    /// Runs once per instance lifetime, before its first session start.
    ///
    /// Overrides must call [`BaseInit::complete`]; development builds report the ones
    /// that don't.
    fn on_first_bind(&self, base: &mut BaseInit) {
        base.complete();
    }

    /// Runs once per (instance, session), including the first session.
    fn on_play_session_start(&self) {}

    /// Runs once when this instance loses the slot it held.
    fn on_unbind(&self) {}
}

/// Token handed to [`Singleton::on_first_bind`].
#[derive(Debug)]
pub struct BaseInit {
    completed: bool,
}

impl BaseInit {
    pub(crate) fn pending() -> Self {
        Self { completed: false }
    }

    /// Runs the inherited first-bind behavior.
    pub fn complete(&mut self) {
        self.completed = true;
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Plain;

    impl Singleton for Plain {
        type Slot = Self;
        const POLICY: Policy = Policy::SCOPED_TO_CONTAINER;
    }

    #[derive(Default)]
    struct Forgetful;

    impl Singleton for Forgetful {
        type Slot = Self;
        const POLICY: Policy = Policy::SCOPED_TO_CONTAINER;

        fn on_first_bind(&self, _base: &mut BaseInit) {}
    }

    #[test]
    fn test_default_first_bind_completes_base() {
        let mut base = BaseInit::pending();
        Plain.on_first_bind(&mut base);
        assert!(base.is_completed());
    }

    #[test]
    fn test_override_can_skip_base() {
        let mut base = BaseInit::pending();
        Forgetful.on_first_bind(&mut base);
        assert!(!base.is_completed());
    }
}
