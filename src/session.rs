//! Play-session clock.
//!
//! A play session is the span between two soft resets of the host. Static state may
//! survive the boundary, so every cached slot remembers the [`SessionId`] it was
//! validated against and drops its reference when the clock has moved on.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Opaque identifier of a play session.
///
/// Only equality with a previously observed value is meaningful. The counter wraps,
/// skipping [`SessionId::UNINITIALIZED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Marker for "never initialized". No running session ever carries this id.
    pub const UNINITIALIZED: SessionId = SessionId(0);

    pub const fn get(self) -> u64 {
        self.0
    }

    fn next(self) -> SessionId {
        match self.0.wrapping_add(1) {
            0 => SessionId(1),
            n => SessionId(n),
        }
    }

    pub(crate) const fn from_raw(raw: u64) -> SessionId {
        SessionId(raw)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == SessionId::UNINITIALIZED {
            write!(f, "session(uninitialized)")
        } else {
            write!(f, "session({})", self.0)
        }
    }
}

const NEVER_ADVANCED: u64 = u64::MAX;

/// Process-wide session counter plus the quitting flag.
///
/// Writes only happen on the owning context. Atomics give background contexts a
/// consistent view of the quitting flag without taking a lock.
#[derive(Debug)]
pub struct SessionClock {
    session: AtomicU64,
    tick: AtomicU64,
    last_advanced_tick: AtomicU64,
    quitting: AtomicBool,
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionClock {
    pub const fn new() -> Self {
        Self {
            session: AtomicU64::new(0),
            tick: AtomicU64::new(0),
            last_advanced_tick: AtomicU64::new(NEVER_ADVANCED),
            quitting: AtomicBool::new(false),
        }
    }

    pub fn current_session_id(&self) -> SessionId {
        SessionId::from_raw(self.session.load(Ordering::Acquire))
    }

    /// Current scheduling tick as reported by the host through [`SessionClock::on_tick`].
    pub fn current_tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    /// Called by the host once per scheduling tick.
    pub fn on_tick(&self) {
        let next = self.tick.load(Ordering::Acquire).wrapping_add(1);
        self.tick.store(next, Ordering::Release);
    }

    /// Advances the session unless it already advanced during the current tick.
    ///
    /// Returns `true` when a new session was started.
    pub fn advance_if_new_tick(&self) -> bool {
        let tick = self.current_tick();
        if self.last_advanced_tick.load(Ordering::Acquire) == tick {
            return false;
        }
        self.last_advanced_tick.store(tick, Ordering::Release);
        self.bump();
        true
    }

    /// Advances the session unconditionally, ignoring the per-tick guard.
    #[doc(hidden)]
    pub fn force_advance(&self) -> SessionId {
        self.bump()
    }

    fn bump(&self) -> SessionId {
        let next = self.current_session_id().next();
        self.session.store(next.get(), Ordering::Release);
        next
    }

    pub fn is_quitting(&self) -> bool {
        self.quitting.load(Ordering::Acquire)
    }

    pub fn notify_quitting(&self) {
        self.quitting.store(true, Ordering::Release);
    }

    /// Clears the quitting flag when re-entering a live session without a process restart.
    ///
    /// Tooling boundary only; production code never un-quits.
    pub fn clear_quitting_flag(&self) {
        self.quitting.store(false, Ordering::Release);
    }
}
