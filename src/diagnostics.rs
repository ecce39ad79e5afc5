//! Event sink shared by the owner guard and the registry.
//!
//! Every event goes to `tracing` and to the optional user trace callback. Development
//! diagnostics are emitted through [`dev_diagnostic!`], which compiles to nothing when
//! [`DEV_CHECKS`] is off.

use std::sync::{Arc, Mutex};

use crate::registry_event::{RegistryEvent, Severity};
use crate::{EntityId, SessionId};

/// Development checks are on in debug builds and whenever the `dev-checks` feature is set.
pub const DEV_CHECKS: bool = cfg!(any(debug_assertions, feature = "dev-checks"));

/// Type alias for the user-supplied tracing callback.
///
/// The callback receives every `RegistryEvent` a registry emits. It must be thread-safe
/// because owner violations are reported from the offending context.
pub type TraceCallback = dyn Fn(&RegistryEvent) + Send + Sync + 'static;

/// Emits a diagnostic only when development checks are compiled in.
///
/// The event expression is not evaluated otherwise.
macro_rules! dev_diagnostic {
    ($diagnostics:expr, $event:expr) => {
        if $crate::DEV_CHECKS {
            $diagnostics.emit(&$event);
        }
    };
}

pub(crate) use dev_diagnostic;

pub struct Diagnostics {
    label: String,
    trace: Mutex<Option<Arc<TraceCallback>>>,
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("label", &self.label)
            .field("has_trace_callback", &self.has_trace_callback())
            .finish()
    }
}

impl Diagnostics {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            trace: Mutex::new(None),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Sets a tracing callback that will be invoked for every event.
    pub fn set_trace_callback(&self, callback: impl Fn(&RegistryEvent) + Send + Sync + 'static) {
        let mut guard = self.trace.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(Arc::new(callback));
    }

    pub fn clear_trace_callback(&self) {
        let mut guard = self.trace.lock().unwrap_or_else(|p| p.into_inner());
        *guard = None;
    }

    pub fn has_trace_callback(&self) -> bool {
        self.trace
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    pub fn emit(&self, event: &RegistryEvent) {
        let registry = self.label.as_str();
        let type_name = event.type_name();
        let entity = event.entity().map(EntityId::get);
        let session = event.session().map(SessionId::get);
        match event.severity() {
            Severity::Error => tracing::error!(
                target: "policy_singleton",
                registry,
                type_name,
                entity,
                session,
                "{event}"
            ),
            Severity::Warning => tracing::warn!(
                target: "policy_singleton",
                registry,
                type_name,
                entity,
                session,
                "{event}"
            ),
            Severity::Trace => tracing::debug!(
                target: "policy_singleton",
                registry,
                type_name,
                entity,
                session,
                "{event}"
            ),
        }

        // Clone out of the lock so the callback may re-enter the registry.
        let callback = self
            .trace
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> RegistryEvent {
        RegistryEvent::SessionStarted {
            session: SessionId::from_raw(1),
        }
    }

    #[test]
    fn test_trace_callback_invoked() {
        let diagnostics = Diagnostics::new("test");
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();

        diagnostics.set_trace_callback(move |e| {
            events_clone.lock().unwrap().push(e.to_string());
        });
        diagnostics.emit(&started());

        let captured = events.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0], "Starting session(1)");
    }

    #[test]
    fn test_clear_trace_callback_stops_events() {
        let diagnostics = Diagnostics::new("test");
        let events = Arc::new(Mutex::new(0usize));
        let events_clone = events.clone();

        diagnostics.set_trace_callback(move |_| *events_clone.lock().unwrap() += 1);
        diagnostics.emit(&started());
        diagnostics.clear_trace_callback();
        diagnostics.emit(&started());

        assert_eq!(*events.lock().unwrap(), 1);
        assert!(!diagnostics.has_trace_callback());
    }

    #[test]
    fn test_callback_may_reenter() {
        let diagnostics = Arc::new(Diagnostics::new("reentrant"));
        let inner = diagnostics.clone();

        diagnostics.set_trace_callback(move |_| {
            // Would deadlock if the trace lock were held during the call.
            assert!(inner.has_trace_callback());
        });
        diagnostics.emit(&started());
    }

    #[test]
    fn test_dev_diagnostic_matches_build() {
        let diagnostics = Diagnostics::new("gate");
        let count = Arc::new(Mutex::new(0usize));
        let count_clone = count.clone();
        diagnostics.set_trace_callback(move |_| *count_clone.lock().unwrap() += 1);

        dev_diagnostic!(
            diagnostics,
            RegistryEvent::Reparented { type_name: "Audio" }
        );

        let expected = if DEV_CHECKS { 1 } else { 0 };
        assert_eq!(*count.lock().unwrap(), expected);
    }
}
