//! Owning-context guard and the hand-off back to it.
//!
//! One execution context owns the object graph. The guard records that context once
//! at bring-up and refuses every other context. Refused callers get `false`/`None`
//! plus one diagnostic, never a panic and never a wait.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::diagnostics::{dev_diagnostic, Diagnostics};
use crate::RegistryEvent;

/// Identity of an execution context (one per OS thread).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_CONTEXT: ContextId = ContextId(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed));
}

impl ContextId {
    const NONE: u64 = 0;

    /// The context the caller is running on.
    pub fn current() -> ContextId {
        CURRENT_CONTEXT.with(|id| *id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) const fn from_raw(raw: u64) -> ContextId {
        ContextId(raw)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Work handed to the owning context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Schedules work onto the owning context.
///
/// `post` must not block. It returns `false` when the job could not be enqueued.
/// Jobs posted from one context must run in submission order.
pub trait Dispatcher: Send + Sync {
    fn post(&self, job: Job) -> bool;
}

/// Sending half of an [`owner_queue`].
#[derive(Debug, Clone)]
pub struct QueueDispatcher {
    tx: Sender<Job>,
}

impl Dispatcher for QueueDispatcher {
    fn post(&self, job: Job) -> bool {
        self.tx.send(job).is_ok()
    }
}

/// Receiving half of an [`owner_queue`], drained by the owning context once per tick.
#[derive(Debug)]
pub struct OwnerPump {
    rx: Receiver<Job>,
}

impl OwnerPump {
    /// Runs every job queued so far and returns how many ran.
    ///
    /// Jobs enqueued by the jobs themselves run in the same call.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            match self.rx.try_recv() {
                Ok(job) => {
                    job();
                    ran += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return ran,
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

/// Creates an unbounded FIFO hand-off channel for the owning context.
pub fn owner_queue() -> (QueueDispatcher, OwnerPump) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (QueueDispatcher { tx }, OwnerPump { rx })
}

/// Records the owning context and validates callers against it.
pub struct OwnerGuard {
    owner: AtomicU64,
    dispatcher: ArcSwapOption<CapturedDispatcher>,
    diagnostics: Arc<Diagnostics>,
}

impl fmt::Debug for OwnerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerGuard")
            .field("owner", &self.owner())
            .field("has_dispatcher", &self.has_dispatcher())
            .finish()
    }
}

impl OwnerGuard {
    pub fn new(diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            owner: AtomicU64::new(ContextId::NONE),
            dispatcher: ArcSwapOption::empty(),
            diagnostics,
        }
    }

    /// Claims the calling context as owner. Idempotent.
    ///
    /// The dispatcher is stored only if the caller is (or just became) the owner and no
    /// dispatcher was captured before. Returns `true` when the caller owns the graph.
    pub fn capture_owner(&self, dispatcher: Option<Arc<dyn Dispatcher>>) -> bool {
        let me = ContextId::current().get();
        let owned = match self.owner.compare_exchange(
            ContextId::NONE,
            me,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(existing) => existing == me,
        };
        if !owned {
            return false;
        }

        if let Some(dispatcher) = dispatcher {
            if self.dispatcher.load().is_none() {
                self.dispatcher.store(Some(Arc::new(CapturedDispatcher(dispatcher))));
            }
        }
        true
    }

    pub fn owner(&self) -> Option<ContextId> {
        match self.owner.load(Ordering::Acquire) {
            ContextId::NONE => None,
            raw => Some(ContextId(raw)),
        }
    }

    pub fn is_owner(&self) -> bool {
        self.owner() == Some(ContextId::current())
    }

    pub fn has_dispatcher(&self) -> bool {
        self.dispatcher.load().is_some()
    }

    /// Returns `true` iff called from the owning context.
    ///
    /// Emits exactly one diagnostic per failed call.
    pub fn validate_owner(&self, caller: &str) -> bool {
        match self.owner() {
            Some(owner) if owner == ContextId::current() => true,
            Some(owner) => {
                self.report(caller, Some(owner), None);
                false
            }
            None => {
                self.report(caller, None, Some("owner context has not been captured"));
                false
            }
        }
    }

    /// Runs `action` on the owning context.
    ///
    /// Inline when already there, otherwise through the captured dispatcher. Returns
    /// `false` with one diagnostic if no dispatcher is available or it refused the job.
    pub fn post_to_owner(&self, action: impl FnOnce() + Send + 'static, caller: &str) -> bool {
        if self.is_owner() {
            action();
            return true;
        }

        let Some(dispatcher) = self.dispatcher.load_full() else {
            self.report(
                caller,
                self.owner(),
                Some("no dispatcher was captured for the owning context"),
            );
            return false;
        };

        if dispatcher.0.post(Box::new(action)) {
            return true;
        }
        self.report(caller, self.owner(), Some("the owner dispatcher is closed"));
        false
    }

    /// Forgets the captured owner and dispatcher so another context can claim them.
    #[doc(hidden)]
    pub fn release_owner(&self) {
        self.dispatcher.store(None);
        self.owner.store(ContextId::NONE, Ordering::Release);
    }

    fn report(&self, caller: &str, owner: Option<ContextId>, reason: Option<&'static str>) {
        dev_diagnostic!(
            self.diagnostics,
            RegistryEvent::OwnerViolation {
                caller: caller.to_string(),
                current: ContextId::current(),
                owner,
                reason,
            }
        );
    }
}

struct CapturedDispatcher(Arc<dyn Dispatcher>);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEV_CHECKS;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn guard_with_log() -> (OwnerGuard, Arc<Mutex<Vec<RegistryEvent>>>) {
        let diagnostics = Arc::new(Diagnostics::new("owner-test"));
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        diagnostics.set_trace_callback(move |e| events_clone.lock().unwrap().push(e.clone()));
        (OwnerGuard::new(diagnostics), events)
    }

    fn expected(count: usize) -> usize {
        if DEV_CHECKS {
            count
        } else {
            0
        }
    }

    #[test]
    fn test_context_ids_differ_per_thread() {
        let here = ContextId::current();
        let there = std::thread::spawn(ContextId::current).join().unwrap();
        assert_ne!(here, there);
        assert_eq!(here, ContextId::current());
    }

    #[test]
    fn test_capture_is_idempotent() {
        let (guard, _) = guard_with_log();
        assert!(guard.capture_owner(None));
        assert!(guard.capture_owner(None));
        assert_eq!(guard.owner(), Some(ContextId::current()));
        assert!(guard.is_owner());
    }

    #[test]
    fn test_other_context_cannot_capture() {
        let (guard, _) = guard_with_log();
        guard.capture_owner(None);

        std::thread::scope(|s| {
            let captured = s
                .spawn(|| {
                    let (dispatcher, _pump) = owner_queue();
                    guard.capture_owner(Some(Arc::new(dispatcher)))
                })
                .join()
                .unwrap();
            assert!(!captured);
        });
        assert!(guard.is_owner());
        assert!(!guard.has_dispatcher());
    }

    #[test]
    fn test_validate_before_capture_fails() {
        let (guard, events) = guard_with_log();
        assert!(!guard.validate_owner("Inspect"));

        let captured = events.lock().unwrap();
        assert_eq!(captured.len(), expected(1));
        if DEV_CHECKS {
            assert!(captured[0]
                .to_string()
                .contains("owner context has not been captured"));
        }
    }

    #[test]
    fn test_validate_from_background_logs_once_per_call() {
        let (guard, events) = guard_with_log();
        guard.capture_owner(None);
        assert!(guard.validate_owner("Inspect"));

        std::thread::scope(|s| {
            s.spawn(|| {
                assert!(!guard.validate_owner("Inspect"));
                assert!(!guard.validate_owner("Inspect"));
            });
        });

        assert_eq!(events.lock().unwrap().len(), expected(2));
    }

    #[test]
    fn test_post_on_owner_runs_inline() {
        let (guard, _) = guard_with_log();
        guard.capture_owner(None);

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        assert!(guard.post_to_owner(
            move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
            },
            "Inline"
        ));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_post_from_background_is_queued_in_order() {
        let (guard, _) = guard_with_log();
        let (dispatcher, pump) = owner_queue();
        guard.capture_owner(Some(Arc::new(dispatcher)));

        let order = Arc::new(Mutex::new(Vec::new()));
        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 1..=3 {
                    let order = order.clone();
                    assert!(guard.post_to_owner(move || order.lock().unwrap().push(i), "Worker"));
                }
            });
        });

        assert!(order.lock().unwrap().is_empty());
        assert_eq!(pump.pending(), 3);
        assert_eq!(pump.run_pending(), 3);
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_post_without_dispatcher_fails_soft() {
        let (guard, events) = guard_with_log();
        guard.capture_owner(None);

        std::thread::scope(|s| {
            let posted = s.spawn(|| guard.post_to_owner(|| {}, "Worker")).join().unwrap();
            assert!(!posted);
        });
        assert_eq!(events.lock().unwrap().len(), expected(1));
    }

    #[test]
    fn test_post_to_closed_queue_fails_soft() {
        let (guard, events) = guard_with_log();
        let (dispatcher, pump) = owner_queue();
        guard.capture_owner(Some(Arc::new(dispatcher)));
        drop(pump);

        std::thread::scope(|s| {
            let posted = s.spawn(|| guard.post_to_owner(|| {}, "Worker")).join().unwrap();
            assert!(!posted);
        });
        assert_eq!(events.lock().unwrap().len(), expected(1));
    }

    #[test]
    fn test_release_owner_allows_recapture() {
        let (guard, _) = guard_with_log();
        guard.capture_owner(None);
        guard.release_owner();
        assert_eq!(guard.owner(), None);

        std::thread::scope(|s| {
            s.spawn(|| assert!(guard.capture_owner(None)));
        });
        assert!(!guard.is_owner());
    }
}
