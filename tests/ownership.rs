//! Integration tests for owner-context confinement.
//!
//! Every registry decision runs on the context that brought the registry up. Other
//! threads are refused with a diagnostic and can only hand work over through
//! `post_to_owner`.

use policy_singleton::{
    owner_queue, ContextId, ObjectGraph, Policy, Registry, RegistryEvent, Scene, Singleton,
    SingletonHost, TypeTag, DEV_CHECKS,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct AudioHub {
    session_starts: AtomicUsize,
}

impl Singleton for AudioHub {
    type Slot = Self;
    const POLICY: Policy = Policy::PERSISTENT;

    fn on_play_session_start(&self) {
        self.session_starts.fetch_add(1, Ordering::SeqCst);
    }
}

type Events = Arc<Mutex<Vec<RegistryEvent>>>;

fn scene() -> (Scene, Events) {
    let registry = Arc::new(Registry::builder().label("ownership").build());
    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = events.clone();
    registry.set_trace_callback(move |event| events_clone.lock().unwrap().push(event.clone()));
    (Scene::new(registry), events)
}

fn violations(events: &Events) -> Vec<RegistryEvent> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, RegistryEvent::OwnerViolation { .. }))
        .cloned()
        .collect()
}

fn dev_only(n: usize) -> usize {
    if DEV_CHECKS {
        n
    } else {
        0
    }
}

#[test]
fn test_background_lookup_is_refused() {
    let (scene, events) = scene();
    let owner = ContextId::current();

    let worker = std::thread::scope(|s| {
        s.spawn(|| {
            assert!(scene.instance::<AudioHub>().unwrap().is_none());
            ContextId::current()
        })
        .join()
        .unwrap()
    });

    assert_ne!(owner, worker);
    assert_eq!(scene.container_count(), 0);
    assert!(scene.registry().slots().is_empty());

    let seen = violations(&events);
    assert_eq!(seen.len(), dev_only(1));
    if DEV_CHECKS {
        assert_eq!(
            seen[0],
            RegistryEvent::OwnerViolation {
                caller: "Instance".to_string(),
                current: worker,
                owner: Some(owner),
                reason: None,
            }
        );
    }
}

#[test]
fn test_background_sees_nothing_even_when_bound() {
    let (scene, events) = scene();
    scene.instance::<AudioHub>().unwrap();

    std::thread::scope(|s| {
        s.spawn(|| {
            assert!(scene.try_get_instance::<AudioHub>().is_none());
            assert!(!scene.begin_play_session());
        });
    });

    assert!(scene.is_bound::<AudioHub>());
    assert_eq!(violations(&events).len(), dev_only(2));
}

#[test]
fn test_background_activation_is_destroyed_on_next_tick() {
    let (scene, _) = scene();
    let stage = scene.spawn("Stage");
    let hub = scene.place::<AudioHub>(stage);

    std::thread::scope(|s| {
        s.spawn(|| hub.notify_activated(scene.registry(), &scene));
    });

    assert!(!hub.is_alive());
    assert!(!scene.is_bound::<AudioHub>());
    assert_eq!(scene.name_of(stage).as_deref(), Some("Stage"));

    scene.tick();
    assert_eq!(scene.name_of(stage), None);
}

#[test]
fn test_background_deactivation_keeps_binding() {
    let (scene, _) = scene();
    scene.instance::<AudioHub>().unwrap();
    let holder = scene.find_active(TypeTag::of::<AudioHub>()).unwrap();

    std::thread::scope(|s| {
        s.spawn(|| holder.notify_deactivated(scene.registry()));
    });

    assert!(scene.is_bound::<AudioHub>());
}

#[test]
fn test_post_to_owner_runs_on_next_tick() {
    let (scene, events) = scene();
    let scene = Arc::new(scene);
    let ran_on = Arc::new(Mutex::new(None));

    let posted = std::thread::scope(|s| {
        s.spawn(|| {
            let scene_clone = scene.clone();
            let ran_on = ran_on.clone();
            scene.post_to_owner(
                move || {
                    *ran_on.lock().unwrap() = Some(ContextId::current());
                    scene_clone.instance::<AudioHub>().unwrap();
                },
                "LoadAudio",
            )
        })
        .join()
        .unwrap()
    });

    assert!(posted);
    assert_eq!(scene.pending_jobs(), 1);
    assert!(!scene.is_bound::<AudioHub>());

    scene.tick();
    assert_eq!(scene.pending_jobs(), 0);
    assert_eq!(*ran_on.lock().unwrap(), Some(ContextId::current()));
    assert!(scene.is_bound::<AudioHub>());
    assert!(violations(&events).is_empty());
}

#[test]
fn test_post_to_owner_keeps_order() {
    let (scene, _) = scene();
    let order = Arc::new(Mutex::new(Vec::new()));

    std::thread::scope(|s| {
        s.spawn(|| {
            for i in 0..5 {
                let order = order.clone();
                assert!(scene.post_to_owner(move || order.lock().unwrap().push(i), "Queue"));
            }
        });
    });

    scene.tick();
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_post_without_dispatcher_fails() {
    let registry = Registry::new();
    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = events.clone();
    registry.set_trace_callback(move |event| events_clone.lock().unwrap().push(event.clone()));
    assert!(registry.bring_up(None));

    let posted = std::thread::scope(|s| {
        s.spawn(|| registry.post_to_owner(|| {}, "Save"))
            .join()
            .unwrap()
    });

    assert!(!posted);
    assert_eq!(violations(&events).len(), dev_only(1));
    if DEV_CHECKS {
        assert!(violations(&events)[0]
            .to_string()
            .contains("no dispatcher was captured"));
    }
}

#[test]
fn test_closed_dispatcher_fails() {
    let registry = Registry::new();
    let (dispatcher, pump) = owner_queue();
    assert!(registry.bring_up(Some(Arc::new(dispatcher))));
    drop(pump);

    let posted = std::thread::scope(|s| {
        s.spawn(|| registry.post_to_owner(|| {}, "Save"))
            .join()
            .unwrap()
    });
    assert!(!posted);
}

#[test]
fn test_released_owner_can_move() {
    let registry = Arc::new(Registry::new());
    assert!(registry.bring_up(None));

    let moved = std::thread::scope(|s| {
        s.spawn(|| {
            if registry.bring_up(None) {
                return false;
            }
            registry.guard().release_owner();
            registry.bring_up(None) && registry.guard().is_owner()
        })
        .join()
        .unwrap()
    });

    assert!(moved);
    assert!(!registry.guard().is_owner());
}
