//! Game session example for policy-singleton.
//!
//! Demonstrates:
//! - A persistent manager surviving level transitions
//! - A level-scoped controller placed in each level
//! - Session resets without restarting the process
//! - Handing work from a loader thread to the owning thread
//!
//! Run with: `cargo run --example game_session`

use policy_singleton::{define_registry, BaseInit, Policy, Scene, Singleton, SingletonHost};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

// Create an isolated registry for this example
define_registry!(game);

#[derive(Default)]
struct GameManager {
    sessions: AtomicU32,
    coins: AtomicU32,
}

impl Singleton for GameManager {
    type Slot = Self;
    const POLICY: Policy = Policy::PERSISTENT;

    fn on_first_bind(&self, base: &mut BaseInit) {
        base.complete();
        println!("   GameManager: first bind");
    }

    fn on_play_session_start(&self) {
        let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        self.coins.store(0, Ordering::SeqCst);
        println!("   GameManager: session #{n} starts, coins reset");
    }
}

#[derive(Default)]
struct LevelController {
    name: Mutex<String>,
}

impl Singleton for LevelController {
    type Slot = Self;
    const POLICY: Policy = Policy::SCOPED_TO_CONTAINER;

    fn on_play_session_start(&self) {
        println!("   LevelController: ready");
    }

    fn on_unbind(&self) {
        println!("   LevelController: {} unloaded", self.name.lock().unwrap());
    }
}

fn play_level(scene: &Scene, level: &str) {
    let container = scene.spawn(level);
    let controller = scene.add::<LevelController>(container);
    if let Some(controller) = controller.downcast::<LevelController>() {
        *controller.name.lock().unwrap() = level.to_string();
    }

    let manager = scene.instance::<GameManager>().unwrap().unwrap();
    manager.coins.fetch_add(5, Ordering::SeqCst);
    println!(
        "   {level}: collected coins, total {}",
        manager.coins.load(Ordering::SeqCst)
    );

    scene.transition();
}

fn main() {
    println!("=== policy-singleton: Game Session ===\n");

    game::set_trace_callback(|event| {
        if event.is_diagnostic() {
            println!("   [diagnostic] {event}");
        }
    });

    let scene = Arc::new(Scene::new(game::registry().clone()));

    // -------------------------------------------------------------------------
    // 1. Two levels in one session
    // -------------------------------------------------------------------------
    println!("1. Playing two levels...");

    play_level(&scene, "Forest");
    play_level(&scene, "Cave");

    // -------------------------------------------------------------------------
    // 2. A second play session without a restart
    // -------------------------------------------------------------------------
    println!("\n2. Starting a new play session...");

    scene.next_play_session();
    play_level(&scene, "Forest");

    // -------------------------------------------------------------------------
    // 3. A loader thread posts work back to the owner
    // -------------------------------------------------------------------------
    println!("\n3. Loader thread awarding a bonus...");

    let loader = {
        let scene = scene.clone();
        thread::spawn(move || {
            let refused = scene.try_get_instance::<GameManager>().is_none();
            println!("   loader: direct access refused = {refused}");

            let owner_scene = scene.clone();
            scene.post_to_owner(
                move || {
                    if let Ok(Some(manager)) = owner_scene.instance::<GameManager>() {
                        manager.coins.fetch_add(100, Ordering::SeqCst);
                    }
                },
                "AwardBonus",
            )
        })
    };
    let posted = loader.join().unwrap_or(false);
    println!("   queued: {posted}, pending jobs: {}", scene.pending_jobs());

    scene.tick();
    let manager = scene.instance::<GameManager>().unwrap().unwrap();
    println!("   coins after tick: {}", manager.coins.load(Ordering::SeqCst));

    // -------------------------------------------------------------------------
    // 4. Shutdown
    // -------------------------------------------------------------------------
    println!("\n4. Quitting...");

    scene.quit();
    println!(
        "   instance while quitting: {:?}",
        scene.instance::<GameManager>().map(|m| m.is_some())
    );

    for slot in game::registry().slots() {
        println!("   slot {} -> {:?} ({})", slot.type_name, slot.entity, slot.session);
    }

    println!("\n=== Example completed successfully ===");
}
