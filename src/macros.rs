//! Macros for declaring isolated registries.

/// Declares a module holding its own static [`Registry`](crate::Registry).
///
/// The module name doubles as the registry label in tracing output. The generated
/// module contains a lazily built registry, reachable through `registry()`, and free
/// functions forwarding to it that take the host graph where the registry needs one.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use policy_singleton::{define_registry, Policy, Scene, Singleton};
///
/// #[derive(Default)]
/// struct Mixer;
///
/// impl Singleton for Mixer {
///     type Slot = Self;
///     const POLICY: Policy = Policy::PERSISTENT;
/// }
///
/// define_registry!(audio);
///
/// let scene = Scene::new(audio::registry().clone());
/// let mixer: Arc<Mixer> = audio::instance(&scene).unwrap().unwrap();
/// assert!(audio::is_bound::<Mixer>());
/// assert_eq!(audio::registry().label(), "audio");
/// # let _ = mixer;
/// ```
///
/// Registries declared this way never share slots:
///
/// ```rust
/// use policy_singleton::define_registry;
///
/// define_registry!(menus);
/// define_registry!(gameplay);
///
/// assert!(!std::sync::Arc::ptr_eq(menus::registry(), gameplay::registry()));
/// ```
#[macro_export]
macro_rules! define_registry {
    ($name:ident) => {
        pub mod $name {
            use std::sync::{Arc, LazyLock};

            static REGISTRY: LazyLock<Arc<$crate::Registry>> = LazyLock::new(|| {
                Arc::new(
                    $crate::Registry::builder()
                        .label(stringify!($name))
                        .build(),
                )
            });

            /// The registry behind this module.
            pub fn registry() -> &'static Arc<$crate::Registry> {
                &REGISTRY
            }

            /// Captures the calling context as owner and begins the first session.
            pub fn bring_up(dispatcher: Option<Arc<dyn $crate::Dispatcher>>) -> bool {
                REGISTRY.bring_up(dispatcher)
            }

            pub fn begin_play_session() -> bool {
                REGISTRY.begin_play_session()
            }

            /// Returns the instance of `T`, creating one if its policy allows it.
            pub fn instance<T, G>(
                graph: &G,
            ) -> Result<Option<Arc<T>>, $crate::SingletonError>
            where
                T: $crate::Singleton,
                G: $crate::ObjectGraph + ?Sized,
            {
                REGISTRY.instance::<T, G>(graph)
            }

            /// Returns the instance of `T` if one exists. Never creates one.
            pub fn try_get_instance<T, G>(graph: &G) -> Option<Arc<T>>
            where
                T: $crate::Singleton,
                G: $crate::ObjectGraph + ?Sized,
            {
                REGISTRY.try_get_instance::<T, G>(graph)
            }

            pub fn is_bound<T: $crate::Singleton>() -> bool {
                REGISTRY.is_bound::<T>()
            }

            pub fn notify_quitting() {
                REGISTRY.notify_quitting()
            }

            pub fn clear_quitting_flag() {
                REGISTRY.clear_quitting_flag()
            }

            pub fn is_quitting() -> bool {
                REGISTRY.is_quitting()
            }

            pub fn post_to_owner(action: impl FnOnce() + Send + 'static, caller: &str) -> bool {
                REGISTRY.post_to_owner(action, caller)
            }

            /// Set a tracing callback for registry events.
            pub fn set_trace_callback(
                callback: impl Fn(&$crate::RegistryEvent) + Send + Sync + 'static,
            ) {
                REGISTRY.set_trace_callback(callback)
            }

            /// Clear the tracing callback.
            pub fn clear_trace_callback() {
                REGISTRY.clear_trace_callback()
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::{Policy, Scene, Singleton};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Inventory;

    impl Singleton for Inventory {
        type Slot = Self;
        const POLICY: Policy = Policy::PERSISTENT;
    }

    #[test]
    fn test_define_registry_macro() {
        define_registry!(test_reg);

        let scene = Scene::new(test_reg::registry().clone());
        assert!(test_reg::try_get_instance::<Inventory, _>(&scene).is_none());

        let first = test_reg::instance::<Inventory, _>(&scene).unwrap().unwrap();
        let again = test_reg::try_get_instance::<Inventory, _>(&scene).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert!(test_reg::is_bound::<Inventory>());
        assert_eq!(test_reg::registry().label(), "test_reg");
    }

    #[test]
    fn test_multiple_registries() {
        define_registry!(reg_a);
        define_registry!(reg_b);

        let scene_a = Scene::new(reg_a::registry().clone());
        reg_a::instance::<Inventory, _>(&scene_a).unwrap();

        assert!(reg_a::is_bound::<Inventory>());
        assert!(!reg_b::is_bound::<Inventory>());
    }

    #[test]
    fn test_quitting_flag() {
        define_registry!(quit_test);

        assert!(quit_test::bring_up(None));
        quit_test::notify_quitting();
        assert!(quit_test::is_quitting());
        quit_test::clear_quitting_flag();
        assert!(!quit_test::is_quitting());
        assert!(!quit_test::begin_play_session());
    }

    #[test]
    fn test_tracing() {
        define_registry!(trace_test);

        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        trace_test::set_trace_callback(move |event| {
            events_clone.lock().unwrap().push(format!("{}", event));
        });

        let scene = Scene::new(trace_test::registry().clone());
        trace_test::instance::<Inventory, _>(&scene).unwrap();
        trace_test::clear_trace_callback();
        assert!(trace_test::post_to_owner(|| {}, "test"));

        let recorded = events.lock().unwrap();
        assert!(recorded[0].starts_with("Starting session"));
        assert!(recorded.iter().any(|e| e.starts_with("auto-created")));
    }
}
