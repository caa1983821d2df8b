//! Parent/child delegation and plugin extension tests.

use conflux::{
    Action, Registry, RegistryPlugin, StoreConfig, StoreInstance, REGISTRY_STORE_NAME,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn counter_config() -> StoreConfig {
    StoreConfig::new(|state, action| {
        let count = state.and_then(Value::as_i64).unwrap_or(0);
        match action.kind.as_str() {
            "increment" => json!(count + 1),
            _ => json!(count),
        }
    })
    .with_selector("get_count", |state, _args| (**state).clone())
    .with_action("increment", |_args| Action::bare("increment"))
}

// --- Parent Delegation ---

#[test]
fn test_child_delegates_unknown_store_to_parent() {
    let parent = Registry::new();
    parent.register_store("shared/counter", counter_config());
    let child = Registry::with_parent(parent.clone());

    // Reads and writes through the child hit the parent's instance.
    child
        .dispatch("shared/counter")
        .unwrap()
        .call("increment", &[])
        .unwrap();
    assert_eq!(
        parent
            .select("shared/counter")
            .unwrap()
            .call("get_count", &[]),
        Some(json!(1))
    );
    assert_eq!(
        child
            .select("shared/counter")
            .unwrap()
            .call("get_count", &[]),
        Some(json!(1))
    );
}

#[test]
fn test_local_store_shadows_parent() {
    let parent = Registry::new();
    parent.register_store("shared/counter", counter_config());
    let child = Registry::with_parent(parent.clone());
    child.register_store("shared/counter", counter_config());

    child
        .dispatch("shared/counter")
        .unwrap()
        .call("increment", &[])
        .unwrap();

    assert_eq!(
        child
            .select("shared/counter")
            .unwrap()
            .call("get_count", &[]),
        Some(json!(1))
    );
    assert_eq!(
        parent
            .select("shared/counter")
            .unwrap()
            .call("get_count", &[]),
        Some(json!(0))
    );
}

#[test]
fn test_child_changes_notify_parent_subscribers() {
    let parent = Registry::new();
    let child = Registry::with_parent(parent.clone());
    child.register_store("child/counter", counter_config());

    let notifications = Arc::new(AtomicUsize::new(0));
    let inner = notifications.clone();
    parent.subscribe(move || {
        inner.fetch_add(1, Ordering::SeqCst);
    });

    child
        .dispatch("child/counter")
        .unwrap()
        .call("increment", &[])
        .unwrap();
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
}

#[test]
fn test_parent_changes_do_not_notify_child() {
    let parent = Registry::new();
    parent.register_store("shared/counter", counter_config());
    let child = Registry::with_parent(parent.clone());

    let notifications = Arc::new(AtomicUsize::new(0));
    let inner = notifications.clone();
    child.subscribe(move || {
        inner.fetch_add(1, Ordering::SeqCst);
    });

    parent
        .dispatch("shared/counter")
        .unwrap()
        .call("increment", &[])
        .unwrap();
    assert_eq!(notifications.load(Ordering::SeqCst), 0);
}

#[test]
fn test_subscribe_store_delegates_to_parent() {
    let parent = Registry::new();
    parent.register_store("shared/counter", counter_config());
    let child = Registry::with_parent(parent.clone());

    let notifications = Arc::new(AtomicUsize::new(0));
    let inner = notifications.clone();
    let handle = child.subscribe_store("shared/counter", move || {
        inner.fetch_add(1, Ordering::SeqCst);
    });
    assert!(handle.is_some());

    parent
        .dispatch("shared/counter")
        .unwrap()
        .call("increment", &[])
        .unwrap();
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
}

#[test]
fn test_each_registry_owns_its_bootstrap_store() {
    let parent = Registry::new();
    let child = Registry::with_parent(parent.clone());
    // Both resolve the bootstrap namespace without delegation.
    assert!(parent.select(REGISTRY_STORE_NAME).is_some());
    assert!(child.select(REGISTRY_STORE_NAME).is_some());
}

// --- Duplicate Registration ---

#[test]
fn test_duplicate_registration_keeps_original() {
    init_tracing();
    let registry = Registry::new();
    registry.register_store("demo/counter", counter_config());
    registry
        .dispatch("demo/counter")
        .unwrap()
        .call("increment", &[])
        .unwrap();

    // Re-registering must not replace the live instance or reset state.
    registry.register_store("demo/counter", counter_config());
    assert_eq!(
        registry
            .select("demo/counter")
            .unwrap()
            .call("get_count", &[]),
        Some(json!(1))
    );
}

// --- Plugins ---

struct RecordingPlugin {
    registered: Mutex<Vec<String>>,
    fallback: Arc<dyn StoreInstance>,
}

impl RegistryPlugin for RecordingPlugin {
    fn on_register(&self, _registry: &Registry, name: &str) {
        self.registered.lock().unwrap().push(name.to_string());
    }

    fn store_fallback(&self, name: &str) -> Option<Arc<dyn StoreInstance>> {
        (name == "plugin/virtual").then(|| self.fallback.clone())
    }
}

fn fallback_instance() -> Arc<dyn StoreInstance> {
    conflux::ReduxStore::new("plugin/virtual", counter_config())
}

#[test]
fn test_plugin_sees_registrations() {
    let registry = Registry::new();
    let plugin = Arc::new(RecordingPlugin {
        registered: Mutex::new(Vec::new()),
        fallback: fallback_instance(),
    });
    registry.use_plugin(plugin.clone());

    registry.register_store("demo/a", counter_config());
    registry.register_store("demo/b", counter_config());
    assert_eq!(
        *plugin.registered.lock().unwrap(),
        vec!["demo/a", "demo/b"]
    );
}

#[test]
fn test_plugin_fallback_resolves_unknown_namespace() {
    let registry = Registry::new();
    let plugin = Arc::new(RecordingPlugin {
        registered: Mutex::new(Vec::new()),
        fallback: fallback_instance(),
    });
    registry.use_plugin(plugin);

    assert!(registry.select("plugin/other").is_none());
    let select = registry.select("plugin/virtual").unwrap();
    assert_eq!(select.call("get_count", &[]), Some(json!(0)));
}

#[test]
fn test_registered_store_wins_over_plugin_fallback() {
    let registry = Registry::new();
    let plugin = Arc::new(RecordingPlugin {
        registered: Mutex::new(Vec::new()),
        fallback: fallback_instance(),
    });
    registry.use_plugin(plugin);
    registry.register_store("plugin/virtual", counter_config());

    registry
        .dispatch("plugin/virtual")
        .unwrap()
        .call("increment", &[])
        .unwrap();
    assert_eq!(
        registry
            .select("plugin/virtual")
            .unwrap()
            .call("get_count", &[]),
        Some(json!(1))
    );
}
