//! The registry: a composable directory of named stores.
//!
//! A registry routes `select`/`dispatch`/`resolve_select`/`suspend_select`
//! calls by namespace, wraps each store's notifications through a dedicated
//! per-store emitter feeding a registry-wide emitter, delegates lookup
//! misses to an optional parent registry, and offers a transactional
//! `batch` that coalesces notification fan-out.

mod bootstrap;

use crate::emitter::Emitter;
use crate::error::Result;
use crate::store::{
    create_redux_store, PendingValue, StoreConfig, StoreDescriptor, StoreInstance,
};
use crate::types::{Action, ListenerId};
use bootstrap::BootstrapDescriptor;
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

pub use bootstrap::REGISTRY_STORE_NAME;

/// Closed extension surface for registry behavior.
///
/// Hooks are consulted at fixed points instead of merging arbitrary methods
/// onto the registry.
pub trait RegistryPlugin: Send + Sync {
    /// Called after a store is installed.
    fn on_register(&self, _registry: &Registry, _name: &str) {}

    /// May supply a store for a namespace the registry resolved neither
    /// locally nor through its parent chain.
    fn store_fallback(&self, _name: &str) -> Option<Arc<dyn StoreInstance>> {
        None
    }
}

struct RegisteredStore {
    instance: Arc<dyn StoreInstance>,
    /// Wraps the instance's native notifications so batching can pause this
    /// store's fan-out independently of its dispatch cycle.
    emitter: Arc<Emitter>,
    _native_sub: ListenerId,
}

/// A namespace-partitioned directory of store instances.
pub struct Registry {
    stores: RwLock<HashMap<String, RegisteredStore>>,
    emitter: Arc<Emitter>,
    parent: Option<Arc<Registry>>,
    plugins: RwLock<Vec<Arc<dyn RegistryPlugin>>>,
    /// Active selection-observation sink. A single shared cell: observation
    /// is deliberately not reentrant.
    listening: Mutex<Option<Vec<String>>>,
    weak_self: Weak<Registry>,
}

impl Registry {
    /// Create a standalone registry with the bootstrap store installed.
    pub fn new() -> Arc<Self> {
        Self::build(None)
    }

    /// Create a registry that delegates lookup misses to `parent`.
    pub fn with_parent(parent: Arc<Registry>) -> Arc<Self> {
        Self::build(Some(parent))
    }

    fn build(parent: Option<Arc<Registry>>) -> Arc<Self> {
        let registry = Arc::new_cyclic(|weak| Registry {
            stores: RwLock::new(HashMap::new()),
            emitter: Arc::new(Emitter::new()),
            parent,
            plugins: RwLock::new(Vec::new()),
            listening: Mutex::new(None),
            weak_self: weak.clone(),
        });

        // Forward registry-wide notifications upward so a parent subscriber
        // observes changes originating in any descendant registry.
        if let Some(parent) = registry.parent.clone() {
            registry.emitter.subscribe(Box::new(move || parent.emitter.emit()));
        }

        // The introspection store is always local, never delegated.
        registry.register(Arc::new(BootstrapDescriptor));

        registry
    }

    /// Instantiate and install a store. A duplicate name is reported and
    /// the original instance retained.
    pub fn register(&self, descriptor: Arc<dyn StoreDescriptor>) {
        let name = descriptor.name().to_string();
        if self.stores.read().contains_key(&name) {
            tracing::warn!(store = %name, "store already registered, keeping the original");
            return;
        }
        let Some(registry) = self.weak_self.upgrade() else {
            return;
        };
        let instance = descriptor.instantiate(&registry);
        self.install(name, instance);
    }

    /// Convenience path: build a standard store from a declarative
    /// configuration and register it. Returns the installed instance (the
    /// original one if the name was already taken); `None` only while the
    /// registry is being torn down.
    pub fn register_store(
        &self,
        name: impl Into<String>,
        config: StoreConfig,
    ) -> Option<Arc<dyn StoreInstance>> {
        let name = name.into();
        self.register(create_redux_store(name.clone(), config));
        self.store(&name)
    }

    fn install(&self, name: String, instance: Arc<dyn StoreInstance>) {
        let store_emitter = Arc::new(Emitter::new());
        let global = self.emitter.clone();
        store_emitter.subscribe(Box::new(move || global.emit()));
        let feed = store_emitter.clone();
        let native_sub = instance.subscribe(Box::new(move || feed.emit()));

        let installed = {
            let mut stores = self.stores.write();
            match stores.entry(name.clone()) {
                Entry::Occupied(_) => {
                    tracing::warn!(store = %name, "store already registered, keeping the original");
                    instance.unsubscribe(native_sub);
                    false
                }
                Entry::Vacant(slot) => {
                    slot.insert(RegisteredStore {
                        instance,
                        emitter: store_emitter,
                        _native_sub: native_sub,
                    });
                    true
                }
            }
        };

        if installed {
            for plugin in self.plugins.read().iter() {
                plugin.on_register(self, &name);
            }
        }
    }

    /// Resolve a namespace to its store instance: locally, then through the
    /// parent chain, then through plugin fallbacks.
    pub fn store(&self, name: &str) -> Option<Arc<dyn StoreInstance>> {
        if let Some(entry) = self.stores.read().get(name) {
            return Some(entry.instance.clone());
        }
        if let Some(parent) = &self.parent {
            if let Some(found) = parent.store(name) {
                return Some(found);
            }
        }
        for plugin in self.plugins.read().iter() {
            if let Some(found) = plugin.store_fallback(name) {
                return Some(found);
            }
        }
        None
    }

    /// The namespace's selector set, or `None` for an unknown namespace.
    pub fn select(&self, name: &str) -> Option<Selectors> {
        let instance = self.store(name)?;
        self.record_selection(name);
        Some(Selectors { instance })
    }

    /// The namespace's action dispatch surface, or `None` (dispatch to
    /// nothing is a deliberate no-op at the call site).
    pub fn dispatch(&self, name: &str) -> Option<Dispatcher> {
        Some(Dispatcher {
            instance: self.store(name)?,
        })
    }

    /// Like [`Registry::select`], but every call yields a deferred value
    /// that settles once any pending resolver completes.
    pub fn resolve_select(&self, name: &str) -> Option<ResolveSelectors> {
        let instance = self.store(name)?;
        self.record_selection(name);
        Some(ResolveSelectors { instance })
    }

    /// Like [`Registry::select`], but a call whose resolution is pending
    /// blocks the caller until resolved.
    pub fn suspend_select(&self, name: &str) -> Option<SuspendSelectors> {
        let instance = self.store(name)?;
        self.record_selection(name);
        Some(SuspendSelectors { instance })
    }

    /// Subscribe to the registry-wide emitter, notified on any change in
    /// any store (including descendants).
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> SubscriptionHandle {
        let id = self.emitter.subscribe(Box::new(listener));
        SubscriptionHandle {
            emitter: self.emitter.clone(),
            id,
        }
    }

    /// Subscribe to one store's notifications, delegating to the parent
    /// when the store does not exist locally.
    pub fn subscribe_store(
        &self,
        name: &str,
        listener: impl Fn() + Send + Sync + 'static,
    ) -> Option<SubscriptionHandle> {
        if let Some(entry) = self.stores.read().get(name) {
            let id = entry.emitter.subscribe(Box::new(listener));
            return Some(SubscriptionHandle {
                emitter: entry.emitter.clone(),
                id,
            });
        }
        self.parent.as_ref()?.subscribe_store(name, listener)
    }

    /// Channel-based registry-wide change feed: one event per delivered
    /// notification (batched changes collapse into one event). Dropping
    /// the receiver disconnects the channel; the feed removes itself on
    /// the next delivery attempt.
    pub fn changes(&self) -> Receiver<ChangeEvent> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let emitter = self.emitter.clone();
        let id_cell: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let slot = id_cell.clone();
        let id = self.emitter.subscribe(Box::new(move || {
            if sender.send(ChangeEvent).is_err() {
                if let Some(id) = slot.lock().take() {
                    emitter.unsubscribe(id);
                }
            }
        }));
        *id_cell.lock() = Some(id);
        receiver
    }

    /// Run `f` with every emitter paused; all notifications emitted during
    /// the callback coalesce into at most one per emitter on resume. A
    /// nested batch degrades to a plain call.
    pub fn batch(&self, f: impl FnOnce()) {
        if self.emitter.is_paused() {
            f();
            return;
        }

        let emitters: Vec<Arc<Emitter>> = self
            .stores
            .read()
            .values()
            .map(|entry| entry.emitter.clone())
            .collect();

        self.emitter.pause();
        for emitter in &emitters {
            emitter.pause();
        }

        f();

        for emitter in &emitters {
            emitter.resume();
        }
        self.emitter.resume();
    }

    /// Run `f` while recording every store name touched via selection.
    /// Not reentrant: a single shared tracking cell is active at a time.
    pub fn observe_selections<R>(&self, f: impl FnOnce() -> R) -> (R, Vec<String>) {
        *self.listening.lock() = Some(Vec::new());
        let result = f();
        let names = self.listening.lock().take().unwrap_or_default();
        (result, names)
    }

    /// Install a registry plugin. Hooks apply to registrations and lookups
    /// from this point on.
    pub fn use_plugin(&self, plugin: Arc<dyn RegistryPlugin>) {
        self.plugins.write().push(plugin);
    }

    fn record_selection(&self, name: &str) {
        let mut listening = self.listening.lock();
        if let Some(names) = listening.as_mut() {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
}

/// Marker event delivered by [`Registry::changes`]. Carries no payload;
/// consumers re-select whatever they care about.
#[derive(Clone, Copy, Debug)]
pub struct ChangeEvent;

/// A namespace's selector call surface.
pub struct Selectors {
    instance: Arc<dyn StoreInstance>,
}

impl Selectors {
    pub fn call(&self, selector: &str, args: &[Value]) -> Option<Value> {
        self.instance.select(selector, args)
    }

    pub fn names(&self) -> Vec<String> {
        self.instance.selector_names()
    }
}

/// A namespace's action dispatch surface.
pub struct Dispatcher {
    instance: Arc<dyn StoreInstance>,
}

impl Dispatcher {
    pub fn call(&self, action: &str, args: &[Value]) -> Result<()> {
        self.instance.dispatch(action, args)
    }

    pub fn dispatch_action(&self, action: Action) -> Result<()> {
        self.instance.dispatch_action(action)
    }

    pub fn names(&self) -> Vec<String> {
        self.instance.action_names()
    }
}

/// Selector surface whose calls settle after resolver completion.
pub struct ResolveSelectors {
    instance: Arc<dyn StoreInstance>,
}

impl ResolveSelectors {
    pub fn call(&self, selector: &str, args: &[Value]) -> Option<PendingValue> {
        self.instance.resolve_select(selector, args)
    }
}

/// Selector surface whose calls block until resolved.
pub struct SuspendSelectors {
    instance: Arc<dyn StoreInstance>,
}

impl SuspendSelectors {
    pub fn call(&self, selector: &str, args: &[Value]) -> Option<Result<Value>> {
        self.instance.suspend_select(selector, args)
    }
}

/// Releases a subscription when explicitly asked to.
pub struct SubscriptionHandle {
    emitter: Arc<Emitter>,
    id: ListenerId,
}

impl SubscriptionHandle {
    pub fn unsubscribe(self) -> bool {
        self.emitter.unsubscribe(self.id)
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}
