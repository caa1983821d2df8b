//! The standard reducer-driven store instance.

use super::config::{SelectorKind, StoreConfig};
use super::{StoreDescriptor, StoreInstance};
use crate::emitter::{Emitter, Listener};
use crate::error::{RegistryError, Result};
use crate::registry::Registry;
use crate::resolution::{ResolutionAction, ResolutionState, ResolutionStatus};
use crate::types::{Action, ListenerId, StateRef};
use parking_lot::{Condvar, Mutex, RwLock};
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Action kind used to ask the reducer for its initial state.
const INIT_ACTION: &str = "@init";

/// A reducer-driven store: state owned exclusively by the reducer, mutated
/// only by dispatched actions, read only through selectors.
///
/// Dispatch is atomic per action: the reducer runs synchronously under the
/// state write lock and never suspends. Resolvers run on their own threads
/// and feed terminal transitions back through the resolution slice.
pub struct ReduxStore {
    name: String,
    config: StoreConfig,
    state: RwLock<StateRef>,
    resolution: Mutex<ResolutionState>,
    emitter: Emitter,
    /// Bumped on every dispatch and resolution transition; paired with
    /// `wakeup` so blocked `resolve_select`/`suspend_select` callers can
    /// re-check status without missed notifications.
    version: Mutex<u64>,
    wakeup: Condvar,
    weak_self: Weak<ReduxStore>,
}

impl ReduxStore {
    pub fn new(name: impl Into<String>, config: StoreConfig) -> Arc<Self> {
        let name = name.into();
        let initial = config
            .initial_state
            .clone()
            .unwrap_or_else(|| (config.reducer)(None, &Action::bare(INIT_ACTION)));

        Arc::new_cyclic(|weak| Self {
            name,
            config,
            state: RwLock::new(Arc::new(initial)),
            resolution: Mutex::new(ResolutionState::new()),
            emitter: Emitter::new(),
            version: Mutex::new(0),
            wakeup: Condvar::new(),
            weak_self: weak.clone(),
        })
    }

    /// Current state handle.
    pub fn state(&self) -> StateRef {
        self.state.read().clone()
    }

    fn normalize(&self, selector: &str, args: &[Value]) -> Vec<Value> {
        match self.config.normalizers.get(selector) {
            Some(normalize) => normalize(args.to_vec()),
            None => args.to_vec(),
        }
    }

    /// Run a selector without triggering resolver fulfilment.
    fn run_selector(&self, selector: &str, args: &[Value]) -> Option<Value> {
        let kind = self.config.selectors.get(selector)?;
        let state = self.state();
        Some(match kind {
            SelectorKind::Plain(f) => f(&state, args),
            SelectorKind::Memoized(memo) => memo.call(&state, args),
        })
    }

    /// Start the selector's resolver for these args unless resolution has
    /// already started. The resolver runs on its own thread; its outcome is
    /// recorded as a terminal transition. Invalidation never cancels an
    /// in-flight resolver, so a late completion overwrites the entry.
    fn ensure_resolution(&self, selector: &str, args: &[Value]) {
        let Some(resolver) = self.config.resolvers.get(selector) else {
            return;
        };

        let norm = self.normalize(selector, args);
        {
            let mut resolution = self.resolution.lock();
            if resolution.has_started_resolution(selector, &norm) {
                return;
            }
            resolution.apply(ResolutionAction::Start {
                selector: selector.to_string(),
                args: norm.clone(),
            });
        }
        self.bump_and_emit();

        let resolve = resolver.resolve.clone();
        let weak = self.weak_self.clone();
        let selector = selector.to_string();
        let raw_args = args.to_vec();
        std::thread::spawn(move || {
            let Some(store) = weak.upgrade() else {
                return;
            };
            let ctx = ResolverContext {
                store: Arc::downgrade(&store),
            };
            let action = match resolve(&ctx, &raw_args) {
                Ok(()) => ResolutionAction::Finish {
                    selector,
                    args: norm,
                },
                Err(error) => {
                    tracing::debug!(store = %store.name, selector = %selector, "resolver failed");
                    ResolutionAction::Fail {
                        selector,
                        args: norm,
                        error,
                    }
                }
            };
            // `norm` is already normalized; apply directly so the terminal
            // transition lands on the entry the Start created.
            {
                let mut resolution = store.resolution.lock();
                resolution.apply(action);
            }
            store.bump_and_emit();
        });
    }

    fn dispatch_action_inner(&self, action: Action) {
        {
            let mut state = self.state.write();
            let next = (self.config.reducer)(Some(&state), &action);
            *state = Arc::new(next);
        }
        self.invalidate_for_action(&action);
        self.bump_and_emit();
    }

    /// Resolver cache invalidation: after every dispatch, each resolver
    /// with a `should_invalidate` hook is consulted for its terminal
    /// entries.
    fn invalidate_for_action(&self, action: &Action) {
        let mut invalidations = Vec::new();
        {
            let resolution = self.resolution.lock();
            for (selector, resolver) in &self.config.resolvers {
                let Some(should_invalidate) = &resolver.should_invalidate else {
                    continue;
                };
                let Some(entries) = resolution.selectors().get(selector) else {
                    continue;
                };
                entries.for_each(|key, status| {
                    let terminal = matches!(
                        status,
                        ResolutionStatus::Finished | ResolutionStatus::Failed(_)
                    );
                    if !terminal {
                        return;
                    }
                    if let Value::Array(args) = key {
                        if should_invalidate(action, args) {
                            invalidations.push((selector.clone(), args.clone()));
                        }
                    }
                });
            }
        }

        if invalidations.is_empty() {
            return;
        }
        let mut resolution = self.resolution.lock();
        for (selector, args) in invalidations {
            resolution.apply(ResolutionAction::Invalidate { selector, args });
        }
    }

    /// Route a resolution transition's args through the selector's
    /// normalizer so externally applied transitions hit the same entries
    /// as the store's own bookkeeping.
    fn normalize_resolution_action(&self, action: ResolutionAction) -> ResolutionAction {
        use ResolutionAction::*;
        match action {
            Start { selector, args } => {
                let args = self.normalize(&selector, &args);
                Start { selector, args }
            }
            StartAll {
                selector,
                args_list,
            } => {
                let args_list = args_list
                    .into_iter()
                    .map(|args| self.normalize(&selector, &args))
                    .collect();
                StartAll {
                    selector,
                    args_list,
                }
            }
            Finish { selector, args } => {
                let args = self.normalize(&selector, &args);
                Finish { selector, args }
            }
            FinishAll {
                selector,
                args_list,
            } => {
                let args_list = args_list
                    .into_iter()
                    .map(|args| self.normalize(&selector, &args))
                    .collect();
                FinishAll {
                    selector,
                    args_list,
                }
            }
            Fail {
                selector,
                args,
                error,
            } => {
                let args = self.normalize(&selector, &args);
                Fail {
                    selector,
                    args,
                    error,
                }
            }
            FailAll {
                selector,
                args_list,
                error,
            } => {
                let args_list = args_list
                    .into_iter()
                    .map(|args| self.normalize(&selector, &args))
                    .collect();
                FailAll {
                    selector,
                    args_list,
                    error,
                }
            }
            Invalidate { selector, args } => {
                let args = self.normalize(&selector, &args);
                Invalidate { selector, args }
            }
            other @ (InvalidateForSelector { .. } | InvalidateForStore) => other,
        }
    }

    fn bump_and_emit(&self) {
        {
            let mut version = self.version.lock();
            *version += 1;
            self.wakeup.notify_all();
        }
        self.emitter.emit();
    }

    /// Block until the (normalized) entry reaches a terminal status.
    /// Returns `None` on timeout.
    fn wait_terminal(
        &self,
        selector: &str,
        norm: &[Value],
        timeout: Option<Duration>,
    ) -> Option<std::result::Result<(), Value>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut version = self.version.lock();
        loop {
            let status = self.resolution.lock().status(selector, norm).cloned();
            match status {
                Some(ResolutionStatus::Finished) => return Some(Ok(())),
                Some(ResolutionStatus::Failed(error)) => return Some(Err(error)),
                _ => {}
            }

            match deadline {
                Some(deadline) => {
                    if self
                        .wakeup
                        .wait_until(&mut version, deadline)
                        .timed_out()
                    {
                        return None;
                    }
                }
                None => self.wakeup.wait(&mut version),
            }
        }
    }

    fn await_resolution(
        &self,
        selector: &str,
        args: &[Value],
        timeout: Option<Duration>,
    ) -> Option<Result<Value>> {
        let norm = self.normalize(selector, args);
        let outcome = self.wait_terminal(selector, &norm, timeout)?;
        Some(self.settle(selector, args, outcome))
    }

    fn poll_resolution(&self, selector: &str, args: &[Value]) -> Option<Result<Value>> {
        let norm = self.normalize(selector, args);
        let status = self.resolution.lock().status(selector, &norm).cloned();
        match status {
            Some(ResolutionStatus::Finished) => Some(self.settle(selector, args, Ok(()))),
            Some(ResolutionStatus::Failed(error)) => {
                Some(self.settle(selector, args, Err(error)))
            }
            _ => None,
        }
    }

    fn settle(
        &self,
        selector: &str,
        args: &[Value],
        outcome: std::result::Result<(), Value>,
    ) -> Result<Value> {
        match outcome {
            Ok(()) => self
                .run_selector(selector, args)
                .ok_or_else(|| RegistryError::UnknownSelector {
                    store: self.name.clone(),
                    selector: selector.to_string(),
                }),
            Err(error) => Err(RegistryError::Resolver(error)),
        }
    }
}

impl StoreInstance for ReduxStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn select(&self, selector: &str, args: &[Value]) -> Option<Value> {
        if !self.config.selectors.contains_key(selector) {
            return None;
        }
        self.ensure_resolution(selector, args);
        self.run_selector(selector, args)
    }

    fn dispatch(&self, action: &str, args: &[Value]) -> Result<()> {
        let creator =
            self.config
                .actions
                .get(action)
                .ok_or_else(|| RegistryError::UnknownAction {
                    store: self.name.clone(),
                    action: action.to_string(),
                })?;
        let action = creator(args);
        self.dispatch_action_inner(action);
        Ok(())
    }

    fn dispatch_action(&self, action: Action) -> Result<()> {
        self.dispatch_action_inner(action);
        Ok(())
    }

    fn subscribe(&self, listener: Listener) -> ListenerId {
        self.emitter.subscribe(listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.emitter.unsubscribe(id)
    }

    fn resolve_select(&self, selector: &str, args: &[Value]) -> Option<PendingValue> {
        if !self.config.selectors.contains_key(selector) {
            return None;
        }
        if !self.config.resolvers.contains_key(selector) {
            let value = self.run_selector(selector, args)?;
            return Some(PendingValue::settled(Ok(value)));
        }
        self.ensure_resolution(selector, args);
        Some(PendingValue {
            inner: PendingInner::Waiting {
                store: self.weak_self.clone(),
                selector: selector.to_string(),
                args: args.to_vec(),
            },
        })
    }

    fn suspend_select(&self, selector: &str, args: &[Value]) -> Option<Result<Value>> {
        if !self.config.selectors.contains_key(selector) {
            return None;
        }
        if !self.config.resolvers.contains_key(selector) {
            return self.run_selector(selector, args).map(Ok);
        }
        self.ensure_resolution(selector, args);
        self.await_resolution(selector, args, None)
    }

    fn selector_names(&self) -> Vec<String> {
        self.config.selectors.keys().cloned().collect()
    }

    fn action_names(&self) -> Vec<String> {
        self.config.actions.keys().cloned().collect()
    }

    fn resolution_status(&self, selector: &str, args: &[Value]) -> Option<ResolutionStatus> {
        let norm = self.normalize(selector, args);
        self.resolution.lock().status(selector, &norm).cloned()
    }

    fn resolution_snapshot(&self) -> Value {
        self.resolution.lock().cached_resolvers()
    }

    fn apply_resolution(&self, action: ResolutionAction) {
        let action = self.normalize_resolution_action(action);
        {
            let mut resolution = self.resolution.lock();
            resolution.apply(action);
        }
        self.bump_and_emit();
    }
}

/// Context handed to a running resolver: a weak handle back to its store.
pub struct ResolverContext {
    pub(crate) store: Weak<ReduxStore>,
}

impl ResolverContext {
    /// Read a selector on the resolver's own store, without re-triggering
    /// fulfilment.
    pub fn select(&self, selector: &str, args: &[Value]) -> Option<Value> {
        let store = self.store.upgrade()?;
        store.run_selector(selector, args)
    }

    /// Dispatch a raw action into the resolver's store.
    pub fn dispatch_action(&self, action: Action) -> Result<()> {
        let store = self.store.upgrade().ok_or(RegistryError::StoreGone)?;
        store.dispatch_action_inner(action);
        Ok(())
    }

    /// Invoke a named action creator on the resolver's store.
    pub fn dispatch(&self, action: &str, args: &[Value]) -> Result<()> {
        let store = self.store.upgrade().ok_or(RegistryError::StoreGone)?;
        StoreInstance::dispatch(&*store, action, args)
    }
}

enum PendingInner {
    Settled(Result<Value>),
    Waiting {
        store: Weak<ReduxStore>,
        selector: String,
        args: Vec<Value>,
    },
}

/// A deferred selector value produced by `resolve_select`.
///
/// Settles with the selector's value once resolution finishes, or with
/// [`RegistryError::Resolver`] carrying the verbatim failure payload.
pub struct PendingValue {
    inner: PendingInner,
}

impl PendingValue {
    pub(crate) fn settled(result: Result<Value>) -> Self {
        Self {
            inner: PendingInner::Settled(result),
        }
    }

    /// Block until the value settles.
    pub fn wait(&self) -> Result<Value> {
        match &self.inner {
            PendingInner::Settled(result) => result.clone(),
            PendingInner::Waiting {
                store,
                selector,
                args,
            } => {
                let store = store.upgrade().ok_or(RegistryError::StoreGone)?;
                store
                    .await_resolution(selector, args, None)
                    .expect("blocking wait cannot time out")
            }
        }
    }

    /// Block until the value settles or the timeout elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<Value>> {
        match &self.inner {
            PendingInner::Settled(result) => Some(result.clone()),
            PendingInner::Waiting {
                store,
                selector,
                args,
            } => match store.upgrade() {
                Some(store) => store.await_resolution(selector, args, Some(timeout)),
                None => Some(Err(RegistryError::StoreGone)),
            },
        }
    }

    /// Non-blocking probe; `None` while still resolving.
    pub fn try_get(&self) -> Option<Result<Value>> {
        match &self.inner {
            PendingInner::Settled(result) => Some(result.clone()),
            PendingInner::Waiting {
                store,
                selector,
                args,
            } => match store.upgrade() {
                Some(store) => store.poll_resolution(selector, args),
                None => Some(Err(RegistryError::StoreGone)),
            },
        }
    }
}

/// Standard descriptor pairing a name with a declarative configuration.
pub struct ReduxStoreDescriptor {
    name: String,
    config: StoreConfig,
}

impl ReduxStoreDescriptor {
    pub fn new(name: impl Into<String>, config: StoreConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

impl StoreDescriptor for ReduxStoreDescriptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate(&self, _registry: &Arc<Registry>) -> Arc<dyn StoreInstance> {
        ReduxStore::new(self.name.clone(), self.config.clone())
    }
}

/// Create a standard store descriptor from a declarative configuration.
pub fn create_redux_store(
    name: impl Into<String>,
    config: StoreConfig,
) -> Arc<ReduxStoreDescriptor> {
    Arc::new(ReduxStoreDescriptor::new(name, config))
}
