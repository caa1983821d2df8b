//! Declarative store configuration.

use super::redux::ResolverContext;
use crate::memo::MemoizedSelector;
use crate::types::{Action, StateRef};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Pure state transition. Must treat unknown action kinds as pass-through,
/// and produce the initial state when called with `None`.
pub type Reducer = Arc<dyn Fn(Option<&Value>, &Action) -> Value + Send + Sync>;

/// Pure read of store state.
pub type Selector = Arc<dyn Fn(&StateRef, &[Value]) -> Value + Send + Sync>;

/// Pure function producing a plain action descriptor.
pub type ActionCreator = Arc<dyn Fn(&[Value]) -> Action + Send + Sync>;

/// Resolver body: performs the work needed before its selector's result is
/// authoritative, dispatching data into the store along the way. An `Err`
/// payload is recorded verbatim as the resolution failure.
pub type ResolveFn =
    Arc<dyn Fn(&ResolverContext, &[Value]) -> std::result::Result<(), Value> + Send + Sync>;

/// Decides whether a completed resolution should be invalidated in response
/// to a dispatched action.
pub type ShouldInvalidate = Arc<dyn Fn(&Action, &[Value]) -> bool + Send + Sync>;

/// Collapses equivalent argument spellings to one canonical tuple before
/// resolution bookkeeping.
pub type NormalizeArgs = Arc<dyn Fn(Vec<Value>) -> Vec<Value> + Send + Sync>;

/// A selector's async fulfilment hook.
#[derive(Clone)]
pub struct Resolver {
    pub(crate) resolve: ResolveFn,
    pub(crate) should_invalidate: Option<ShouldInvalidate>,
}

impl Resolver {
    pub fn new(
        resolve: impl Fn(&ResolverContext, &[Value]) -> std::result::Result<(), Value>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            resolve: Arc::new(resolve),
            should_invalidate: None,
        }
    }

    pub fn with_should_invalidate(
        mut self,
        f: impl Fn(&Action, &[Value]) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_invalidate = Some(Arc::new(f));
        self
    }
}

#[derive(Clone)]
pub(crate) enum SelectorKind {
    Plain(Selector),
    Memoized(Arc<MemoizedSelector>),
}

/// Declarative configuration for a standard store.
///
/// The reducer is required at construction; everything else is attached
/// with builder methods.
#[derive(Clone)]
pub struct StoreConfig {
    pub(crate) reducer: Reducer,
    pub(crate) initial_state: Option<Value>,
    pub(crate) selectors: HashMap<String, SelectorKind>,
    pub(crate) actions: HashMap<String, ActionCreator>,
    pub(crate) resolvers: HashMap<String, Resolver>,
    pub(crate) normalizers: HashMap<String, NormalizeArgs>,
}

impl StoreConfig {
    pub fn new(reducer: impl Fn(Option<&Value>, &Action) -> Value + Send + Sync + 'static) -> Self {
        Self {
            reducer: Arc::new(reducer),
            initial_state: None,
            selectors: HashMap::new(),
            actions: HashMap::new(),
            resolvers: HashMap::new(),
            normalizers: HashMap::new(),
        }
    }

    /// Seed state explicitly instead of asking the reducer for it.
    pub fn with_initial_state(mut self, state: Value) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn with_selector(
        mut self,
        name: impl Into<String>,
        selector: impl Fn(&StateRef, &[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.selectors
            .insert(name.into(), SelectorKind::Plain(Arc::new(selector)));
        self
    }

    /// Serve a memoized selector through the same `select` surface.
    pub fn with_memoized_selector(
        mut self,
        name: impl Into<String>,
        selector: MemoizedSelector,
    ) -> Self {
        self.selectors
            .insert(name.into(), SelectorKind::Memoized(Arc::new(selector)));
        self
    }

    pub fn with_action(
        mut self,
        name: impl Into<String>,
        creator: impl Fn(&[Value]) -> Action + Send + Sync + 'static,
    ) -> Self {
        self.actions.insert(name.into(), Arc::new(creator));
        self
    }

    /// Attach a resolver to the selector of the same name.
    pub fn with_resolver(mut self, name: impl Into<String>, resolver: Resolver) -> Self {
        self.resolvers.insert(name.into(), resolver);
        self
    }

    /// Attach an argument normalizer to the selector of the same name.
    pub fn with_normalize_args(
        mut self,
        name: impl Into<String>,
        normalize: impl Fn(Vec<Value>) -> Vec<Value> + Send + Sync + 'static,
    ) -> Self {
        self.normalizers.insert(name.into(), Arc::new(normalize));
        self
    }
}
