//! Store instances and their declarative construction.
//!
//! A store is one registered namespace: a reducer-owned state value, named
//! selectors and action creators, and optionally resolvers that fulfil
//! selector data asynchronously. The [`StoreInstance`] trait is the exact
//! contract the registry routes through; [`ReduxStore`] is the standard
//! implementation built from a [`StoreConfig`].

pub mod config;
pub mod redux;

use crate::emitter::Listener;
use crate::error::Result;
use crate::resolution::{ResolutionAction, ResolutionStatus};
use crate::types::{Action, ListenerId};
use serde_json::Value;
use std::sync::Arc;

pub use config::{Resolver, StoreConfig};
pub use redux::{
    create_redux_store, PendingValue, ReduxStore, ReduxStoreDescriptor, ResolverContext,
};

/// The runtime contract of one registered namespace.
///
/// Namespace-level misses never occur here (the registry resolves the
/// namespace); selector-level misses are soft (`None`), unknown actions are
/// hard errors.
pub trait StoreInstance: Send + Sync {
    fn name(&self) -> &str;

    /// Invoke a named selector against current state. Triggers resolver
    /// fulfilment as a side effect when the selector has a resolver.
    fn select(&self, selector: &str, args: &[Value]) -> Option<Value>;

    /// Invoke a named action creator and dispatch the produced action.
    fn dispatch(&self, action: &str, args: &[Value]) -> Result<()>;

    /// Dispatch a raw action descriptor.
    fn dispatch_action(&self, action: Action) -> Result<()>;

    fn subscribe(&self, listener: Listener) -> ListenerId;

    fn unsubscribe(&self, id: ListenerId) -> bool;

    /// Like `select`, but returns a deferred value that settles once any
    /// pending resolution reaches a terminal state.
    fn resolve_select(&self, selector: &str, args: &[Value]) -> Option<PendingValue>;

    /// Like `select`, but blocks the calling thread until resolved.
    fn suspend_select(&self, selector: &str, args: &[Value]) -> Option<Result<Value>>;

    fn selector_names(&self) -> Vec<String>;

    fn action_names(&self) -> Vec<String>;

    // Resolution introspection, used by the registry's bootstrap store.
    // Stores without resolution machinery keep the defaults.

    fn resolution_status(&self, _selector: &str, _args: &[Value]) -> Option<ResolutionStatus> {
        None
    }

    fn resolution_snapshot(&self) -> Value {
        Value::Null
    }

    fn apply_resolution(&self, _action: ResolutionAction) {}
}

/// A named recipe for building a store instance at registration time.
pub trait StoreDescriptor: Send + Sync {
    fn name(&self) -> &str;

    fn instantiate(&self, registry: &Arc<crate::registry::Registry>) -> Arc<dyn StoreInstance>;
}
