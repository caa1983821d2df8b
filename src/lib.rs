//! # Conflux
//!
//! A namespace-partitioned data store registry: named stores built from
//! reducers, selectors, actions, and resolvers, routed through a composable
//! registry with batched change notification.
//!
//! ## Core Concepts
//!
//! - **Registry**: Directory of named stores with parent delegation
//! - **Stores**: Reducer-owned state read through named selectors
//! - **Resolvers**: Async fulfilment tracked per (selector, args) entry
//! - **Memoization**: Dependency-aware selector caching keyed by deep
//!   argument equality
//!
//! ## Example
//!
//! ```ignore
//! use conflux::{Action, Registry, StoreConfig};
//! use serde_json::json;
//!
//! let registry = Registry::new();
//! registry.register_store(
//!     "demo/counter",
//!     StoreConfig::new(|state, action| match action.kind.as_str() {
//!         "increment" => json!(state.and_then(|s| s.as_i64()).unwrap_or(0) + 1),
//!         _ => state.cloned().unwrap_or(json!(0)),
//!     })
//!     .with_selector("get_count", |state, _args| (**state).clone())
//!     .with_action("increment", |_args| Action::bare("increment")),
//! );
//!
//! registry.dispatch("demo/counter").unwrap().call("increment", &[])?;
//! let count = registry.select("demo/counter").unwrap().call("get_count", &[]);
//! ```

pub mod emitter;
pub mod error;
pub mod keymap;
pub mod memo;
pub mod registry;
pub mod resolution;
pub mod store;
pub mod types;

// Re-exports
pub use emitter::{Emitter, Listener};
pub use error::{RegistryError, Result};
pub use keymap::EquivalentKeyMap;
pub use memo::{Dependant, MemoizedSelector};
pub use registry::{
    ChangeEvent, Dispatcher, Registry, RegistryPlugin, ResolveSelectors, Selectors,
    SubscriptionHandle, SuspendSelectors, REGISTRY_STORE_NAME,
};
pub use resolution::{ResolutionAction, ResolutionState, ResolutionStatus, StatusCounts};
pub use store::{
    create_redux_store, PendingValue, ReduxStore, ReduxStoreDescriptor, Resolver, ResolverContext,
    StoreConfig, StoreDescriptor, StoreInstance,
};
pub use types::{Action, ListenerId, StateRef};
