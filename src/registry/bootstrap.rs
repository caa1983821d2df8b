//! The built-in introspection store.
//!
//! Every registry installs this store under a fixed name. Its selectors and
//! actions operate on the resolution state of *other* stores, addressed by
//! a leading store-name argument, so tooling can observe and manipulate
//! resolution without holding a store handle.

use crate::emitter::{Emitter, Listener};
use crate::error::{RegistryError, Result};
use crate::registry::Registry;
use crate::resolution::{ResolutionAction, ResolutionStatus};
use crate::store::{PendingValue, StoreDescriptor, StoreInstance};
use crate::types::{Action, ListenerId};
use serde_json::Value;
use std::sync::{Arc, Weak};

/// Namespace of the built-in introspection store.
pub const REGISTRY_STORE_NAME: &str = "core/registry";

const SELECTOR_NAMES: &[&str] = &[
    "get_is_resolving",
    "has_started_resolution",
    "has_finished_resolution",
    "is_resolving",
    "get_cached_resolvers",
];

const ACTION_NAMES: &[&str] = &[
    "start_resolution",
    "finish_resolution",
    "invalidate_resolution",
    "invalidate_resolution_for_store",
    "invalidate_resolution_for_store_selector",
];

pub(crate) struct BootstrapDescriptor;

impl StoreDescriptor for BootstrapDescriptor {
    fn name(&self) -> &str {
        REGISTRY_STORE_NAME
    }

    fn instantiate(&self, registry: &Arc<Registry>) -> Arc<dyn StoreInstance> {
        Arc::new(BootstrapStore {
            registry: Arc::downgrade(registry),
            emitter: Emitter::new(),
        })
    }
}

struct BootstrapStore {
    registry: Weak<Registry>,
    /// Satisfies the subscription contract; this store holds no state of
    /// its own and never emits.
    emitter: Emitter,
}

impl BootstrapStore {
    fn target(&self, name: &str) -> Option<Arc<dyn StoreInstance>> {
        self.registry.upgrade()?.store(name)
    }

    fn unknown_action(&self, action: &str) -> RegistryError {
        RegistryError::UnknownAction {
            store: REGISTRY_STORE_NAME.to_string(),
            action: action.to_string(),
        }
    }
}

/// Splits the conventional `[store, selector, args...]` argument layout.
fn selector_and_args(args: &[Value]) -> Option<(String, Vec<Value>)> {
    let selector = args.get(1)?.as_str()?.to_string();
    let rest = match args.get(2) {
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
        None => Vec::new(),
    };
    Some((selector, rest))
}

impl StoreInstance for BootstrapStore {
    fn name(&self) -> &str {
        REGISTRY_STORE_NAME
    }

    fn select(&self, selector: &str, args: &[Value]) -> Option<Value> {
        let store_name = args.first()?.as_str()?;

        if selector == "get_cached_resolvers" {
            return Some(self.target(store_name)?.resolution_snapshot());
        }

        let (target_selector, target_args) = selector_and_args(args)?;
        let status = self
            .target(store_name)?
            .resolution_status(&target_selector, &target_args);

        let value = match selector {
            "get_is_resolving" => match status {
                Some(status) => Value::String(status.label().to_string()),
                None => Value::Null,
            },
            "has_started_resolution" => Value::Bool(status.is_some()),
            "has_finished_resolution" => Value::Bool(matches!(
                status,
                Some(ResolutionStatus::Finished) | Some(ResolutionStatus::Failed(_))
            )),
            "is_resolving" => Value::Bool(matches!(status, Some(ResolutionStatus::Resolving))),
            _ => return None,
        };
        Some(value)
    }

    fn dispatch(&self, action: &str, args: &[Value]) -> Result<()> {
        if !ACTION_NAMES.contains(&action) {
            return Err(self.unknown_action(action));
        }

        let store_name = args
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| self.unknown_action(action))?;
        let store = self
            .target(store_name)
            .ok_or_else(|| RegistryError::UnknownStore(store_name.to_string()))?;

        let resolution_action = match action {
            "invalidate_resolution_for_store" => ResolutionAction::InvalidateForStore,
            "invalidate_resolution_for_store_selector" => {
                let (selector, _) =
                    selector_and_args(args).ok_or_else(|| self.unknown_action(action))?;
                ResolutionAction::InvalidateForSelector { selector }
            }
            _ => {
                let (selector, rest) =
                    selector_and_args(args).ok_or_else(|| self.unknown_action(action))?;
                match action {
                    "start_resolution" => ResolutionAction::Start {
                        selector,
                        args: rest,
                    },
                    "finish_resolution" => ResolutionAction::Finish {
                        selector,
                        args: rest,
                    },
                    _ => ResolutionAction::Invalidate {
                        selector,
                        args: rest,
                    },
                }
            }
        };

        store.apply_resolution(resolution_action);
        Ok(())
    }

    fn dispatch_action(&self, action: Action) -> Result<()> {
        Err(self.unknown_action(&action.kind))
    }

    fn subscribe(&self, listener: Listener) -> ListenerId {
        self.emitter.subscribe(listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.emitter.unsubscribe(id)
    }

    fn resolve_select(&self, selector: &str, args: &[Value]) -> Option<PendingValue> {
        // No resolvers here, so every read settles immediately.
        self.select(selector, args)
            .map(|value| PendingValue::settled(Ok(value)))
    }

    fn suspend_select(&self, selector: &str, args: &[Value]) -> Option<Result<Value>> {
        self.select(selector, args).map(Ok)
    }

    fn selector_names(&self) -> Vec<String> {
        SELECTOR_NAMES.iter().map(|s| s.to_string()).collect()
    }

    fn action_names(&self) -> Vec<String> {
        ACTION_NAMES.iter().map(|s| s.to_string()).collect()
    }
}
