//! Error types for the store registry.

use thiserror::Error;

/// Main error type for registry operations.
///
/// Namespace lookup misses are deliberately not errors: they surface as
/// `None` at the call site so callers can probe for stores that may not be
/// registered yet. Errors are reserved for contract violations and for
/// resolver rejections observed at an awaiting point.
#[derive(Clone, Debug, Error)]
pub enum RegistryError {
    #[error("Store not registered: {0}")]
    UnknownStore(String),

    #[error("Unknown selector '{selector}' in store '{store}'")]
    UnknownSelector { store: String, selector: String },

    #[error("Unknown action '{action}' in store '{store}'")]
    UnknownAction { store: String, action: String },

    /// A resolver rejected. The payload is stored verbatim; `null` is a
    /// legitimate rejection value and still counts as a failure.
    #[error("Resolver failed: {0}")]
    Resolver(serde_json::Value),

    #[error("Store instance dropped while a waiter was blocked")]
    StoreGone,
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
