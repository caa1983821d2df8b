//! Resolution lifecycle tracking for selectors backed by resolvers.
//!
//! Each (selector, argument tuple) pair moves through
//! `Resolving -> Finished | Failed`, keyed by deep argument equality so
//! equivalent argument spellings share one entry.

pub mod queries;
pub mod state;

pub use queries::StatusCounts;
pub use state::{ResolutionAction, ResolutionState, ResolutionStatus};
