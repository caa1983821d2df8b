//! Resolution state and its transitions.

use crate::keymap::EquivalentKeyMap;
use crate::resolution::queries::StatusCounts;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Lifecycle status of one selector invocation's resolver.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolutionStatus {
    Resolving,
    Finished,
    /// The payload is whatever the resolver rejected with, stored verbatim.
    /// `Failed(Value::Null)` is still a failure; no query inspects the
    /// payload to decide.
    Failed(Value),
}

impl ResolutionStatus {
    /// Wire name of the status, as exposed by introspection snapshots.
    pub fn label(&self) -> &'static str {
        match self {
            ResolutionStatus::Resolving => "resolving",
            ResolutionStatus::Finished => "finished",
            ResolutionStatus::Failed(_) => "error",
        }
    }
}

/// Transition applied to resolution state.
#[derive(Clone, Debug)]
pub enum ResolutionAction {
    Start {
        selector: String,
        args: Vec<Value>,
    },
    StartAll {
        selector: String,
        args_list: Vec<Vec<Value>>,
    },
    Finish {
        selector: String,
        args: Vec<Value>,
    },
    FinishAll {
        selector: String,
        args_list: Vec<Vec<Value>>,
    },
    Fail {
        selector: String,
        args: Vec<Value>,
        error: Value,
    },
    FailAll {
        selector: String,
        args_list: Vec<Vec<Value>>,
        error: Value,
    },
    /// Tombstone one (selector, args) entry.
    Invalidate {
        selector: String,
        args: Vec<Value>,
    },
    /// Drop every entry for one selector.
    InvalidateForSelector {
        selector: String,
    },
    /// Reset all resolution state.
    InvalidateForStore,
}

/// Per-store resolution state: selector name to argument-keyed statuses.
///
/// A generation counter is bumped on every transition and substitutes for
/// state-reference identity when memoizing derived tallies.
pub struct ResolutionState {
    selectors: HashMap<String, EquivalentKeyMap<ResolutionStatus>>,
    generation: u64,
    pub(crate) counts_memo: Mutex<Option<(u64, Arc<StatusCounts>)>>,
}

fn args_key(args: &[Value]) -> Value {
    Value::Array(args.to_vec())
}

impl ResolutionState {
    pub fn new() -> Self {
        Self {
            selectors: HashMap::new(),
            generation: 0,
            counts_memo: Mutex::new(None),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn selectors(&self) -> &HashMap<String, EquivalentKeyMap<ResolutionStatus>> {
        &self.selectors
    }

    /// Current status for a (selector, args) entry, if any.
    pub fn status(&self, selector: &str, args: &[Value]) -> Option<&ResolutionStatus> {
        self.selectors.get(selector)?.get(&args_key(args))
    }

    /// Apply a transition. Mutates in place and bumps the generation.
    pub fn apply(&mut self, action: ResolutionAction) {
        match action {
            ResolutionAction::Start { selector, args } => {
                self.set(selector, args, ResolutionStatus::Resolving);
            }
            ResolutionAction::StartAll {
                selector,
                args_list,
            } => {
                for args in args_list {
                    self.set(selector.clone(), args, ResolutionStatus::Resolving);
                }
            }
            ResolutionAction::Finish { selector, args } => {
                self.set(selector, args, ResolutionStatus::Finished);
            }
            ResolutionAction::FinishAll {
                selector,
                args_list,
            } => {
                for args in args_list {
                    self.set(selector.clone(), args, ResolutionStatus::Finished);
                }
            }
            ResolutionAction::Fail {
                selector,
                args,
                error,
            } => {
                self.set(selector, args, ResolutionStatus::Failed(error));
            }
            ResolutionAction::FailAll {
                selector,
                args_list,
                error,
            } => {
                for args in args_list {
                    self.set(selector.clone(), args, ResolutionStatus::Failed(error.clone()));
                }
            }
            ResolutionAction::Invalidate { selector, args } => {
                if let Some(map) = self.selectors.get_mut(&selector) {
                    map.remove(&args_key(&args));
                }
            }
            ResolutionAction::InvalidateForSelector { selector } => {
                self.selectors.remove(&selector);
            }
            ResolutionAction::InvalidateForStore => {
                self.selectors.clear();
            }
        }
        self.generation += 1;
    }

    fn set(&mut self, selector: String, args: Vec<Value>, status: ResolutionStatus) {
        self.selectors
            .entry(selector)
            .or_default()
            .insert(Value::Array(args), status);
    }
}

impl Default for ResolutionState {
    fn default() -> Self {
        Self::new()
    }
}
