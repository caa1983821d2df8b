//! Read-only queries over resolution state.

use crate::resolution::state::{ResolutionState, ResolutionStatus};
use serde_json::{json, Value};
use std::sync::Arc;

/// Tally of resolution entries per terminal/live status.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub resolving: usize,
    pub finished: usize,
    pub failed: usize,
}

impl ResolutionState {
    /// Whether resolution has started (any status) for the entry.
    pub fn has_started_resolution(&self, selector: &str, args: &[Value]) -> bool {
        self.status(selector, args).is_some()
    }

    /// Whether resolution reached a terminal state (success or failure).
    pub fn has_finished_resolution(&self, selector: &str, args: &[Value]) -> bool {
        matches!(
            self.status(selector, args),
            Some(ResolutionStatus::Finished) | Some(ResolutionStatus::Failed(_))
        )
    }

    /// Whether resolution failed. Decided by status variant alone, so a
    /// `null` failure payload still counts.
    pub fn has_resolution_failed(&self, selector: &str, args: &[Value]) -> bool {
        matches!(self.status(selector, args), Some(ResolutionStatus::Failed(_)))
    }

    /// The failure payload, if the entry failed. `Some(Value::Null)` for a
    /// null rejection, `None` only when the entry has not failed.
    pub fn resolution_error(&self, selector: &str, args: &[Value]) -> Option<Value> {
        match self.status(selector, args) {
            Some(ResolutionStatus::Failed(error)) => Some(error.clone()),
            _ => None,
        }
    }

    /// Whether resolution has started and not yet reached a terminal state.
    pub fn is_resolving(&self, selector: &str, args: &[Value]) -> bool {
        matches!(self.status(selector, args), Some(ResolutionStatus::Resolving))
    }

    /// Whether any entry across all selectors is still resolving.
    pub fn has_resolving_selectors(&self) -> bool {
        self.selectors()
            .values()
            .any(|map| map.any(|status| matches!(status, ResolutionStatus::Resolving)))
    }

    /// JSON snapshot of the raw resolution state, one entry list per
    /// selector.
    pub fn cached_resolvers(&self) -> Value {
        let mut snapshot = serde_json::Map::new();
        for (selector, map) in self.selectors() {
            let mut entries = Vec::new();
            map.for_each(|args, status| {
                let mut entry = json!({
                    "args": args.clone(),
                    "status": status.label(),
                });
                if let ResolutionStatus::Failed(error) = status {
                    entry["error"] = error.clone();
                }
                entries.push(entry);
            });
            snapshot.insert(selector.clone(), Value::Array(entries));
        }
        Value::Object(snapshot)
    }

    /// Tally entries per status, memoized by generation: repeated calls
    /// against unchanged state return the same shared tally, any transition
    /// produces a fresh one.
    pub fn count_selectors_by_status(&self) -> Arc<StatusCounts> {
        let mut memo = self.counts_memo.lock();
        if let Some((generation, counts)) = &*memo {
            if *generation == self.generation() {
                return counts.clone();
            }
        }

        let mut counts = StatusCounts::default();
        for map in self.selectors().values() {
            map.for_each(|_, status| match status {
                ResolutionStatus::Resolving => counts.resolving += 1,
                ResolutionStatus::Finished => counts.finished += 1,
                ResolutionStatus::Failed(_) => counts.failed += 1,
            });
        }

        let counts = Arc::new(counts);
        *memo = Some((self.generation(), counts.clone()));
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::state::ResolutionAction;
    use serde_json::json;

    fn start(state: &mut ResolutionState, selector: &str, args: Vec<Value>) {
        state.apply(ResolutionAction::Start {
            selector: selector.into(),
            args,
        });
    }

    #[test]
    fn test_is_resolving_lifecycle() {
        let mut state = ResolutionState::new();
        assert!(!state.is_resolving("f", &[json!(1)]));

        start(&mut state, "f", vec![json!(1)]);
        assert!(state.is_resolving("f", &[json!(1)]));
        assert!(state.has_started_resolution("f", &[json!(1)]));
        assert!(!state.has_finished_resolution("f", &[json!(1)]));

        state.apply(ResolutionAction::Finish {
            selector: "f".into(),
            args: vec![json!(1)],
        });
        assert!(!state.is_resolving("f", &[json!(1)]));
        assert!(state.has_finished_resolution("f", &[json!(1)]));
    }

    #[test]
    fn test_null_failure_counts_as_failed() {
        let mut state = ResolutionState::new();
        state.apply(ResolutionAction::Fail {
            selector: "f".into(),
            args: vec![json!(1)],
            error: json!(null),
        });

        assert!(state.has_resolution_failed("f", &[json!(1)]));
        assert!(state.has_finished_resolution("f", &[json!(1)]));
        assert_eq!(state.resolution_error("f", &[json!(1)]), Some(json!(null)));
        assert!(!state.is_resolving("f", &[json!(1)]));
    }

    #[test]
    fn test_error_cleared_by_fresh_resolution() {
        let mut state = ResolutionState::new();
        state.apply(ResolutionAction::Fail {
            selector: "f".into(),
            args: vec![json!(1)],
            error: json!("boom"),
        });
        state.apply(ResolutionAction::Invalidate {
            selector: "f".into(),
            args: vec![json!(1)],
        });
        start(&mut state, "f", vec![json!(1)]);
        state.apply(ResolutionAction::Finish {
            selector: "f".into(),
            args: vec![json!(1)],
        });

        assert!(!state.has_resolution_failed("f", &[json!(1)]));
        assert_eq!(state.resolution_error("f", &[json!(1)]), None);
    }

    #[test]
    fn test_has_resolving_selectors() {
        let mut state = ResolutionState::new();
        assert!(!state.has_resolving_selectors());

        start(&mut state, "a", vec![]);
        assert!(state.has_resolving_selectors());

        state.apply(ResolutionAction::Finish {
            selector: "a".into(),
            args: vec![],
        });
        assert!(!state.has_resolving_selectors());
    }

    #[test]
    fn test_count_selectors_by_status() {
        let mut state = ResolutionState::new();
        start(&mut state, "a", vec![json!(1)]);
        start(&mut state, "a", vec![json!(2)]);
        start(&mut state, "b", vec![]);
        state.apply(ResolutionAction::Finish {
            selector: "a".into(),
            args: vec![json!(1)],
        });
        state.apply(ResolutionAction::Finish {
            selector: "a".into(),
            args: vec![json!(2)],
        });

        let counts = state.count_selectors_by_status();
        assert_eq!(
            *counts,
            StatusCounts {
                resolving: 1,
                finished: 2,
                failed: 0
            }
        );
    }

    #[test]
    fn test_count_memoized_by_generation() {
        let mut state = ResolutionState::new();
        start(&mut state, "a", vec![]);

        let first = state.count_selectors_by_status();
        let second = state.count_selectors_by_status();
        assert!(Arc::ptr_eq(&first, &second));

        state.apply(ResolutionAction::Finish {
            selector: "a".into(),
            args: vec![],
        });
        let third = state.count_selectors_by_status();
        assert!(!Arc::ptr_eq(&second, &third));
        assert_eq!(third.finished, 1);
    }

    #[test]
    fn test_cached_resolvers_snapshot() {
        let mut state = ResolutionState::new();
        start(&mut state, "f", vec![json!(1)]);
        state.apply(ResolutionAction::Fail {
            selector: "f".into(),
            args: vec![json!(2)],
            error: json!("bad"),
        });

        let snapshot = state.cached_resolvers();
        let entries = snapshot["f"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries
            .iter()
            .any(|e| e["status"] == "resolving" && e["args"] == json!([1])));
        assert!(entries
            .iter()
            .any(|e| e["status"] == "error" && e["error"] == "bad"));
    }
}
