//! Dependency-keyed memoization for pure selectors.
//!
//! A [`MemoizedSelector`] caches results per dependency class. Dependants
//! that are shared state handles index into a pointer-keyed tree whose edges
//! hold weak handles, so a cache class dies with the state version that
//! anchored it. A scalar dependant forces the single fallback cache, which
//! is instead invalidated by shallow comparison against the previous call's
//! dependant list.
//!
//! Within a class, entries are kept in recency order keyed by the trailing
//! argument tuple; hits promote, misses compute and insert, and nothing is
//! evicted explicitly.

use crate::types::StateRef;
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// A cache-validity input for a memoized selector.
#[derive(Clone)]
pub enum Dependant {
    /// Shared state handle; identity by pointer, liveness by weak handle.
    Shared(StateRef),
    /// Plain value; compared by equality in the fallback cache.
    Scalar(Value),
}

/// The wrapped pure computation.
pub type SelectorFn = Arc<dyn Fn(&StateRef, &[Value]) -> Value + Send + Sync>;

/// Computes the dependant list for a call.
pub type DependantsFn = Arc<dyn Fn(&StateRef, &[Value]) -> Vec<Dependant> + Send + Sync>;

/// Argument tuple key (source excluded), hashed structurally.
#[derive(Clone, PartialEq, Eq)]
struct ArgsKey(Vec<Value>);

impl Hash for ArgsKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for value in &self.0 {
            crate::keymap::hash_value(value, state);
        }
    }
}

struct EntryCache {
    entries: LruCache<ArgsKey, Value>,
}

impl EntryCache {
    fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
        }
    }
}

#[derive(Default)]
struct TreeNode {
    children: HashMap<usize, TreeEdge>,
    leaf: Option<EntryCache>,
}

struct TreeEdge {
    /// Liveness anchor; a failed upgrade means the address was recycled and
    /// the edge (and everything under it) is stale.
    anchor: Weak<Value>,
    node: TreeNode,
}

struct Fallback {
    dependants: Vec<Dependant>,
    cache: EntryCache,
}

/// A memoizing wrapper around a pure selector.
pub struct MemoizedSelector {
    selector: SelectorFn,
    get_dependants: DependantsFn,
    tree: Mutex<TreeNode>,
    fallback: Mutex<Option<Fallback>>,
}

fn shallow_eq(a: &[Dependant], b: &[Dependant]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| match (x, y) {
            (Dependant::Shared(p), Dependant::Shared(q)) => Arc::ptr_eq(p, q),
            (Dependant::Scalar(p), Dependant::Scalar(q)) => p == q,
            _ => false,
        })
}

impl MemoizedSelector {
    /// Memoize a selector on its source state handle: the cache class is
    /// the state version itself.
    pub fn new(selector: impl Fn(&StateRef, &[Value]) -> Value + Send + Sync + 'static) -> Self {
        Self::with_dependants(selector, |source: &StateRef, _args: &[Value]| {
            vec![Dependant::Shared(source.clone())]
        })
    }

    /// Memoize a selector with an explicit dependant computation.
    pub fn with_dependants(
        selector: impl Fn(&StateRef, &[Value]) -> Value + Send + Sync + 'static,
        get_dependants: impl Fn(&StateRef, &[Value]) -> Vec<Dependant> + Send + Sync + 'static,
    ) -> Self {
        Self {
            selector: Arc::new(selector),
            get_dependants: Arc::new(get_dependants),
            tree: Mutex::new(TreeNode::default()),
            fallback: Mutex::new(None),
        }
    }

    /// Compute the dependant list as it would be for a call.
    pub fn dependants(&self, source: &StateRef, args: &[Value]) -> Vec<Dependant> {
        (self.get_dependants)(source, args)
    }

    /// Invoke the selector, serving a cached result when the dependency
    /// class and argument tuple both hit.
    pub fn call(&self, source: &StateRef, args: &[Value]) -> Value {
        let dependants = (self.get_dependants)(source, args);

        if let Some(hit) = self.lookup(&dependants, args) {
            return hit;
        }

        // Computed outside the cache locks so a selector is free to call
        // other memoized selectors.
        let computed = (self.selector)(source, args);
        self.store(&dependants, args, computed.clone());
        computed
    }

    /// Drop every dependency class at once.
    pub fn clear(&self) {
        *self.tree.lock() = TreeNode::default();
        *self.fallback.lock() = None;
    }

    fn all_shared(dependants: &[Dependant]) -> bool {
        dependants
            .iter()
            .all(|d| matches!(d, Dependant::Shared(_)))
    }

    fn lookup(&self, dependants: &[Dependant], args: &[Value]) -> Option<Value> {
        let key = ArgsKey(args.to_vec());

        if Self::all_shared(dependants) {
            let mut tree = self.tree.lock();
            let mut node = &mut *tree;
            for dependant in dependants {
                let Dependant::Shared(anchor) = dependant else {
                    unreachable!();
                };
                let ptr = Arc::as_ptr(anchor) as usize;
                if node.children.get(&ptr)?.anchor.strong_count() == 0 {
                    // Address recycled by a new state version.
                    node.children.remove(&ptr);
                    return None;
                }
                node = &mut node.children.get_mut(&ptr)?.node;
            }
            node.leaf.as_mut()?.entries.get(&key).cloned()
        } else {
            let mut fallback = self.fallback.lock();
            let slot = fallback.as_mut()?;
            if !shallow_eq(&slot.dependants, dependants) {
                return None;
            }
            slot.cache.entries.get(&key).cloned()
        }
    }

    fn store(&self, dependants: &[Dependant], args: &[Value], result: Value) {
        let key = ArgsKey(args.to_vec());

        if Self::all_shared(dependants) {
            let mut tree = self.tree.lock();
            let mut node = &mut *tree;
            for dependant in dependants {
                let Dependant::Shared(anchor) = dependant else {
                    unreachable!();
                };
                let ptr = Arc::as_ptr(anchor) as usize;
                // Sweep siblings whose anchoring state version is gone. A
                // surviving edge at `ptr` is therefore the same live
                // allocation as `anchor`, never a recycled address.
                node.children
                    .retain(|_, edge| edge.anchor.strong_count() > 0);
                let edge = node.children.entry(ptr).or_insert_with(|| TreeEdge {
                    anchor: Arc::downgrade(anchor),
                    node: TreeNode::default(),
                });
                node = &mut edge.node;
            }
            node.leaf
                .get_or_insert_with(EntryCache::new)
                .entries
                .put(key, result);
        } else {
            let mut fallback = self.fallback.lock();
            let valid = fallback
                .as_ref()
                .is_some_and(|slot| shallow_eq(&slot.dependants, dependants));
            if !valid {
                *fallback = Some(Fallback {
                    dependants: dependants.to_vec(),
                    cache: EntryCache::new(),
                });
            }
            if let Some(slot) = fallback.as_mut() {
                slot.cache.entries.put(key, result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_selector(
        counter: Arc<AtomicUsize>,
    ) -> impl Fn(&StateRef, &[Value]) -> Value + Send + Sync + 'static {
        move |source, args| {
            counter.fetch_add(1, Ordering::SeqCst);
            json!({ "state": (**source).clone(), "args": args })
        }
    }

    #[test]
    fn test_cache_hit_same_state_handle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let memo = MemoizedSelector::new(counting_selector(calls.clone()));

        let state: StateRef = Arc::new(json!({"items": [1, 2]}));
        let first = memo.call(&state, &[json!(1)]);
        let second = memo.call(&state, &[json!(1)]);

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_different_args_recompute() {
        let calls = Arc::new(AtomicUsize::new(0));
        let memo = MemoizedSelector::new(counting_selector(calls.clone()));

        let state: StateRef = Arc::new(json!(1));
        memo.call(&state, &[json!(1)]);
        memo.call(&state, &[json!(2)]);
        memo.call(&state, &[json!(1)]);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_new_state_handle_recomputes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let memo = MemoizedSelector::new(counting_selector(calls.clone()));

        let a: StateRef = Arc::new(json!(1));
        let b: StateRef = Arc::new(json!(1));
        memo.call(&a, &[]);
        memo.call(&b, &[]);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_identical_dependants_across_source_handles() {
        // Two source handles sharing the same dependant object must share
        // the cached result.
        let calls = Arc::new(AtomicUsize::new(0));
        let shared: StateRef = Arc::new(json!({"items": [1, 2, 3]}));
        let dep = shared.clone();
        let memo = MemoizedSelector::with_dependants(
            counting_selector(calls.clone()),
            move |_source, _args| vec![Dependant::Shared(dep.clone())],
        );

        let source_a: StateRef = Arc::new(json!("a"));
        let source_b: StateRef = Arc::new(json!("b"));
        let first = memo.call(&source_a, &[json!(0)]);
        let second = memo.call(&source_b, &[json!(0)]);

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scalar_dependant_fallback_invalidation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let memo = MemoizedSelector::with_dependants(
            counting_selector(calls.clone()),
            |_source, args| vec![Dependant::Scalar(args.first().cloned().unwrap_or(Value::Null))],
        );

        let state: StateRef = Arc::new(json!(null));
        memo.call(&state, &[json!("x")]);
        memo.call(&state, &[json!("x")]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A different scalar dependant clears the fallback cache.
        memo.call(&state, &[json!("y")]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // The earlier class is gone: returning to it recomputes.
        memo.call(&state, &[json!("x")]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_dead_dependant_class_pruned() {
        let calls = Arc::new(AtomicUsize::new(0));
        let memo = MemoizedSelector::new(counting_selector(calls.clone()));

        {
            let state: StateRef = Arc::new(json!([1]));
            memo.call(&state, &[]);
        }
        // The old class is unreachable; a fresh handle computes anew even
        // if the allocator recycles the address.
        let state: StateRef = Arc::new(json!([1]));
        memo.call(&state, &[]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stale_edge_pruned_mid_walk() {
        // Two shared dependants: a long-lived outer anchor and the source
        // itself, so lookups descend two tree levels.
        let calls = Arc::new(AtomicUsize::new(0));
        let anchor: StateRef = Arc::new(json!("outer"));
        let outer = anchor.clone();
        let memo = MemoizedSelector::with_dependants(
            counting_selector(calls.clone()),
            move |source, _args| {
                vec![
                    Dependant::Shared(outer.clone()),
                    Dependant::Shared(source.clone()),
                ]
            },
        );

        let first: StateRef = Arc::new(json!([1]));
        memo.call(&first, &[]);
        memo.call(&first, &[]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        drop(first);
        let second: StateRef = Arc::new(json!([2]));
        memo.call(&second, &[]);
        memo.call(&second, &[]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dead_edges_swept_on_insert() {
        let memo = MemoizedSelector::new(|_s, _a| Value::Null);
        for i in 0..16 {
            let state: StateRef = Arc::new(json!(i));
            memo.call(&state, &[]);
        }
        // Each dropped state version's edge is swept by the next insert.
        assert_eq!(memo.tree.lock().children.len(), 1);
    }

    #[test]
    fn test_clear_invalidates_everything() {
        let calls = Arc::new(AtomicUsize::new(0));
        let memo = MemoizedSelector::new(counting_selector(calls.clone()));

        let state: StateRef = Arc::new(json!(1));
        memo.call(&state, &[]);
        memo.clear();
        memo.call(&state, &[]);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dependants_accessor() {
        let memo = MemoizedSelector::new(|_s, _a| Value::Null);
        let state: StateRef = Arc::new(json!(1));
        let deps = memo.dependants(&state, &[]);
        assert_eq!(deps.len(), 1);
        assert!(matches!(&deps[0], Dependant::Shared(p) if Arc::ptr_eq(p, &state)));
    }
}
