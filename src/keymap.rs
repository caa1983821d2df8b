//! A map keyed by deep value equality.
//!
//! Scalar keys (`null`, booleans, numbers, strings) live in a flat map with
//! strict value equality. Composite keys (arrays, objects) are routed into
//! one of two prefix trees so that keys with the same shape and contents hit
//! the same entry regardless of how they were assembled: object keys walk
//! alternating property-name (lexicographically sorted) and property-value
//! edges, array keys walk element-value edges in order.
//!
//! Removal is a tombstone: the slot's value is blanked but tree nodes stay
//! allocated. Iteration filters tombstones, so callers never observe phantom
//! entries.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Structural hash over a JSON value with object properties visited in
/// sorted order, so hashing agrees with `serde_json`'s order-insensitive
/// object equality.
pub(crate) fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => 0u8.hash(state),
        Value::Bool(b) => {
            1u8.hash(state);
            b.hash(state);
        }
        Value::Number(n) => {
            2u8.hash(state);
            n.hash(state);
        }
        Value::String(s) => {
            3u8.hash(state);
            s.hash(state);
        }
        Value::Array(items) => {
            4u8.hash(state);
            items.len().hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Object(map) => {
            5u8.hash(state);
            map.len().hash(state);
            let mut names: Vec<&String> = map.keys().collect();
            names.sort_unstable();
            for name in names {
                name.hash(state);
                hash_value(&map[name], state);
            }
        }
    }
}

/// A JSON value usable as a hash-map key, compared by deep equality.
#[derive(Clone, Debug)]
pub(crate) struct DeepKey(pub Value);

impl PartialEq for DeepKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for DeepKey {}

impl Hash for DeepKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_value(&self.0, state);
    }
}

/// Scalar key forms stored in the flat map.
#[derive(Clone, PartialEq, Eq, Hash)]
enum ScalarKey {
    Null,
    Bool(bool),
    Num(serde_json::Number),
    Str(String),
}

fn scalar_key(key: &Value) -> Option<ScalarKey> {
    match key {
        Value::Null => Some(ScalarKey::Null),
        Value::Bool(b) => Some(ScalarKey::Bool(*b)),
        Value::Number(n) => Some(ScalarKey::Num(n.clone())),
        Value::String(s) => Some(ScalarKey::Str(s.clone())),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Edge in a composite-key prefix tree.
#[derive(Clone, PartialEq, Eq, Hash)]
enum Edge {
    /// Property-name level (object keys only).
    Name(String),
    /// Property- or element-value level, compared by deep equality.
    Val(DeepKey),
}

fn path_edges(key: &Value) -> Vec<Edge> {
    match key {
        Value::Array(items) => items
            .iter()
            .map(|item| Edge::Val(DeepKey(item.clone())))
            .collect(),
        Value::Object(map) => {
            let mut names: Vec<&String> = map.keys().collect();
            names.sort_unstable();
            let mut edges = Vec::with_capacity(names.len() * 2);
            for name in names {
                edges.push(Edge::Name(name.clone()));
                edges.push(Edge::Val(DeepKey(map[name].clone())));
            }
            edges
        }
        _ => Vec::new(),
    }
}

#[derive(Default)]
struct Node {
    children: HashMap<Edge, Node>,
    /// Index into the slot slab for the key terminating at this node.
    leaf: Option<usize>,
}

impl Node {
    fn walk(&self, edges: &[Edge]) -> Option<usize> {
        let mut node = self;
        for edge in edges {
            node = node.children.get(edge)?;
        }
        node.leaf
    }

    fn walk_or_create(&mut self, edges: Vec<Edge>) -> &mut Option<usize> {
        let mut node = self;
        for edge in edges {
            node = node.children.entry(edge).or_default();
        }
        &mut node.leaf
    }
}

struct Slot<V> {
    key: Value,
    /// None marks a tombstone left behind by `remove`.
    value: Option<V>,
}

/// A map whose composite keys compare by deep equality.
pub struct EquivalentKeyMap<V> {
    scalars: HashMap<ScalarKey, usize>,
    arrays: Node,
    objects: Node,
    slots: Vec<Slot<V>>,
    /// Most recently touched (key, slot) pair; equal-key lookups skip the
    /// tree walk entirely.
    recent: Mutex<Option<(Value, usize)>>,
    live: usize,
}

impl<V> EquivalentKeyMap<V> {
    pub fn new() -> Self {
        Self {
            scalars: HashMap::new(),
            arrays: Node::default(),
            objects: Node::default(),
            slots: Vec::new(),
            recent: Mutex::new(None),
            live: 0,
        }
    }

    /// Number of live (non-tombstoned) entries.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn recent_slot(&self, key: &Value) -> Option<usize> {
        let recent = self.recent.lock();
        match &*recent {
            Some((recent_key, index)) if recent_key == key => Some(*index),
            _ => None,
        }
    }

    fn remember(&self, key: &Value, index: usize) {
        *self.recent.lock() = Some((key.clone(), index));
    }

    fn find_slot(&self, key: &Value) -> Option<usize> {
        if let Some(index) = self.recent_slot(key) {
            return Some(index);
        }
        let index = match scalar_key(key) {
            Some(scalar) => *self.scalars.get(&scalar)?,
            None => {
                let edges = path_edges(key);
                match key {
                    Value::Array(_) => self.arrays.walk(&edges)?,
                    _ => self.objects.walk(&edges)?,
                }
            }
        };
        self.remember(key, index);
        Some(index)
    }

    /// Insert or replace the value for an equivalent key. Replacing an
    /// equivalent key repoints the fast path at the newly supplied key.
    pub fn insert(&mut self, key: Value, value: V) {
        let existing = if let Some(index) = self.recent_slot(&key) {
            Some(index)
        } else {
            match scalar_key(&key) {
                Some(scalar) => self.scalars.get(&scalar).copied(),
                None => {
                    let edges = path_edges(&key);
                    match &key {
                        Value::Array(_) => self.arrays.walk(&edges),
                        _ => self.objects.walk(&edges),
                    }
                }
            }
        };

        let index = match existing {
            Some(index) => index,
            None => {
                let index = self.slots.len();
                self.slots.push(Slot {
                    key: key.clone(),
                    value: None,
                });
                match scalar_key(&key) {
                    Some(scalar) => {
                        self.scalars.insert(scalar, index);
                    }
                    None => {
                        let edges = path_edges(&key);
                        let leaf = match &key {
                            Value::Array(_) => self.arrays.walk_or_create(edges),
                            _ => self.objects.walk_or_create(edges),
                        };
                        *leaf = Some(index);
                    }
                }
                index
            }
        };

        let slot = &mut self.slots[index];
        if slot.value.is_none() {
            self.live += 1;
        }
        slot.value = Some(value);
        slot.key = key.clone();
        self.remember(&key, index);
    }

    pub fn get(&self, key: &Value) -> Option<&V> {
        let index = self.find_slot(key)?;
        self.slots[index].value.as_ref()
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    /// Tombstone the entry for an equivalent key. Returns true if a live
    /// entry was removed. Tree nodes and the slot stay allocated.
    pub fn remove(&mut self, key: &Value) -> bool {
        let Some(index) = self.find_slot(key) else {
            return false;
        };
        let slot = &mut self.slots[index];
        if slot.value.take().is_some() {
            self.live -= 1;
            true
        } else {
            false
        }
    }

    /// Visit every live entry.
    pub fn for_each(&self, mut f: impl FnMut(&Value, &V)) {
        for slot in &self.slots {
            if let Some(value) = &slot.value {
                f(&slot.key, value);
            }
        }
    }

    /// Iterator over live values.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.slots.iter().filter_map(|slot| slot.value.as_ref())
    }

    /// True if any live value matches the predicate.
    pub fn any(&self, mut predicate: impl FnMut(&V) -> bool) -> bool {
        self.values().any(|v| predicate(v))
    }

    pub fn clear(&mut self) {
        self.scalars.clear();
        self.arrays = Node::default();
        self.objects = Node::default();
        self.slots.clear();
        *self.recent.lock() = None;
        self.live = 0;
    }
}

impl<V> Default for EquivalentKeyMap<V> {
    fn default() -> Self {
        Self::new()
    }
}
