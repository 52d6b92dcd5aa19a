//! Traversal-scoped state: the active path of in-progress pointers, the set
//! of circular pointers found, and the wall-clock deadline.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::graph::NodeId;

/// Pointers currently being resolved, each mapped to the node reserved for
/// its result. A pointer met again while still on this path is circular.
#[derive(Debug, Default)]
pub struct CycleTracker {
    active: HashMap<String, NodeId>,
    order: Vec<String>,
}

impl CycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a pointer onto the active path.
    ///
    /// Returns `false` (and changes nothing) if the pointer is already active.
    pub fn enter(&mut self, key: &str, node: NodeId) -> bool {
        if self.active.contains_key(key) {
            return false;
        }
        self.active.insert(key.to_string(), node);
        self.order.push(key.to_string());
        true
    }

    /// Pop the most recently entered pointer.
    pub fn leave(&mut self) {
        if let Some(key) = self.order.pop() {
            self.active.remove(&key);
        }
    }

    /// The node reserved for `key` if it is on the active path.
    pub fn active(&self, key: &str) -> Option<NodeId> {
        self.active.get(key).copied()
    }

    pub fn depth(&self) -> usize {
        self.order.len()
    }
}

/// Pointers discovered to be circular during one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CircularRefSet(BTreeSet<String>);

impl CircularRefSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pointer; returns `true` if it was not yet present.
    pub fn insert(&mut self, pointer: impl Into<String>) -> bool {
        self.0.insert(pointer.into())
    }

    pub fn contains(&self, pointer: &str) -> bool {
        self.0.contains(pointer)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Wall-clock budget, checked at traversal-step granularity.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Returns the elapsed time once the budget is spent.
    pub fn expired(&self) -> Option<Duration> {
        let limit = self.limit?;
        let elapsed = self.started.elapsed();
        (elapsed >= limit).then_some(elapsed)
    }
}
