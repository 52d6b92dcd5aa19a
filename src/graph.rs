//! Arena document model.
//!
//! A dereferenced document may be genuinely cyclic: a schema's property can
//! point back at the schema itself. Nodes therefore live in a flat arena and
//! refer to their children by [`NodeId`], so an edge back to an ancestor is
//! just another handle.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

use crate::pointer::{push_token, tokens};

/// Stable handle of a node within one [`DocumentGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A single node. Containers hold handles, never owned children.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<NodeId>),
    Object(IndexMap<String, NodeId>),
}

#[derive(Debug, Clone)]
pub struct DocumentGraph {
    nodes: Vec<Node>,
    root: NodeId,
}

impl DocumentGraph {
    /// A graph with a single `null` root, to be filled by a builder.
    pub(crate) fn empty() -> Self {
        Self {
            nodes: vec![Node::Null],
            root: NodeId(0),
        }
    }

    /// Copy a tree value into a fresh graph. No node is shared.
    pub fn from_value(value: &Value) -> Self {
        let mut graph = Self {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        graph.root = graph.insert_value(value);
        graph
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn set_root(&mut self, id: NodeId) {
        self.root = id;
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Allocate a placeholder whose content is set once it is known.
    pub(crate) fn reserve(&mut self) -> NodeId {
        self.push(Node::Null)
    }

    pub(crate) fn set(&mut self, id: NodeId, node: Node) {
        self.nodes[id.0] = node;
    }

    /// Copy a tree value into the arena, returning the new subtree's root.
    pub(crate) fn insert_value(&mut self, value: &Value) -> NodeId {
        match value {
            Value::Null => self.push(Node::Null),
            Value::Bool(b) => self.push(Node::Bool(*b)),
            Value::Number(n) => self.push(Node::Number(n.clone())),
            Value::String(s) => self.push(Node::String(s.clone())),
            Value::Array(arr) => {
                let id = self.reserve();
                let items = arr.iter().map(|item| self.insert_value(item)).collect();
                self.set(id, Node::Array(items));
                id
            }
            Value::Object(map) => {
                let id = self.reserve();
                let entries = map
                    .iter()
                    .map(|(k, v)| (k.clone(), self.insert_value(v)))
                    .collect();
                self.set(id, Node::Object(entries));
                id
            }
        }
    }

    /// Child of an object node by key.
    pub fn get(&self, id: NodeId, key: &str) -> Option<NodeId> {
        match self.node(id) {
            Node::Object(entries) => entries.get(key).copied(),
            _ => None,
        }
    }

    /// Child of an array node by index.
    pub fn index(&self, id: NodeId, i: usize) -> Option<NodeId> {
        match self.node(id) {
            Node::Array(items) => items.get(i).copied(),
            _ => None,
        }
    }

    /// Navigate a JSON Pointer (no leading `#`) from the root.
    pub fn pointer(&self, pointer: &str) -> Option<NodeId> {
        let mut current = self.root;
        for token in tokens(pointer) {
            current = match self.node(current) {
                Node::Object(entries) => *entries.get(&token)?,
                Node::Array(items) => *items.get(token.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// String content of a node, if it is a string.
    pub fn as_str(&self, id: NodeId) -> Option<&str> {
        match self.node(id) {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether any node is reachable from itself.
    pub fn is_cyclic(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            OnPath,
            Done,
        }

        let mut marks = vec![Mark::New; self.nodes.len()];
        let mut stack: Vec<(NodeId, usize)> = vec![(self.root, 0)];
        marks[self.root.0] = Mark::OnPath;

        while let Some((id, next)) = stack.last().copied() {
            let child = match self.node(id) {
                Node::Array(items) => items.get(next).copied(),
                Node::Object(entries) => entries.get_index(next).map(|(_, c)| *c),
                _ => None,
            };

            match child {
                Some(child) => {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    match marks[child.0] {
                        Mark::OnPath => return true,
                        Mark::New => {
                            marks[child.0] = Mark::OnPath;
                            stack.push((child, 0));
                        }
                        Mark::Done => {}
                    }
                }
                None => {
                    marks[id.0] = Mark::Done;
                    stack.pop();
                }
            }
        }
        false
    }

    /// Expand the graph into a tree value.
    ///
    /// Shared nodes are copied at each use. An edge back to a node that is
    /// still being expanded becomes `{"$ref": "#<ancestor location>"}`.
    pub fn to_value(&self) -> Value {
        self.value_of(self.root)
    }

    /// Expand the subgraph rooted at `id`; back-edges point at locations
    /// relative to that subgraph.
    pub fn value_of(&self, id: NodeId) -> Value {
        let mut on_path = HashMap::new();
        self.expand(id, String::new(), &mut on_path)
    }

    fn expand(&self, id: NodeId, location: String, on_path: &mut HashMap<NodeId, String>) -> Value {
        if let Some(ancestor) = on_path.get(&id) {
            let mut map = Map::new();
            map.insert("$ref".to_string(), Value::String(format!("#{}", ancestor)));
            return Value::Object(map);
        }

        match self.node(id) {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Number(n) => Value::Number(n.clone()),
            Node::String(s) => Value::String(s.clone()),
            Node::Array(items) => {
                on_path.insert(id, location.clone());
                let out = items
                    .iter()
                    .enumerate()
                    .map(|(i, child)| {
                        self.expand(*child, push_token(&location, &i.to_string()), on_path)
                    })
                    .collect();
                on_path.remove(&id);
                Value::Array(out)
            }
            Node::Object(entries) => {
                on_path.insert(id, location.clone());
                let mut out = Map::new();
                for (key, child) in entries {
                    let value = self.expand(*child, push_token(&location, key), on_path);
                    out.insert(key.clone(), value);
                }
                on_path.remove(&id);
                Value::Object(out)
            }
        }
    }
}
