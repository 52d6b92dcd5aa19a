//! Dereferencing: replace every reference node with its resolved target.
//!
//! The walk copies the input into a [`DocumentGraph`]. Every container is
//! registered under its canonical pointer while it is being built (the active
//! path) and after it is finished (the memo), so:
//!
//! - a pointer resolved once is never resolved again; later references get
//!   the same node handle, bounding work by the number of distinct pointers;
//! - a pointer that reaches a node still on the active path is circular, and
//!   is handled per [`CircularMode`].

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::cycle::{CircularRefSet, CycleTracker, Deadline};
use crate::error::ResolveError;
use crate::graph::{DocumentGraph, Node, NodeId};
use crate::loader::{DocumentSource, FileSource, Resources};
use crate::pointer::{follow, push_token, ref_in_map, Followed, Reference, Target};
use crate::types::{CircularMode, DereferenceOptions};

/// A reference that could not be resolved; its node was left as written.
#[derive(Debug)]
pub struct RefFailure {
    /// Where the reference node sits (`#/...` in the root document, or
    /// `resource#/...` inside an external one).
    pub location: String,
    /// The `$ref` string as written.
    pub pointer: String,
    pub error: ResolveError,
}

/// Result of a dereference pass.
#[derive(Debug)]
pub struct Dereferenced {
    /// The resolved document. Cyclic when circular references were allowed.
    pub graph: DocumentGraph,
    /// Pointers found to revisit an in-progress ancestor.
    pub circular: CircularRefSet,
    /// Per-branch failures (empty unless running best-effort).
    pub failures: Vec<RefFailure>,
}

impl Dereferenced {
    /// Expand into a tree; cycles become `$ref`s to the ancestor location.
    pub fn to_value(&self) -> Value {
        self.graph.to_value()
    }

    /// True when every reference resolved.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Dereference a document, fetching external resources from the filesystem
/// or network.
///
/// # Errors
///
/// Returns `CircularReferenceForbidden` in `Forbid` mode, `Timeout` when the
/// deadline passes, and the first resolution failure when `fail_fast` is set.
pub fn dereference(doc: &Value, options: &DereferenceOptions) -> Result<Dereferenced, ResolveError> {
    dereference_with(doc, options, &FileSource)
}

/// Dereference a document, fetching external resources through `source`.
pub fn dereference_with(
    doc: &Value,
    options: &DereferenceOptions,
    source: &dyn DocumentSource,
) -> Result<Dereferenced, ResolveError> {
    let resources = Resources::new(
        doc,
        options.base_location.as_deref(),
        source,
        options.resolve_external,
    );
    let root_location = resources.root_location().to_string();

    let mut walk = Walk {
        options,
        resources,
        graph: DocumentGraph::empty(),
        tracker: CycleTracker::new(),
        memo: HashMap::new(),
        circular: CircularRefSet::new(),
        failures: Vec::new(),
        deadline: Deadline::new(options.timeout),
    };

    let root = walk.build(doc, &root_location, String::new())?;
    walk.graph.set_root(root);

    debug!(
        nodes = walk.graph.len(),
        pointers = walk.memo.len(),
        circular = walk.circular.len(),
        failures = walk.failures.len(),
        "dereference complete"
    );

    Ok(Dereferenced {
        graph: walk.graph,
        circular: walk.circular,
        failures: walk.failures,
    })
}

struct Walk<'o, 's> {
    options: &'o DereferenceOptions,
    resources: Resources<'s>,
    graph: DocumentGraph,
    tracker: CycleTracker,
    memo: HashMap<String, NodeId>,
    circular: CircularRefSet,
    failures: Vec<RefFailure>,
    deadline: Deadline,
}

impl Walk<'_, '_> {
    /// Build `value`, found at `pointer` inside the resource at `location`.
    fn build(&mut self, value: &Value, location: &str, pointer: String) -> Result<NodeId, ResolveError> {
        if let Some(elapsed) = self.deadline.expired() {
            return Err(ResolveError::Timeout { elapsed });
        }

        match value {
            Value::Object(map) => {
                if let Some(raw) = ref_in_map(map) {
                    return self.build_ref(map, raw, location, &pointer);
                }
                self.build_container(location, pointer, |walk, at| {
                    let mut entries = IndexMap::with_capacity(map.len());
                    for (key, child) in map {
                        let id = walk.build(child, location, push_token(at, key))?;
                        entries.insert(key.clone(), id);
                    }
                    Ok(Node::Object(entries))
                })
            }
            Value::Array(arr) => self.build_container(location, pointer, |walk, at| {
                let mut items = Vec::with_capacity(arr.len());
                for (i, child) in arr.iter().enumerate() {
                    items.push(walk.build(child, location, push_token(at, &i.to_string()))?);
                }
                Ok(Node::Array(items))
            }),
            scalar => Ok(self.graph.insert_value(scalar)),
        }
    }

    /// Reserve a node for a container, keep it on the active path while its
    /// children are built, then memoize it.
    fn build_container<F>(&mut self, location: &str, pointer: String, fill: F) -> Result<NodeId, ResolveError>
    where
        F: FnOnce(&mut Self, &str) -> Result<Node, ResolveError>,
    {
        let key = format!("{}#{}", location, pointer);
        if let Some(id) = self.memo.get(&key) {
            return Ok(*id);
        }

        let id = self.graph.reserve();
        let entered = self.tracker.enter(&key, id);
        let node = fill(self, &pointer)?;
        self.graph.set(id, node);
        if entered {
            self.tracker.leave();
        }
        self.memo.insert(key, id);
        Ok(id)
    }

    fn build_ref(
        &mut self,
        map: &Map<String, Value>,
        raw: &str,
        location: &str,
        pointer: &str,
    ) -> Result<NodeId, ResolveError> {
        let followed = Reference::parse(raw).and_then(|reference| {
            let start = self.resources.absolute(location, &reference);
            follow(&mut self.resources, start, raw)
        });
        let resolved = match followed {
            Ok(Followed::Value(resolved)) => resolved,
            Ok(Followed::Loop { target }) => {
                return self.circular_ref(map, &target, None);
            }
            Err(error) => return self.branch_failure(map, raw, location, pointer, error),
        };

        let key = resolved.target.key();
        let target_id = if let Some(id) = self.memo.get(&key) {
            *id
        } else if let Some(id) = self.tracker.active(&key) {
            return self.circular_ref(map, &resolved.target, Some(id));
        } else {
            let id = self.build(
                resolved.value(),
                &resolved.target.location,
                resolved.target.pointer.clone(),
            )?;
            self.memo.insert(key, id);
            id
        };

        for link in &resolved.chain {
            self.memo.entry(link.clone()).or_insert(target_id);
        }

        if map.len() > 1 {
            return self.merge_siblings(map, target_id, location, pointer);
        }
        Ok(target_id)
    }

    /// Extended reference: the target's entries overlaid with the reference
    /// node's own keys.
    fn merge_siblings(
        &mut self,
        map: &Map<String, Value>,
        target_id: NodeId,
        location: &str,
        pointer: &str,
    ) -> Result<NodeId, ResolveError> {
        let Node::Object(target_entries) = self.graph.node(target_id) else {
            return Ok(target_id);
        };
        let mut merged = target_entries.clone();
        for (key, child) in map {
            if key == "$ref" {
                continue;
            }
            let id = self.build(child, location, push_token(pointer, key))?;
            merged.insert(key.clone(), id);
        }
        Ok(self.graph.push(Node::Object(merged)))
    }

    /// A reference that revisits an in-progress ancestor.
    ///
    /// `ancestor` is the node reserved for it, or `None` for a chain of pure
    /// references that loops without reaching a value.
    fn circular_ref(
        &mut self,
        map: &Map<String, Value>,
        target: &Target,
        ancestor: Option<NodeId>,
    ) -> Result<NodeId, ResolveError> {
        let root_location = self.resources.root_location();
        let pointer = target.to_ref(root_location);

        if self.options.circular == CircularMode::Forbid {
            return Err(ResolveError::CircularReferenceForbidden { pointer });
        }

        trace!(pointer = %pointer, "circular reference");
        if self.circular.insert(pointer.clone()) {
            if let Some(callback) = &self.options.on_circular {
                callback(&format!("#{}", target.pointer));
            }
        }

        match (self.options.circular, ancestor) {
            (CircularMode::Allow, Some(id)) => Ok(id),
            _ => Ok(self.copy_ref_node(map, &pointer)),
        }
    }

    /// Keep a reference node as written, with its pointer rewritten to be
    /// valid from the root document.
    fn copy_ref_node(&mut self, map: &Map<String, Value>, pointer: &str) -> NodeId {
        let mut node = map.clone();
        node.insert("$ref".to_string(), Value::String(pointer.to_string()));
        self.graph.insert_value(&Value::Object(node))
    }

    fn branch_failure(
        &mut self,
        map: &Map<String, Value>,
        raw: &str,
        location: &str,
        pointer: &str,
        error: ResolveError,
    ) -> Result<NodeId, ResolveError> {
        if self.options.fail_fast || matches!(error, ResolveError::Timeout { .. }) {
            return Err(error);
        }

        let at = Target {
            location: location.to_string(),
            pointer: pointer.to_string(),
        }
        .to_ref(self.resources.root_location());
        warn!(location = %at, pointer = raw, error = %error, "unresolved reference");

        self.failures.push(RefFailure {
            location: at,
            pointer: raw.to_string(),
            error,
        });
        Ok(self.graph.insert_value(&Value::Object(map.clone())))
    }
}
