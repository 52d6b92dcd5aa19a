//! Reduction: the minimal self-contained document for one operation.
//!
//! Starting from the operation, every local `$ref` is followed with a
//! worklist. Each target is copied as a whole component (for example all of
//! `#/components/schemas/Pet`, even when only one of its properties was
//! referenced) to the same location in the output, so every reference keeps
//! its original text and still resolves.

use std::collections::{HashSet, VecDeque};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::ReduceError;
use crate::pointer::{from_tokens, lookup, navigate, ref_of, tokens};
use crate::types::HTTP_METHODS;

/// Root sections rebuilt from what the operation reaches.
const REBUILT_SECTIONS: &[&str] = &[
    "paths",
    "components",
    "definitions",
    "parameters",
    "responses",
    "securityDefinitions",
    "tags",
    "webhooks",
];

/// Path item fields that travel with the operation.
const PATH_ITEM_FIELDS: &[&str] = &["summary", "description", "servers", "parameters"];

/// Swagger 2.0 root sections holding named, reusable objects.
const SWAGGER_SECTIONS: &[&str] = &["definitions", "parameters", "responses", "securityDefinitions"];

/// Reduce `doc` to the operation `method` (case-insensitive) on `path`.
///
/// # Errors
///
/// Returns `NotAnApiDocument` when `doc` has no `paths` object, and
/// `OperationNotFound` when the path or method is absent.
pub fn reduce(doc: &Value, path: &str, method: &str) -> Result<Value, ReduceError> {
    let root = doc.as_object().ok_or(ReduceError::NotAnApiDocument)?;
    let paths = root
        .get("paths")
        .and_then(Value::as_object)
        .ok_or(ReduceError::NotAnApiDocument)?;

    let not_found = || ReduceError::OperationNotFound {
        path: path.to_string(),
        method: method.to_string(),
    };

    let mut item = paths.get(path).ok_or_else(not_found)?;
    if let Some(raw) = ref_of(item) {
        item = lookup(doc, raw).map_err(|_| not_found())?;
    }
    let item = item.as_object().ok_or_else(not_found)?;

    let (method_key, operation) = item
        .iter()
        .find(|(key, _)| {
            key.eq_ignore_ascii_case(method) && HTTP_METHODS.contains(&key.to_ascii_lowercase().as_str())
        })
        .ok_or_else(not_found)?;

    let mut reduced_item = Map::new();
    for (key, value) in item {
        if PATH_ITEM_FIELDS.contains(&key.as_str()) || key.starts_with("x-") {
            reduced_item.insert(key.clone(), value.clone());
        }
    }
    reduced_item.insert(method_key.clone(), operation.clone());
    let reduced_item = Value::Object(reduced_item);

    let mut out = Map::new();
    for (key, value) in root {
        if key == "paths" {
            let mut reduced_paths = Map::new();
            reduced_paths.insert(path.to_string(), reduced_item.clone());
            out.insert(key.clone(), Value::Object(reduced_paths));
        } else if key == "tags" {
            if let Some(tags) = used_tags(value, operation) {
                out.insert(key.clone(), tags);
            }
        } else if !REBUILT_SECTIONS.contains(&key.as_str()) {
            out.insert(key.clone(), value.clone());
        }
    }

    let mut reach = Reach::new(doc);
    reach.scan(&reduced_item);
    for scheme in security_schemes(doc, operation) {
        reach.push_unit(scheme);
    }
    reach.run();

    let count = reach.units.len();
    let mut out = Value::Object(out);
    for unit in reach.units {
        if let Some(value) = navigate(doc, &from_tokens(unit.as_slice())) {
            place(&mut out, &unit, value.clone());
        }
    }
    debug!(path, method, components = count, "reduced document");
    Ok(out)
}

/// Local reference closure over the document.
struct Reach<'d> {
    doc: &'d Value,
    visited: HashSet<Vec<String>>,
    queue: VecDeque<Vec<String>>,
    units: Vec<Vec<String>>,
}

impl<'d> Reach<'d> {
    fn new(doc: &'d Value) -> Self {
        Self {
            doc,
            visited: HashSet::new(),
            queue: VecDeque::new(),
            units: Vec::new(),
        }
    }

    /// Queue every local reference found in `value`, including discriminator
    /// mapping targets.
    fn scan(&mut self, value: &Value) {
        match value {
            Value::Object(map) => {
                if let Some(raw) = ref_of(value) {
                    self.push_ref(raw);
                }
                if let Some(mapping) = map
                    .get("discriminator")
                    .and_then(|d| d.get("mapping"))
                    .and_then(Value::as_object)
                {
                    for target in mapping.values().filter_map(Value::as_str) {
                        self.push_mapping(target);
                    }
                }
                for child in map.values() {
                    self.scan(child);
                }
            }
            Value::Array(items) => {
                for child in items {
                    self.scan(child);
                }
            }
            _ => {}
        }
    }

    fn push_ref(&mut self, raw: &str) {
        let Some(fragment) = raw.trim().strip_prefix('#') else {
            return;
        };
        let pointer = urlencoding::decode(fragment)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| fragment.to_string());
        if navigate(self.doc, &pointer).is_none() {
            warn!(pointer = raw, "reference target does not exist; left dangling");
            return;
        }
        let unit = unit_of(self.doc, &tokens(&pointer));
        self.push_unit(unit);
    }

    /// A mapping value is either a reference or a bare schema name.
    fn push_mapping(&mut self, target: &str) {
        if target.contains(['#', '/']) {
            self.push_ref(target);
        } else {
            self.push_ref(&format!("#{}", from_tokens(&["components", "schemas", target])));
        }
    }

    fn push_unit(&mut self, unit: Vec<String>) {
        if unit.is_empty() || !self.visited.insert(unit.clone()) {
            return;
        }
        self.queue.push_back(unit);
    }

    fn run(&mut self) {
        while let Some(unit) = self.queue.pop_front() {
            let doc = self.doc;
            if let Some(value) = navigate(doc, &from_tokens(unit.as_slice())) {
                self.scan(value);
            }
            self.units.push(unit);
        }
    }
}

/// The component a pointer lands in: `components/<section>/<name>`, a Swagger
/// section entry, or the longest prefix reachable through objects only.
fn unit_of(doc: &Value, tokens: &[String]) -> Vec<String> {
    match tokens.first().map(String::as_str) {
        Some("components") if tokens.len() >= 3 => return tokens[..3].to_vec(),
        Some(section) if SWAGGER_SECTIONS.contains(&section) && tokens.len() >= 2 => {
            return tokens[..2].to_vec()
        }
        _ => {}
    }

    let mut current = doc;
    let mut prefix = Vec::new();
    for token in tokens {
        match current.as_object().and_then(|m| m.get(token)) {
            Some(next) => {
                prefix.push(token.clone());
                current = next;
                if !next.is_object() {
                    break;
                }
            }
            None => break,
        }
    }
    prefix
}

/// Root tags filtered to those `operation` lists; `None` when none remain.
fn used_tags(tags: &Value, operation: &Value) -> Option<Value> {
    let used: HashSet<&str> = operation
        .get("tags")
        .and_then(Value::as_array)
        .map(|t| t.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let kept: Vec<Value> = tags
        .as_array()?
        .iter()
        .filter(|tag| {
            tag.get("name")
                .and_then(Value::as_str)
                .is_some_and(|name| used.contains(name))
        })
        .cloned()
        .collect();
    (!kept.is_empty()).then_some(Value::Array(kept))
}

/// Security schemes named by the operation's requirements and by the root
/// requirements, which stay in the output.
fn security_schemes(doc: &Value, operation: &Value) -> Vec<Vec<String>> {
    let section: Vec<String> = if doc.get("securityDefinitions").is_some() {
        vec!["securityDefinitions".into()]
    } else {
        vec!["components".into(), "securitySchemes".into()]
    };

    let mut out = Vec::new();
    let lists = [operation.get("security"), doc.get("security")];
    let requirements = lists
        .into_iter()
        .flatten()
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(Value::as_object);
    for requirement in requirements {
        for name in requirement.keys() {
            let mut unit = section.clone();
            unit.push(name.clone());
            if navigate(doc, &from_tokens(unit.as_slice())).is_some() {
                out.push(unit);
            }
        }
    }
    out
}

/// Insert `value` at `tokens`, creating intermediate objects.
fn place(out: &mut Value, tokens: &[String], value: Value) {
    let Some((last, parents)) = tokens.split_last() else {
        return;
    };
    let mut current = out;
    for token in parents {
        let Some(map) = current.as_object_mut() else {
            return;
        };
        current = map
            .entry(token.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if let Some(map) = current.as_object_mut() {
        map.insert(last.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unit_of_component_pointers() {
        let doc = json!({
            "components": { "schemas": { "Pet": { "properties": { "name": {} } } } },
            "definitions": { "Pet": {} },
            "x-shared": { "list": [{ "a": 1 }] }
        });
        let t = |p: &str| tokens(p);
        assert_eq!(
            unit_of(&doc, &t("/components/schemas/Pet/properties/name")),
            vec!["components", "schemas", "Pet"]
        );
        assert_eq!(unit_of(&doc, &t("/definitions/Pet")), vec!["definitions", "Pet"]);
        assert_eq!(unit_of(&doc, &t("/x-shared/list/0/a")), vec!["x-shared", "list"]);
    }

    #[test]
    fn tags_filtered_to_operation() {
        let tags = json!([{ "name": "pet" }, { "name": "store" }]);
        assert_eq!(
            used_tags(&tags, &json!({ "tags": ["pet"] })),
            Some(json!([{ "name": "pet" }]))
        );
        assert_eq!(used_tags(&tags, &json!({})), None);
    }

    #[test]
    fn place_creates_parents() {
        let mut out = json!({ "openapi": "3.0.3" });
        place(
            &mut out,
            &["components".to_string(), "schemas".to_string(), "Pet".to_string()],
            json!({ "type": "object" }),
        );
        assert_eq!(out["components"]["schemas"]["Pet"]["type"], "object");
    }

    #[test]
    fn method_is_case_insensitive() {
        let doc = json!({ "paths": { "/pets": { "get": { "responses": {} } } } });
        let out = reduce(&doc, "/pets", "GET").unwrap();
        assert!(out["paths"]["/pets"].get("get").is_some());
    }

    #[test]
    fn missing_operation() {
        let doc = json!({ "paths": { "/pets": { "get": { "responses": {} } } } });
        let err = reduce(&doc, "/pets", "post").unwrap_err();
        assert_eq!(err.to_string(), "operation not found: POST /pets");

        let err = reduce(&doc, "/owners", "get").unwrap_err();
        assert!(matches!(err, ReduceError::OperationNotFound { .. }));

        let err = reduce(&json!({ "openapi": "3.0.3" }), "/pets", "get").unwrap_err();
        assert!(matches!(err, ReduceError::NotAnApiDocument));
    }

    #[test]
    fn parameters_key_is_not_an_operation() {
        let doc = json!({ "paths": { "/pets": { "parameters": [], "get": { "responses": {} } } } });
        assert!(reduce(&doc, "/pets", "parameters").is_err());
    }
}
