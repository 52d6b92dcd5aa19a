//! Reference pointers: parsing, JSON Pointer (RFC 6901) navigation and
//! chain-following resolution.

use std::rc::Rc;

use serde_json::{Map, Value};

use crate::error::ResolveError;
use crate::loader::{DocumentSource, Resources};

/// Escape a single JSON Pointer token (`~` → `~0`, `/` → `~1`).
pub fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Unescape a single JSON Pointer token (`~1` → `/`, `~0` → `~`).
pub fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Append a token to a JSON Pointer.
pub fn push_token(pointer: &str, token: &str) -> String {
    format!("{}/{}", pointer, escape_token(token))
}

/// Build a JSON Pointer from unescaped tokens.
pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .fold(String::new(), |acc, t| push_token(&acc, t.as_ref()))
}

/// Split a JSON Pointer into unescaped tokens. `""` is the whole document.
pub fn tokens(pointer: &str) -> Vec<String> {
    if pointer.is_empty() {
        return Vec::new();
    }
    pointer
        .trim_start_matches('/')
        .split('/')
        .map(unescape_token)
        .collect()
}

/// Navigate a JSON Pointer (no leading `#`) within a value.
pub fn navigate<'a>(value: &'a Value, pointer: &str) -> Option<&'a Value> {
    let mut current = value;
    for token in tokens(pointer) {
        current = match current {
            Value::Object(map) => map.get(&token)?,
            Value::Array(arr) => arr.get(token.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Returns the pointer string if `value` is a reference node.
pub fn ref_of(value: &Value) -> Option<&str> {
    value.as_object().and_then(ref_in_map)
}

pub(crate) fn ref_in_map(map: &Map<String, Value>) -> Option<&str> {
    map.get("$ref").and_then(Value::as_str)
}

/// Returns the pointer string if `value` is a reference node with no sibling keys.
pub(crate) fn pure_ref_of(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) if map.len() == 1 => ref_in_map(map),
        _ => None,
    }
}

/// A parsed `$ref` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// File path or URL; `None` for local pointers.
    pub resource: Option<String>,
    /// Decoded JSON Pointer into the target resource (`""` for the whole resource).
    pub pointer: String,
}

impl Reference {
    /// Parse a `$ref` string.
    ///
    /// # Errors
    ///
    /// Returns `UnresolvableReference` for empty pointers and for fragments
    /// that are not JSON Pointers (named anchors).
    pub fn parse(raw: &str) -> Result<Self, ResolveError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ResolveError::unresolvable(raw, "empty pointer"));
        }

        let (resource, fragment) = match trimmed.find('#') {
            Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
            None => (trimmed, ""),
        };

        let pointer = urlencoding::decode(fragment)
            .map_err(|_| ResolveError::unresolvable(raw, "fragment is not valid UTF-8"))?
            .into_owned();
        if !pointer.is_empty() && !pointer.starts_with('/') {
            return Err(ResolveError::unresolvable(
                raw,
                "fragment is not a JSON Pointer",
            ));
        }

        Ok(Self {
            resource: (!resource.is_empty()).then(|| resource.to_string()),
            pointer,
        })
    }

    pub fn is_local(&self) -> bool {
        self.resource.is_none()
    }
}

/// An absolute reference target: normalized resource location plus pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Target {
    pub location: String,
    pub pointer: String,
}

impl Target {
    /// Identity of the target, independent of how the pointer was spelled.
    pub fn key(&self) -> String {
        format!("{}#{}", self.location, self.pointer)
    }

    /// `$ref` string addressing this target from the root document.
    pub fn to_ref(&self, root_location: &str) -> String {
        if self.location == root_location {
            format!("#{}", self.pointer)
        } else {
            self.key()
        }
    }
}

/// A target reached after following a chain of pure references.
pub(crate) struct Resolved {
    /// The final, concrete target.
    pub target: Target,
    /// Keys of every link in the chain, the final target included.
    pub chain: Vec<String>,
    document: Rc<Value>,
}

impl Resolved {
    pub fn value(&self) -> &Value {
        static MISSING: Value = Value::Null;
        navigate(&self.document, &self.target.pointer).unwrap_or(&MISSING)
    }
}

/// Outcome of following a reference chain.
pub(crate) enum Followed {
    Value(Resolved),
    /// The chain returned to `target`, a link it had already visited, without
    /// reaching a concrete value.
    Loop { target: Target },
}

/// Follow `start` through any chain of pure reference nodes.
pub(crate) fn follow(
    resources: &mut Resources<'_>,
    start: Target,
    raw: &str,
) -> Result<Followed, ResolveError> {
    let mut target = start;
    let mut chain: Vec<String> = Vec::new();

    loop {
        let document = resources.document(&target.location, raw)?;
        let value = navigate(&document, &target.pointer).ok_or_else(|| {
            ResolveError::unresolvable(raw, format!("{} does not exist", target.key()))
        })?;
        chain.push(target.key());

        let Some(next_raw) = pure_ref_of(value) else {
            return Ok(Followed::Value(Resolved {
                target,
                chain,
                document,
            }));
        };

        let reference = Reference::parse(next_raw)?;
        let next = resources.absolute(&target.location, &reference);
        if chain.contains(&next.key()) {
            return Ok(Followed::Loop { target: next });
        }
        target = next;
    }
}

/// Look up a local `#/...` pointer in a document without following chains.
///
/// # Errors
///
/// Returns `UnresolvableReference` for external, empty or missing pointers.
pub fn lookup<'a>(doc: &'a Value, raw: &str) -> Result<&'a Value, ResolveError> {
    let reference = Reference::parse(raw)?;
    if !reference.is_local() {
        return Err(ResolveError::unresolvable(
            raw,
            "pointer does not begin with '#'",
        ));
    }
    navigate(doc, &reference.pointer)
        .ok_or_else(|| ResolveError::unresolvable(raw, "target does not exist"))
}

/// Resolve a pointer to its value, following chained references.
///
/// Local pointers resolve against `doc`; external ones are fetched through
/// `source`, relative to `base_location`. A chain that loops without reaching
/// a concrete value is unresolvable.
///
/// # Errors
///
/// Returns `UnresolvableReference` for malformed or missing pointers, or the
/// acquisition error for external resources that cannot be fetched.
pub fn resolve(
    doc: &Value,
    raw: &str,
    base_location: Option<&str>,
    source: &dyn DocumentSource,
) -> Result<Value, ResolveError> {
    let mut resources = Resources::new(doc, base_location, source, true);
    let reference = Reference::parse(raw)?;
    let root = resources.root_location().to_string();
    let start = resources.absolute(&root, &reference);

    match follow(&mut resources, start, raw)? {
        Followed::Value(resolved) => Ok(resolved.value().clone()),
        Followed::Loop { target } => Err(ResolveError::unresolvable(
            raw,
            format!("reference chain loops back to {}", target.key()),
        )),
    }
}
