//! Bundling: embed external references as local components.
//!
//! Internal references are left exactly as written. Every external target is
//! resolved once (following chains across resources), copied under a
//! component section of the root document, and every reference to that same
//! target is rewritten to the one local copy.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

use crate::cycle::Deadline;
use crate::error::ResolveError;
use crate::loader::{DocumentSource, Resources};
use crate::pointer::{follow, from_tokens, navigate, Followed, Reference};
use crate::types::Dialect;

/// Bundle `doc`, fetching external resources through `source`.
///
/// `base_location` is the location of `doc` itself; relative external
/// references resolve against it.
///
/// # Errors
///
/// Bundling fails on the first external reference that cannot be resolved.
pub fn bundle(
    doc: &Value,
    base_location: Option<&str>,
    source: &dyn DocumentSource,
) -> Result<Value, ResolveError> {
    bundle_within(doc, base_location, source, &Deadline::unbounded())
}

/// [`bundle`] under a wall-clock budget, checked once per visited node.
pub(crate) fn bundle_within(
    doc: &Value,
    base_location: Option<&str>,
    source: &dyn DocumentSource,
    deadline: &Deadline,
) -> Result<Value, ResolveError> {
    let resources = Resources::new(doc, base_location, source, true);
    let root_location = resources.root_location().to_string();
    let dialect = Dialect::detect(doc).unwrap_or(Dialect::OpenApi30);

    let mut bundler = Bundler {
        doc,
        dialect,
        resources,
        deadline,
        embedded: HashMap::new(),
        taken: HashMap::new(),
        inlining: HashSet::new(),
        components: Vec::new(),
    };

    let mut out = doc.clone();
    bundler.walk(&mut out, &root_location, &mut Vec::new())?;

    let count = bundler.components.len();
    for component in bundler.components {
        insert_component(&mut out, &component)?;
    }
    debug!(components = count, "bundle complete");
    Ok(out)
}

/// Where an embedded external target lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Schema,
    Parameter,
    Response,
    RequestBody,
    Header,
    Example,
    Link,
    Callback,
    SecurityScheme,
    PathItem,
}

impl Placement {
    /// Infer the kind of object a reference stands for from where it sits.
    fn infer(path: &[String]) -> Self {
        let last = path.last().map(String::as_str);
        let parent = path.len().checked_sub(2).map(|i| path[i].as_str());

        match (parent, last) {
            (_, Some("schema" | "items" | "additionalProperties" | "not")) => Placement::Schema,
            (Some("properties" | "patternProperties" | "definitions" | "schemas" | "$defs"), _) => {
                Placement::Schema
            }
            (Some("allOf" | "anyOf" | "oneOf" | "prefixItems"), _) => Placement::Schema,
            (_, Some("requestBody")) | (Some("requestBodies"), _) => Placement::RequestBody,
            (Some("parameters"), _) => Placement::Parameter,
            (Some("responses"), _) => Placement::Response,
            (Some("headers"), _) => Placement::Header,
            (Some("examples"), _) => Placement::Example,
            (Some("links"), _) => Placement::Link,
            (Some("callbacks"), _) => Placement::Callback,
            (Some("securitySchemes" | "securityDefinitions"), _) => Placement::SecurityScheme,
            (Some("paths" | "webhooks" | "pathItems"), _) if path.len() == 2 => Placement::PathItem,
            _ if path.len() == 3 && path[0] == "components" && path[1] == "callbacks" => {
                Placement::PathItem
            }
            _ => Placement::Schema,
        }
    }

    /// Section tokens for this kind in `dialect`; `None` when the dialect has
    /// no reusable section for it and the target must be inlined.
    fn section(self, dialect: Dialect) -> Option<&'static [&'static str]> {
        if dialect.is_swagger() {
            return match self {
                Placement::Schema => Some(&["definitions"]),
                Placement::Parameter => Some(&["parameters"]),
                Placement::Response => Some(&["responses"]),
                Placement::SecurityScheme => Some(&["securityDefinitions"]),
                _ => None,
            };
        }

        Some(match self {
            Placement::Schema => &["components", "schemas"],
            Placement::Parameter => &["components", "parameters"],
            Placement::Response => &["components", "responses"],
            Placement::RequestBody => &["components", "requestBodies"],
            Placement::Header => &["components", "headers"],
            Placement::Example => &["components", "examples"],
            Placement::Link => &["components", "links"],
            Placement::Callback => &["components", "callbacks"],
            Placement::SecurityScheme => &["components", "securitySchemes"],
            Placement::PathItem if dialect == Dialect::OpenApi31 => &["components", "pathItems"],
            Placement::PathItem => return None,
        })
    }
}

struct Component {
    section: &'static [&'static str],
    name: String,
    value: Value,
}

struct Bundler<'d, 's> {
    doc: &'d Value,
    dialect: Dialect,
    resources: Resources<'s>,
    deadline: &'d Deadline,
    /// Target key → local `$ref` of its embedded copy.
    embedded: HashMap<String, String>,
    /// Section pointer → names already used in it.
    taken: HashMap<String, HashSet<String>>,
    /// Targets currently being inlined.
    inlining: HashSet<String>,
    components: Vec<Component>,
}

impl Bundler<'_, '_> {
    /// Walk `value`, which came from the resource at `location` and sits at
    /// `path` in the bundled output.
    fn walk(&mut self, value: &mut Value, location: &str, path: &mut Vec<String>) -> Result<(), ResolveError> {
        if let Some(elapsed) = self.deadline.expired() {
            return Err(ResolveError::Timeout { elapsed });
        }
        match value {
            Value::Object(map) => {
                if let Some(Value::String(raw)) = map.get("$ref") {
                    let raw = raw.clone();
                    if let Some(replacement) = self.rewrite(&raw, location, path)? {
                        match replacement {
                            Rewrite::Ref(local) => {
                                map.insert("$ref".to_string(), Value::String(local));
                            }
                            Rewrite::Inline(inlined) => {
                                *value = inlined;
                                return Ok(());
                            }
                        }
                    }
                }
                for (key, child) in map.iter_mut() {
                    if key == "$ref" {
                        continue;
                    }
                    path.push(key.clone());
                    self.walk(child, location, path)?;
                    path.pop();
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter_mut().enumerate() {
                    path.push(i.to_string());
                    self.walk(child, location, path)?;
                    path.pop();
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Decide what a reference found at `path` becomes. `None` keeps it as is.
    fn rewrite(&mut self, raw: &str, location: &str, path: &[String]) -> Result<Option<Rewrite>, ResolveError> {
        if raw.trim_start().starts_with('#') && self.resources.is_root(location) {
            return Ok(None);
        }
        let reference = Reference::parse(raw)?;

        let start = self.resources.absolute(location, &reference);
        if self.resources.is_root(&start.location) {
            return Ok(Some(Rewrite::Ref(format!("#{}", start.pointer))));
        }

        let resolved = match follow(&mut self.resources, start, raw)? {
            Followed::Value(resolved) => resolved,
            Followed::Loop { target } => {
                return Err(ResolveError::unresolvable(
                    raw,
                    format!("reference chain loops back to {}", target.key()),
                ))
            }
        };

        if self.resources.is_root(&resolved.target.location) {
            return Ok(Some(Rewrite::Ref(format!("#{}", resolved.target.pointer))));
        }

        let key = resolved.target.key();
        if let Some(local) = self.embedded.get(&key) {
            return Ok(Some(Rewrite::Ref(local.clone())));
        }

        let placement = Placement::infer(path);
        let Some(section) = placement.section(self.dialect) else {
            if !self.inlining.insert(key.clone()) {
                return Err(ResolveError::unresolvable(
                    raw,
                    format!("{:?} reference is circular and cannot be inlined", placement),
                ));
            }
            let mut copy = resolved.value().clone();
            let mut inner = path.to_vec();
            self.walk(&mut copy, &resolved.target.location, &mut inner)?;
            self.inlining.remove(&key);
            debug!(target = %key, "inlined external reference");
            return Ok(Some(Rewrite::Inline(copy)));
        };

        let name = self.unique_name(section, &resolved.target.location, &resolved.target.pointer);
        let mut tokens: Vec<String> = section.iter().map(|t| t.to_string()).collect();
        tokens.push(name.clone());
        let local = format!("#{}", from_tokens(tokens.as_slice()));

        // Registered before the copy is walked so references back into it
        // terminate.
        self.embedded.insert(key.clone(), local.clone());
        for link in &resolved.chain {
            self.embedded.entry(link.clone()).or_insert_with(|| local.clone());
        }

        let mut copy = resolved.value().clone();
        self.walk(&mut copy, &resolved.target.location, &mut tokens)?;
        debug!(target = %key, component = %local, "embedded external reference");

        self.components.push(Component {
            section,
            name,
            value: copy,
        });
        Ok(Some(Rewrite::Ref(local)))
    }

    /// A component name not yet used in `section`, derived from the last
    /// pointer token or the resource's file stem.
    fn unique_name(&mut self, section: &'static [&'static str], location: &str, pointer: &str) -> String {
        let base = pointer
            .rsplit('/')
            .next()
            .filter(|t| !t.is_empty())
            .map(crate::pointer::unescape_token)
            .or_else(|| {
                Path::new(location.split(['?', '#']).next().unwrap_or(location))
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "component".to_string());
        let base = sanitize(&base);

        let doc = self.doc;
        let taken = self
            .taken
            .entry(from_tokens(section))
            .or_insert_with(|| existing_names(doc, section));

        let mut name = base.clone();
        let mut n = 2;
        while taken.contains(&name) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        taken.insert(name.clone());
        name
    }
}

enum Rewrite {
    Ref(String),
    Inline(Value),
}

fn existing_names(doc: &Value, section: &[&str]) -> HashSet<String> {
    navigate(doc, &from_tokens(section))
        .and_then(Value::as_object)
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}

/// Component keys must match `^[a-zA-Z0-9.\-_]+$`.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "component".to_string()
    } else {
        cleaned
    }
}

fn insert_component(out: &mut Value, component: &Component) -> Result<(), ResolveError> {
    let mut current = out;
    for token in component.section {
        let map = current.as_object_mut().ok_or_else(|| {
            ResolveError::unresolvable(
                format!("#{}", from_tokens(component.section)),
                "component section is not an object",
            )
        })?;
        current = map
            .entry(token.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let section = current.as_object_mut().ok_or_else(|| {
        ResolveError::unresolvable(
            format!("#{}", from_tokens(component.section)),
            "component section is not an object",
        )
    })?;
    section.insert(component.name.clone(), component.value.clone());
    Ok(())
}
