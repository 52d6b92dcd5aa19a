//! Path keys, path templates, parameters and operation identifiers.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::{Checker, Operation};
use crate::pointer::push_token;
use crate::types::json_type_name;

static TEMPLATE_PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}/]*)\}").expect("valid"));
static PURE_TEMPLATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{[^{}/]+\}$").expect("valid"));

const FORM_MEDIA_TYPES: &[&str] = &["multipart/form-data", "application/x-www-form-urlencoded"];

/// Names of the `{param}` segments of a path template, in order.
pub(crate) fn template_params(path: &str) -> Vec<&str> {
    TEMPLATE_PARAM_RE
        .captures_iter(path)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Path with every parameter name erased, for equivalence checks.
fn normalized_template(path: &str) -> String {
    TEMPLATE_PARAM_RE.replace_all(path, "{}").into_owned()
}

pub(crate) fn check_paths(c: &mut Checker<'_>) {
    let doc = c.doc;
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return;
    };

    let mut seen: HashMap<String, &str> = HashMap::new();
    for key in paths.keys() {
        if key.starts_with("x-") {
            continue;
        }
        let location = push_token("/paths", key);

        if !key.starts_with('/') && !PURE_TEMPLATE_RE.is_match(key) {
            c.error(&location, format!("path `{}` must begin with '/'", key));
        }
        if template_params(key).iter().any(|p| p.is_empty()) {
            c.error(&location, format!("path `{}` has an empty parameter template", key));
        }

        let normalized = normalized_template(key);
        if let Some(first) = seen.get(&normalized) {
            c.warn(&location, format!("path `{}` is equivalent to `{}`", key, first));
        } else {
            seen.insert(normalized, key);
        }
    }
}

/// A parameter with the location it was declared at.
#[derive(Clone)]
struct Param<'a> {
    location: String,
    value: &'a serde_json::Map<String, Value>,
}

impl Param<'_> {
    fn name(&self) -> &str {
        self.value.get("name").and_then(Value::as_str).unwrap_or_default()
    }

    fn location_in(&self) -> &str {
        self.value.get("in").and_then(Value::as_str).unwrap_or_default()
    }

    fn is_required(&self) -> bool {
        self.value.get("required").and_then(Value::as_bool) == Some(true)
    }
}

/// Parameters declared in `list`, after following local references, with
/// duplicates (same `name` and `in`) reported.
fn declared_params<'a>(c: &mut Checker<'a>, list: Option<&'a Value>, location: &str) -> Vec<Param<'a>> {
    let Some(items) = list.and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for (i, item) in items.iter().enumerate() {
        let at = push_token(location, &i.to_string());
        let resolved = c.resolve(item);
        let Some(value) = resolved.as_object() else {
            c.error(
                &at,
                format!("parameter must be an object, found {}", json_type_name(resolved)),
            );
            continue;
        };
        let param = Param { location: at, value };
        if !seen.insert((param.name().to_string(), param.location_in().to_string())) {
            c.error(
                &param.location,
                format!("duplicate parameter `{}` in {}", param.name(), param.location_in()),
            );
        }
        out.push(param);
    }
    out
}

/// Operation parameters override path-level ones with the same `name`/`in`.
fn effective_params<'a>(path_level: &[Param<'a>], op_level: Vec<Param<'a>>) -> Vec<Param<'a>> {
    let overridden: HashSet<(&str, &str)> = op_level
        .iter()
        .map(|p| (p.name(), p.location_in()))
        .collect();
    let inherited: Vec<Param<'a>> = path_level
        .iter()
        .filter(|p| !overridden.contains(&(p.name(), p.location_in())))
        .cloned()
        .collect();
    inherited.into_iter().chain(op_level).collect()
}

pub(crate) fn check_operations(c: &mut Checker<'_>) {
    let mut path_level = HashMap::new();
    for (_, item_location, item) in c.path_items() {
        let location = push_token(&item_location, "parameters");
        let params = declared_params(c, item.get("parameters"), &location);
        path_level.insert(item_location, params);
    }

    let mut operation_ids: HashMap<String, String> = HashMap::new();
    for op in c.operations() {
        if let Some(id) = op.op.get("operationId").and_then(Value::as_str) {
            match operation_ids.get(id) {
                Some(first) => c.error(
                    push_token(&op.location, "operationId"),
                    format!("operationId `{}` is already used by {}", id, first),
                ),
                None => {
                    let owner = format!("{} {}", op.method.to_uppercase(), op.path);
                    operation_ids.insert(id.to_string(), owner);
                }
            }
        }

        let op_level = declared_params(c, op.op.get("parameters"), &push_token(&op.location, "parameters"));
        let inherited = path_level.get(&op.item_location).map(Vec::as_slice).unwrap_or_default();
        let params = effective_params(inherited, op_level);

        check_path_params(c, &op, &params);
        if c.dialect.is_swagger() {
            check_swagger_params(c, &op, &params);
        }
    }
}

fn check_path_params(c: &mut Checker<'_>, op: &Operation<'_>, params: &[Param<'_>]) {
    let template = template_params(op.path);

    let mut seen = HashSet::new();
    for name in template.iter().filter(|n| !n.is_empty()) {
        if !seen.insert(*name) {
            c.error(
                &op.location,
                format!("path `{}` repeats parameter `{}`", op.path, name),
            );
            continue;
        }
        match params.iter().find(|p| p.location_in() == "path" && p.name() == *name) {
            None => c.error(
                &op.location,
                format!(
                    "path parameter `{}` from `{}` must be declared at the path or operation level",
                    name, op.path
                ),
            ),
            Some(param) if !param.is_required() => c.error(
                &param.location,
                format!("path parameter `{}` must be marked required", name),
            ),
            Some(_) => {}
        }
    }

    for param in params.iter().filter(|p| p.location_in() == "path") {
        if !template.contains(&param.name()) {
            c.error(
                &param.location,
                format!("path parameter `{}` does not appear in `{}`", param.name(), op.path),
            );
        }
    }
}

fn check_swagger_params(c: &mut Checker<'_>, op: &Operation<'_>, params: &[Param<'_>]) {
    let body = params.iter().filter(|p| p.location_in() == "body").count();
    let form = params.iter().filter(|p| p.location_in() == "formData").count();

    if body > 1 {
        c.error(&op.location, "operation cannot have more than one body parameter");
    }
    if body > 0 && form > 0 {
        c.error(&op.location, "operation cannot have both body and formData parameters");
    }

    let files: Vec<&Param<'_>> = params
        .iter()
        .filter(|p| p.value.get("type").and_then(Value::as_str) == Some("file"))
        .collect();
    for param in &files {
        if param.location_in() != "formData" {
            c.error(
                &param.location,
                format!("file parameter `{}` must be in formData", param.name()),
            );
        }
    }

    if !files.is_empty() {
        let doc = c.doc;
        let consumes = op
            .op
            .get("consumes")
            .or_else(|| doc.get("consumes"))
            .and_then(Value::as_array);
        let accepts_form = consumes.is_some_and(|types| {
            types
                .iter()
                .filter_map(Value::as_str)
                .any(|t| FORM_MEDIA_TYPES.iter().any(|f| t.starts_with(f)))
        });
        if !accepts_form {
            c.error(
                &op.location,
                "operation with file parameters must consume multipart/form-data or application/x-www-form-urlencoded",
            );
        }
    }
}
