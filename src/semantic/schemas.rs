//! Schema objects and component names.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::Checker;
use crate::pointer::{from_tokens, push_token, ref_of};
use crate::types::Dialect;

static COMPONENT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9\.\-_]+$").expect("valid"));

/// `allOf` nesting followed when looking for inherited properties.
const MAX_ALL_OF_DEPTH: usize = 8;

/// Keys whose values hold instance data, never schemas.
const DATA_KEYS: &[&str] = &["example", "examples"];

pub(crate) fn check_schemas(c: &mut Checker<'_>) {
    let doc = c.doc;
    let section = c.dialect.schemas_section();

    if let Some(schemas) = c.section(section) {
        let base = from_tokens(section);
        for (name, schema) in schemas {
            walk_schema(c, schema, &push_token(&base, name));
        }
    }

    if let Some(paths) = doc.get("paths") {
        scan(c, paths, "/paths");
    }
    if c.dialect.is_swagger() {
        for key in ["parameters", "responses"] {
            if let Some(section) = doc.get(key) {
                scan(c, section, &push_token("", key));
            }
        }
    } else if let Some(components) = doc.get("components").and_then(Value::as_object) {
        for (key, section) in components {
            if key != "schemas" {
                scan(c, section, &from_tokens(&["components", key.as_str()]));
            }
        }
    }
}

/// Find `schema` entries outside the schema section (parameters, media
/// types, headers) and check them.
fn scan<'a>(c: &mut Checker<'a>, value: &'a Value, location: &str) {
    if c.out_of_time() {
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key.starts_with("x-") || DATA_KEYS.contains(&key.as_str()) {
                    continue;
                }
                let child_location = push_token(location, key);
                if key == "schema" {
                    walk_schema(c, child, &child_location);
                } else {
                    scan(c, child, &child_location);
                }
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                scan(c, child, &push_token(location, &i.to_string()));
            }
        }
        _ => {}
    }
}

fn walk_schema<'a>(c: &mut Checker<'a>, value: &'a Value, location: &str) {
    let Some(schema) = value.as_object().filter(|_| !c.out_of_time()) else {
        return;
    };
    if ref_of(value).is_some() {
        return;
    }

    check_discriminator(c, value, schema, location);
    check_array_items(c, schema, location);
    if c.dialect.is_swagger() {
        check_required_defined(c, schema, location);
    }

    for key in ["properties", "patternProperties", "$defs", "definitions"] {
        if let Some(children) = schema.get(key).and_then(Value::as_object) {
            let base = push_token(location, key);
            for (name, child) in children {
                walk_schema(c, child, &push_token(&base, name));
            }
        }
    }
    for key in ["allOf", "anyOf", "oneOf", "prefixItems"] {
        if let Some(children) = schema.get(key).and_then(Value::as_array) {
            let base = push_token(location, key);
            for (i, child) in children.iter().enumerate() {
                walk_schema(c, child, &push_token(&base, &i.to_string()));
            }
        }
    }
    for key in ["not", "additionalProperties", "contains", "if", "then", "else"] {
        if let Some(child) = schema.get(key) {
            walk_schema(c, child, &push_token(location, key));
        }
    }
    match schema.get("items") {
        Some(Value::Array(items)) => {
            let base = push_token(location, "items");
            for (i, child) in items.iter().enumerate() {
                walk_schema(c, child, &push_token(&base, &i.to_string()));
            }
        }
        Some(child) => walk_schema(c, child, &push_token(location, "items")),
        None => {}
    }
}

fn check_array_items(c: &mut Checker<'_>, schema: &Map<String, Value>, location: &str) {
    if c.dialect == Dialect::OpenApi31 {
        return;
    }
    if schema.get("type").and_then(Value::as_str) == Some("array") && !schema.contains_key("items") {
        c.error(location, "schema of type `array` must declare `items`");
    }
}

fn check_required_defined(c: &mut Checker<'_>, schema: &Map<String, Value>, location: &str) {
    if schema.contains_key("allOf") {
        return;
    }
    let Some(required) = schema.get("required").and_then(Value::as_array) else {
        return;
    };
    let properties = schema.get("properties").and_then(Value::as_object);
    for (i, name) in required.iter().enumerate() {
        let Some(name) = name.as_str() else {
            continue;
        };
        if !properties.is_some_and(|p| p.contains_key(name)) {
            c.error(
                push_token(&push_token(location, "required"), &i.to_string()),
                format!("required property `{}` is not defined in `properties`", name),
            );
        }
    }
}

fn discriminator_property<'v>(schema: &'v Map<String, Value>, dialect: Dialect) -> Option<&'v str> {
    let discriminator = schema.get("discriminator")?;
    if dialect.is_swagger() {
        discriminator.as_str()
    } else {
        discriminator.get("propertyName")?.as_str()
    }
}

/// Whether `keyword` (`properties` or `required`) of `value`, or of any
/// `allOf` member, names `property`.
fn names_property<'a>(c: &Checker<'a>, value: &'a Value, keyword: &str, property: &str, depth: usize) -> bool {
    let Some(schema) = c.resolve(value).as_object() else {
        return false;
    };
    let own = match schema.get(keyword) {
        Some(Value::Object(map)) => map.contains_key(property),
        Some(Value::Array(items)) => items.iter().any(|v| v.as_str() == Some(property)),
        _ => false,
    };
    if own || depth >= MAX_ALL_OF_DEPTH {
        return own;
    }
    schema
        .get("allOf")
        .and_then(Value::as_array)
        .is_some_and(|members| {
            members
                .iter()
                .any(|m| names_property(c, m, keyword, property, depth + 1))
        })
}

/// `names_property` on the schema itself, or on every `oneOf`/`anyOf` member.
fn defined_everywhere<'a>(c: &Checker<'a>, value: &'a Value, keyword: &str, property: &str) -> bool {
    if names_property(c, value, keyword, property, 0) {
        return true;
    }
    ["oneOf", "anyOf"].iter().any(|key| {
        value.get(*key).and_then(Value::as_array).is_some_and(|members| {
            !members.is_empty()
                && members
                    .iter()
                    .all(|m| names_property(c, m, keyword, property, 0))
        })
    })
}

fn check_discriminator<'a>(c: &mut Checker<'a>, value: &'a Value, schema: &Map<String, Value>, location: &str) {
    let Some(property) = discriminator_property(schema, c.dialect) else {
        return;
    };
    let at = push_token(location, "discriminator");

    if !defined_everywhere(c, value, "properties", property) {
        c.error(
            at,
            format!("discriminator property `{}` is not defined in the schema", property),
        );
    } else if !defined_everywhere(c, value, "required", property) {
        c.warn(
            at,
            format!("discriminator property `{}` should be listed in `required`", property),
        );
    }
}

/// 3.x component keys must be plain identifiers.
pub(crate) fn check_component_names(c: &mut Checker<'_>) {
    if c.dialect.is_swagger() {
        return;
    }
    let doc = c.doc;
    let Some(components) = doc.get("components").and_then(Value::as_object) else {
        return;
    };
    for (section, entries) in components {
        if section.starts_with("x-") {
            continue;
        }
        let Some(entries) = entries.as_object() else {
            continue;
        };
        let base = from_tokens(&["components", section.as_str()]);
        for name in entries.keys() {
            if !COMPONENT_NAME_RE.is_match(name) {
                c.error(
                    push_token(&base, name),
                    format!("component name `{}` must match ^[a-zA-Z0-9.\\-_]+$", name),
                );
            }
        }
    }
}
