//! Dialect-aware semantic rules: the checks an OpenAPI/Swagger meta-schema
//! cannot express.
//!
//! Every rule runs to completion and records its findings; nothing stops at
//! the first violation. Locations are JSON Pointers into the document.

mod paths;
mod responses;
mod schemas;
mod security;

use std::cell::Cell;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::cycle::Deadline;
use crate::error::ValidationMessage;
use crate::pointer::{lookup, push_token, ref_of};
use crate::types::{Dialect, HTTP_METHODS};

/// Reference hops followed before a local chain is treated as broken.
const MAX_REF_HOPS: usize = 32;

/// Findings of the semantic rules.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SemanticReport {
    pub errors: Vec<ValidationMessage>,
    pub warnings: Vec<ValidationMessage>,
}

impl SemanticReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

const RULES: &[fn(&mut Checker<'_>)] = &[
    paths::check_paths,
    paths::check_operations,
    responses::check_responses,
    security::check_security_schemes,
    security::check_security_requirements,
    schemas::check_schemas,
    schemas::check_component_names,
];

/// Run every semantic rule for `dialect` against `doc`.
///
/// Never fails: an invalid document is reported through the returned errors.
pub fn validate_semantics(doc: &Value, dialect: Dialect) -> SemanticReport {
    run(doc, dialect, Deadline::unbounded()).finish()
}

/// [`validate_semantics`] under a wall-clock budget. Returns the elapsed time
/// when the budget runs out before every rule has finished.
pub(crate) fn validate_semantics_within(
    doc: &Value,
    dialect: Dialect,
    deadline: &Deadline,
) -> Result<SemanticReport, Duration> {
    let c = run(doc, dialect, *deadline);
    match c.timed_out.get() {
        Some(elapsed) => Err(elapsed),
        None => Ok(c.finish()),
    }
}

fn run(doc: &Value, dialect: Dialect, deadline: Deadline) -> Checker<'_> {
    let mut c = Checker::new(doc, dialect, deadline);
    for rule in RULES {
        if c.out_of_time() {
            break;
        }
        rule(&mut c);
    }
    c
}

pub(crate) struct Checker<'a> {
    pub doc: &'a Value,
    pub dialect: Dialect,
    deadline: Deadline,
    timed_out: Cell<Option<Duration>>,
    errors: Vec<ValidationMessage>,
    warnings: Vec<ValidationMessage>,
}

/// One operation of the document, with the location of its path item.
pub(crate) struct Operation<'a> {
    pub path: &'a str,
    pub method: &'static str,
    pub location: String,
    pub item_location: String,
    pub op: &'a Map<String, Value>,
}

impl<'a> Checker<'a> {
    fn new(doc: &'a Value, dialect: Dialect, deadline: Deadline) -> Self {
        Self {
            doc,
            dialect,
            deadline,
            timed_out: Cell::new(None),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn finish(self) -> SemanticReport {
        SemanticReport {
            errors: self.errors,
            warnings: self.warnings,
        }
    }

    pub fn error(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationMessage::new(location, message));
    }

    pub fn warn(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationMessage::new(location, message));
    }

    /// Whether the budget is spent. Once spent, walks stop yielding items.
    pub fn out_of_time(&self) -> bool {
        if self.timed_out.get().is_none() {
            self.timed_out.set(self.deadline.expired());
        }
        self.timed_out.get().is_some()
    }

    /// Follow local references from `value` to a concrete node. Broken or
    /// external references yield the reference node itself.
    pub fn resolve(&self, value: &'a Value) -> &'a Value {
        let mut current = value;
        for _ in 0..MAX_REF_HOPS {
            let Some(raw) = ref_of(current) else {
                return current;
            };
            match lookup(self.doc, raw) {
                Ok(next) => current = next,
                Err(_) => return current,
            }
        }
        current
    }

    /// Path entries, skipping extensions and non-object items. Path items
    /// given as local references are followed.
    pub fn path_items(&self) -> Vec<(&'a str, String, &'a Map<String, Value>)> {
        let Some(paths) = self.doc.get("paths").and_then(Value::as_object) else {
            return Vec::new();
        };
        paths
            .iter()
            .take_while(|_| !self.out_of_time())
            .filter(|(key, _)| !key.starts_with("x-"))
            .filter_map(|(key, item)| {
                let item = self.resolve(item).as_object()?;
                Some((key.as_str(), push_token("/paths", key), item))
            })
            .collect()
    }

    pub fn operations(&self) -> Vec<Operation<'a>> {
        let mut out = Vec::new();
        for (path, item_location, item) in self.path_items() {
            for method in HTTP_METHODS {
                if let Some(op) = item.get(*method).and_then(Value::as_object) {
                    out.push(Operation {
                        path,
                        method: *method,
                        location: push_token(&item_location, method),
                        item_location: item_location.clone(),
                        op,
                    });
                }
            }
        }
        out
    }

    /// The named entries of a top-level section (`["components", "schemas"]`,
    /// `["securityDefinitions"]`, ...).
    pub fn section(&self, tokens: &[&str]) -> Option<&'a Map<String, Value>> {
        let mut current = self.doc;
        for token in tokens {
            current = current.get(*token)?;
        }
        current.as_object()
    }
}
