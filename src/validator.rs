//! Document validation: structural (meta-schema) then semantic.

use std::cmp::Reverse;
use std::collections::HashMap;

use jsonschema::error::ValidationErrorKind;
use jsonschema::Validator;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, trace};

use crate::bundle::bundle_within;
use crate::cycle::Deadline;
use crate::error::{ResolveError, ValidateError, ValidationMessage};
use crate::lineage::{LineageReducer, StructuralError};
use crate::loader::DocumentSource;
use crate::meta;
use crate::pointer::{lookup, ref_of, unescape_token, Reference};
use crate::semantic::validate_semantics_within;
use crate::types::{Dialect, ValidateOptions};

/// Nested `oneOf`/`anyOf` levels expanded below a failing composition.
const MAX_BRANCH_DEPTH: usize = 8;

/// Reference hops followed while walking a keyword location.
const MAX_REF_HOPS: usize = 32;

/// Keys copied from the enclosing schema so a branch's local references
/// still resolve once it is compiled on its own.
const CARRIED_KEYS: &[&str] = &["$schema", "$id", "id", "definitions", "$defs"];

/// Which validation phase produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Structural,
    Semantic,
}

/// Outcome of validating a document. An invalid document is a normal result,
/// not an error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub phase: Phase,
    pub errors: Vec<ValidationMessage>,
    pub warnings: Vec<ValidationMessage>,
    /// Errors found beyond `max_errors` and not reported individually.
    pub additional_error_count: usize,
}

impl ValidationResult {
    fn new(phase: Phase, errors: Vec<ValidationMessage>, warnings: Vec<ValidationMessage>, additional: usize) -> Self {
        Self {
            valid: errors.is_empty(),
            phase,
            errors,
            warnings,
            additional_error_count: additional,
        }
    }

    /// Convert an invalid result into the matching error.
    pub fn into_result(self) -> Result<Self, ValidateError> {
        if self.valid {
            return Ok(self);
        }
        Err(match self.phase {
            Phase::Structural => ValidateError::Structural {
                errors: self.errors,
                additional: self.additional_error_count,
            },
            Phase::Semantic => ValidateError::Semantic {
                errors: self.errors,
                additional: self.additional_error_count,
            },
        })
    }
}

/// Validate `doc` against a structural meta-schema.
///
/// Cascaded errors are reduced by lineage as they are produced; at most
/// `options.max_errors` are kept and the rest are counted.
///
/// # Errors
///
/// Returns `InvalidMetaSchema` if `meta_schema` does not compile and
/// `Timeout` when `options.timeout` passes.
pub fn validate_structure(
    doc: &Value,
    meta_schema: &Value,
    options: &ValidateOptions,
) -> Result<ValidationResult, ValidateError> {
    structural(doc, meta_schema, options.max_errors, &Deadline::new(options.timeout))
}

fn structural(
    doc: &Value,
    meta_schema: &Value,
    max_errors: usize,
    deadline: &Deadline,
) -> Result<ValidationResult, ValidateError> {
    let validator = jsonschema::validator_for(meta_schema).map_err(|e| ValidateError::InvalidMetaSchema {
        message: e.to_string(),
    })?;

    let mut reducer = LineageReducer::new(max_errors);
    let mut branches = Branches::new(meta_schema);
    if let Some(elapsed) = deadline.expired() {
        return Err(ValidateError::Timeout { elapsed });
    }
    for e in validator.iter_errors(doc) {
        if let Some(elapsed) = deadline.expired() {
            return Err(ValidateError::Timeout { elapsed });
        }
        let error = StructuralError {
            message: e.to_string(),
            location: e.instance_path.to_string(),
            keyword_location: e.schema_path.to_string(),
        };
        if is_unmatched_composition(&e.kind) {
            let mut inner = branches.expand(doc, ROOT_SCOPE, &error.keyword_location, &error.location, 0, deadline)?;
            // Deepest first, so each lineage records its most specific error.
            inner.sort_by_key(|b| Reverse(b.location.matches('/').count()));
            for branch_error in inner {
                reducer.push(branch_error);
            }
        }
        reducer.push(error);
    }

    let (errors, additional) = reducer.finish();
    if additional > 0 {
        debug!(kept = errors.len(), additional, "structural errors truncated");
    }
    Ok(ValidationResult::new(
        Phase::Structural,
        errors.into_iter().map(ValidationMessage::from).collect(),
        Vec::new(),
        additional,
    ))
}

fn is_unmatched_composition(kind: &ValidationErrorKind) -> bool {
    matches!(kind, ValidationErrorKind::OneOfNotValid | ValidationErrorKind::AnyOf)
}

const ROOT_SCOPE: usize = 0;

/// Per-branch errors of failed `oneOf`/`anyOf` keywords.
///
/// A failed composition is reported as one error with no detail about its
/// branches, so the failing instance is validated again against each branch
/// on its own. Branch validators are compiled once per keyword location.
struct Branches {
    /// Scope 0 is the meta-schema; scope `n` is the schema of `compiled[n - 1]`.
    meta: Value,
    compiled: Vec<(Value, Validator)>,
    /// (scope, keyword location) to the scopes of its branches; `None` when
    /// the branches could not be compiled.
    known: HashMap<(usize, String), Option<Vec<usize>>>,
}

impl Branches {
    fn new(meta: &Value) -> Self {
        Self {
            meta: meta.clone(),
            compiled: Vec::new(),
            known: HashMap::new(),
        }
    }

    fn schema(&self, scope: usize) -> &Value {
        match scope {
            ROOT_SCOPE => &self.meta,
            n => &self.compiled[n - 1].0,
        }
    }

    /// Errors inside every branch of the composition at `keyword` (a
    /// keyword location within `scope`) for the instance at `location`.
    fn expand(
        &mut self,
        doc: &Value,
        scope: usize,
        keyword: &str,
        location: &str,
        depth: usize,
        deadline: &Deadline,
    ) -> Result<Vec<StructuralError>, ValidateError> {
        let Some(instance) = doc.pointer(location) else {
            return Ok(Vec::new());
        };
        let Some(scopes) = self.branch_scopes(scope, keyword) else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        for branch in scopes {
            if let Some(elapsed) = deadline.expired() {
                return Err(ValidateError::Timeout { elapsed });
            }
            let found: Vec<(StructuralError, bool)> = self.compiled[branch - 1]
                .1
                .iter_errors(instance)
                .map(|e| {
                    let error = StructuralError {
                        message: e.to_string(),
                        location: format!("{}{}", location, e.instance_path),
                        keyword_location: e.schema_path.to_string(),
                    };
                    (error, is_unmatched_composition(&e.kind))
                })
                .collect();

            for (error, composite) in found {
                if composite && depth < MAX_BRANCH_DEPTH {
                    out.extend(self.expand(
                        doc,
                        branch,
                        &error.keyword_location,
                        &error.location,
                        depth + 1,
                        deadline,
                    )?);
                }
                out.push(error);
            }
        }
        Ok(out)
    }

    fn branch_scopes(&mut self, scope: usize, keyword: &str) -> Option<Vec<usize>> {
        let key = (scope, keyword.to_string());
        if let Some(known) = self.known.get(&key) {
            return known.clone();
        }
        let scopes = self.compile(scope, keyword);
        if scopes.is_none() {
            trace!(keyword, "composition branches not expandable");
        }
        self.known.insert(key, scopes.clone());
        scopes
    }

    fn compile(&mut self, scope: usize, keyword: &str) -> Option<Vec<usize>> {
        let schema = self.schema(scope);
        let branches = keyword_target(schema, keyword)?.as_array()?;
        let wrapped: Vec<Value> = branches.iter().map(|b| standalone(schema, b)).collect();

        let mut scopes = Vec::with_capacity(wrapped.len());
        for branch in wrapped {
            let validator = jsonschema::validator_for(&branch).ok()?;
            self.compiled.push((branch, validator));
            scopes.push(self.compiled.len());
        }
        Some(scopes)
    }
}

/// The schema node a keyword location points at. `$ref` segments are
/// followed through local references.
fn keyword_target<'v>(schema: &'v Value, keyword: &str) -> Option<&'v Value> {
    let mut current = schema;
    for token in keyword.split('/').skip(1) {
        current = child(schema, current, &unescape_token(token))?;
    }
    Some(current)
}

fn child<'v>(schema: &'v Value, mut current: &'v Value, token: &str) -> Option<&'v Value> {
    for _ in 0..MAX_REF_HOPS {
        let target = ref_of(current).and_then(|raw| lookup(schema, raw).ok());
        if token == "$ref" && target.is_some() {
            return target;
        }
        let found = match current {
            Value::Object(map) => map.get(token),
            Value::Array(items) => token.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match (found, target) {
            (Some(found), _) => return Some(found),
            (None, Some(next)) => current = next,
            (None, None) => return None,
        }
    }
    None
}

/// `branch` as a schema of its own, carrying the enclosing schema's
/// definitions.
fn standalone(schema: &Value, branch: &Value) -> Value {
    let (Some(outer), Some(inner)) = (schema.as_object(), branch.as_object()) else {
        return branch.clone();
    };
    let mut out: Map<String, Value> = inner.clone();
    for key in CARRIED_KEYS {
        if let Some(value) = outer.get(*key) {
            out.entry(key.to_string()).or_insert_with(|| value.clone());
        }
    }
    Value::Object(out)
}

/// Validate a Swagger/OpenAPI document.
///
/// Structural validation runs first, against `options.meta_schema` or the
/// built-in baseline for the detected dialect. Semantic rules run only once
/// the structure is sound, on a bundled copy when the document has external
/// references.
///
/// # Errors
///
/// Fails only for operational problems: unknown dialect, an uncompilable
/// meta-schema, an external reference that cannot be fetched, or timeout.
pub fn validate(
    doc: &Value,
    options: &ValidateOptions,
    source: &dyn DocumentSource,
) -> Result<ValidationResult, ValidateError> {
    let dialect = Dialect::detect(doc).ok_or_else(|| ValidateError::UnsupportedDialect {
        found: Dialect::describe_discriminator(doc),
    })?;
    let deadline = Deadline::new(options.timeout);

    let meta_schema = match &options.meta_schema {
        Some(schema) => schema.clone(),
        None => meta::builtin(dialect),
    };
    let result = structural(doc, &meta_schema, options.max_errors, &deadline)?;
    if !result.valid {
        info!(%dialect, errors = result.errors.len(), "document failed structural validation");
        return Ok(result);
    }

    let bundled;
    let target = if has_external_refs(doc) {
        bundled = bundle_within(doc, options.base_location.as_deref(), source, &deadline).map_err(|e| match e {
            ResolveError::Timeout { elapsed } => ValidateError::Timeout { elapsed },
            other => ValidateError::Resolve(other),
        })?;
        &bundled
    } else {
        doc
    };

    let report = validate_semantics_within(target, dialect, &deadline)
        .map_err(|elapsed| ValidateError::Timeout { elapsed })?;

    let mut errors = report.errors;
    let additional = errors.len().saturating_sub(options.max_errors);
    errors.truncate(options.max_errors);
    info!(
        %dialect,
        errors = errors.len(),
        warnings = report.warnings.len(),
        "semantic validation complete"
    );
    Ok(ValidationResult::new(Phase::Semantic, errors, report.warnings, additional))
}

/// Whether any `$ref` in `value` points outside the document.
pub fn has_external_refs(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            let external = matches!(
                map.get("$ref").and_then(Value::as_str).map(Reference::parse),
                Some(Ok(Reference { resource: Some(_), .. }))
            );
            external || map.values().any(has_external_refs)
        }
        Value::Array(items) => items.iter().any(has_external_refs),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemorySource;
    use serde_json::json;
    use std::time::Duration;

    fn petstore() -> Value {
        json!({
            "openapi": "3.0.3",
            "info": { "title": "Pets", "version": "1.0.0" },
            "paths": {
                "/pets/{petId}": {
                    "get": {
                        "operationId": "getPet",
                        "parameters": [
                            { "name": "petId", "in": "path", "required": true, "schema": { "type": "string" } }
                        ],
                        "responses": { "200": { "description": "ok" } }
                    }
                }
            }
        })
    }

    #[test]
    fn valid_document() {
        let result = validate(&petstore(), &ValidateOptions::new(), &MemorySource::new()).unwrap();
        assert!(result.valid);
        assert_eq!(result.phase, Phase::Semantic);
        assert!(result.errors.is_empty());
        assert!(result.into_result().is_ok());
    }

    #[test]
    fn structural_failure_skips_semantics() {
        let mut doc = petstore();
        doc["info"] = json!({ "title": "Pets" });
        doc["paths"]["/pets/{petId}"]["get"]["parameters"] = json!([]);

        let result = validate(&doc, &ValidateOptions::new(), &MemorySource::new()).unwrap();
        assert!(!result.valid);
        assert_eq!(result.phase, Phase::Structural);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].location, "/info");
    }

    #[test]
    fn semantic_failure() {
        let mut doc = petstore();
        doc["paths"]["/pets/{petId}"]["get"]["parameters"] = json!([]);

        let result = validate(&doc, &ValidateOptions::new(), &MemorySource::new()).unwrap();
        assert!(!result.valid);
        assert_eq!(result.phase, Phase::Semantic);
        assert!(matches!(
            result.into_result(),
            Err(ValidateError::Semantic { .. })
        ));
    }

    #[test]
    fn unsupported_dialect() {
        let err = validate(&json!({ "swagger": "1.2" }), &ValidateOptions::new(), &MemorySource::new())
            .unwrap_err();
        assert!(matches!(err, ValidateError::UnsupportedDialect { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn invalid_meta_schema() {
        let options = ValidateOptions::new().meta_schema(json!({ "type": 12 }));
        let err = validate(&petstore(), &options, &MemorySource::new()).unwrap_err();
        assert!(matches!(err, ValidateError::InvalidMetaSchema { .. }));
    }

    #[test]
    fn error_cap_counts_the_rest() {
        let schema = json!({
            "properties": { "items": { "type": "array", "items": { "type": "string" } } }
        });
        let items: Vec<Value> = (0..2000).map(|i| json!(i)).collect();
        let doc = json!({ "items": items });

        let options = ValidateOptions::new().max_errors(20);
        let result = validate_structure(&doc, &schema, &options).unwrap();
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 20);
        assert_eq!(result.additional_error_count, 1980);
        assert_eq!(result.errors[0].location, "/items/0");
    }

    fn response_meta_schema() -> Value {
        json!({
            "type": "object",
            "properties": { "paths": { "additionalProperties": { "$ref": "#/$defs/pathItem" } } },
            "$defs": {
                "pathItem": { "additionalProperties": { "$ref": "#/$defs/operation" } },
                "operation": {
                    "properties": { "responses": { "additionalProperties": {
                        "oneOf": [{ "$ref": "#/$defs/reference" }, { "$ref": "#/$defs/response" }]
                    } } }
                },
                "reference": {
                    "type": "object",
                    "required": ["$ref"],
                    "properties": { "$ref": { "type": "string" } }
                },
                "response": {
                    "type": "object",
                    "required": ["description"],
                    "properties": {
                        "description": { "type": "string" },
                        "content": { "additionalProperties": { "$ref": "#/$defs/mediaType" } }
                    },
                    "additionalProperties": false
                },
                "mediaType": {
                    "type": "object",
                    "properties": { "schema": { "type": "object" } },
                    "additionalProperties": false
                }
            }
        })
    }

    #[test]
    fn one_of_failure_pinpoints_the_branch_error() {
        let doc = json!({ "paths": { "/pets": { "get": { "responses": { "200": {
            "description": "ok",
            "content": { "application/json": { "schemma": { "type": "object" } } }
        } } } } } });

        let result = validate_structure(&doc, &response_meta_schema(), &ValidateOptions::new()).unwrap();
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1, "{:?}", result.errors);
        assert_eq!(
            result.errors[0].location,
            "/paths/~1pets/get/responses/200/content/application~1json"
        );
        assert!(result.errors[0].message.contains("schemma"));
    }

    #[test]
    fn nested_composition_is_expanded() {
        let schema = json!({
            "properties": { "value": { "anyOf": [
                { "type": "string" },
                { "oneOf": [
                    { "type": "object", "required": ["kind"] },
                    { "type": "object", "properties": { "size": { "type": "integer" } }, "required": ["size"] }
                ] }
            ] } }
        });
        let doc = json!({ "value": { "size": "large" } });
        let result = validate_structure(&doc, &schema, &ValidateOptions::new()).unwrap();
        assert_eq!(result.errors.len(), 1, "{:?}", result.errors);
        assert_eq!(result.errors[0].location, "/value/size");
    }

    #[test]
    fn keyword_location_follows_refs() {
        let schema = response_meta_schema();
        let target = keyword_target(
            &schema,
            "/properties/paths/additionalProperties/$ref/additionalProperties/$ref/properties/responses/additionalProperties/oneOf",
        )
        .unwrap();
        assert_eq!(target.as_array().map(Vec::len), Some(2));
        assert!(keyword_target(&schema, "/properties/nothing/oneOf").is_none());
    }

    #[test]
    fn zero_timeout_raises() {
        let options = ValidateOptions::new().timeout(Duration::ZERO);
        let err = validate(&petstore(), &options, &MemorySource::new()).unwrap_err();
        assert!(matches!(err, ValidateError::Timeout { .. }));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn external_refs_are_bundled_before_semantics() {
        let mut doc = petstore();
        doc["paths"]["/pets/{petId}"]["get"]["parameters"] = json!([{ "$ref": "params.json#/PetId" }]);
        let source = MemorySource::new().with(
            "params.json",
            json!({ "PetId": { "name": "petId", "in": "path", "required": true, "schema": { "type": "string" } } }),
        );

        assert!(has_external_refs(&doc));
        let result = validate(&doc, &ValidateOptions::new(), &source).unwrap();
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn detects_external_refs() {
        assert!(!has_external_refs(&json!({ "a": { "$ref": "#/b" } })));
        assert!(has_external_refs(&json!({ "a": [{ "$ref": "other.yaml#/b" }] })));
    }
}
