//! Built-in baseline meta-schemas, one per dialect.
//!
//! These cover the document skeleton (root fields, `info`, path items and
//! operation objects) rather than the full official schemas. Callers wanting
//! the official rules pass them through `ValidateOptions::meta_schema`.

use serde_json::{json, Value};

use crate::types::Dialect;

const OPENAPI_OPERATION_KEYS: &[&str] = &[
    "tags",
    "summary",
    "description",
    "externalDocs",
    "operationId",
    "parameters",
    "requestBody",
    "responses",
    "callbacks",
    "deprecated",
    "security",
    "servers",
];

const SWAGGER_OPERATION_KEYS: &[&str] = &[
    "tags",
    "summary",
    "description",
    "externalDocs",
    "operationId",
    "consumes",
    "produces",
    "parameters",
    "responses",
    "schemes",
    "deprecated",
    "security",
];

/// The baseline meta-schema for `dialect`.
pub fn builtin(dialect: Dialect) -> Value {
    let mut schema = json!({
        "type": "object",
        "properties": {
            "info": { "$ref": "#/$defs/info" },
            "paths": { "$ref": "#/$defs/paths" },
            "tags": { "type": "array", "items": { "$ref": "#/$defs/tag" } },
            "security": { "type": "array", "items": { "type": "object" } },
            "externalDocs": { "type": "object", "required": ["url"] }
        },
        "$defs": {
            "info": {
                "type": "object",
                "required": ["title", "version"],
                "properties": {
                    "title": { "type": "string" },
                    "version": { "type": "string" },
                    "description": { "type": "string" }
                }
            },
            "tag": {
                "type": "object",
                "required": ["name"],
                "properties": { "name": { "type": "string" } }
            },
            "paths": {
                "type": "object",
                "patternProperties": { "^x-": {} },
                "additionalProperties": { "$ref": "#/$defs/pathItem" }
            },
            "pathItem": {
                "type": "object",
                "properties": {
                    "$ref": { "type": "string" },
                    "parameters": { "type": "array" }
                }
            },
            "operation": {
                "type": "object",
                "required": ["responses"],
                "properties": {
                    "tags": { "type": "array", "items": { "type": "string" } },
                    "summary": { "type": "string" },
                    "description": { "type": "string" },
                    "operationId": { "type": "string" },
                    "parameters": { "type": "array" },
                    "responses": { "type": "object" },
                    "deprecated": { "type": "boolean" },
                    "security": { "type": "array" }
                },
                "patternProperties": { "^x-": {} },
                "additionalProperties": false
            }
        }
    });

    let (discriminator, required, operation_keys): (&str, &[&str], &[&str]) = match dialect {
        Dialect::Swagger2 => ("swagger", &["swagger", "info", "paths"], SWAGGER_OPERATION_KEYS),
        Dialect::OpenApi30 => ("openapi", &["openapi", "info", "paths"], OPENAPI_OPERATION_KEYS),
        Dialect::OpenApi31 => ("openapi", &["openapi", "info"], OPENAPI_OPERATION_KEYS),
    };

    schema["required"] = json!(required);
    schema["properties"][discriminator] = json!({ "type": "string" });
    if dialect.is_swagger() {
        schema["properties"]["definitions"] = json!({ "type": "object" });
        schema["properties"]["parameters"] = json!({ "type": "object" });
        schema["properties"]["responses"] = json!({ "type": "object" });
        schema["properties"]["securityDefinitions"] = json!({ "type": "object" });
        schema["properties"]["basePath"] = json!({ "type": "string", "pattern": "^/" });
    } else {
        schema["properties"]["components"] = json!({ "type": "object" });
        schema["properties"]["servers"] = json!({
            "type": "array",
            "items": { "type": "object", "required": ["url"] }
        });
    }
    if dialect == Dialect::OpenApi31 {
        schema["properties"]["webhooks"] = json!({ "type": "object" });
        schema["anyOf"] = json!([
            { "required": ["paths"] },
            { "required": ["components"] },
            { "required": ["webhooks"] }
        ]);
    }

    for key in operation_keys {
        let properties = &mut schema["$defs"]["operation"]["properties"];
        if properties.get(*key).is_none() {
            properties[*key] = json!({});
        }
    }
    for method in crate::types::HTTP_METHODS {
        schema["$defs"]["pathItem"]["properties"][*method] = json!({ "$ref": "#/$defs/operation" });
    }

    schema
}
