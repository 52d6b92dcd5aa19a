//! Integration tests for structural and semantic validation.

use oas_refgraph::{
    reduce_errors_by_lineage, validate, validate_semantics, validate_structure, Dialect,
    MemorySource, Phase, StructuralError, ValidateError, ValidateOptions,
};
use serde_json::{json, Map, Value};

fn check(doc: &Value, options: &ValidateOptions) -> oas_refgraph::ValidationResult {
    validate(doc, options, &MemorySource::new()).unwrap()
}

// === Dialects ===

mod dialects {
    use super::*;

    #[test]
    fn swagger_petstore() {
        let doc = json!({
            "swagger": "2.0",
            "info": { "title": "Pets", "version": "1.0.0" },
            "basePath": "/v1",
            "consumes": ["multipart/form-data"],
            "paths": {
                "/pets/{petId}/photo": { "post": {
                    "parameters": [
                        { "name": "petId", "in": "path", "required": true, "type": "string" },
                        { "name": "file", "in": "formData", "type": "file" }
                    ],
                    "responses": { "200": { "description": "ok" } }
                } }
            },
            "securityDefinitions": { "basic": { "type": "basic" } },
            "security": [{ "basic": [] }]
        });
        let result = check(&doc, &ValidateOptions::new());
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn openapi_31_webhooks_only() {
        let doc = json!({
            "openapi": "3.1.0",
            "info": { "title": "Hooks", "version": "1" },
            "webhooks": { "newPet": { "post": { "responses": { "200": { "description": "ok" } } } } }
        });
        assert!(check(&doc, &ValidateOptions::new()).valid);
    }

    #[test]
    fn swagger_rejects_request_body() {
        let doc = json!({
            "swagger": "2.0",
            "info": { "title": "Pets", "version": "1" },
            "paths": { "/pets": { "post": {
                "requestBody": {},
                "responses": { "200": { "description": "ok" } }
            } } }
        });
        let result = check(&doc, &ValidateOptions::new());
        assert!(!result.valid);
        assert_eq!(result.phase, Phase::Structural);
        assert_eq!(result.errors[0].location, "/paths/~1pets/post");
    }

    #[test]
    fn missing_discriminator_field() {
        let err = validate(
            &json!({ "info": { "title": "x", "version": "1" } }),
            &ValidateOptions::new(),
            &MemorySource::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ValidateError::UnsupportedDialect { .. }));
    }
}

// === Lineage Reduction ===

mod lineage {
    use super::*;

    #[test]
    fn misspelled_property_in_nested_one_of() {
        let errors = vec![
            StructuralError::new(
                "/paths/~1pets/get/responses/200",
                "must have required property '$ref'",
            ),
            StructuralError::new(
                "/paths/~1pets/get/responses/200/content/application~1json/schema/properties/name",
                "must NOT have additional properties",
            ),
            StructuralError::new(
                "/paths/~1pets/get/responses/200/content/application~1json/schema",
                "must match exactly one schema in oneOf",
            ),
            StructuralError::new(
                "/paths/~1pets/get/responses/200/content/application~1json",
                "must NOT have additional properties",
            ),
            StructuralError::new(
                "/paths/~1pets/get/responses/200",
                "must match exactly one schema in oneOf",
            ),
        ];
        let reduced = reduce_errors_by_lineage(errors);
        assert_eq!(reduced.len(), 1);
        assert!(reduced[0].location.ends_with("/schema/properties/name"));
    }

    #[test]
    fn misspelled_property_inside_one_of_branch() {
        let meta = json!({
            "type": "object",
            "required": ["openapi", "paths"],
            "properties": {
                "paths": { "additionalProperties": { "additionalProperties": {
                    "properties": { "responses": { "additionalProperties": {
                        "oneOf": [
                            { "$ref": "#/definitions/Reference" },
                            { "$ref": "#/definitions/Response" }
                        ]
                    } } }
                } } }
            },
            "definitions": {
                "Reference": { "type": "object", "required": ["$ref"] },
                "Response": {
                    "type": "object",
                    "required": ["description"],
                    "properties": {
                        "description": { "type": "string" },
                        "content": { "additionalProperties": {
                            "type": "object",
                            "properties": { "schema": { "oneOf": [
                                { "$ref": "#/definitions/Reference" },
                                { "$ref": "#/definitions/Schema" }
                            ] } },
                            "additionalProperties": false
                        } }
                    },
                    "additionalProperties": false
                },
                "Schema": {
                    "type": "object",
                    "properties": { "properties": { "additionalProperties": { "$ref": "#/definitions/Schema" } } },
                    "patternProperties": { "^(type|format|items|required)$": {} },
                    "additionalProperties": false
                }
            }
        });
        let doc = json!({
            "openapi": "3.0.3",
            "info": { "title": "Pets", "version": "1" },
            "paths": { "/pets": { "get": { "responses": { "200": {
                "description": "ok",
                "content": { "application/json": { "schema": {
                    "type": "object",
                    "properties": { "name": { "type": "string", "fromat": "uuid" } }
                } } }
            } } } } }
        });

        let options = ValidateOptions::new().meta_schema(meta);
        let result = check(&doc, &options);
        assert!(!result.valid);
        assert_eq!(result.phase, Phase::Structural);
        assert_eq!(result.errors.len(), 1, "{:?}", result.errors);
        assert_eq!(
            result.errors[0].location,
            "/paths/~1pets/get/responses/200/content/application~1json/schema/properties/name"
        );
        assert!(result.errors[0].message.contains("fromat"));
    }

    #[test]
    fn misspelled_operation_key_is_one_error() {
        let doc = json!({
            "openapi": "3.0.3",
            "info": { "title": "Pets", "version": "1" },
            "paths": { "/pets": { "get": {
                "respones": { "200": { "description": "ok" } }
            } } }
        });
        let result = check(&doc, &ValidateOptions::new());
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1, "{:?}", result.errors);
        assert_eq!(result.errors[0].location, "/paths/~1pets/get");
        assert_eq!(result.additional_error_count, 0);
    }

    #[test]
    fn only_boilerplate_falls_back() {
        let errors = vec![
            StructuralError::new("/a", "must match exactly one schema in oneOf"),
            StructuralError::new("/b", "\"$ref\" is a required property"),
        ];
        assert_eq!(reduce_errors_by_lineage(errors.clone()), errors);
    }
}

// === Error Bounds ===

mod bounds {
    use super::*;
    use std::time::Duration;

    fn many_broken_paths(count: usize) -> Value {
        let mut paths = Map::new();
        for i in 0..count {
            paths.insert(format!("/p{i}"), json!({ "get": { "summary": "no responses" } }));
        }
        json!({
            "openapi": "3.0.3",
            "info": { "title": "Broken", "version": "1" },
            "paths": paths
        })
    }

    #[test]
    fn two_thousand_errors_capped_at_twenty() {
        let doc = many_broken_paths(2000);
        let result = check(&doc, &ValidateOptions::new().max_errors(20));
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 20);
        assert_eq!(result.additional_error_count, 1980);
    }

    #[test]
    fn default_cap() {
        let doc = many_broken_paths(50);
        let result = check(&doc, &ValidateOptions::new());
        assert_eq!(result.errors.len(), oas_refgraph::DEFAULT_MAX_ERRORS);
        assert_eq!(result.additional_error_count, 30);
    }

    #[test]
    fn semantic_errors_capped_too() {
        let doc = json!({
            "openapi": "3.0.3",
            "info": { "title": "Codes", "version": "1" },
            "paths": { "/a": { "get": { "responses": {
                "600": {}, "700": {}, "800": {}, "900": {}, "abc": {}
            } } } }
        });
        let result = check(&doc, &ValidateOptions::new().max_errors(2));
        assert_eq!(result.phase, Phase::Semantic);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.additional_error_count, 3);
    }

    #[test]
    fn structure_timeout_is_an_error() {
        let doc = many_broken_paths(10);
        let options = ValidateOptions::new().timeout(Duration::ZERO);
        let meta = json!({ "type": "object" });
        let err = validate_structure(&doc, &meta, &options).unwrap_err();
        assert!(matches!(err, ValidateError::Timeout { .. }));
    }
}

// === Semantics ===

mod semantics {
    use super::*;

    #[test]
    fn collects_every_violation() {
        let doc = json!({
            "openapi": "3.0.3",
            "paths": {
                "pets": {},
                "/pets/{petId}": { "get": { "responses": { "999": {} } } }
            },
            "components": {
                "securitySchemes": { "bearer": { "type": "http" } },
                "schemas": { "Pet": {
                    "properties": { "name": {} },
                    "discriminator": { "propertyName": "kind" }
                } }
            }
        });
        let report = validate_semantics(&doc, Dialect::OpenApi30);
        let locations: Vec<&str> = report.errors.iter().map(|e| e.location.as_str()).collect();
        assert!(locations.contains(&"/paths/pets"));
        assert!(locations.contains(&"/paths/~1pets~1{petId}/get"));
        assert!(locations.contains(&"/paths/~1pets~1{petId}/get/responses/999"));
        assert!(locations.contains(&"/components/securitySchemes/bearer"));
        assert!(locations.contains(&"/components/schemas/Pet/discriminator"));
    }

    #[test]
    fn warnings_do_not_invalidate() {
        let doc = json!({
            "openapi": "3.0.3",
            "info": { "title": "Pets", "version": "1" },
            "paths": {
                "/pets/{id}": { "get": {
                    "parameters": [{ "name": "id", "in": "path", "required": true }],
                    "responses": { "200": { "description": "ok" } }
                } },
                "/pets/{petId}": { "get": {
                    "parameters": [{ "name": "petId", "in": "path", "required": true }],
                    "responses": { "200": { "description": "ok" } }
                } }
            }
        });
        let result = check(&doc, &ValidateOptions::new());
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn result_serializes_camel_case() {
        let doc = json!({
            "openapi": "3.0.3",
            "info": { "title": "Pets", "version": "1" },
            "paths": {}
        });
        let value = serde_json::to_value(check(&doc, &ValidateOptions::new())).unwrap();
        assert_eq!(value["valid"], true);
        assert_eq!(value["phase"], "semantic");
        assert_eq!(value["additionalErrorCount"], 0);
        assert_eq!(value["errors"], json!([]));
    }

    #[test]
    fn unreachable_external_reference_is_operational() {
        let doc = json!({
            "openapi": "3.0.3",
            "info": { "title": "Pets", "version": "1" },
            "paths": { "/pets": { "get": { "responses": {
                "200": { "$ref": "responses.yaml#/Ok" }
            } } } }
        });
        let err = validate(&doc, &ValidateOptions::new(), &MemorySource::new()).unwrap_err();
        assert!(matches!(err, ValidateError::Resolve(_)));
        assert_eq!(err.exit_code(), 3);
    }
}
