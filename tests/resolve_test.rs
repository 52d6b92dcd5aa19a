//! Integration tests for pointer resolution, dereferencing and bundling.

use std::sync::{Arc, Mutex};

use oas_refgraph::{
    bundle, dereference, dereference_with, lookup, resolve, CircularMode, DereferenceOptions,
    MemorySource, Node, ResolveError,
};
use serde_json::{json, Value};

fn petstore() -> Value {
    json!({
        "openapi": "3.0.3",
        "info": { "title": "Pets", "version": "1.0.0" },
        "paths": {
            "/pets": {
                "get": {
                    "parameters": [{ "$ref": "#/components/parameters/Limit" }],
                    "responses": { "200": {
                        "description": "ok",
                        "content": { "application/json": {
                            "schema": { "type": "array", "items": { "$ref": "#/components/schemas/Pet" } }
                        } }
                    } }
                },
                "post": {
                    "requestBody": { "content": { "application/json": {
                        "schema": { "$ref": "#/components/schemas/Pet" }
                    } } },
                    "responses": { "201": { "description": "created" } }
                }
            }
        },
        "components": {
            "parameters": {
                "Limit": { "name": "limit", "in": "query", "schema": { "type": "integer" } }
            },
            "schemas": {
                "Pet": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "name": { "type": "string" },
                        "owner": { "$ref": "#/components/schemas/Owner" }
                    }
                },
                "Owner": { "type": "object", "properties": { "id": { "type": "integer" } } }
            }
        }
    })
}

fn contains_ref(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.contains_key("$ref") || map.values().any(contains_ref),
        Value::Array(items) => items.iter().any(contains_ref),
        _ => false,
    }
}

// === Pointer Resolution ===

mod pointer_resolution {
    use super::*;

    #[test]
    fn lookup_local_pointer() {
        let doc = petstore();
        let owner = lookup(&doc, "#/components/schemas/Owner").unwrap();
        assert_eq!(owner["type"], "object");
    }

    #[test]
    fn lookup_percent_encoded_path_key() {
        let doc = petstore();
        let get = lookup(&doc, "#/paths/~1pets/get").unwrap();
        assert!(get.get("responses").is_some());

        let doc = json!({ "paths": { "/a b": { "x": 1 } } });
        assert_eq!(lookup(&doc, "#/paths/~1a%20b/x").unwrap(), &json!(1));
    }

    #[test]
    fn empty_pointer_fails_fast() {
        let doc = petstore();
        let err = lookup(&doc, "   ").unwrap_err();
        assert!(matches!(err, ResolveError::UnresolvableReference { .. }));
    }

    #[test]
    fn missing_target_message() {
        let doc = petstore();
        let err = lookup(&doc, "#/components/schemas/Cat").unwrap_err();
        assert!(err
            .to_string()
            .starts_with("could not find a definition for `#/components/schemas/Cat`"));
    }

    #[test]
    fn resolve_follows_chains() {
        let doc = json!({
            "components": { "schemas": {
                "Alias": { "$ref": "#/components/schemas/Middle" },
                "Middle": { "$ref": "#/components/schemas/Real" },
                "Real": { "type": "string" }
            } }
        });
        let value = resolve(&doc, "#/components/schemas/Alias", None, &MemorySource::new()).unwrap();
        assert_eq!(value, json!({ "type": "string" }));
    }

    #[test]
    fn resolve_external_fragment() {
        let source = MemorySource::new().with(
            "common.yaml",
            json!({ "schemas": { "Error": { "type": "object" } } }),
        );
        let doc = json!({});
        let value = resolve(&doc, "common.yaml#/schemas/Error", Some("api.yaml"), &source).unwrap();
        assert_eq!(value["type"], "object");
    }

    #[test]
    fn resolve_looping_chain_is_unresolvable() {
        let doc = json!({ "a": { "$ref": "#/b" }, "b": { "$ref": "#/a" } });
        let err = resolve(&doc, "#/a", None, &MemorySource::new()).unwrap_err();
        assert!(matches!(err, ResolveError::UnresolvableReference { .. }));
    }
}

// === Dereferencing ===

mod dereferencing {
    use super::*;

    #[test]
    fn replaces_every_reference() {
        let doc = petstore();
        let result = dereference(&doc, &DereferenceOptions::new()).unwrap();
        assert!(result.is_complete());
        assert!(result.circular.is_empty());

        let value = result.to_value();
        assert!(!contains_ref(&value));
        let body = &value["paths"]["/pets"]["post"]["requestBody"]["content"]["application/json"]["schema"];
        assert_eq!(body["properties"]["owner"]["properties"]["id"]["type"], "integer");
    }

    #[test]
    fn input_is_not_mutated() {
        let doc = petstore();
        let before = doc.clone();
        dereference(&doc, &DereferenceOptions::new()).unwrap();
        assert_eq!(doc, before);
    }

    #[test]
    fn dereference_is_idempotent() {
        let doc = petstore();
        let once = dereference(&doc, &DereferenceOptions::new()).unwrap().to_value();
        let twice = dereference(&once, &DereferenceOptions::new()).unwrap().to_value();
        assert_eq!(once, twice);
    }

    #[test]
    fn shared_target_is_one_node() {
        let doc = petstore();
        let result = dereference(&doc, &DereferenceOptions::new()).unwrap();
        let graph = &result.graph;
        let a = graph
            .pointer("/paths/~1pets/get/responses/200/content/application~1json/schema/items")
            .unwrap();
        let b = graph
            .pointer("/paths/~1pets/post/requestBody/content/application~1json/schema")
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn mutual_recursion_ignored_and_reported() {
        let doc = json!({ "components": { "schemas": {
            "A": { "type": "object", "properties": { "b": { "$ref": "#/components/schemas/B" } } },
            "B": { "type": "object", "properties": { "a": { "$ref": "#/components/schemas/A" } } }
        } } });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let options = DereferenceOptions::new()
            .circular(CircularMode::Ignore)
            .on_circular(move |p| sink.lock().unwrap().push(p.to_string()));

        let result = dereference(&doc, &options).unwrap();
        assert!(result.circular.contains("#/components/schemas/A"));
        assert_eq!(result.circular.len(), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["#/components/schemas/A".to_string()]);

        let value = result.to_value();
        assert_eq!(
            value["components"]["schemas"]["A"]["properties"]["b"]["properties"]["a"],
            json!({ "$ref": "#/components/schemas/A" })
        );
    }

    #[test]
    fn allow_mode_builds_a_real_cycle() {
        let doc = json!({ "components": { "schemas": {
            "Node": { "type": "object", "properties": {
                "next": { "$ref": "#/components/schemas/Node" }
            } }
        } } });
        let result = dereference(&doc, &DereferenceOptions::new()).unwrap();
        assert!(result.graph.is_cyclic());

        let graph = &result.graph;
        let node = graph.pointer("/components/schemas/Node").unwrap();
        let properties = graph.get(node, "properties").unwrap();
        assert_eq!(graph.get(properties, "next"), Some(node));
        assert!(matches!(graph.node(node), Node::Object(_)));
    }

    #[test]
    fn forbid_mode_names_the_pointer() {
        let doc = json!({ "definitions": {
            "Tree": { "properties": { "children": {
                "type": "array", "items": { "$ref": "#/definitions/Tree" }
            } } }
        } });
        let options = DereferenceOptions::new().circular(CircularMode::Forbid);
        let err = dereference(&doc, &options).unwrap_err();
        match err {
            ResolveError::CircularReferenceForbidden { pointer } => {
                assert_eq!(pointer, "#/definitions/Tree")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn long_cycle_terminates() {
        let mut schemas = serde_json::Map::new();
        for i in 0..100 {
            let next = (i + 1) % 100;
            schemas.insert(
                format!("S{i}"),
                json!({ "properties": { "next": { "$ref": format!("#/components/schemas/S{next}") } } }),
            );
        }
        let doc = json!({ "components": { "schemas": schemas } });
        let options = DereferenceOptions::new().circular(CircularMode::Ignore);
        let result = dereference(&doc, &options).unwrap();
        assert_eq!(result.circular.len(), 1);
        assert!(result.circular.contains("#/components/schemas/S0"));
    }

    #[test]
    fn missing_target_leaves_siblings_resolved() {
        let doc = json!({
            "a": { "$ref": "#/nowhere" },
            "b": { "$ref": "#/defs/x" },
            "defs": { "x": { "type": "string" } }
        });
        let result = dereference(&doc, &DereferenceOptions::new()).unwrap();
        assert!(!result.is_complete());
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].pointer, "#/nowhere");

        let value = result.to_value();
        assert_eq!(value["a"], json!({ "$ref": "#/nowhere" }));
        assert_eq!(value["b"], json!({ "type": "string" }));
    }

    #[test]
    fn fail_fast_aborts() {
        let doc = json!({ "a": { "$ref": "#/nowhere" } });
        let options = DereferenceOptions::new().fail_fast(true);
        let err = dereference(&doc, &options).unwrap_err();
        assert!(matches!(err, ResolveError::UnresolvableReference { .. }));
    }

    #[test]
    fn external_references_across_resources() {
        let source = MemorySource::new()
            .with(
                "schemas/pet.yaml",
                json!({
                    "Pet": { "type": "object", "properties": {
                        "tag": { "$ref": "#/Tag" },
                        "owner": { "$ref": "owner.yaml#/Owner" }
                    } },
                    "Tag": { "type": "string" }
                }),
            )
            .with("schemas/owner.yaml", json!({ "Owner": { "type": "integer" } }));
        let doc = json!({ "schema": { "$ref": "schemas/pet.yaml#/Pet" } });
        let options = DereferenceOptions::new().base_location("api.yaml");

        let value = dereference_with(&doc, &options, &source).unwrap().to_value();
        assert_eq!(value["schema"]["properties"]["tag"], json!({ "type": "string" }));
        assert_eq!(value["schema"]["properties"]["owner"], json!({ "type": "integer" }));
    }

    #[test]
    fn external_disabled_is_a_branch_failure() {
        let doc = json!({ "schema": { "$ref": "other.yaml#/Pet" } });
        let options = DereferenceOptions::new().resolve_external(false);
        let result = dereference_with(&doc, &options, &MemorySource::new()).unwrap();
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.to_value()["schema"]["$ref"], "other.yaml#/Pet");
    }
}

// === Bundling ===

mod bundling {
    use super::*;

    fn source() -> MemorySource {
        MemorySource::new()
            .with(
                "models.yaml",
                json!({
                    "Pet": { "type": "object", "properties": {
                        "owner": { "$ref": "people.yaml#/Owner" }
                    } }
                }),
            )
            .with("people.yaml", json!({ "Owner": { "type": "object" } }))
    }

    #[test]
    fn embeds_external_chain_once() {
        let doc = json!({
            "openapi": "3.0.3",
            "paths": { "/pets": { "get": { "responses": { "200": {
                "description": "ok",
                "content": { "application/json": {
                    "schema": { "$ref": "models.yaml#/Pet" }
                } }
            } } }, "post": {
                "requestBody": { "content": { "application/json": {
                    "schema": { "$ref": "./models.yaml#/Pet" }
                } } },
                "responses": {}
            } } },
            "components": { "schemas": {
                "Local": { "type": "string" },
                "Alias": { "$ref": "#/components/schemas/Local" }
            } }
        });

        let bundled = bundle(&doc, Some("api.yaml"), &source()).unwrap();
        let schemas = &bundled["components"]["schemas"];
        assert_eq!(schemas["Pet"]["type"], "object");
        assert_eq!(
            schemas["Pet"]["properties"]["owner"],
            json!({ "$ref": "#/components/schemas/Owner" })
        );
        assert_eq!(schemas["Owner"]["type"], "object");
        assert_eq!(schemas["Alias"], json!({ "$ref": "#/components/schemas/Local" }));

        let get = &bundled["paths"]["/pets"]["get"]["responses"]["200"]["content"]["application/json"]["schema"];
        let post = &bundled["paths"]["/pets"]["post"]["requestBody"]["content"]["application/json"]["schema"];
        assert_eq!(get, &json!({ "$ref": "#/components/schemas/Pet" }));
        assert_eq!(get, post);
    }

    #[test]
    fn internal_references_resolve_the_same() {
        let doc = json!({
            "openapi": "3.0.3",
            "paths": { "/pets": { "get": { "responses": { "200": {
                "$ref": "#/components/responses/Ok"
            } } } } },
            "components": { "responses": { "Ok": {
                "description": "ok",
                "content": { "application/json": { "schema": { "$ref": "models.yaml#/Pet" } } }
            } } }
        });
        let bundled = bundle(&doc, Some("api.yaml"), &source()).unwrap();
        let before = lookup(&doc, "#/components/responses/Ok").unwrap();
        let after = lookup(&bundled, "#/components/responses/Ok").unwrap();
        assert_eq!(before["description"], after["description"]);
        assert_eq!(
            bundled["paths"]["/pets"]["get"]["responses"]["200"],
            json!({ "$ref": "#/components/responses/Ok" })
        );
    }

    #[test]
    fn swagger_embeds_under_definitions() {
        let doc = json!({
            "swagger": "2.0",
            "paths": { "/pets": { "get": { "responses": { "200": {
                "description": "ok",
                "schema": { "$ref": "models.yaml#/Pet" }
            } } } } }
        });
        let bundled = bundle(&doc, Some("api.yaml"), &source()).unwrap();
        assert!(bundled["definitions"].get("Pet").is_some());
        assert!(bundled["definitions"].get("Owner").is_some());
        assert!(bundled.get("components").is_none());
    }

    #[test]
    fn unreachable_resource_fails() {
        let doc = json!({ "openapi": "3.0.3", "x": { "$ref": "missing.yaml#/A" } });
        let err = bundle(&doc, Some("api.yaml"), &MemorySource::new()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
