//! OpenAPI Reference Graph
//!
//! Reference resolution, bundling, validation and per-operation reduction
//! for Swagger 2.0, OpenAPI 3.0 and OpenAPI 3.1 documents.
//!
//! Documents are `serde_json::Value` trees as produced by the loader (JSON or
//! YAML). Every pass leaves its input untouched and returns a new document.
//!
//! # Example
//!
//! ```
//! use oas_refgraph::{dereference, reduce, CircularMode, DereferenceOptions};
//! use serde_json::json;
//!
//! let doc = json!({
//!     "openapi": "3.0.3",
//!     "info": { "title": "Pets", "version": "1" },
//!     "paths": {
//!         "/pets": { "get": { "responses": { "200": {
//!             "description": "ok",
//!             "content": { "application/json": {
//!                 "schema": { "$ref": "#/components/schemas/Pet" }
//!             } }
//!         } } } }
//!     },
//!     "components": { "schemas": {
//!         "Pet": { "type": "object", "properties": { "name": { "type": "string" } } },
//!         "Owner": { "type": "object" }
//!     } }
//! });
//!
//! let options = DereferenceOptions::new().circular(CircularMode::Ignore);
//! let resolved = dereference(&doc, &options).unwrap().to_value();
//! let schema = &resolved["paths"]["/pets"]["get"]["responses"]["200"]
//!     ["content"]["application/json"]["schema"];
//! assert_eq!(schema["type"], "object");
//!
//! // Only what GET /pets reaches survives reduction.
//! let reduced = reduce(&doc, "/pets", "get").unwrap();
//! assert!(reduced["components"]["schemas"].get("Pet").is_some());
//! assert!(reduced["components"]["schemas"].get("Owner").is_none());
//! ```
//!
//! # Circular references
//!
//! | Mode | Effect of a pointer that revisits an ancestor |
//! |------|-----------------------------------------------|
//! | `Allow` | Graph edge back to the ancestor node (cyclic [`DocumentGraph`]) |
//! | `Ignore` | Reference node left in place, pointer recorded |
//! | `Forbid` | `CircularReferenceForbidden` error |
//!
//! # Exit codes
//!
//! Every error type maps to a process exit code through `exit_code()`:
//! 1 invalid document, 2 resolution or usage error, 3 I/O, 4 timeout.

pub mod bundle;
pub mod cycle;
pub mod dereference;
mod error;
pub mod graph;
pub mod lineage;
pub mod loader;
pub mod meta;
pub mod pointer;
pub mod reduce;
pub mod semantic;
mod types;
pub mod validator;

pub use bundle::bundle;
pub use cycle::{CircularRefSet, CycleTracker, Deadline};
pub use dereference::{dereference, dereference_with, Dereferenced, RefFailure};
pub use error::{ReduceError, ResolveError, ValidateError, ValidationMessage};
pub use graph::{DocumentGraph, Node, NodeId};
pub use lineage::{reduce_errors_by_lineage, LineageReducer, StructuralError};
pub use loader::{
    is_url, load_document, load_document_auto, load_document_str, DocumentSource, FileSource,
    MemorySource,
};
pub use pointer::{lookup, resolve};
pub use reduce::reduce;
pub use semantic::{validate_semantics, SemanticReport};
pub use types::{
    json_type_name, CircularCallback, CircularMode, DereferenceOptions, Dialect, ValidateOptions,
    DEFAULT_MAX_ERRORS, HTTP_METHODS,
};
pub use validator::{has_external_refs, validate, validate_structure, Phase, ValidationResult};

#[cfg(feature = "remote")]
pub use loader::load_document_url;
