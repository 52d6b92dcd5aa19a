//! Core types shared by the resolution, validation and reduction passes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP methods that may appear as operation keys in a path item.
pub const HTTP_METHODS: &[&str] = &[
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Default cap on individually reported validation errors.
pub const DEFAULT_MAX_ERRORS: usize = 20;

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Specification version governing structural and semantic rules.
///
/// Detected once from the top-level `swagger` / `openapi` field; every rule
/// set and meta-schema is keyed off this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    #[serde(rename = "swagger2")]
    Swagger2,
    #[serde(rename = "openapi30")]
    OpenApi30,
    #[serde(rename = "openapi31")]
    OpenApi31,
}

impl Dialect {
    /// Detect the dialect from a document's discriminator field.
    ///
    /// Returns `None` when neither `swagger: "2.0"` nor `openapi: 3.0.x/3.1.x`
    /// is present.
    pub fn detect(doc: &Value) -> Option<Self> {
        if let Some(version) = doc.get("swagger").and_then(Value::as_str) {
            return (version == "2.0").then_some(Dialect::Swagger2);
        }

        let version = doc.get("openapi").and_then(Value::as_str)?;
        if version == "3.0" || version.starts_with("3.0.") {
            Some(Dialect::OpenApi30)
        } else if version == "3.1" || version.starts_with("3.1.") {
            Some(Dialect::OpenApi31)
        } else {
            None
        }
    }

    /// Describe whatever discriminator a document carries, for error messages.
    pub fn describe_discriminator(doc: &Value) -> String {
        if let Some(v) = doc.get("swagger") {
            return format!("swagger: {}", v);
        }
        if let Some(v) = doc.get("openapi") {
            return format!("openapi: {}", v);
        }
        "no swagger/openapi field".to_string()
    }

    pub fn is_swagger(&self) -> bool {
        matches!(self, Dialect::Swagger2)
    }

    /// JSON Pointer tokens of the section holding reusable schemas.
    pub fn schemas_section(&self) -> &'static [&'static str] {
        match self {
            Dialect::Swagger2 => &["definitions"],
            Dialect::OpenApi30 | Dialect::OpenApi31 => &["components", "schemas"],
        }
    }

    /// JSON Pointer tokens of the section holding security scheme definitions.
    pub fn security_section(&self) -> &'static [&'static str] {
        match self {
            Dialect::Swagger2 => &["securityDefinitions"],
            Dialect::OpenApi30 | Dialect::OpenApi31 => &["components", "securitySchemes"],
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::Swagger2 => "Swagger 2.0",
            Dialect::OpenApi30 => "OpenAPI 3.0",
            Dialect::OpenApi31 => "OpenAPI 3.1",
        })
    }
}

/// How the dereferencer treats a pointer that revisits an in-progress ancestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CircularMode {
    /// Produce a genuinely cyclic graph: the reference becomes an edge back
    /// to the ancestor node.
    #[default]
    Allow,
    /// Leave the reference node unresolved and record the pointer.
    Ignore,
    /// Fail with `CircularReferenceForbidden`.
    Forbid,
}

impl CircularMode {
    /// Parse a mode name; returns `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(CircularMode::Allow),
            "ignore" => Some(CircularMode::Ignore),
            "forbid" => Some(CircularMode::Forbid),
            _ => None,
        }
    }
}

/// Callback invoked with the fragment (`#/...`) of each circular pointer.
pub type CircularCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Options for dereferencing.
#[derive(Clone)]
pub struct DereferenceOptions {
    /// Follow pointers that leave the document (files, URLs).
    pub resolve_external: bool,
    /// Treatment of circular pointers.
    pub circular: CircularMode,
    /// Invoked once per distinct circular pointer, in `Allow` and `Ignore` modes.
    pub on_circular: Option<CircularCallback>,
    /// Abort on the first unresolvable pointer instead of leaving that
    /// branch unresolved.
    pub fail_fast: bool,
    /// Wall-clock budget for the whole walk.
    pub timeout: Option<Duration>,
    /// Location of the root document; relative external pointers resolve
    /// against it.
    pub base_location: Option<String>,
}

impl Default for DereferenceOptions {
    fn default() -> Self {
        Self {
            resolve_external: true,
            circular: CircularMode::Allow,
            on_circular: None,
            fail_fast: false,
            timeout: None,
            base_location: None,
        }
    }
}

impl fmt::Debug for DereferenceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DereferenceOptions")
            .field("resolve_external", &self.resolve_external)
            .field("circular", &self.circular)
            .field("on_circular", &self.on_circular.as_ref().map(|_| ".."))
            .field("fail_fast", &self.fail_fast)
            .field("timeout", &self.timeout)
            .field("base_location", &self.base_location)
            .finish()
    }
}

impl DereferenceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve_external(mut self, resolve_external: bool) -> Self {
        self.resolve_external = resolve_external;
        self
    }

    pub fn circular(mut self, mode: CircularMode) -> Self {
        self.circular = mode;
        self
    }

    pub fn on_circular(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_circular = Some(Arc::new(callback));
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_location(mut self, location: impl Into<String>) -> Self {
        self.base_location = Some(location.into());
        self
    }
}

/// Options for structural and semantic validation.
#[derive(Debug, Clone)]
pub struct ValidateOptions {
    /// Errors reported individually; the remainder is only counted.
    pub max_errors: usize,
    /// Wall-clock budget for the whole validation.
    pub timeout: Option<Duration>,
    /// Structural meta-schema; the built-in baseline for the detected dialect
    /// is used when absent.
    pub meta_schema: Option<Value>,
    /// Location of the document, for resolving external references.
    pub base_location: Option<String>,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            max_errors: DEFAULT_MAX_ERRORS,
            timeout: None,
            meta_schema: None,
            base_location: None,
        }
    }
}

impl ValidateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the error cap. Zero is treated as one: a failing document always
    /// reports at least one error.
    pub fn max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors.max(1);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn meta_schema(mut self, schema: Value) -> Self {
        self.meta_schema = Some(schema);
        self
    }

    pub fn base_location(mut self, location: impl Into<String>) -> Self {
        self.base_location = Some(location.into());
        self
    }
}
