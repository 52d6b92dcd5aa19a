//! Error types for reference resolution, reduction and validation.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors while acquiring documents or resolving `$ref` pointers.
#[derive(Debug, Error)]
pub enum ResolveError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML: {source}")]
    InvalidYaml {
        #[source]
        source: serde_yaml::Error,
    },

    // Reference errors (exit code 2)
    #[error("could not find a definition for `{pointer}`: {reason}")]
    UnresolvableReference { pointer: String, reason: String },

    #[error("circular $ref pointer found: {pointer}")]
    CircularReferenceForbidden { pointer: String },

    // Deadline errors (exit code 4)
    #[error("resolution timed out after {}ms", elapsed.as_millis())]
    Timeout { elapsed: Duration },
}

impl ResolveError {
    /// Shorthand for an unresolvable pointer.
    pub(crate) fn unresolvable(pointer: impl Into<String>, reason: impl Into<String>) -> Self {
        ResolveError::UnresolvableReference {
            pointer: pointer.into(),
            reason: reason.into(),
        }
    }

    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ResolveError::FileNotFound { .. } | ResolveError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            ResolveError::NetworkError { .. } => 3,
            ResolveError::Timeout { .. } => 4,
            _ => 2,
        }
    }
}

/// Errors while reducing a document to a single operation.
#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("operation not found: {} {path}", method.to_uppercase())]
    OperationNotFound { path: String, method: String },

    #[error("document has no paths object")]
    NotAnApiDocument,
}

impl ReduceError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Errors during validation.
///
/// An invalid document is not an error: validation reports it through
/// [`ValidationResult`](crate::ValidationResult). `Structural` and `Semantic`
/// only appear when a caller converts a result with `into_result`.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("unsupported API definition: expected `swagger: \"2.0\"` or `openapi: 3.0.x/3.1.x`, got {found}")]
    UnsupportedDialect { found: String },

    #[error("invalid meta-schema: {message}")]
    InvalidMetaSchema { message: String },

    #[error("validation timed out after {}ms", elapsed.as_millis())]
    Timeout { elapsed: Duration },

    #[error("structural validation failed with {} error(s){}", errors.len(), plus_additional(*additional))]
    Structural {
        errors: Vec<ValidationMessage>,
        additional: usize,
    },

    #[error("semantic validation failed with {} error(s){}", errors.len(), plus_additional(*additional))]
    Semantic {
        errors: Vec<ValidationMessage>,
        additional: usize,
    },
}

fn plus_additional(additional: usize) -> String {
    if additional == 0 {
        String::new()
    } else {
        format!(", plus {} additional error(s)", additional)
    }
}

impl ValidateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ValidateError::Resolve(e) => e.exit_code(),
            ValidateError::UnsupportedDialect { .. } | ValidateError::InvalidMetaSchema { .. } => 2,
            ValidateError::Timeout { .. } => 4,
            ValidateError::Structural { .. } | ValidateError::Semantic { .. } => 1,
        }
    }
}

/// Single validation finding with location context.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ValidationMessage {
    /// JSON Pointer (RFC 6901) into the validated document.
    pub location: String,
    /// Human-readable message.
    pub message: String,
}

impl ValidationMessage {
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let location = if self.location.is_empty() {
            "/"
        } else {
            &self.location
        };
        write!(f, "{}: {}", location, self.message)
    }
}
