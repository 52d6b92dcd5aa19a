//! Collapse cascaded structural errors into one error per failure lineage.
//!
//! A single mistake deep inside a `oneOf` branch makes a structural validator
//! report the mistake itself plus a generic failure for every composition
//! keyword above it. Only the deepest, most specific error is useful.
//!
//! Lineage is a substring test on locations: an error is dropped when an
//! already recorded location contains its own. The document root has the
//! empty location, which every location contains, so a root-level error
//! (such as a missing `paths`) survives only when it is seen before any
//! deeper error.

use serde::Serialize;

use crate::error::ValidationMessage;

/// Messages that are symptoms of a failed `$ref`/`oneOf` match rather than
/// root causes.
const BOILERPLATE: &[&str] = &[
    "must have required property '$ref'",
    "must match exactly one schema in oneOf",
    "\"$ref\" is a required property",
];

/// Suffixes of composition-keyword failures in `jsonschema` messages.
const BOILERPLATE_SUFFIXES: &[&str] = &[
    "the 'oneOf' keyword",
    "the 'anyOf' keyword",
];

/// One structural validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuralError {
    pub message: String,
    /// JSON Pointer into the validated instance.
    pub location: String,
    /// JSON Pointer into the schema, at the failing keyword.
    #[serde(rename = "keywordLocation")]
    pub keyword_location: String,
}

impl StructuralError {
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: location.into(),
            keyword_location: String::new(),
        }
    }

    pub fn is_boilerplate(&self) -> bool {
        BOILERPLATE.contains(&self.message.as_str())
            || BOILERPLATE_SUFFIXES
                .iter()
                .any(|suffix| self.message.ends_with(suffix))
    }
}

impl From<StructuralError> for ValidationMessage {
    fn from(error: StructuralError) -> Self {
        ValidationMessage::new(error.location, error.message)
    }
}

/// Reduce a complete error list. Never returns an empty list for non-empty
/// input.
pub fn reduce_errors_by_lineage(errors: Vec<StructuralError>) -> Vec<StructuralError> {
    let mut reducer = LineageReducer::new(usize::MAX);
    for error in errors {
        reducer.push(error);
    }
    reducer.finish().0
}

/// Incremental form of [`reduce_errors_by_lineage`] that keeps at most `cap`
/// errors and counts the rest.
#[derive(Debug)]
pub struct LineageReducer {
    cap: usize,
    kept: Vec<StructuralError>,
    /// Every recorded location, including those past the cap.
    locations: Vec<String>,
    overflow: usize,
    boilerplate: Vec<StructuralError>,
    boilerplate_seen: usize,
}

impl LineageReducer {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            kept: Vec::new(),
            locations: Vec::new(),
            overflow: 0,
            boilerplate: Vec::new(),
            boilerplate_seen: 0,
        }
    }

    pub fn push(&mut self, error: StructuralError) {
        if error.is_boilerplate() {
            self.boilerplate_seen += 1;
            if self.boilerplate.len() < self.cap {
                self.boilerplate.push(error);
            }
            return;
        }

        // First error per location wins; a recorded location that contains
        // this one is a deeper error of the same lineage.
        if self
            .locations
            .iter()
            .any(|recorded| recorded.contains(error.location.as_str()))
        {
            return;
        }

        self.locations.push(error.location.clone());
        if self.kept.len() < self.cap {
            self.kept.push(error);
        } else {
            self.overflow += 1;
        }
    }

    /// Number of lineages recorded so far.
    pub fn recorded(&self) -> usize {
        self.locations.len()
    }

    /// Kept errors and the count of further errors not kept.
    ///
    /// Falls back to the boilerplate errors when nothing else was seen.
    pub fn finish(self) -> (Vec<StructuralError>, usize) {
        if self.locations.is_empty() {
            let additional = self.boilerplate_seen - self.boilerplate.len();
            return (self.boilerplate, additional);
        }
        (self.kept, self.overflow)
    }
}
