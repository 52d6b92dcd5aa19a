//! Document acquisition from files, strings and HTTP URLs.
//!
//! The resolution passes never read files themselves: they fetch external
//! resources through a [`DocumentSource`], caching each resource for the
//! duration of one call.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

use serde_json::Value;
use tracing::debug;

use crate::error::ResolveError;
use crate::pointer::{Reference, Target};

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Load an API document from a file path.
///
/// `.yaml`/`.yml` files parse as YAML, `.json` as JSON; anything else is
/// sniffed from its first character.
///
/// # Errors
///
/// Returns `ResolveError::FileNotFound` if the file doesn't exist, or a parse
/// error if the content isn't valid JSON/YAML.
pub fn load_document(path: &Path) -> Result<Value, ResolveError> {
    if !path.exists() {
        return Err(ResolveError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| ResolveError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => parse_yaml(&content),
        Some("json") => parse_json(&content),
        _ => load_document_str(&content),
    }
}

/// Load an API document from a JSON or YAML string.
///
/// # Errors
///
/// Returns `ResolveError::InvalidJson` for content that starts like JSON but
/// doesn't parse, `ResolveError::InvalidYaml` otherwise.
pub fn load_document_str(content: &str) -> Result<Value, ResolveError> {
    if looks_like_json(content) {
        parse_json(content)
    } else {
        parse_yaml(content)
    }
}

fn looks_like_json(content: &str) -> bool {
    matches!(content.trim_start().chars().next(), Some('{') | Some('['))
}

fn parse_json(content: &str) -> Result<Value, ResolveError> {
    serde_json::from_str(content).map_err(|source| ResolveError::InvalidJson { source })
}

fn parse_yaml(content: &str) -> Result<Value, ResolveError> {
    serde_yaml::from_str(content).map_err(|source| ResolveError::InvalidYaml { source })
}

/// Load an API document from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `ResolveError::NetworkError` if the request fails, or a parse
/// error if the body isn't valid JSON/YAML.
#[cfg(feature = "remote")]
pub fn load_document_url(url: &str) -> Result<Value, ResolveError> {
    let network_error = |source| ResolveError::NetworkError {
        url: url.to_string(),
        source,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(network_error)?;

    let response = client
        .get(url)
        .header("Accept", "application/json, application/yaml, text/yaml")
        .send()
        .map_err(network_error)?;

    // Check for HTTP errors before parsing
    let response = response.error_for_status().map_err(network_error)?;
    let body = response.text().map_err(network_error)?;

    debug!(url, bytes = body.len(), "fetched remote document");
    load_document_str(&body)
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a document from a file path or URL.
///
/// URL loading requires the `remote` feature.
pub fn load_document_auto(source: &str) -> Result<Value, ResolveError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_document_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(ResolveError::FileNotFound {
                path: PathBuf::from(source),
            })
        }
    } else {
        load_document(Path::new(source))
    }
}

/// Normalize a file location lexically (`./a/../b.yaml` → `b.yaml`).
///
/// URLs are returned unchanged.
pub fn normalize_location(location: &str) -> String {
    if is_url(location) {
        return location.to_string();
    }

    let mut out = PathBuf::new();
    for component in Path::new(location).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if out.file_name().is_some() {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out.to_string_lossy().into_owned()
}

/// Resolve a reference's resource part against the location of the
/// resource it appears in.
pub fn join_location(base: &str, reference: &str) -> String {
    if is_url(reference) {
        return reference.to_string();
    }

    if is_url(base) {
        return url::Url::parse(base)
            .and_then(|b| b.join(reference))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| reference.to_string());
    }

    let reference_path = Path::new(reference);
    if reference_path.is_absolute() {
        return normalize_location(reference);
    }

    let base_dir = Path::new(base).parent().unwrap_or(Path::new(""));
    normalize_location(&base_dir.join(reference_path).to_string_lossy())
}

/// Raw-document acquisition capability consumed by the resolution passes.
pub trait DocumentSource {
    /// Fetch and parse the document at `location` (file path or URL).
    fn fetch(&self, location: &str) -> Result<Value, ResolveError>;
}

/// Fetches documents from the filesystem, or over HTTP for URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSource;

impl DocumentSource for FileSource {
    fn fetch(&self, location: &str) -> Result<Value, ResolveError> {
        load_document_auto(location)
    }
}

/// In-memory document set, keyed by normalized location.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    documents: HashMap<String, Value>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, location: &str, document: Value) -> Self {
        self.insert(location, document);
        self
    }

    pub fn insert(&mut self, location: &str, document: Value) {
        self.documents
            .insert(normalize_location(location), document);
    }
}

impl DocumentSource for MemorySource {
    fn fetch(&self, location: &str) -> Result<Value, ResolveError> {
        self.documents
            .get(&normalize_location(location))
            .cloned()
            .ok_or_else(|| ResolveError::FileNotFound {
                path: PathBuf::from(location),
            })
    }
}

/// Per-call resource cache: the root document plus every external resource
/// fetched so far. Never shared between calls.
pub(crate) struct Resources<'s> {
    source: &'s dyn DocumentSource,
    root_location: String,
    allow_external: bool,
    cache: HashMap<String, Rc<Value>>,
}

impl<'s> Resources<'s> {
    pub fn new(
        root: &Value,
        root_location: Option<&str>,
        source: &'s dyn DocumentSource,
        allow_external: bool,
    ) -> Self {
        let root_location = root_location.map(normalize_location).unwrap_or_default();
        let mut cache = HashMap::new();
        cache.insert(root_location.clone(), Rc::new(root.clone()));
        Self {
            source,
            root_location,
            allow_external,
            cache,
        }
    }

    pub fn root_location(&self) -> &str {
        &self.root_location
    }

    pub fn is_root(&self, location: &str) -> bool {
        location == self.root_location
    }

    /// Absolute target of `reference` as written inside the resource at `base`.
    pub fn absolute(&self, base: &str, reference: &Reference) -> Target {
        let location = match &reference.resource {
            None => base.to_string(),
            Some(resource) => {
                let joined = join_location(base, resource);
                if joined == self.root_location {
                    self.root_location.clone()
                } else {
                    joined
                }
            }
        };
        Target {
            location,
            pointer: reference.pointer.clone(),
        }
    }

    /// The document at `location`, fetching it on first use.
    ///
    /// `raw` is the pointer being resolved, for error messages.
    pub fn document(&mut self, location: &str, raw: &str) -> Result<Rc<Value>, ResolveError> {
        if let Some(doc) = self.cache.get(location) {
            return Ok(Rc::clone(doc));
        }

        if !self.allow_external {
            return Err(ResolveError::unresolvable(
                raw,
                "external references are not resolved",
            ));
        }

        debug!(location, "fetching external resource");
        let doc = Rc::new(self.source.fetch(location)?);
        self.cache.insert(location.to_string(), Rc::clone(&doc));
        Ok(doc)
    }
}
