//! Output converter registry: turns fetched output content into native
//! objects, keyed by mime type.
//!
//! Provides:
//! - The `OutputConverter` trait for user-supplied converters
//! - Built-in converters for JSON and plain text
//! - Lookup by mime type, ignoring case and media-type parameters

use std::collections::HashMap;
use std::sync::Arc;

use super::value::Value;

// ─── OutputConverter ─────────────────────────────────────────────────────────

/// Converts the raw content of an output into a native value.
pub trait OutputConverter: Send + Sync {
    /// Mime types this converter handles.
    fn mime_types(&self) -> Vec<String>;

    /// Convert raw content. Errors carry a short reason.
    fn convert(&self, content: &[u8]) -> Result<Value, String>;
}

/// Parses JSON documents into `Value::Json`.
#[derive(Debug, Default)]
pub struct JsonConverter;

impl OutputConverter for JsonConverter {
    fn mime_types(&self) -> Vec<String> {
        vec![
            "application/json".into(),
            "application/geo+json".into(),
            "application/vnd.geo+json".into(),
        ]
    }

    fn convert(&self, content: &[u8]) -> Result<Value, String> {
        serde_json::from_slice(content)
            .map(Value::Json)
            .map_err(|e| format!("invalid JSON: {e}"))
    }
}

/// Decodes textual content into `Value::String`.
#[derive(Debug, Default)]
pub struct TextConverter;

impl OutputConverter for TextConverter {
    fn mime_types(&self) -> Vec<String> {
        vec!["text/plain".into(), "text/csv".into()]
    }

    fn convert(&self, content: &[u8]) -> Result<Value, String> {
        String::from_utf8(content.to_vec())
            .map(Value::String)
            .map_err(|e| format!("content is not valid UTF-8: {e}"))
    }
}

// ─── ConverterRegistry ───────────────────────────────────────────────────────

/// Mime type → converter. Later registrations replace earlier ones.
#[derive(Clone)]
pub struct ConverterRegistry {
    converters: HashMap<String, Arc<dyn OutputConverter>>,
}

/// Lowercased mime type without parameters (`text/plain; charset=utf-8` → `text/plain`).
fn normalize(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or(mime_type)
        .trim()
        .to_ascii_lowercase()
}

impl ConverterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// Registry with the built-in JSON and text converters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(JsonConverter));
        registry.register(Arc::new(TextConverter));
        registry
    }

    pub fn register(&mut self, converter: Arc<dyn OutputConverter>) {
        for mime in converter.mime_types() {
            self.converters.insert(normalize(&mime), Arc::clone(&converter));
        }
    }

    pub fn get(&self, mime_type: &str) -> Option<&Arc<dyn OutputConverter>> {
        self.converters.get(&normalize(mime_type))
    }

    pub fn mime_types(&self) -> Vec<&str> {
        let mut mimes: Vec<&str> = self.converters.keys().map(String::as_str).collect();
        mimes.sort_unstable();
        mimes
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("mime_types", &self.mime_types())
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
