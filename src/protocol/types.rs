//! Shared types for the WPS protocol boundary.
//!
//! Process descriptors as published by `DescribeProcess`, the wire
//! representation of inputs and outputs, and the Execute request/response
//! structures exchanged with the server.

use serde::{Deserialize, Serialize};

// ─── Operations ──────────────────────────────────────────────────────────────

/// The three WPS operations the client issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    GetCapabilities,
    DescribeProcess,
    Execute,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::GetCapabilities => write!(f, "GetCapabilities"),
            Operation::DescribeProcess => write!(f, "DescribeProcess"),
            Operation::Execute => write!(f, "Execute"),
        }
    }
}

// ─── Capabilities ────────────────────────────────────────────────────────────

/// Summary of a process as listed in the capabilities document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub identifier: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Parsed `GetCapabilities` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Offered processes, in document order.
    pub processes: Vec<ProcessSummary>,
}

// ─── Process Description ─────────────────────────────────────────────────────

/// A supported format for complex data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    #[serde(alias = "mimeType")]
    pub mime_type: String,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
}

impl Format {
    pub fn new(mime_type: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            encoding: None,
            schema: None,
        }
    }
}

/// Declared subtype of a literal value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralType {
    String,
    Integer,
    Float,
    Boolean,
    AnyUri,
    DateTime,
    /// Any other declared XML Schema type, kept verbatim.
    Other(String),
}

impl LiteralType {
    /// Resolve a declared `dataType` (with or without the `xs:` prefix, or
    /// as a full XML Schema URI) to a literal subtype.
    pub fn from_declared(declared: &str) -> Self {
        let name = declared
            .rsplit(['#', ':'])
            .next()
            .unwrap_or(declared)
            .trim();
        match name.to_ascii_lowercase().as_str() {
            "" | "string" | "normalizedstring" | "token" => LiteralType::String,
            "integer" | "int" | "long" | "short" | "byte" | "positiveinteger"
            | "nonnegativeinteger" | "negativeinteger" | "nonpositiveinteger"
            | "unsignedint" | "unsignedlong" => LiteralType::Integer,
            "float" | "double" | "decimal" => LiteralType::Float,
            "boolean" => LiteralType::Boolean,
            "anyuri" => LiteralType::AnyUri,
            "datetime" => LiteralType::DateTime,
            _ => LiteralType::Other(name.to_string()),
        }
    }

    /// Name used in generated documentation.
    pub fn name(&self) -> &str {
        match self {
            LiteralType::String => "string",
            LiteralType::Integer => "integer",
            LiteralType::Float => "float",
            LiteralType::Boolean => "boolean",
            LiteralType::AnyUri => "anyURI",
            LiteralType::DateTime => "dateTime",
            LiteralType::Other(name) => name,
        }
    }
}

/// Declared data kind of an input or output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataKind {
    Literal {
        data_type: LiteralType,
        #[serde(default)]
        allowed_values: Vec<String>,
    },
    /// Complex payload. The first format is the default one.
    Complex { formats: Vec<Format> },
    BoundingBox {
        #[serde(default)]
        supported_crs: Vec<String>,
    },
}

impl DataKind {
    pub fn is_complex(&self) -> bool {
        matches!(self, DataKind::Complex { .. })
    }

    /// Default format of a complex kind.
    pub fn default_format(&self) -> Option<&Format> {
        match self {
            DataKind::Complex { formats } => formats.first(),
            _ => None,
        }
    }

    /// All mime types a complex kind accepts, default first.
    pub fn mime_types(&self) -> Vec<&str> {
        match self {
            DataKind::Complex { formats } => formats.iter().map(|f| f.mime_type.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Short type name used in documentation and error messages.
    pub fn type_name(&self) -> String {
        match self {
            DataKind::Literal { data_type, .. } => data_type.name().to_string(),
            DataKind::Complex { formats } => {
                let mimes: Vec<&str> = formats.iter().map(|f| f.mime_type.as_str()).collect();
                if mimes.is_empty() {
                    "ComplexData".to_string()
                } else {
                    format!("ComplexData:{}", mimes.join(", "))
                }
            }
            DataKind::BoundingBox { .. } => "BoundingBoxData".to_string(),
        }
    }
}

/// One declared process input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub identifier: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    pub kind: DataKind,
    /// Declared default, as its wire string.
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default = "default_occurs")]
    pub min_occurs: u32,
    #[serde(default = "default_occurs")]
    pub max_occurs: u32,
}

fn default_occurs() -> u32 {
    1
}

/// One declared process output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub identifier: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    pub kind: DataKind,
}

impl OutputSpec {
    /// Mime type of the default format, for complex outputs.
    pub fn mime_type(&self) -> Option<&str> {
        self.kind.default_format().map(|f| f.mime_type.as_str())
    }
}

/// Full description of a remote process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDescriptor {
    pub identifier: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<OutputSpec>,
    /// `storeSupported`: the process can run asynchronously.
    #[serde(default)]
    pub supports_store: bool,
    /// `statusSupported`: the process reports progress.
    #[serde(default)]
    pub supports_status: bool,
}

impl ProcessDescriptor {
    pub fn input(&self, identifier: &str) -> Option<&InputSpec> {
        self.inputs.iter().find(|i| i.identifier == identifier)
    }

    pub fn output(&self, identifier: &str) -> Option<&OutputSpec> {
        self.outputs.iter().find(|o| o.identifier == identifier)
    }
}

// ─── Wire Values ─────────────────────────────────────────────────────────────

/// A bounding box: lower and upper corners plus a coordinate reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lower_corner: Vec<f64>,
    pub upper_corner: Vec<f64>,
    #[serde(default)]
    pub crs: Option<String>,
}

impl BoundingBox {
    /// Build a 2D box from `(minx, miny, maxx, maxy)`.
    pub fn new(minx: f64, miny: f64, maxx: f64, maxy: f64, crs: Option<&str>) -> Self {
        Self {
            lower_corner: vec![minx, miny],
            upper_corner: vec![maxx, maxy],
            crs: crs.map(str::to_string),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.lower_corner.len()
    }

    /// Flattened coordinate tuple: lower corner followed by upper corner.
    pub fn coordinates(&self) -> Vec<f64> {
        self.lower_corner
            .iter()
            .chain(self.upper_corner.iter())
            .copied()
            .collect()
    }
}

/// Protocol-level representation of a single input or output value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireValue {
    /// Literal data, always exchanged as text.
    Literal(String),
    /// Inline complex data. `content` is already encoded per `encoding`.
    ComplexData {
        content: String,
        #[serde(default)]
        mime_type: Option<String>,
        #[serde(default)]
        encoding: Option<String>,
        #[serde(default)]
        schema: Option<String>,
    },
    /// Complex data passed by URL.
    Reference {
        href: String,
        #[serde(default)]
        mime_type: Option<String>,
    },
    BoundingBox(BoundingBox),
}

// ─── Execute ─────────────────────────────────────────────────────────────────

/// Synchronous (single round trip) or asynchronous (store + status) execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sync,
    Async,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Sync => write!(f, "sync"),
            ExecutionMode::Async => write!(f, "async"),
        }
    }
}

/// Declared output in an Execute request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRequest {
    pub identifier: String,
    /// Complex outputs are requested as references.
    pub as_reference: bool,
}

/// A fully converted Execute request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecuteRequest {
    pub identifier: String,
    /// Ordered `(identifier, value)` pairs; repeated identifiers are allowed.
    pub inputs: Vec<(String, WireValue)>,
    pub outputs: Vec<OutputRequest>,
    pub mode: ExecutionMode,
    /// Ask the server for progress reports (only meaningful in async mode).
    pub status: bool,
}

/// Execution status as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedStatus {
    Accepted,
    Started,
    Paused,
    Succeeded,
    Failed,
}

/// A raw output entry from an execute response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOutput {
    pub identifier: String,
    /// Reported literal `dataType`, when the server included one.
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Inline data items. Empty when the output came back by reference.
    #[serde(default)]
    pub data: Vec<WireValue>,
    #[serde(default)]
    pub reference: Option<String>,
}

/// Parsed `ExecuteResponse` document, either from the Execute call itself or
/// from polling the status location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: ReportedStatus,
    #[serde(default)]
    pub percent_completed: u8,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status_location: Option<String>,
    #[serde(default)]
    pub outputs: Vec<RawOutput>,
}

impl StatusReport {
    pub fn is_complete(&self) -> bool {
        matches!(
            self.status,
            ReportedStatus::Succeeded | ReportedStatus::Failed
        )
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
