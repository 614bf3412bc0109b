//! Conversion between native values and WPS wire representations.
//!
//! Literal values travel as text and are parsed back per their declared
//! subtype. Complex values are either embedded in the request (UTF-8 text or
//! base64) or passed by reference; the embedding policy depends on whether
//! the server can reach the content on its own. Bounding boxes keep their
//! corner tuples and coordinate reference in both directions.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::DateTime;
use url::Url;

use super::errors::WpsError;
use super::value::Value;
use crate::protocol::{BoundingBox, DataKind, InputSpec, LiteralType, WireValue};

// ─── Constants ───────────────────────────────────────────────────────────────

pub const ENCODING_UTF8: &str = "utf-8";
pub const ENCODING_BASE64: &str = "base64";

/// Paths longer than this are never treated as local files.
const MAX_PATH_LEN: usize = 255;

/// Extension → candidate mime types, most specific first.
const EXTENSION_MIME_TYPES: &[(&str, &[&str])] = &[
    ("nc", &["application/x-netcdf", "application/x-ogc-dods"]),
    ("zip", &["application/zip", "application/x-zipped-shp"]),
    ("json", &["application/json", "application/geo+json", "application/vnd.geo+json"]),
    ("geojson", &["application/geo+json", "application/vnd.geo+json", "application/json"]),
    ("xml", &["application/xml", "text/xml"]),
    ("gml", &["application/gml+xml", "text/xml"]),
    ("txt", &["text/plain"]),
    ("csv", &["text/csv", "text/plain"]),
    ("html", &["text/html"]),
    ("tif", &["image/tiff", "image/tiff; subtype=geotiff"]),
    ("tiff", &["image/tiff", "image/tiff; subtype=geotiff"]),
    ("png", &["image/png"]),
    ("jpg", &["image/jpeg"]),
    ("jpeg", &["image/jpeg"]),
    ("pdf", &["application/pdf"]),
    ("shp", &["application/x-shapefile"]),
];

const DODS_MIME_TYPE: &str = "application/x-ogc-dods";

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Whether `value` parses as an absolute URL with a scheme.
pub fn is_url(value: &str) -> bool {
    if value.is_empty() || value.contains(char::is_whitespace) {
        return false;
    }
    match Url::parse(value) {
        // Single-letter schemes are Windows drive letters, not URLs
        Ok(url) => url.scheme().len() > 1,
        Err(_) => false,
    }
}

/// Whether `path` names an existing local file.
pub fn is_file(path: &Path) -> bool {
    path.as_os_str().len() <= MAX_PATH_LEN && path.is_file()
}

/// Turn a bare local path into a `file://` URL; URLs are returned as-is.
pub fn fix_local_url(value: &str) -> String {
    if is_url(value) {
        return value.to_string();
    }
    let path = Path::new(value.trim());
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let fixed = Url::from_file_path(&absolute)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| format!("file://{}", absolute.display()));
    tracing::debug!(url = %fixed, "fixed local url");
    fixed
}

fn is_textual_mime(mime_type: &str) -> bool {
    let mime = mime_type.to_ascii_lowercase();
    mime.starts_with("text/") || mime.contains("xml") || mime.contains("json")
}

/// Guess the mime type of a reference among `supported`.
///
/// OPeNDAP endpoints (`dodsC` in the path) resolve to `application/x-ogc-dods`;
/// otherwise the file extension picks the first supported candidate. With an
/// empty `supported` list the most likely candidate is returned.
pub fn guess_type(reference: &str, supported: &[&str]) -> Option<String> {
    let accepts = |mime: &str| supported.is_empty() || supported.iter().any(|s| s.eq_ignore_ascii_case(mime));

    if reference.contains("dodsC") && accepts(DODS_MIME_TYPE) {
        return Some(DODS_MIME_TYPE.to_string());
    }

    let path = Url::parse(reference)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| reference.to_string());
    let extension = Path::new(&path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)?;

    EXTENSION_MIME_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .and_then(|(_, candidates)| candidates.iter().copied().find(|m| accepts(m)))
        .map(|m| m.to_string())
}

/// Encode raw content for inline transmission.
///
/// Fallback order: the declared encoding, then a mime-type heuristic
/// (textual types go as UTF-8), then base64. Returns the encoded content with
/// the encoding actually used, which may differ from the declared one when
/// the content is not valid UTF-8.
pub fn encode_content(
    content: Vec<u8>,
    mime_type: Option<&str>,
    encoding: Option<&str>,
) -> (String, &'static str) {
    let wants_text = match encoding.map(str::to_ascii_lowercase).as_deref() {
        Some(ENCODING_BASE64) => false,
        Some(_) => true,
        None => mime_type.map(is_textual_mime).unwrap_or(false),
    };

    if wants_text {
        match String::from_utf8(content) {
            Ok(text) => return (text, ENCODING_UTF8),
            Err(e) => return (BASE64.encode(e.into_bytes()), ENCODING_BASE64),
        }
    }
    (BASE64.encode(content), ENCODING_BASE64)
}

/// Read a local file and encode it for embedding.
pub fn embed_file(
    path: &Path,
    mime_type: Option<&str>,
    encoding: Option<&str>,
) -> std::io::Result<(String, &'static str)> {
    let content = std::fs::read(path)?;
    Ok(encode_content(content, mime_type, encoding))
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn parse_bbox_text(text: &str, default_crs: Option<&str>) -> Option<BoundingBox> {
    let mut numbers = Vec::new();
    let mut crs = default_crs.map(str::to_string);
    for token in text.split(|c: char| c == ',' || c.is_whitespace()).filter(|t| !t.is_empty()) {
        match token.parse::<f64>() {
            Ok(n) => numbers.push(n),
            Err(_) => crs = Some(token.to_string()),
        }
    }
    bbox_from_numbers(&numbers, crs)
}

fn bbox_from_numbers(numbers: &[f64], crs: Option<String>) -> Option<BoundingBox> {
    if numbers.is_empty() || numbers.len() % 2 != 0 {
        return None;
    }
    let (lower, upper) = numbers.split_at(numbers.len() / 2);
    Some(BoundingBox {
        lower_corner: lower.to_vec(),
        upper_corner: upper.to_vec(),
        crs,
    })
}

// ─── TypeConverter ───────────────────────────────────────────────────────────

/// Converts values for one WPS endpoint.
///
/// The endpoint matters only for complex inputs: a server on the local host
/// can read local files itself, so they are sent as `file://` references
/// instead of being embedded.
#[derive(Debug, Clone)]
pub struct TypeConverter {
    server_is_local: bool,
}

impl TypeConverter {
    pub fn new(service_url: &str) -> Self {
        let server_is_local = Url::parse(service_url)
            .map(|u| {
                u.scheme() == "file"
                    || matches!(
                        u.host_str(),
                        Some("localhost") | Some("127.0.0.1") | Some("[::1]")
                    )
            })
            .unwrap_or(false);
        Self { server_is_local }
    }

    pub fn server_is_local(&self) -> bool {
        self.server_is_local
    }

    // ─── Defaults ────────────────────────────────────────────────────────

    /// Native default of an input parameter.
    ///
    /// Only literal inputs carry a default; complex and bbox inputs are
    /// always absent. A declared default that does not parse as its subtype
    /// is kept as a string.
    pub fn default_of(&self, spec: &InputSpec) -> Option<Value> {
        let DataKind::Literal { .. } = &spec.kind else {
            return None;
        };
        let raw = spec.default_value.as_ref()?;
        match self.from_wire(&spec.identifier, &WireValue::Literal(raw.clone()), &spec.kind) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(
                    input = %spec.identifier,
                    default = %raw,
                    error = %e,
                    "declared default does not match its data type, keeping it as text"
                );
                Some(Value::String(raw.clone()))
            }
        }
    }

    // ─── Native → Wire ───────────────────────────────────────────────────

    /// Convert a native value into one or more wire values.
    ///
    /// A `Value::List` yields one wire value per item, except for bbox
    /// inputs where a flat list of numbers is the box itself.
    pub fn to_wire_all(&self, value: &Value, spec: &InputSpec) -> Result<Vec<WireValue>, WpsError> {
        match value {
            Value::List(items) if !Self::is_numeric_bbox(value, spec) => items
                .iter()
                .map(|item| self.to_wire(item, spec))
                .collect(),
            _ => Ok(vec![self.to_wire(value, spec)?]),
        }
    }

    fn is_numeric_bbox(value: &Value, spec: &InputSpec) -> bool {
        matches!(spec.kind, DataKind::BoundingBox { .. })
            && matches!(value, Value::List(items) if items.iter().all(|i| i.as_f64().is_some()))
    }

    /// Convert a single native value into its wire representation.
    pub fn to_wire(&self, value: &Value, spec: &InputSpec) -> Result<WireValue, WpsError> {
        match &spec.kind {
            DataKind::Literal { data_type, .. } => {
                literal_to_wire(value, data_type).map(WireValue::Literal).map_err(|reason| {
                    WpsError::conversion(&spec.identifier, data_type.name(), reason)
                })
            }
            DataKind::Complex { .. } => self.complex_to_wire(value, spec),
            DataKind::BoundingBox { supported_crs } => {
                let default_crs = supported_crs.first().map(String::as_str);
                let bbox = match value {
                    Value::BoundingBox(b) => {
                        let mut b = b.clone();
                        if b.crs.is_none() {
                            b.crs = default_crs.map(str::to_string);
                        }
                        Some(b)
                    }
                    Value::List(items) => {
                        let numbers: Vec<f64> = items.iter().filter_map(Value::as_f64).collect();
                        bbox_from_numbers(&numbers, default_crs.map(str::to_string))
                    }
                    Value::String(text) => parse_bbox_text(text, default_crs),
                    _ => None,
                };
                match bbox {
                    Some(b) if !b.lower_corner.is_empty()
                        && b.lower_corner.len() == b.upper_corner.len() =>
                    {
                        Ok(WireValue::BoundingBox(b))
                    }
                    _ => Err(WpsError::conversion(
                        &spec.identifier,
                        "BoundingBoxData",
                        format!("{} is not a bounding box", value.kind()),
                    )),
                }
            }
        }
    }

    fn complex_to_wire(&self, value: &Value, spec: &InputSpec) -> Result<WireValue, WpsError> {
        let supported = spec.kind.mime_types();
        let data_type = spec.kind.type_name();

        match value {
            Value::Reference(href) => Ok(WireValue::Reference {
                href: href.clone(),
                mime_type: guess_type(href, &supported).or_else(|| self.default_mime(spec)),
            }),
            Value::Path(path) => self.local_file_to_wire(path, &path.display().to_string(), spec),
            Value::String(text) if is_url(text) => {
                let url = Url::parse(text)
                    .map_err(|e| WpsError::conversion(&spec.identifier, &data_type, e.to_string()))?;
                if url.scheme() == "file" {
                    let path = url.to_file_path().map_err(|_| {
                        WpsError::conversion(&spec.identifier, &data_type, "not a local file URL")
                    })?;
                    if !is_file(&path) {
                        return Err(WpsError::conversion(
                            &spec.identifier,
                            &data_type,
                            format!("{text} should be a local file but was not found on disk"),
                        ));
                    }
                    self.local_file_to_wire(&path, text, spec)
                } else {
                    // Remote content is fetched by the server itself
                    Ok(WireValue::Reference {
                        href: text.clone(),
                        mime_type: guess_type(text, &supported).or_else(|| self.default_mime(spec)),
                    })
                }
            }
            Value::String(text) if is_file(Path::new(text)) => {
                self.local_file_to_wire(Path::new(text), text, spec)
            }
            Value::String(text) => Ok(WireValue::ComplexData {
                content: text.clone(),
                mime_type: self.default_mime(spec),
                encoding: Some(ENCODING_UTF8.to_string()),
                schema: self.default_schema(spec),
            }),
            Value::Bytes(bytes) => {
                let mime = self.default_mime(spec);
                let (content, encoding) =
                    encode_content(bytes.clone(), mime.as_deref(), self.declared_encoding(spec, mime.as_deref()));
                Ok(WireValue::ComplexData {
                    content,
                    mime_type: mime,
                    encoding: Some(encoding.to_string()),
                    schema: self.default_schema(spec),
                })
            }
            Value::Json(json) => Ok(WireValue::ComplexData {
                content: json.to_string(),
                mime_type: self.default_mime(spec).or_else(|| Some("application/json".into())),
                encoding: Some(ENCODING_UTF8.to_string()),
                schema: self.default_schema(spec),
            }),
            other => Err(WpsError::conversion(
                &spec.identifier,
                &data_type,
                format!("{} cannot be sent as complex data", other.kind()),
            )),
        }
    }

    /// Embed a local file, or pass it by `file://` reference when the server
    /// runs on this host.
    fn local_file_to_wire(
        &self,
        path: &Path,
        original: &str,
        spec: &InputSpec,
    ) -> Result<WireValue, WpsError> {
        let supported = spec.kind.mime_types();
        let mime = guess_type(original, &supported).or_else(|| self.default_mime(spec));

        if self.server_is_local {
            return Ok(WireValue::Reference {
                href: fix_local_url(&path.display().to_string()),
                mime_type: mime,
            });
        }

        let encoding = self.declared_encoding(spec, mime.as_deref());
        let (content, used) = embed_file(path, mime.as_deref(), encoding).map_err(|e| {
            WpsError::conversion(
                &spec.identifier,
                &spec.kind.type_name(),
                format!("failed to read {}: {e}", path.display()),
            )
        })?;

        Ok(WireValue::ComplexData {
            content,
            mime_type: mime,
            encoding: Some(used.to_string()),
            schema: self.default_schema(spec),
        })
    }

    fn default_mime(&self, spec: &InputSpec) -> Option<String> {
        spec.kind.default_format().map(|f| f.mime_type.clone())
    }

    fn default_schema(&self, spec: &InputSpec) -> Option<String> {
        spec.kind.default_format().and_then(|f| f.schema.clone())
    }

    /// Encoding declared by the format matching `mime`.
    fn declared_encoding<'a>(&self, spec: &'a InputSpec, mime: Option<&str>) -> Option<&'a str> {
        let DataKind::Complex { formats } = &spec.kind else {
            return None;
        };
        formats
            .iter()
            .find(|f| Some(f.mime_type.as_str()) == mime)
            .or_else(|| formats.first())
            .and_then(|f| f.encoding.as_deref())
    }

    // ─── Wire → Native ───────────────────────────────────────────────────

    /// Convert a wire value back to a native value per the given data kind.
    pub fn from_wire(
        &self,
        identifier: &str,
        wire: &WireValue,
        kind: &DataKind,
    ) -> Result<Value, WpsError> {
        match (wire, kind) {
            (WireValue::Literal(text), DataKind::Literal { data_type, .. }) => {
                literal_from_wire(text, data_type).map_err(|reason| {
                    WpsError::conversion(identifier, data_type.name(), reason)
                })
            }
            (WireValue::Literal(text), DataKind::BoundingBox { .. }) => parse_bbox_text(text, None)
                .map(Value::BoundingBox)
                .ok_or_else(|| {
                    WpsError::conversion(identifier, "BoundingBoxData", format!("'{text}' is not a bounding box"))
                }),
            (WireValue::Literal(text), DataKind::Complex { .. }) => Ok(Value::String(text.clone())),
            (WireValue::ComplexData { content, encoding, .. }, _) => {
                let is_base64 = encoding
                    .as_deref()
                    .map(|e| e.eq_ignore_ascii_case(ENCODING_BASE64))
                    .unwrap_or(false);
                if is_base64 {
                    let compact: String = content.split_whitespace().collect();
                    BASE64.decode(compact).map(Value::Bytes).map_err(|e| {
                        WpsError::conversion(identifier, &kind.type_name(), format!("invalid base64: {e}"))
                    })
                } else {
                    Ok(Value::String(content.clone()))
                }
            }
            (WireValue::Reference { href, .. }, _) => Ok(Value::Reference(href.clone())),
            (WireValue::BoundingBox(bbox), _) => Ok(Value::BoundingBox(bbox.clone())),
        }
    }
}

/// Whole float to `i64`, `None` outside `[-2^63, 2^63)`.
fn float_to_i64(f: f64) -> Option<i64> {
    const BOUND: f64 = 9_223_372_036_854_775_808.0;
    (-BOUND..BOUND).contains(&f).then_some(f as i64)
}

fn literal_to_wire(value: &Value, data_type: &LiteralType) -> Result<String, String> {
    let mismatch = || format!("{} is not a valid {}", value.kind(), data_type.name());
    match data_type {
        LiteralType::Integer => match value {
            Value::Integer(i) => Ok(i.to_string()),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => float_to_i64(*f)
                .map(|i| i.to_string())
                .ok_or_else(|| format!("{f} is out of range for integer")),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|i| i.to_string())
                .map_err(|_| format!("'{s}' is not a valid integer")),
            _ => Err(mismatch()),
        },
        LiteralType::Float => match value {
            Value::Float(f) => Ok(f.to_string()),
            Value::Integer(i) => Ok(i.to_string()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(|_| s.trim().to_string())
                .map_err(|_| format!("'{s}' is not a valid float")),
            _ => Err(mismatch()),
        },
        LiteralType::Boolean => match value {
            Value::Bool(b) => Ok(b.to_string()),
            Value::String(s) => parse_bool(s)
                .map(|b| b.to_string())
                .ok_or_else(|| format!("'{s}' is not a valid boolean")),
            _ => Err(mismatch()),
        },
        LiteralType::DateTime => match value {
            Value::DateTime(dt) => Ok(dt.to_rfc3339()),
            Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| dt.to_rfc3339())
                .map_err(|e| format!("'{s}' is not a valid dateTime: {e}")),
            _ => Err(mismatch()),
        },
        LiteralType::String | LiteralType::AnyUri | LiteralType::Other(_) => match value {
            Value::String(s) | Value::Reference(s) => Ok(s.clone()),
            Value::Integer(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::DateTime(dt) => Ok(dt.to_rfc3339()),
            Value::Path(p) if *data_type == LiteralType::AnyUri => {
                Ok(fix_local_url(&p.display().to_string()))
            }
            _ => Err(mismatch()),
        },
    }
}

fn literal_from_wire(text: &str, data_type: &LiteralType) -> Result<Value, String> {
    match data_type {
        LiteralType::Integer => text
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| format!("'{text}' is not a valid integer")),
        LiteralType::Float => text
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| format!("'{text}' is not a valid float")),
        LiteralType::Boolean => parse_bool(text)
            .map(Value::Bool)
            .ok_or_else(|| format!("'{text}' is not a valid boolean")),
        LiteralType::DateTime => DateTime::parse_from_rfc3339(text.trim())
            .map(Value::DateTime)
            .map_err(|e| format!("'{text}' is not a valid dateTime: {e}")),
        LiteralType::String | LiteralType::AnyUri | LiteralType::Other(_) => {
            Ok(Value::String(text.to_string()))
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Format;

    fn literal_spec(identifier: &str, data_type: LiteralType, default: Option<&str>) -> InputSpec {
        InputSpec {
            identifier: identifier.into(),
            title: None,
            abstract_text: None,
            kind: DataKind::Literal {
                data_type,
                allowed_values: vec![],
            },
            default_value: default.map(str::to_string),
            min_occurs: 1,
            max_occurs: 1,
        }
    }

    fn complex_spec(formats: Vec<Format>) -> InputSpec {
        InputSpec {
            identifier: "dataset".into(),
            title: None,
            abstract_text: None,
            kind: DataKind::Complex { formats },
            default_value: None,
            min_occurs: 0,
            max_occurs: 1,
        }
    }

    fn netcdf_format() -> Format {
        Format {
            mime_type: "application/x-netcdf".into(),
            encoding: Some("base64".into()),
            schema: None,
        }
    }

    fn remote() -> TypeConverter {
        TypeConverter::new("https://remote.org/wps")
    }

    #[test]
    fn test_literal_round_trip() {
        let converter = remote();
        let cases = vec![
            (LiteralType::String, Value::from("Hello david")),
            (LiteralType::Integer, Value::from(-42)),
            (LiteralType::Float, Value::from(3.0)),
            (LiteralType::Float, Value::from(0.1 + 0.2)),
            (LiteralType::Float, Value::from(-1.5e-300)),
            (LiteralType::Boolean, Value::from(true)),
            (LiteralType::Boolean, Value::from(false)),
            (
                LiteralType::DateTime,
                Value::DateTime(DateTime::parse_from_rfc3339("2024-03-01T12:30:00+02:00").unwrap()),
            ),
        ];
        for (data_type, value) in cases {
            let spec = literal_spec("x", data_type, None);
            let wire = converter.to_wire(&value, &spec).unwrap();
            let back = converter.from_wire("x", &wire, &spec.kind).unwrap();
            assert_eq!(back, value, "round trip failed for {wire:?}");
        }
    }

    #[test]
    fn test_literal_type_mismatch_is_conversion_error() {
        let spec = literal_spec("count", LiteralType::Integer, None);
        let err = remote().to_wire(&Value::from("ten"), &spec).unwrap_err();
        match err {
            WpsError::Conversion {
                identifier,
                data_type,
                ..
            } => {
                assert_eq!(identifier, "count");
                assert_eq!(data_type, "integer");
            }
            other => panic!("expected Conversion, got {other:?}"),
        }
    }

    #[test]
    fn test_whole_float_to_integer_range() {
        let converter = remote();
        let spec = literal_spec("count", LiteralType::Integer, None);
        assert_eq!(
            converter.to_wire(&Value::from(7.0), &spec).unwrap(),
            WireValue::Literal("7".into())
        );
        for out_of_range in [1e20, -1e20, 9_223_372_036_854_775_808.0] {
            assert!(matches!(
                converter.to_wire(&Value::from(out_of_range), &spec),
                Err(WpsError::Conversion { .. })
            ));
        }
        assert_eq!(float_to_i64(-9_223_372_036_854_775_808.0), Some(i64::MIN));
    }

    #[test]
    fn test_literal_from_wire_invalid() {
        let spec = literal_spec("flag", LiteralType::Boolean, None);
        let result = remote().from_wire("flag", &WireValue::Literal("maybe".into()), &spec.kind);
        assert!(matches!(result, Err(WpsError::Conversion { .. })));
    }

    #[test]
    fn test_default_of_literal() {
        let converter = remote();
        assert_eq!(
            converter.default_of(&literal_spec("name", LiteralType::String, Some("World"))),
            Some(Value::from("World"))
        );
        assert_eq!(
            converter.default_of(&literal_spec("n", LiteralType::Integer, Some("10"))),
            Some(Value::from(10))
        );
        assert_eq!(converter.default_of(&literal_spec("n", LiteralType::Integer, None)), None);
        // Unparseable defaults are kept as text
        assert_eq!(
            converter.default_of(&literal_spec("n", LiteralType::Integer, Some("ten"))),
            Some(Value::from("ten"))
        );
    }

    #[test]
    fn test_default_of_complex_is_absent() {
        let mut spec = complex_spec(vec![netcdf_format()]);
        spec.default_value = Some("ignored".into());
        assert_eq!(remote().default_of(&spec), None);
    }

    #[test]
    fn test_list_yields_one_wire_value_per_item() {
        let spec = literal_spec("n", LiteralType::Integer, None);
        let wire = remote()
            .to_wire_all(&Value::List(vec![Value::from(1), Value::from(2)]), &spec)
            .unwrap();
        assert_eq!(
            wire,
            vec![WireValue::Literal("1".into()), WireValue::Literal("2".into())]
        );
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("http://localhost:5000/wps"));
        assert!(is_url("file:///path/to/my/file.txt"));
        assert!(!is_url("myfile.txt"));
        assert!(!is_url("just a string"));
        assert!(!is_url("C:\\data\\file.nc"));
    }

    #[test]
    fn test_is_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("dummy.nc");
        std::fs::write(&path, b"CDF\x01").unwrap();
        assert!(is_file(&path));
        assert!(!is_file(tmp.path()));
        let long: String = "a".repeat(260);
        assert!(!is_file(Path::new(&long)));
    }

    #[test]
    fn test_fix_local_url() {
        assert_eq!(fix_local_url("http://example.org/a.nc"), "http://example.org/a.nc");
        assert_eq!(fix_local_url("/tmp/data.nc"), "file:///tmp/data.nc");
        let relative = fix_local_url("data.nc");
        assert!(relative.starts_with("file:///"));
        assert!(relative.ends_with("/data.nc"));
    }

    #[test]
    fn test_guess_type_zip() {
        let mime = guess_type(
            "LSJ_LL.zip",
            &["application/gml+xml", "application/zip", "application/x-zipped-shp"],
        );
        assert_eq!(mime.as_deref(), Some("application/zip"));

        let mime = guess_type("LSJ_LL.zip", &["application/gml+xml", "application/x-zipped-shp"]);
        assert_eq!(mime.as_deref(), Some("application/x-zipped-shp"));
    }

    #[test]
    fn test_guess_type_netcdf() {
        let mime = guess_type(
            "https://remote.org/thredds/dodsC/a.nc",
            &["application/x-netcdf", "application/x-ogc-dods"],
        );
        assert_eq!(mime.as_deref(), Some("application/x-ogc-dods"));

        let mime = guess_type(
            "https://remote.org/thredds/file/a.nc",
            &["application/x-ogc-dods", "application/x-netcdf"],
        );
        assert_eq!(mime.as_deref(), Some("application/x-netcdf"));
    }

    #[test]
    fn test_guess_type_unknown_extension() {
        assert_eq!(guess_type("data.xyz", &["text/plain"]), None);
    }

    #[test]
    fn test_encode_content_fallback_order() {
        // Declared encoding wins
        assert_eq!(
            encode_content(b"abc".to_vec(), Some("text/plain"), Some("base64")),
            ("YWJj".to_string(), ENCODING_BASE64)
        );
        // Mime heuristic for textual types
        assert_eq!(
            encode_content(b"<a/>".to_vec(), Some("text/xml"), None),
            ("<a/>".to_string(), ENCODING_UTF8)
        );
        // Base64 default
        assert_eq!(
            encode_content(b"abc".to_vec(), Some("application/x-netcdf"), None).1,
            ENCODING_BASE64
        );
        assert_eq!(encode_content(b"abc".to_vec(), None, None).1, ENCODING_BASE64);
        // Declared text but binary content: the actual encoding is surfaced
        assert_eq!(
            encode_content(vec![0xff, 0xfe], Some("text/plain"), Some("utf-8")).1,
            ENCODING_BASE64
        );
    }

    #[test]
    fn test_remote_url_stays_reference() {
        let spec = complex_spec(vec![netcdf_format()]);
        let wire = remote()
            .to_wire(&Value::from("http://data.org/tas.nc"), &spec)
            .unwrap();
        assert_eq!(
            wire,
            WireValue::Reference {
                href: "http://data.org/tas.nc".into(),
                mime_type: Some("application/x-netcdf".into()),
            }
        );
    }

    #[test]
    fn test_local_file_embedded_for_remote_server() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("dummy.nc");
        std::fs::write(&path, b"CDF\x01\x00").unwrap();

        let spec = complex_spec(vec![netcdf_format()]);
        let wire = remote().to_wire(&Value::Path(path.clone()), &spec).unwrap();
        match wire {
            WireValue::ComplexData {
                content,
                mime_type,
                encoding,
                ..
            } => {
                assert_eq!(mime_type.as_deref(), Some("application/x-netcdf"));
                assert_eq!(encoding.as_deref(), Some("base64"));
                assert_eq!(BASE64.decode(content).unwrap(), b"CDF\x01\x00");
            }
            other => panic!("expected embedded data, got {other:?}"),
        }

        // The same file given as a file:// URL is embedded too
        let url = Url::from_file_path(&path).unwrap().to_string();
        let wire = remote().to_wire(&Value::from(url), &spec).unwrap();
        assert!(matches!(wire, WireValue::ComplexData { .. }));
    }

    #[test]
    fn test_local_file_referenced_for_local_server() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("caps.xml");
        std::fs::write(&path, "<a/>").unwrap();

        let spec = complex_spec(vec![Format::new("text/xml")]);
        let converter = TypeConverter::new("http://localhost:5000/wps");
        assert!(converter.server_is_local());
        let wire = converter
            .to_wire(&Value::from(path.display().to_string()), &spec)
            .unwrap();
        match wire {
            WireValue::Reference { href, .. } => {
                assert!(href.starts_with("file:///"));
                assert!(href.ends_with("caps.xml"));
            }
            other => panic!("expected reference, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_url_is_conversion_error() {
        let spec = complex_spec(vec![netcdf_format()]);
        let result = remote().to_wire(&Value::from("file:///does/not/exist.nc"), &spec);
        assert!(matches!(result, Err(WpsError::Conversion { .. })));
    }

    #[test]
    fn test_plain_text_embedded_as_utf8() {
        let spec = complex_spec(vec![Format::new("text/plain")]);
        let wire = remote().to_wire(&Value::from("just a string"), &spec).unwrap();
        assert_eq!(
            wire,
            WireValue::ComplexData {
                content: "just a string".into(),
                mime_type: Some("text/plain".into()),
                encoding: Some("utf-8".into()),
                schema: None,
            }
        );
    }

    #[test]
    fn test_complex_from_wire_base64() {
        let kind = DataKind::Complex {
            formats: vec![netcdf_format()],
        };
        let wire = WireValue::ComplexData {
            content: "Q0RG\nAQ==".into(),
            mime_type: Some("application/x-netcdf".into()),
            encoding: Some("base64".into()),
            schema: None,
        };
        let value = remote().from_wire("out", &wire, &kind).unwrap();
        assert_eq!(value, Value::Bytes(b"CDF\x01".to_vec()));
    }

    #[test]
    fn test_bbox_conversions() {
        let spec = InputSpec {
            identifier: "extent".into(),
            title: None,
            abstract_text: None,
            kind: DataKind::BoundingBox {
                supported_crs: vec!["EPSG:4326".into()],
            },
            default_value: None,
            min_occurs: 1,
            max_occurs: 1,
        };
        let converter = remote();

        let expected = WireValue::BoundingBox(BoundingBox::new(0.0, 10.0, 5.0, 20.0, Some("EPSG:4326")));
        let numbers = Value::List(vec![0.0.into(), 10.0.into(), 5.0.into(), 20.0.into()]);
        assert_eq!(converter.to_wire_all(&numbers, &spec).unwrap(), vec![expected.clone()]);
        assert_eq!(converter.to_wire(&Value::from("0,10,5,20"), &spec).unwrap(), expected);

        let back = converter.from_wire("extent", &expected, &spec.kind).unwrap();
        assert_eq!(
            back,
            Value::BoundingBox(BoundingBox::new(0.0, 10.0, 5.0, 20.0, Some("EPSG:4326")))
        );

        assert!(converter.to_wire(&Value::from("0,10,5"), &spec).is_err());
    }
}
