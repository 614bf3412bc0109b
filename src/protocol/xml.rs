//! WPS 1.0.0 document handling.
//!
//! Parses Capabilities, ProcessDescriptions, ExecuteResponse and
//! ExceptionReport documents into the protocol types, and encodes Execute
//! requests. Namespaces are ignored: elements and attributes are matched on
//! their local names, which is what every WPS server in the wild agrees on.

use xml::escape::{escape_str_attribute, escape_str_pcdata};
use xml::reader::{EventReader, XmlEvent};

use super::errors::ServiceError;
use super::types::{
    BoundingBox, Capabilities, DataKind, ExecuteRequest, ExecutionMode, Format, InputSpec,
    LiteralType, OutputSpec, ProcessDescriptor, ProcessSummary, RawOutput, ReportedStatus,
    StatusReport, WireValue,
};

const WPS_NS: &str = "http://www.opengis.net/wps/1.0.0";
const OWS_NS: &str = "http://www.opengis.net/ows/1.1";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

// ─── Element Tree ────────────────────────────────────────────────────────────

/// Minimal element tree built from the xml-rs event stream.
#[derive(Debug, Default, Clone)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Depth-first search for the first descendant with the given name.
    fn find(&self, name: &str) -> Option<&Element> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }

    fn trimmed_text(&self) -> &str {
        self.text.trim()
    }

    fn child_text(&self, name: &str) -> Option<String> {
        self.child(name)
            .map(|c| c.trimmed_text().to_string())
            .filter(|t| !t.is_empty())
    }

    /// Re-serialize this element (used for inline XML payloads).
    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (k, v) in &self.attributes {
            out.push_str(&format!(" {k}=\"{}\"", escape_str_attribute(v)));
        }
        out.push('>');
        out.push_str(&escape_str_pcdata(&self.text));
        for child in &self.children {
            child.write_xml(out);
        }
        out.push_str(&format!("</{}>", self.name));
    }
}

fn parse_tree(body: &str) -> Result<Element, ServiceError> {
    let parser = EventReader::from_str(body);
    let mut stack: Vec<Element> = Vec::new();

    for event in parser {
        let event = event.map_err(|e| ServiceError::Parse {
            reason: e.to_string(),
        })?;
        match event {
            XmlEvent::StartElement {
                name, attributes, ..
            } => {
                stack.push(Element {
                    name: name.local_name,
                    attributes: attributes
                        .into_iter()
                        .map(|a| (a.name.local_name, a.value))
                        .collect(),
                    ..Default::default()
                });
            }
            XmlEvent::EndElement { .. } => {
                let element = stack.pop().ok_or_else(|| ServiceError::Parse {
                    reason: "unbalanced end element".into(),
                })?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            XmlEvent::Characters(text) | XmlEvent::CData(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            _ => {}
        }
    }

    Err(ServiceError::Parse {
        reason: "document has no root element".into(),
    })
}

/// Parse a document, turning a top-level `ExceptionReport` into an error.
fn parse_document(body: &str) -> Result<Element, ServiceError> {
    let root = parse_tree(body)?;
    if root.name == "ExceptionReport" {
        return Err(exception_from_report(&root));
    }
    Ok(root)
}

fn exception_from_report(report: &Element) -> ServiceError {
    match report.find("Exception") {
        Some(exception) => ServiceError::Exception {
            code: exception
                .attr("exceptionCode")
                .unwrap_or("NoApplicableCode")
                .to_string(),
            locator: exception.attr("locator").map(str::to_string),
            text: exception
                .children_named("ExceptionText")
                .map(|t| t.trimmed_text().to_string())
                .collect::<Vec<_>>()
                .join("; "),
        },
        None => ServiceError::Exception {
            code: "NoApplicableCode".into(),
            locator: None,
            text: report.trimmed_text().to_string(),
        },
    }
}

/// Try to read an OWS exception out of an error response body.
pub fn parse_exception_report(body: &str) -> Option<ServiceError> {
    let root = parse_tree(body).ok()?;
    (root.name == "ExceptionReport").then(|| exception_from_report(&root))
}

// ─── Capabilities ────────────────────────────────────────────────────────────

/// Parse a `GetCapabilities` response.
pub fn parse_capabilities(body: &str) -> Result<Capabilities, ServiceError> {
    let root = parse_document(body)?;
    if root.name != "Capabilities" {
        return Err(ServiceError::Parse {
            reason: format!("expected Capabilities, found {}", root.name),
        });
    }

    let title = root
        .child("ServiceIdentification")
        .and_then(|s| s.child_text("Title"));

    let processes = root
        .child("ProcessOfferings")
        .map(|offerings| {
            offerings
                .children_named("Process")
                .filter_map(|p| {
                    Some(ProcessSummary {
                        identifier: p.child_text("Identifier")?,
                        title: p.child_text("Title"),
                        abstract_text: p.child_text("Abstract"),
                        version: p.attr("processVersion").map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Capabilities {
        title,
        version: root.attr("version").map(str::to_string),
        processes,
    })
}

// ─── Process Descriptions ────────────────────────────────────────────────────

/// Parse a `DescribeProcess` response and return the description of
/// `identifier` (or the only description, when the server omits it).
pub fn parse_process_description(
    body: &str,
    identifier: &str,
) -> Result<ProcessDescriptor, ServiceError> {
    let root = parse_document(body)?;
    let descriptions: Vec<&Element> = if root.name == "ProcessDescription" {
        vec![&root]
    } else {
        root.children_named("ProcessDescription").collect()
    };

    let description = descriptions
        .iter()
        .find(|d| d.child_text("Identifier").as_deref() == Some(identifier))
        .or_else(|| descriptions.first())
        .ok_or_else(|| ServiceError::Parse {
            reason: format!("no ProcessDescription for '{identifier}'"),
        })?;

    let inputs = description
        .child("DataInputs")
        .map(|di| di.children_named("Input").filter_map(parse_input).collect())
        .unwrap_or_default();

    let outputs = description
        .child("ProcessOutputs")
        .map(|po| po.children_named("Output").filter_map(parse_output).collect())
        .unwrap_or_default();

    Ok(ProcessDescriptor {
        identifier: description
            .child_text("Identifier")
            .unwrap_or_else(|| identifier.to_string()),
        title: description.child_text("Title"),
        abstract_text: description.child_text("Abstract"),
        version: description.attr("processVersion").map(str::to_string),
        inputs,
        outputs,
        supports_store: parse_bool_attr(description.attr("storeSupported")),
        supports_status: parse_bool_attr(description.attr("statusSupported")),
    })
}

fn parse_bool_attr(value: Option<&str>) -> bool {
    matches!(value.map(str::trim), Some("true") | Some("1"))
}

fn parse_occurs(value: Option<&str>) -> u32 {
    match value.map(str::trim) {
        Some("unbounded") => u32::MAX,
        Some(v) => v.parse().unwrap_or(1),
        None => 1,
    }
}

fn parse_input(input: &Element) -> Option<InputSpec> {
    let identifier = input.child_text("Identifier")?;
    let (kind, default_value) = if let Some(literal) = input.child("LiteralData") {
        (parse_literal_kind(literal), literal.child_text("DefaultValue"))
    } else if let Some(complex) = input.child("ComplexData") {
        (parse_complex_kind(complex), None)
    } else if let Some(bbox) = input.child("BoundingBoxData") {
        (parse_bbox_kind(bbox), None)
    } else {
        tracing::warn!(input = %identifier, "input without a recognised data kind, skipping");
        return None;
    };

    Some(InputSpec {
        identifier,
        title: input.child_text("Title"),
        abstract_text: input.child_text("Abstract"),
        kind,
        default_value,
        min_occurs: parse_occurs(input.attr("minOccurs")),
        max_occurs: parse_occurs(input.attr("maxOccurs")),
    })
}

fn parse_output(output: &Element) -> Option<OutputSpec> {
    let identifier = output.child_text("Identifier")?;
    let kind = if let Some(literal) = output.child("LiteralOutput") {
        parse_literal_kind(literal)
    } else if let Some(complex) = output.child("ComplexOutput") {
        parse_complex_kind(complex)
    } else if let Some(bbox) = output.child("BoundingBoxOutput") {
        parse_bbox_kind(bbox)
    } else {
        tracing::warn!(output = %identifier, "output without a recognised data kind, skipping");
        return None;
    };

    Some(OutputSpec {
        identifier,
        title: output.child_text("Title"),
        abstract_text: output.child_text("Abstract"),
        kind,
    })
}

fn parse_literal_kind(literal: &Element) -> DataKind {
    let data_type = literal
        .child("DataType")
        .map(|dt| {
            let text = dt.trimmed_text();
            if text.is_empty() {
                dt.attr("reference").unwrap_or("string").to_string()
            } else {
                text.to_string()
            }
        })
        .unwrap_or_else(|| "string".to_string());

    let allowed_values = literal
        .child("AllowedValues")
        .map(|av| {
            av.children_named("Value")
                .map(|v| v.trimmed_text().to_string())
                .collect()
        })
        .unwrap_or_default();

    DataKind::Literal {
        data_type: LiteralType::from_declared(&data_type),
        allowed_values,
    }
}

fn parse_format(format: &Element) -> Option<Format> {
    Some(Format {
        mime_type: format.child_text("MimeType")?,
        encoding: format.child_text("Encoding"),
        schema: format.child_text("Schema"),
    })
}

fn parse_complex_kind(complex: &Element) -> DataKind {
    let mut formats: Vec<Format> = complex
        .child("Default")
        .and_then(|d| d.child("Format"))
        .and_then(parse_format)
        .into_iter()
        .collect();

    if let Some(supported) = complex.child("Supported") {
        for format in supported.children_named("Format").filter_map(parse_format) {
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
    }

    DataKind::Complex { formats }
}

fn parse_bbox_kind(bbox: &Element) -> DataKind {
    let mut supported_crs: Vec<String> = bbox
        .child("Default")
        .and_then(|d| d.child_text("CRS"))
        .into_iter()
        .collect();

    if let Some(supported) = bbox.child("Supported") {
        for crs in supported.children_named("CRS") {
            let crs = crs.trimmed_text().to_string();
            if !supported_crs.contains(&crs) {
                supported_crs.push(crs);
            }
        }
    }

    DataKind::BoundingBox { supported_crs }
}

// ─── Execute Response ────────────────────────────────────────────────────────

/// Parse an `ExecuteResponse` document (from Execute or a status poll).
pub fn parse_execute_response(body: &str) -> Result<StatusReport, ServiceError> {
    let root = parse_document(body)?;
    if root.name != "ExecuteResponse" {
        return Err(ServiceError::Parse {
            reason: format!("expected ExecuteResponse, found {}", root.name),
        });
    }

    let status_el = root.child("Status").ok_or_else(|| ServiceError::Parse {
        reason: "ExecuteResponse without Status".into(),
    })?;

    let (status, percent_completed, message) = parse_status(status_el)?;

    let outputs = root
        .child("ProcessOutputs")
        .map(|po| po.children_named("Output").filter_map(parse_raw_output).collect())
        .unwrap_or_default();

    Ok(StatusReport {
        status,
        percent_completed,
        message,
        status_location: root.attr("statusLocation").map(str::to_string),
        outputs,
    })
}

fn parse_status(status: &Element) -> Result<(ReportedStatus, u8, String), ServiceError> {
    let percent = |el: &Element| -> u8 {
        el.attr("percentCompleted")
            .and_then(|p| p.trim().parse::<u8>().ok())
            .map(|p| p.min(100))
            .unwrap_or(0)
    };

    if let Some(el) = status.child("ProcessAccepted") {
        return Ok((ReportedStatus::Accepted, 0, el.trimmed_text().to_string()));
    }
    if let Some(el) = status.child("ProcessStarted") {
        return Ok((ReportedStatus::Started, percent(el), el.trimmed_text().to_string()));
    }
    if let Some(el) = status.child("ProcessPaused") {
        return Ok((ReportedStatus::Paused, percent(el), el.trimmed_text().to_string()));
    }
    if let Some(el) = status.child("ProcessSucceeded") {
        return Ok((ReportedStatus::Succeeded, 100, el.trimmed_text().to_string()));
    }
    if let Some(el) = status.child("ProcessFailed") {
        let message = match el.find("ExceptionReport") {
            Some(report) => exception_from_report(report).to_string(),
            None => el.trimmed_text().to_string(),
        };
        return Ok((ReportedStatus::Failed, 0, message));
    }

    Err(ServiceError::Parse {
        reason: "unrecognised Status element".into(),
    })
}

fn parse_raw_output(output: &Element) -> Option<RawOutput> {
    let identifier = output.child_text("Identifier")?;

    if let Some(reference) = output.child("Reference") {
        return Some(RawOutput {
            identifier,
            data_type: None,
            mime_type: reference.attr("mimeType").map(str::to_string),
            data: Vec::new(),
            reference: reference.attr("href").map(str::to_string),
        });
    }

    let mut raw = RawOutput {
        identifier,
        data_type: None,
        mime_type: None,
        data: Vec::new(),
        reference: None,
    };

    let Some(data) = output.child("Data") else {
        return Some(raw);
    };

    for item in &data.children {
        match item.name.as_str() {
            "LiteralData" => {
                raw.data_type = item.attr("dataType").map(str::to_string);
                raw.data.push(WireValue::Literal(item.trimmed_text().to_string()));
            }
            "ComplexData" => {
                raw.mime_type = item.attr("mimeType").map(str::to_string);
                let content = if item.children.is_empty() {
                    item.trimmed_text().to_string()
                } else {
                    let mut xml = String::new();
                    for child in &item.children {
                        child.write_xml(&mut xml);
                    }
                    xml
                };
                raw.data.push(WireValue::ComplexData {
                    content,
                    mime_type: raw.mime_type.clone(),
                    encoding: item.attr("encoding").map(str::to_string),
                    schema: item.attr("schema").map(str::to_string),
                });
            }
            "BoundingBoxData" | "BoundingBox" => {
                raw.data.push(WireValue::BoundingBox(parse_bbox_value(item)));
            }
            _ => {}
        }
    }

    Some(raw)
}

fn parse_corner(text: Option<String>) -> Vec<f64> {
    text.map(|t| {
        t.split_whitespace()
            .filter_map(|n| n.parse::<f64>().ok())
            .collect()
    })
    .unwrap_or_default()
}

fn parse_bbox_value(bbox: &Element) -> BoundingBox {
    BoundingBox {
        lower_corner: parse_corner(bbox.child_text("LowerCorner")),
        upper_corner: parse_corner(bbox.child_text("UpperCorner")),
        crs: bbox.attr("crs").map(str::to_string),
    }
}

// ─── Execute Request ─────────────────────────────────────────────────────────

fn join_corner(corner: &[f64]) -> String {
    corner
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn write_input(out: &mut String, identifier: &str, value: &WireValue) {
    out.push_str("<wps:Input>");
    out.push_str(&format!(
        "<ows:Identifier>{}</ows:Identifier>",
        escape_str_pcdata(identifier)
    ));
    match value {
        WireValue::Literal(text) => {
            out.push_str(&format!(
                "<wps:Data><wps:LiteralData>{}</wps:LiteralData></wps:Data>",
                escape_str_pcdata(text)
            ));
        }
        WireValue::ComplexData {
            content,
            mime_type,
            encoding,
            schema,
        } => {
            out.push_str("<wps:Data><wps:ComplexData");
            for (name, attr) in [("mimeType", mime_type), ("encoding", encoding), ("schema", schema)] {
                if let Some(attr) = attr {
                    out.push_str(&format!(" {name}=\"{}\"", escape_str_attribute(attr)));
                }
            }
            out.push('>');
            out.push_str(&escape_str_pcdata(content));
            out.push_str("</wps:ComplexData></wps:Data>");
        }
        WireValue::Reference { href, mime_type } => {
            out.push_str(&format!(
                "<wps:Reference xlink:href=\"{}\"",
                escape_str_attribute(href)
            ));
            if let Some(mime) = mime_type {
                out.push_str(&format!(" mimeType=\"{}\"", escape_str_attribute(mime)));
            }
            out.push_str("/>");
        }
        WireValue::BoundingBox(bbox) => {
            out.push_str("<wps:Data><wps:BoundingBoxData");
            if let Some(crs) = &bbox.crs {
                out.push_str(&format!(" crs=\"{}\"", escape_str_attribute(crs)));
            }
            out.push_str(&format!(" dimensions=\"{}\">", bbox.dimensions()));
            out.push_str(&format!(
                "<ows:LowerCorner>{}</ows:LowerCorner><ows:UpperCorner>{}</ows:UpperCorner>",
                join_corner(&bbox.lower_corner),
                join_corner(&bbox.upper_corner)
            ));
            out.push_str("</wps:BoundingBoxData></wps:Data>");
        }
    }
    out.push_str("</wps:Input>");
}

/// Encode an Execute request as a WPS 1.0.0 XML document.
pub fn encode_execute_request(request: &ExecuteRequest, version: &str) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    out.push_str(&format!(
        "<wps:Execute service=\"WPS\" version=\"{}\" xmlns:wps=\"{WPS_NS}\" xmlns:ows=\"{OWS_NS}\" xmlns:xlink=\"{XLINK_NS}\">",
        escape_str_attribute(version)
    ));
    out.push_str(&format!(
        "<ows:Identifier>{}</ows:Identifier>",
        escape_str_pcdata(&request.identifier)
    ));

    if !request.inputs.is_empty() {
        out.push_str("<wps:DataInputs>");
        for (identifier, value) in &request.inputs {
            write_input(&mut out, identifier, value);
        }
        out.push_str("</wps:DataInputs>");
    }

    let store = request.mode == ExecutionMode::Async;
    out.push_str("<wps:ResponseForm>");
    out.push_str(&format!(
        "<wps:ResponseDocument storeExecuteResponse=\"{store}\" status=\"{}\">",
        store && request.status
    ));
    for output in &request.outputs {
        out.push_str(&format!(
            "<wps:Output asReference=\"{}\"><ows:Identifier>{}</ows:Identifier></wps:Output>",
            output.as_reference,
            escape_str_pcdata(&output.identifier)
        ));
    }
    out.push_str("</wps:ResponseDocument></wps:ResponseForm>");
    out.push_str("</wps:Execute>");
    out
}

// ─── Tests ───────────────────────────────────────────────────────────────────
