//! Process binder: turns process descriptions into callable operations.
//!
//! Provides:
//! - `sanitize`, the identifier → member name mapping
//! - `BoundOperation`: name, parameters with native defaults, documentation
//! - `Arguments`: keyword arguments for a call, resolved against parameters
//! - Collision detection within a process and across processes

use std::collections::HashMap;

use super::capabilities::CapabilityCache;
use super::convert::TypeConverter;
use super::errors::WpsError;
use super::value::Value;
use crate::protocol::{DataKind, InputSpec, OutputSpec, ProcessDescriptor, WpsService};

// ─── Name Sanitization ───────────────────────────────────────────────────────

/// Words that cannot be used as member names as-is.
const RESERVED_WORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "crate",
    "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl", "in",
    "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "self", "static", "struct", "super", "trait", "true", "try", "type", "typeof",
    "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

/// Map a server identifier to a valid member name.
///
/// Lowercases, replaces every character outside `[a-z0-9_]` with `_`,
/// prefixes a leading digit with `_` and appends `_` to reserved words.
pub fn sanitize(name: &str) -> String {
    let mut out: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if RESERVED_WORDS.contains(&out.as_str()) {
        out.push('_');
    }
    out
}

/// Sanitize every identifier in `identifiers`, failing on the first pair
/// that maps to the same name.
fn sanitize_unique<'a>(
    scope: &str,
    identifiers: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<String>, WpsError> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    let mut names = Vec::new();
    for identifier in identifiers {
        let name = sanitize(identifier);
        if let Some(first) = seen.insert(name.clone(), identifier) {
            return Err(WpsError::BindingNameCollision {
                scope: scope.to_string(),
                name,
                first: first.to_string(),
                second: identifier.to_string(),
            });
        }
        names.push(name);
    }
    Ok(names)
}

// ─── Bound Operation ─────────────────────────────────────────────────────────

/// One parameter of a bound operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Sanitized name used for keyword arguments.
    pub name: String,
    /// Input identifier on the server.
    pub identifier: String,
    pub kind: DataKind,
    /// Native default; `None` means the input is left out unless given.
    pub default: Option<Value>,
    pub description: String,
    pub required: bool,
}

/// One output of a bound operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputBinding {
    pub name: String,
    pub spec: OutputSpec,
}

/// A remote process as a locally callable operation.
///
/// Holds only what a call needs: the process identifier, the parameter
/// list and the descriptor. Invocation goes through the client, which
/// routes the resolved inputs to the execution controller.
#[derive(Debug, Clone)]
pub struct BoundOperation {
    pub name: String,
    pub identifier: String,
    pub parameters: Vec<Parameter>,
    pub outputs: Vec<OutputBinding>,
    pub doc: String,
    pub descriptor: ProcessDescriptor,
}

impl BoundOperation {
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Find an output by sanitized name or by identifier.
    pub fn output(&self, name: &str) -> Option<&OutputBinding> {
        self.outputs
            .iter()
            .find(|o| o.name == name || o.spec.identifier == name)
    }

    /// Resolve keyword arguments into `(identifier, value)` inputs.
    ///
    /// Unset parameters fall back to their default; parameters that end up
    /// absent are omitted. Unknown keywords are rejected.
    pub fn resolve(&self, arguments: Arguments) -> Result<Vec<(String, Value)>, WpsError> {
        let mut given: HashMap<String, Value> = HashMap::new();
        for (name, value) in arguments.0 {
            if self.parameter(&name).is_none() {
                return Err(WpsError::UnknownParameter {
                    operation: self.name.clone(),
                    name,
                });
            }
            given.insert(name, value);
        }

        Ok(self
            .parameters
            .iter()
            .filter_map(|p| {
                given
                    .remove(&p.name)
                    .or_else(|| p.default.clone())
                    .map(|value| (p.identifier.clone(), value))
            })
            .collect())
    }
}

// ─── Arguments ───────────────────────────────────────────────────────────────

/// Keyword arguments for a bound operation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(Vec<(String, Value)>);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a keyword argument. Repeating a name replaces the earlier value.
    pub fn arg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.retain(|(n, _)| n != name);
        self.0.push((name.to_string(), value.into()));
        self
    }

    /// Set a keyword argument when `value` is present.
    pub fn arg_opt(self, name: &str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(v) => self.arg(name, v),
            None => self,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter().fold(Arguments::new(), |args, (k, v)| {
            let name: String = k.into();
            args.arg(&name, v)
        })
    }
}

// ─── ProcessBinder ───────────────────────────────────────────────────────────

/// Builds bound operations from process descriptors.
#[derive(Debug, Clone)]
pub struct ProcessBinder {
    converter: TypeConverter,
}

impl ProcessBinder {
    pub fn new(converter: TypeConverter) -> Self {
        Self { converter }
    }

    /// Describe and bind every process retained in `cache`.
    ///
    /// One `DescribeProcess` round trip per process, in server order. Fails
    /// if two process identifiers map to the same operation name.
    pub async fn bind_all(
        &self,
        cache: &mut CapabilityCache,
        service: &dyn WpsService,
    ) -> Result<Vec<BoundOperation>, WpsError> {
        let identifiers: Vec<String> = cache.identifiers().iter().map(|s| s.to_string()).collect();
        sanitize_unique(service.url(), identifiers.iter().map(String::as_str))?;

        let mut operations = Vec::with_capacity(identifiers.len());
        for identifier in &identifiers {
            let descriptor = cache.describe(service, identifier).await?;
            operations.push(self.bind(descriptor)?);
        }
        Ok(operations)
    }

    /// Bind a single described process.
    pub fn bind(&self, descriptor: &ProcessDescriptor) -> Result<BoundOperation, WpsError> {
        let scope = format!("process '{}'", descriptor.identifier);
        let input_names = sanitize_unique(
            &format!("inputs of {scope}"),
            descriptor.inputs.iter().map(|i| i.identifier.as_str()),
        )?;
        let output_names = sanitize_unique(
            &format!("outputs of {scope}"),
            descriptor.outputs.iter().map(|o| o.identifier.as_str()),
        )?;

        let parameters: Vec<Parameter> = descriptor
            .inputs
            .iter()
            .zip(input_names)
            .map(|(input, name)| Parameter {
                name,
                identifier: input.identifier.clone(),
                kind: input.kind.clone(),
                default: self.converter.default_of(input),
                description: describe(input.title.as_deref(), input.abstract_text.as_deref()),
                required: input.min_occurs > 0 && input.default_value.is_none(),
            })
            .collect();

        let outputs: Vec<OutputBinding> = descriptor
            .outputs
            .iter()
            .zip(output_names)
            .map(|(spec, name)| OutputBinding {
                name,
                spec: spec.clone(),
            })
            .collect();

        let operation = BoundOperation {
            name: sanitize(&descriptor.identifier),
            identifier: descriptor.identifier.clone(),
            doc: build_doc(descriptor, &parameters, &outputs),
            parameters,
            outputs,
            descriptor: descriptor.clone(),
        };

        tracing::debug!(
            process = %operation.identifier,
            operation = %operation.name,
            parameters = operation.parameters.len(),
            "bound process"
        );
        Ok(operation)
    }
}

// ─── Documentation ───────────────────────────────────────────────────────────

fn describe(title: Option<&str>, abstract_text: Option<&str>) -> String {
    match (title, abstract_text) {
        (Some(t), Some(a)) if !a.trim().is_empty() => format!("{t}: {}", a.trim()),
        (Some(t), _) => t.to_string(),
        (None, Some(a)) => a.trim().to_string(),
        (None, None) => String::new(),
    }
}

fn type_line(kind: &DataKind, input: Option<&InputSpec>) -> String {
    let mut line = kind.type_name();
    if let Some(spec) = input {
        if spec.max_occurs > 1 {
            line.push_str(", list");
        }
        if spec.min_occurs == 0 || spec.default_value.is_some() {
            line.push_str(", optional");
        }
    }
    line
}

/// Documentation derived from a descriptor, in numpy docstring layout.
fn build_doc(
    descriptor: &ProcessDescriptor,
    parameters: &[Parameter],
    outputs: &[OutputBinding],
) -> String {
    let mut doc = String::new();
    doc.push_str(descriptor.title.as_deref().unwrap_or(&descriptor.identifier));
    doc.push('\n');
    if let Some(text) = descriptor.abstract_text.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        doc.push('\n');
        doc.push_str(text);
        doc.push('\n');
    }

    if !parameters.is_empty() {
        doc.push_str("\nParameters\n----------\n");
        for (param, input) in parameters.iter().zip(&descriptor.inputs) {
            doc.push_str(&format!("{} : {}\n", param.name, type_line(&param.kind, Some(input))));
            if !param.description.is_empty() {
                doc.push_str(&format!("    {}\n", param.description));
            }
            if let DataKind::Literal { allowed_values, .. } = &param.kind {
                if !allowed_values.is_empty() {
                    doc.push_str(&format!("    Allowed values: {}\n", allowed_values.join(", ")));
                }
            }
            if let Some(default) = &param.default {
                doc.push_str(&format!("    Default: {default}\n"));
            }
        }
    }

    if !outputs.is_empty() {
        doc.push_str("\nReturns\n-------\n");
        for output in outputs {
            doc.push_str(&format!("{} : {}\n", output.name, type_line(&output.spec.kind, None)));
            let description = describe(output.spec.title.as_deref(), output.spec.abstract_text.as_deref());
            if !description.is_empty() {
                doc.push_str(&format!("    {description}\n"));
            }
        }
    }

    doc
}

// ─── Tests ───────────────────────────────────────────────────────────────────
