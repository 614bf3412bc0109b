//! Result materialization: turns a finished execution into values.
//!
//! Inline output data goes through the type converter, using the reported
//! `dataType` when the server sent one and the declared kind otherwise.
//! Reference-only outputs are converted by the registered converter for
//! their mime type when object conversion is on; otherwise, or without a
//! converter, the URL itself is the result.

use super::binder::OutputBinding;
use super::convert::TypeConverter;
use super::converters::ConverterRegistry;
use super::errors::WpsError;
use super::execution::{ExecutionHandle, ExecutionStatus};
use super::value::Value;
use crate::protocol::{DataKind, LiteralType, RawOutput, WpsService};

// ─── Materialized ────────────────────────────────────────────────────────────

/// Outputs of one execution: a single value for single-output processes,
/// otherwise the values in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub enum Materialized {
    Single(Value),
    Sequence(Vec<Value>),
}

impl Materialized {
    fn from_values(mut values: Vec<Value>) -> Self {
        if values.len() == 1 {
            Materialized::Single(values.remove(0))
        } else {
            Materialized::Sequence(values)
        }
    }

    pub fn as_single(&self) -> Option<&Value> {
        match self {
            Materialized::Single(v) => Some(v),
            Materialized::Sequence(_) => None,
        }
    }

    pub fn into_values(self) -> Vec<Value> {
        match self {
            Materialized::Single(v) => vec![v],
            Materialized::Sequence(values) => values,
        }
    }
}

/// Unwrap single-element lists.
pub fn delist(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::List(values)
    }
}

// ─── ResultMaterializer ──────────────────────────────────────────────────────

pub struct ResultMaterializer<'a> {
    service: &'a dyn WpsService,
    converter: &'a TypeConverter,
    converters: &'a ConverterRegistry,
    convert_objects: bool,
}

impl<'a> ResultMaterializer<'a> {
    pub fn new(
        service: &'a dyn WpsService,
        converter: &'a TypeConverter,
        converters: &'a ConverterRegistry,
        convert_objects: bool,
    ) -> Self {
        Self {
            service,
            converter,
            converters,
            convert_objects,
        }
    }

    /// Convert the raw outputs of a succeeded execution.
    ///
    /// Returns `(identifier, value)` pairs: declared outputs first, in
    /// declaration order, then any undeclared output the server sent.
    pub async fn materialize(
        &self,
        handle: &ExecutionHandle,
        outputs: &[OutputBinding],
    ) -> Result<Vec<(String, Value)>, WpsError> {
        if handle.status() != ExecutionStatus::Succeeded {
            return Err(WpsError::ExecutionFailed {
                process: handle.process().to_string(),
                status: handle.status().to_string(),
                message: handle.message().to_string(),
            });
        }

        let raw = handle.outputs();
        let mut values = Vec::with_capacity(raw.len());

        for binding in outputs {
            match raw.iter().find(|r| r.identifier == binding.spec.identifier) {
                Some(output) => {
                    let value = self.convert_output(output, Some(&binding.spec.kind)).await?;
                    values.push((output.identifier.clone(), value));
                }
                None => tracing::warn!(
                    process = %handle.process(),
                    output = %binding.spec.identifier,
                    "declared output missing from response"
                ),
            }
        }

        for output in raw {
            if !outputs.iter().any(|b| b.spec.identifier == output.identifier) {
                let value = self.convert_output(output, None).await?;
                values.push((output.identifier.clone(), value));
            }
        }

        Ok(values)
    }

    async fn convert_output(
        &self,
        output: &RawOutput,
        declared: Option<&DataKind>,
    ) -> Result<Value, WpsError> {
        if !output.data.is_empty() {
            let kind = resolve_kind(output, declared);
            let items = output
                .data
                .iter()
                .map(|wire| self.converter.from_wire(&output.identifier, wire, &kind))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(delist(items));
        }

        let Some(reference) = &output.reference else {
            return Ok(Value::List(Vec::new()));
        };

        let mime_type = output.mime_type.as_deref().or_else(|| {
            declared.and_then(|k| k.default_format()).map(|f| f.mime_type.as_str())
        });

        let converter = match mime_type {
            Some(mime) if self.convert_objects => self.converters.get(mime),
            _ => None,
        };
        let Some(converter) = converter else {
            return Ok(Value::Reference(reference.clone()));
        };

        tracing::debug!(output = %output.identifier, url = %reference, "fetching output for conversion");
        let content = self.service.fetch(reference).await?;
        converter.convert(&content).map_err(|reason| {
            WpsError::conversion(&output.identifier, mime_type.unwrap_or_default(), reason)
        })
    }
}

/// Reported literal type wins over the declared kind.
fn resolve_kind(output: &RawOutput, declared: Option<&DataKind>) -> DataKind {
    match (&output.data_type, declared) {
        (Some(reported), None | Some(DataKind::Literal { .. })) => DataKind::Literal {
            data_type: LiteralType::from_declared(reported),
            allowed_values: Vec::new(),
        },
        (_, Some(kind)) => kind.clone(),
        (None, None) => DataKind::Literal {
            data_type: LiteralType::String,
            allowed_values: Vec::new(),
        },
    }
}

// ─── ExecutionResult ─────────────────────────────────────────────────────────

/// What a bound operation call returns: the execution handle plus its
/// materialized outputs.
///
/// A failed or cancelled execution is still a result; asking it for values
/// returns `WpsError::ExecutionFailed` with the server's status message.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    handle: ExecutionHandle,
    outputs: Vec<(String, Value)>,
    /// Sanitized output names, aligned with `outputs` where declared.
    names: Vec<String>,
}

impl ExecutionResult {
    pub(crate) fn new(handle: ExecutionHandle, outputs: Vec<(String, Value)>, bindings: &[OutputBinding]) -> Self {
        let names = outputs
            .iter()
            .map(|(identifier, _)| {
                bindings
                    .iter()
                    .find(|b| &b.spec.identifier == identifier)
                    .map(|b| b.name.clone())
                    .unwrap_or_else(|| identifier.clone())
            })
            .collect();
        Self {
            handle,
            outputs,
            names,
        }
    }

    pub(crate) fn unfinished(handle: ExecutionHandle) -> Self {
        Self {
            handle,
            outputs: Vec::new(),
            names: Vec::new(),
        }
    }

    pub fn handle(&self) -> &ExecutionHandle {
        &self.handle
    }

    pub fn status(&self) -> ExecutionStatus {
        self.handle.status()
    }

    pub fn is_success(&self) -> bool {
        self.handle.status() == ExecutionStatus::Succeeded
    }

    fn ensure_success(&self) -> Result<(), WpsError> {
        if self.is_success() {
            Ok(())
        } else {
            Err(WpsError::ExecutionFailed {
                process: self.handle.process().to_string(),
                status: self.handle.status().to_string(),
                message: self.handle.message().to_string(),
            })
        }
    }

    /// All outputs (`None`) or one output by sanitized name or identifier.
    pub fn get(&self, name: Option<&str>) -> Result<Materialized, WpsError> {
        match name {
            None => {
                self.ensure_success()?;
                Ok(Materialized::from_values(
                    self.outputs.iter().map(|(_, v)| v.clone()).collect(),
                ))
            }
            Some(name) => self.output(name).map(|v| Materialized::Single(v.clone())),
        }
    }

    /// One output by sanitized name or identifier.
    pub fn output(&self, name: &str) -> Result<&Value, WpsError> {
        self.ensure_success()?;
        self.outputs
            .iter()
            .zip(&self.names)
            .find(|((identifier, _), sanitized)| identifier == name || *sanitized == name)
            .map(|((_, value), _)| value)
            .ok_or_else(|| WpsError::UnknownOutput {
                process: self.handle.process().to_string(),
                name: name.to_string(),
            })
    }

    /// Output names in result order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn into_materialized(self) -> Result<Materialized, WpsError> {
        self.ensure_success()?;
        Ok(Materialized::from_values(
            self.outputs.into_iter().map(|(_, v)| v).collect(),
        ))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
