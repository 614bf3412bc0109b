//! Interactive form for a bound operation.
//!
//! On an interactive host a form mirrors the operation's parameter list:
//! each field starts at the parameter default and can be edited before the
//! form is turned into call arguments. Elsewhere the entry point returns
//! `None`.

use console::Term;
use serde::Serialize;

use super::binder::{Arguments, BoundOperation};
use super::errors::WpsError;
use super::value::Value;
use crate::protocol::DataKind;

/// Whether the process runs attached to an interactive terminal.
pub fn is_interactive_host() -> bool {
    Term::stdout().is_term()
}

/// One editable field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormField {
    pub name: String,
    pub identifier: String,
    pub type_name: String,
    pub description: String,
    pub required: bool,
    /// Allowed values of a literal input, if restricted.
    pub choices: Vec<String>,
    #[serde(skip)]
    pub value: Option<Value>,
}

/// Form wired to a bound operation's parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterForm {
    pub operation: String,
    pub title: String,
    pub fields: Vec<FormField>,
}

impl ParameterForm {
    pub fn from_operation(operation: &BoundOperation) -> Self {
        let fields = operation
            .parameters
            .iter()
            .map(|p| FormField {
                name: p.name.clone(),
                identifier: p.identifier.clone(),
                type_name: p.kind.type_name(),
                description: p.description.clone(),
                required: p.required,
                choices: match &p.kind {
                    DataKind::Literal { allowed_values, .. } => allowed_values.clone(),
                    _ => Vec::new(),
                },
                value: p.default.clone(),
            })
            .collect();

        Self {
            operation: operation.name.clone(),
            title: operation
                .descriptor
                .title
                .clone()
                .unwrap_or_else(|| operation.identifier.clone()),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Set a field value; `None` clears it.
    pub fn set(&mut self, name: &str, value: Option<Value>) -> Result<(), WpsError> {
        let field = self
            .fields
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| WpsError::UnknownParameter {
                operation: self.operation.clone(),
                name: name.to_string(),
            })?;
        field.value = value;
        Ok(())
    }

    /// Required fields that still have no value.
    pub fn missing(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.required && f.value.is_none())
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Call arguments for every field with a value.
    pub fn arguments(&self) -> Arguments {
        self.fields
            .iter()
            .filter_map(|f| f.value.clone().map(|v| (f.name.clone(), v)))
            .collect()
    }
}

/// A form for `operation` on an interactive host, `None` otherwise.
pub fn interact(operation: &BoundOperation) -> Option<ParameterForm> {
    interact_on(is_interactive_host(), operation)
}

fn interact_on(interactive: bool, operation: &BoundOperation) -> Option<ParameterForm> {
    if !interactive {
        tracing::debug!(operation = %operation.name, "not an interactive host, no form");
        return None;
    }
    Some(ParameterForm::from_operation(operation))
}
