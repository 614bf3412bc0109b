//! Client error types.

use thiserror::Error;

use crate::protocol::{Operation, ServiceError};

/// Errors surfaced by discovery, binding, execution and conversion.
///
/// None of these are retried; each propagates to the immediate caller.
#[derive(Debug, Error)]
pub enum WpsError {
    /// The server reported access-forbidden for an operation.
    #[error("you are not authorized to do a request of type: {operation}")]
    Unauthorized { operation: Operation },

    /// Requested process names with no case-insensitive match on the server.
    #[error("these process names are not on the WPS server: {}", names.join(", "))]
    UnknownProcess { names: Vec<String> },

    /// Two distinct identifiers sanitize to the same callable name.
    #[error("'{first}' and '{second}' both bind to '{name}' in {scope}")]
    BindingNameCollision {
        scope: String,
        name: String,
        first: String,
        second: String,
    },

    /// Transport or protocol failure while submitting an Execute request.
    #[error("failed to submit '{process}': {reason}")]
    ExecutionSubmission { process: String, reason: String },

    /// A value could not be converted to or from its declared wire type.
    #[error("cannot convert '{identifier}' as {data_type}: {reason}")]
    Conversion {
        identifier: String,
        data_type: String,
        reason: String,
    },

    /// Any other transport error from discovery or binding, unmodified.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// No bound operation with this name.
    #[error("unknown operation: '{name}'")]
    UnknownOperation { name: String },

    /// Keyword argument not declared by the bound operation.
    #[error("'{operation}' got an unexpected argument '{name}'")]
    UnknownParameter { operation: String, name: String },

    /// No output with this name or identifier.
    #[error("'{process}' has no output '{name}'")]
    UnknownOutput { process: String, name: String },

    /// Outputs were requested from an execution that did not succeed.
    #[error("process '{process}' {status}: {message}")]
    ExecutionFailed {
        process: String,
        status: String,
        message: String,
    },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    Config { reason: String },
}

impl WpsError {
    /// Translate a service error for `operation`, turning access-forbidden
    /// conditions into `Unauthorized` and passing everything else through.
    pub fn from_service(operation: Operation, error: ServiceError) -> Self {
        if error.is_access_forbidden() {
            WpsError::Unauthorized { operation }
        } else {
            WpsError::Service(error)
        }
    }

    pub(crate) fn conversion(identifier: &str, data_type: &str, reason: impl Into<String>) -> Self {
        WpsError::Conversion {
            identifier: identifier.to_string(),
            data_type: data_type.to_string(),
            reason: reason.into(),
        }
    }
}
