//! WPS client runtime.
//!
//! This module handles:
//! - Capability discovery and per-process operation binding
//! - Conversion between native values and WPS wire values
//! - The execution state machine, status polling and cancellation
//! - Materializing outputs into values or references
//!
//! `Client` is the entry point; the other types are exposed for callers
//! that need to drive a step on its own.

pub mod binder;
pub mod capabilities;
pub mod client;
pub mod config;
pub mod convert;
pub mod converters;
pub mod errors;
pub mod execution;
pub mod interact;
pub mod monitor;
pub mod results;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use binder::{sanitize, Arguments, BoundOperation, OutputBinding, Parameter, ProcessBinder};
pub use capabilities::CapabilityCache;
pub use client::{Client, ClientBuilder};
pub use config::{default_config_path, load_client_config, ClientConfig, Credentials, TransportConfig};
pub use convert::TypeConverter;
pub use converters::{ConverterRegistry, JsonConverter, OutputConverter, TextConverter};
pub use errors::WpsError;
pub use execution::{ExecutionController, ExecutionHandle, ExecutionStatus};
pub use interact::{interact, FormField, ParameterForm};
pub use monitor::{
    cancel_on_ctrl_c, BarPresenter, ConsolePresenter, Monitor, Presentation, ProgressPresenter,
    SilentPresenter,
};
pub use results::{delist, ExecutionResult, Materialized, ResultMaterializer};
pub use value::Value;
