//! WPS protocol boundary.
//!
//! This module handles:
//! - The protocol data model (process descriptors, wire values, status reports)
//! - WPS 1.0.0 document parsing and Execute request encoding
//! - The `WpsService` trait and its reqwest-backed implementation
//!
//! Everything above this layer works with typed descriptors and never sees XML.

pub mod errors;
pub mod transport;
pub mod types;
pub mod xml;

// Re-exports for convenience
pub use errors::ServiceError;
pub use transport::{HttpOptions, HttpWpsService, WpsService, DEFAULT_VERSION};
pub use types::{
    BoundingBox, Capabilities, DataKind, ExecuteRequest, ExecutionMode, Format, InputSpec,
    LiteralType, Operation, OutputRequest, OutputSpec, ProcessDescriptor, ProcessSummary,
    RawOutput, ReportedStatus, StatusReport, WireValue,
};
