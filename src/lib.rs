//! Client for OGC Web Processing Services.
//!
//! Connects to a WPS endpoint, binds each remote process as a callable
//! operation and runs it synchronously or asynchronously with progress
//! monitoring:
//!
//! ```no_run
//! use wps_client::{Arguments, Client};
//!
//! # async fn run() -> Result<(), wps_client::WpsError> {
//! let client = Client::builder("http://localhost:5000/wps")
//!     .processes(["hello"])
//!     .connect()
//!     .await?;
//! let result = client.call("hello", Arguments::new().arg("name", "david")).await?;
//! println!("{}", result.output("output")?);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod protocol;

pub use client::{
    Arguments, BoundOperation, Client, ClientBuilder, ClientConfig, ExecutionHandle,
    ExecutionResult, ExecutionStatus, Materialized, OutputConverter, Presentation, Value,
    WpsError,
};
pub use protocol::{HttpWpsService, ServiceError, WpsService};

/// Initialize the tracing subscriber.
///
/// Interactive mode writes human-readable events to stderr; otherwise events
/// are JSON lines. The filter comes from `RUST_LOG`, defaulting to
/// `wps_client=info,warn`. Returns `false` if a global subscriber was
/// already installed, which is then left in place.
pub fn init_tracing(interactive: bool) -> bool {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wps_client=info,warn"));

    let installed = if interactive {
        fmt::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .try_init()
            .is_ok()
    } else {
        fmt::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(false)
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::debug!(
            version = env!("CARGO_PKG_VERSION"),
            interactive,
            "tracing initialized"
        );
    }
    installed
}
