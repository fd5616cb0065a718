//! # Jobhost Runtime
//!
//! The host side of the jobhost function host.
//!
//! - **Configuration**: figment-layered [`HostConfig`] (defaults, files,
//!   `JOBHOST_*` environment, overrides)
//! - **Logging**: [`LoggingBuilder`] and [`init_host_logging`](logging::init_host_logging)
//!   set up `tracing-subscriber`, optionally with diagnostic capture
//! - **Extensions**: [`Extension`]s contribute converters and trigger
//!   binding providers
//! - **Host**: [`JobHost`] indexes functions at build time and invokes them,
//!   reporting every invocation to instance loggers and the result aggregator
//!
//! ```rust,ignore
//! use jobhost_runtime::{JobHost, FunctionDefinition, config::load_config, logging};
//!
//! let config = load_config()?;
//! let diagnostics = logging::init_host_logging(&config)?;
//!
//! let mut builder = JobHost::builder().config(config).extension(BlobExtension);
//! if let Some(handle) = diagnostics {
//!     builder = builder.diagnostics(handle);
//! }
//! let host = builder.function(resize).build()?;
//!
//! host.call("resize", args).await?;
//! host.stop().await?;
//! ```

pub mod config;
pub mod error;
pub mod extension;
pub mod host;
pub mod logging;

pub use config::{ConfigError, ConfigLoader, ConfigResult, HostConfig};
pub use error::{HostError, HostResult};
pub use extension::Extension;
pub use host::{
    FUNCTION_TARGET, FixedDelayRetry, FunctionArguments, FunctionDefinition, FunctionOutcome,
    FunctionResult, JobHost, JobHostBuilder, PROGRAMMATIC_TRIGGER_REASON,
};
pub use logging::{LoggingBuilder, SpanEvents};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
