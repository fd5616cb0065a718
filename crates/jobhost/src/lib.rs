//! # Jobhost
//!
//! A function host that binds trigger values to whatever parameter types the
//! functions declare.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐  trigger value  ┌─────────┐  BoundValue  ┌───────────────┐
//! │ Extension │────────────────▶│ JobHost │─────────────▶│ user function │
//! │ (blob...) │                 │         │              └───────────────┘
//! └───────────┘                 └─────────┘
//!       │ converters                 │ started / completed
//!       ▼                            ▼
//! ConverterRegistry       instance loggers, result aggregator
//! ```
//!
//! - **Core**: type descriptors, the converter registry, default-type
//!   resolution and exact bindings
//! - **Telemetry**: batched result aggregation and diagnostic capture
//! - **Runtime**: configuration, logging, extensions and the host
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use jobhost::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config()?;
//!     let diagnostics = init_host_logging(&config)?;
//!
//!     let mut builder = JobHost::builder().config(config).extension(BlobExtension);
//!     if let Some(handle) = diagnostics {
//!         builder = builder.diagnostics(handle);
//!     }
//!     let host = builder
//!         .function(
//!             FunctionDefinition::new("log_blob", |args, _| async move {
//!                 let blob: String = args["blob"].clone().take().map_err(|e| e.to_string())?;
//!                 info!(%blob, "Blob written");
//!                 Ok(())
//!             })
//!             .parameter(
//!                 ParameterInfo::new("blob", TypeDesc::string())
//!                     .with_attribute(Arc::new(BlobTriggerAttribute::new("images/{name}"))),
//!             ),
//!         )
//!         .build()?;
//!
//!     host.call("log_blob", args).await?;
//!     host.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `blob`: Blob trigger extension (default)
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use jobhost_core as core;
#[cfg(feature = "blob")]
pub use jobhost_extension_blob as blob;
pub use jobhost_runtime as runtime;
pub use jobhost_telemetry as telemetry;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use std::sync::Arc;

    // Host - main entry point
    pub use jobhost_runtime::config::{ConfigLoader, HostConfig, load_config};
    pub use jobhost_runtime::logging::{LoggingBuilder, init_host_logging};
    pub use jobhost_runtime::{
        Extension, FixedDelayRetry, FunctionArguments, FunctionDefinition, FunctionResult,
        HostError, JobHost,
    };

    // Binding model
    pub use jobhost_core::prelude::*;

    // Invocation records
    pub use jobhost_telemetry::{
        FunctionCompletedMessage, FunctionInstanceLogger, FunctionStartedMessage, SummarySink,
    };

    #[cfg(feature = "blob")]
    pub use jobhost_extension_blob::{BlobExtension, BlobTriggerAttribute, BlobTriggerMessage};

    pub use jobhost_runtime::prelude::*;
}
