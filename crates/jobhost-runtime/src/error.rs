//! Runtime error types.

use jobhost_core::BindingError;
use jobhost_telemetry::AggregatorError;
use thiserror::Error;

pub use crate::config::{ConfigError, ConfigResult};

/// Errors that can occur while indexing or invoking functions.
#[derive(Error, Debug)]
pub enum HostError {
    /// No function with this name was indexed.
    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    /// Two functions share a name.
    #[error("Function already registered: {0}")]
    DuplicateFunction(String),

    /// No provider could bind a trigger parameter.
    #[error("No binding provider for parameter '{parameter}' of type '{type_name}' in function '{function}'")]
    NoBindingProvider {
        function: String,
        parameter: String,
        type_name: String,
    },

    /// A call omitted an argument the function declares.
    #[error("Missing argument '{parameter}' for function '{function}'")]
    MissingArgument { function: String, parameter: String },

    /// Binding failed, at indexing time or during an invocation.
    #[error(transparent)]
    Binding(#[from] BindingError),

    /// The function body could not be run to completion.
    #[error("Invocation failed: {0}")]
    Invocation(String),

    /// The host has been stopped.
    #[error("Host is stopped")]
    Stopped,

    /// Invalid host configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A telemetry task failed during shutdown.
    #[error(transparent)]
    Telemetry(#[from] AggregatorError),
}

impl HostError {
    /// Creates a missing argument error.
    pub fn missing_argument(function: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self::MissingArgument {
            function: function.into(),
            parameter: parameter.into(),
        }
    }
}

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;
