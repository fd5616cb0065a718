//! Error types for the binding engine.
//!
//! Two layers of errors exist:
//!
//! - [`ConvertError`] is what an individual converter returns.
//! - [`BindingError`] is what binding and indexing surface to the host. It
//!   wraps converter failures with the attribute and type context.
//!
//! A provider that cannot handle a parameter is *not* an error: it returns
//! `Ok(None)` so the host can try the next provider.

use thiserror::Error;

use crate::attribute::AttributeKind;
use crate::types::TypeDesc;

// =============================================================================
// Conversion Errors
// =============================================================================

/// Errors raised by converters.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The value did not have the type the converter expected.
    #[error("type mismatch: expected '{expected}', got '{got}'")]
    TypeMismatch {
        /// Expected type.
        expected: String,
        /// Actual type.
        got: String,
    },

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bytes were not valid UTF-8.
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Custom conversion error.
    #[error("{0}")]
    Custom(String),
}

impl ConvertError {
    /// Creates a custom conversion error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Creates a type mismatch error.
    pub fn mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }
}

// =============================================================================
// Binding Errors
// =============================================================================

/// Errors surfaced while indexing or binding a trigger parameter.
#[derive(Debug, Error)]
pub enum BindingError {
    /// A trigger advertises a marker type but registers no converter for it.
    ///
    /// Raised at indexing time; the extension is misconfigured.
    #[error(
        "converter for attribute '{attribute}' from '{source_type}' to '{dest_type}' not found"
    )]
    Configuration {
        /// Attribute kind of the trigger.
        attribute: AttributeKind,
        /// Trigger value type.
        source_type: TypeDesc,
        /// Requested destination type.
        dest_type: TypeDesc,
    },

    /// A registered converter failed.
    #[error("failed to convert '{source_type}' to '{dest_type}' for attribute '{attribute}': {source}")]
    Conversion {
        /// Attribute kind of the trigger.
        attribute: AttributeKind,
        /// Source type of the failed conversion.
        source_type: TypeDesc,
        /// Destination type of the failed conversion.
        dest_type: TypeDesc,
        /// The converter's error.
        source: ConvertError,
    },

    /// A binding received a value it never agreed to accept.
    #[error(
        "binding for attribute '{attribute}' accepts '{expected}' or a direct-invoke string, got '{got}'"
    )]
    InternalConsistency {
        /// Attribute kind of the trigger.
        attribute: AttributeKind,
        /// Trigger value type the binding was built for.
        expected: TypeDesc,
        /// Type of the value actually supplied.
        got: TypeDesc,
    },

    /// The invocation was cancelled while binding.
    #[error("binding cancelled")]
    Cancelled,
}

impl BindingError {
    /// Creates a configuration error.
    pub fn configuration(attribute: &AttributeKind, source: &TypeDesc, dest: &TypeDesc) -> Self {
        Self::Configuration {
            attribute: attribute.clone(),
            source_type: source.clone(),
            dest_type: dest.clone(),
        }
    }

    /// Wraps a converter failure with its context.
    pub fn conversion(
        attribute: &AttributeKind,
        source_type: &TypeDesc,
        dest_type: &TypeDesc,
        source: ConvertError,
    ) -> Self {
        Self::Conversion {
            attribute: attribute.clone(),
            source_type: source_type.clone(),
            dest_type: dest_type.clone(),
            source,
        }
    }

    /// Returns `true` for errors that indicate a broken extension or host.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::InternalConsistency { .. }
        )
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for converters.
pub type ConvertResult<T> = Result<T, ConvertError>;

/// Result type for binding operations.
pub type BindingResult<T> = Result<T, BindingError>;
