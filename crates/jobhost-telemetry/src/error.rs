//! Error types for telemetry sinks and aggregators.

use thiserror::Error;

// =============================================================================
// Sink Errors
// =============================================================================

/// Errors a sink may report for a batch.
///
/// Aggregators log and drop the batch; they never retry.
#[derive(Debug, Error)]
pub enum SinkError {
    /// I/O failure while writing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The sink refused the batch.
    #[error("batch rejected: {0}")]
    Rejected(String),
}

impl SinkError {
    /// Creates a rejection error.
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }
}

// =============================================================================
// Aggregator Errors
// =============================================================================

/// Errors raised while shutting an aggregator down.
#[derive(Debug, Error)]
pub enum AggregatorError {
    /// A background task panicked or was aborted.
    #[error("aggregator task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for sink writes.
pub type SinkResult<T> = Result<T, SinkError>;

/// Result type for aggregator lifecycle operations.
pub type AggregatorResult<T> = Result<T, AggregatorError>;
