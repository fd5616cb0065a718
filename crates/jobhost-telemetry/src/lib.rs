//! # Jobhost Telemetry
//!
//! Telemetry plumbing for the jobhost function host.
//!
//! - **Batching**: [`BatchAggregator`] collects items from many producers and
//!   flushes them to a [`BatchSink`] on a size threshold or a timer, with a
//!   final flush on shutdown
//! - **Invocation Records**: [`FunctionStartedMessage`],
//!   [`FunctionCompletedMessage`] and [`FunctionInstanceLogEntry`], observed
//!   through [`FunctionInstanceLogger`]s
//! - **Result Aggregation**: [`ResultAggregator`] summarises completed
//!   invocations per function
//! - **Diagnostics**: [`DiagnosticsLayer`] batches diagnostic `tracing`
//!   events into text blocks
//!
//! ## Log Targets
//!
//! | Target | Content |
//! |--------|---------|
//! | `jobhost::results` | one line per completed invocation |
//! | `jobhost::aggregator` | per-function summaries |
//! | `jobhost::diagnostics` | batched diagnostic text |

pub mod aggregator;
pub mod diagnostics;
pub mod error;
pub mod instance;
pub mod results;

pub use aggregator::{
    AggregatorOptions, BatchAggregator, BatchSink, TextBatchSink, TextSink, format_text_batch,
};
pub use diagnostics::{
    DIAGNOSTICS_TARGET, DiagnosticsHandle, DiagnosticsLayer, DiagnosticsOptions, TracingTextSink,
};
pub use error::{AggregatorError, AggregatorResult, SinkError, SinkResult};
pub use instance::{
    FunctionCompletedMessage, FunctionInstanceLogEntry, FunctionInstanceLogger,
    FunctionStartedMessage, RESULTS_TARGET, TracingInstanceLogger,
};
pub use results::{
    AGGREGATOR_TARGET, FunctionResultSummary, ResultAggregator, SummarySink, TracingSummarySink,
    summarize,
};
