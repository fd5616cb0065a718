//! Function-result aggregation.
//!
//! Completed invocations are batched by a [`BatchAggregator`] and each flushed
//! batch is summarised per function before it reaches a [`SummarySink`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::aggregator::{AggregatorOptions, BatchAggregator, BatchSink};
use crate::error::{AggregatorResult, SinkResult};
use crate::instance::FunctionInstanceLogEntry;

/// Target of the aggregated summary lines.
pub const AGGREGATOR_TARGET: &str = "jobhost::aggregator";

// =============================================================================
// Summary
// =============================================================================

/// Per-function statistics over one flushed batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResultSummary {
    /// Function name.
    pub name: String,
    /// Earliest start time in the window.
    pub window_start: DateTime<Utc>,
    /// Number of invocations.
    pub count: usize,
    /// Successful invocations.
    pub successes: usize,
    /// Failed invocations.
    pub failures: usize,
    /// `successes / count`, as a percentage.
    pub success_rate: f64,
    /// Shortest duration.
    pub min_duration: Duration,
    /// Longest duration.
    pub max_duration: Duration,
    /// Mean duration.
    pub avg_duration: Duration,
}

/// Groups completed entries by function, in order of first appearance.
///
/// Entries that have not completed are skipped.
pub fn summarize(entries: &[FunctionInstanceLogEntry]) -> Vec<FunctionResultSummary> {
    let mut groups: Vec<(&str, Vec<&FunctionInstanceLogEntry>)> = Vec::new();
    for entry in entries.iter().filter(|e| e.is_completed()) {
        match groups.iter_mut().find(|(name, _)| *name == entry.function_name) {
            Some((_, group)) => group.push(entry),
            None => groups.push((entry.function_name.as_str(), vec![entry])),
        }
    }

    groups
        .into_iter()
        .filter_map(|(name, group)| {
            let window_start = group.iter().map(|e| e.started_at).min()?;
            let durations: Vec<Duration> =
                group.iter().map(|e| e.duration.unwrap_or_default()).collect();
            let count = group.len();
            let successes = group.iter().filter(|e| e.succeeded()).count();
            let total: Duration = durations.iter().sum();

            Some(FunctionResultSummary {
                name: name.to_string(),
                window_start,
                count,
                successes,
                failures: count - successes,
                success_rate: successes as f64 * 100.0 / count as f64,
                min_duration: durations.iter().copied().min().unwrap_or_default(),
                max_duration: durations.iter().copied().max().unwrap_or_default(),
                avg_duration: mean(total, count),
            })
        })
        .collect()
}

/// `total / count` without narrowing `count`. `count` must be non-zero.
fn mean(total: Duration, count: usize) -> Duration {
    match u32::try_from(count) {
        Ok(count) => total / count,
        Err(_) => total.div_f64(count as f64),
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Receives per-function summaries.
#[async_trait]
pub trait SummarySink: Send + Sync + 'static {
    /// Writes the summaries of one flushed batch.
    async fn write(&self, summaries: Vec<FunctionResultSummary>) -> SinkResult<()>;
}

/// Logs each summary at `info` under [`AGGREGATOR_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSummarySink;

#[async_trait]
impl SummarySink for TracingSummarySink {
    async fn write(&self, summaries: Vec<FunctionResultSummary>) -> SinkResult<()> {
        for summary in summaries {
            info!(
                target: AGGREGATOR_TARGET,
                name = %summary.name,
                window_start = %summary.window_start,
                count = summary.count,
                successes = summary.successes,
                failures = summary.failures,
                success_rate = summary.success_rate,
                min_duration_ms = summary.min_duration.as_secs_f64() * 1000.0,
                max_duration_ms = summary.max_duration.as_secs_f64() * 1000.0,
                avg_duration_ms = summary.avg_duration.as_secs_f64() * 1000.0,
                "Aggregated function results"
            );
        }
        Ok(())
    }
}

struct SummarizingSink<S> {
    inner: S,
}

#[async_trait]
impl<S: SummarySink> BatchSink<FunctionInstanceLogEntry> for SummarizingSink<S> {
    async fn write(&self, batch: Vec<FunctionInstanceLogEntry>) -> SinkResult<()> {
        let summaries = summarize(&batch);
        if summaries.is_empty() {
            return Ok(());
        }
        self.inner.write(summaries).await
    }
}

// =============================================================================
// ResultAggregator
// =============================================================================

/// Batches completed invocations and writes per-function summaries.
#[derive(Debug)]
pub struct ResultAggregator {
    inner: BatchAggregator<FunctionInstanceLogEntry>,
}

impl ResultAggregator {
    /// Starts an aggregator writing summaries to `sink`.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(options: AggregatorOptions, sink: impl SummarySink) -> Self {
        Self {
            inner: BatchAggregator::new(options, SummarizingSink { inner: sink }),
        }
    }

    /// Starts an aggregator logging summaries through `tracing`.
    pub fn with_tracing(options: AggregatorOptions) -> Self {
        Self::new(options, TracingSummarySink)
    }

    /// Records an entry. Entries that have not completed are ignored;
    /// returns whether the entry was accepted.
    pub fn add(&self, entry: FunctionInstanceLogEntry) -> bool {
        if !entry.is_completed() {
            return false;
        }
        self.inner.enqueue(entry);
        true
    }

    /// Cuts the current buffer as a batch.
    pub fn flush(&self) -> usize {
        self.inner.flush()
    }

    /// Final flush; idempotent.
    pub async fn shutdown(&self) -> AggregatorResult<()> {
        self.inner.shutdown().await
    }
}
