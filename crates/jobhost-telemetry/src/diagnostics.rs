//! Diagnostic log-line capture.
//!
//! [`DiagnosticsLayer`] is a `tracing_subscriber` layer that picks up events
//! from diagnostic targets (by default everything under
//! `jobhost_diagnostics`), renders each one as a single line and batches the
//! lines through a [`BatchAggregator`]. A batch is written as one text block,
//! so a burst of diagnostics costs one log record instead of dozens.
//!
//! ```rust,ignore
//! let (layer, handle) = DiagnosticsLayer::new(DiagnosticsOptions::default(), TracingTextSink);
//! tracing_subscriber::registry().with(fmt::layer()).with(layer).init();
//! // ...
//! handle.shutdown().await?;
//! ```

use std::fmt::{self, Write as _};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber, info};
use tracing_subscriber::layer::{Context, Layer};

use crate::aggregator::{AggregatorOptions, BatchAggregator, TextBatchSink, TextSink};
use crate::error::{AggregatorResult, SinkResult};

/// Target the batched text is re-emitted under. Never captured.
pub const DIAGNOSTICS_TARGET: &str = "jobhost::diagnostics";

/// Default prefix of captured targets.
pub const DEFAULT_TARGET_PREFIX: &str = "jobhost_diagnostics";

// =============================================================================
// Options
// =============================================================================

/// Capture settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticsOptions {
    /// Most verbose level captured.
    pub level: Level,
    /// Events whose target starts with this prefix are captured.
    pub target_prefix: String,
    /// Period of the flush timer.
    pub flush_interval: Duration,
    /// Lines that trigger an immediate flush.
    pub max_lines_per_flush: usize,
}

impl Default for DiagnosticsOptions {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            target_prefix: DEFAULT_TARGET_PREFIX.to_string(),
            flush_interval: Duration::from_secs(10),
            max_lines_per_flush: 30,
        }
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Re-emits each batch once at `info` under [`DIAGNOSTICS_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTextSink;

#[async_trait]
impl TextSink for TracingTextSink {
    async fn write(&self, text: String) -> SinkResult<()> {
        info!(target: DIAGNOSTICS_TARGET, "{text}");
        Ok(())
    }
}

// =============================================================================
// Layer
// =============================================================================

struct State {
    aggregator: BatchAggregator<String>,
    active: AtomicBool,
    level: Level,
    target_prefix: String,
}

impl State {
    fn captures(&self, target: &str, level: &Level) -> bool {
        self.active.load(Ordering::Acquire)
            && target != DIAGNOSTICS_TARGET
            && target.starts_with(&self.target_prefix)
            && *level <= self.level
    }
}

/// Captures diagnostic events into batched text.
#[derive(Clone)]
pub struct DiagnosticsLayer {
    state: Arc<State>,
}

impl DiagnosticsLayer {
    /// Creates the layer and the handle that shuts it down.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(options: DiagnosticsOptions, sink: impl TextSink) -> (Self, DiagnosticsHandle) {
        let aggregator = BatchAggregator::new(
            AggregatorOptions::default()
                .with_batch_size(options.max_lines_per_flush)
                .with_flush_interval(options.flush_interval),
            TextBatchSink::new(sink),
        );

        let state = Arc::new(State {
            aggregator,
            active: AtomicBool::new(true),
            level: options.level,
            target_prefix: options.target_prefix,
        });

        let layer = Self {
            state: state.clone(),
        };
        (layer, DiagnosticsHandle { state })
    }
}

impl fmt::Debug for DiagnosticsLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticsLayer")
            .field("level", &self.state.level)
            .field("target_prefix", &self.state.target_prefix)
            .finish_non_exhaustive()
    }
}

impl<S: Subscriber> Layer<S> for DiagnosticsLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !self.state.captures(metadata.target(), metadata.level()) {
            return;
        }

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        if let Some(line) = visitor.finish() {
            self.state.aggregator.enqueue(line);
        }
    }
}

/// Renders `message` followed by `key=value` pairs.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn finish(self) -> Option<String> {
        let message = self.message.trim();
        if message.is_empty() && self.fields.is_empty() {
            return None;
        }
        Some(format!("{message}{}", self.fields))
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Controls a [`DiagnosticsLayer`] after it has been installed.
pub struct DiagnosticsHandle {
    state: Arc<State>,
}

impl DiagnosticsHandle {
    /// Forces a flush of the captured lines.
    pub fn flush(&self) -> usize {
        self.state.aggregator.flush()
    }

    /// Detaches the layer, then flushes and stops the aggregator.
    ///
    /// After this the layer ignores every event. Idempotent.
    pub async fn shutdown(&self) -> AggregatorResult<()> {
        self.state.active.store(false, Ordering::Release);
        self.state.aggregator.shutdown().await
    }
}

impl fmt::Debug for DiagnosticsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticsHandle")
            .field("active", &self.state.active.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use tokio_test::assert_ok;
    use tracing::{debug, error, warn};
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    struct ChannelText {
        sender: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl TextSink for ChannelText {
        async fn write(&self, text: String) -> SinkResult<()> {
            let _ = self.sender.send(text);
            Ok(())
        }
    }

    fn layer(max_lines: usize) -> (DiagnosticsLayer, DiagnosticsHandle, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let options = DiagnosticsOptions {
            max_lines_per_flush: max_lines,
            flush_interval: Duration::from_secs(60),
            ..DiagnosticsOptions::default()
        };
        let (layer, handle) = DiagnosticsLayer::new(options, ChannelText { sender });
        (layer, handle, receiver)
    }

    #[tokio::test]
    async fn test_captures_matching_events() {
        let (layer, handle, mut texts) = layer(30);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            warn!(target: "jobhost_diagnostics::channel", endpoint = "east", "Transmission failed");
            error!(target: "jobhost_diagnostics", "Queue full");
            debug!(target: "jobhost_diagnostics", "too verbose");
            warn!(target: "other", "not a diagnostic");
        });

        assert_ok!(handle.shutdown().await);
        let text = texts.recv().await.unwrap();
        assert_eq!(text, "\nTransmission failed endpoint=east\nQueue full\n");
        assert!(texts.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_size_threshold_cuts_batches() {
        let (layer, handle, mut texts) = layer(2);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            for i in 0..5 {
                warn!(target: "jobhost_diagnostics", "line {i}");
            }
        });

        assert_ok!(handle.shutdown().await);
        assert_eq!(texts.recv().await.unwrap(), "\nline 0\nline 1\n");
        assert_eq!(texts.recv().await.unwrap(), "\nline 2\nline 3\n");
        assert_eq!(texts.recv().await.unwrap(), "\nline 4\n");
    }

    #[tokio::test]
    async fn test_shutdown_detaches_layer() {
        let (layer, handle, mut texts) = layer(30);
        let subscriber = tracing_subscriber::registry().with(layer);

        assert_ok!(handle.shutdown().await);
        assert_ok!(handle.shutdown().await);

        tracing::subscriber::with_default(subscriber, || {
            warn!(target: "jobhost_diagnostics", "after shutdown");
        });
        assert_eq!(handle.flush(), 0);
        assert!(texts.recv().await.is_none());
    }
}
