//! Logging setup for the jobhost runtime.
//!
//! One `tracing-subscriber` registry carries the formatting layer, the
//! env-filter and, when enabled, the [`DiagnosticsLayer`] that batches
//! diagnostic events.
//!
//! ```rust,ignore
//! use jobhost_runtime::config::load_config;
//! use jobhost_runtime::logging;
//!
//! let config = load_config()?;
//! let diagnostics = logging::init_host_logging(&config)?;
//! ```

use std::path::{Path, PathBuf};

use jobhost_telemetry::{
    DIAGNOSTICS_TARGET, DiagnosticsHandle, DiagnosticsLayer, TracingTextSink,
};
use tracing::warn;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{
    ConfigResult, HostConfig, LogFormat, LogOutput, LogRotation, LoggingConfig, SpanEventConfig,
};

/// Span event configuration for logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanEvents {
    /// Log when a span is created.
    pub new: bool,
    /// Log when a span is entered.
    pub enter: bool,
    /// Log when a span is exited.
    pub exit: bool,
    /// Log when a span is closed.
    pub close: bool,
}

impl SpanEvents {
    /// No span events will be logged.
    pub const NONE: Self = Self {
        new: false,
        enter: false,
        exit: false,
        close: false,
    };

    /// Log span creation and close events.
    ///
    /// With the per-invocation `function` span this gives one line when an
    /// invocation starts and one, with its busy time, when it ends.
    pub const LIFECYCLE: Self = Self {
        new: true,
        enter: false,
        exit: false,
        close: true,
    };

    /// Log all span events.
    pub const FULL: Self = Self {
        new: true,
        enter: true,
        exit: true,
        close: true,
    };

    fn to_fmt_span(self) -> fmt::format::FmtSpan {
        let mut span = fmt::format::FmtSpan::NONE;
        if self.new {
            span |= fmt::format::FmtSpan::NEW;
        }
        if self.enter {
            span |= fmt::format::FmtSpan::ENTER;
        }
        if self.exit {
            span |= fmt::format::FmtSpan::EXIT;
        }
        if self.close {
            span |= fmt::format::FmtSpan::CLOSE;
        }
        span
    }
}

impl From<&SpanEventConfig> for SpanEvents {
    fn from(config: &SpanEventConfig) -> Self {
        Self {
            new: config.new,
            enter: config.enter,
            exit: config.exit,
            close: config.close,
        }
    }
}

// =============================================================================
// Configuration-Based Initialization
// =============================================================================

/// Initialize logging from a `LoggingConfig`.
///
/// Does nothing if a global subscriber is already installed.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = LoggingBuilder::from_config(config).try_init();
}

/// Initialize logging for a host, installing the diagnostics layer when
/// `diagnostics.enabled` is set.
///
/// Must be called within a Tokio runtime when diagnostics are enabled. The
/// returned handle should be passed to
/// [`JobHostBuilder::diagnostics`](crate::JobHostBuilder::diagnostics) so the
/// host flushes captured lines when it stops.
pub fn init_host_logging(config: &HostConfig) -> ConfigResult<Option<DiagnosticsHandle>> {
    let mut builder = LoggingBuilder::from_config(&config.logging);

    let handle = if config.diagnostics.enabled {
        let options = config.diagnostics.to_options()?;
        let directive = format!(
            "{}={}",
            options.target_prefix,
            options.level.as_str().to_lowercase()
        );
        let (layer, handle) = DiagnosticsLayer::new(options, TracingTextSink);
        builder = builder
            .directive(&directive)
            .directive(&format!("{DIAGNOSTICS_TARGET}=info"))
            .diagnostics(layer);
        Some(handle)
    } else {
        None
    };

    if let Err(e) = builder.try_init() {
        warn!(error = %e, "Global subscriber already installed, host logging not initialized");
    }
    Ok(handle)
}

// =============================================================================
// LoggingBuilder
// =============================================================================

/// A builder for configuring logging.
///
/// ```rust,ignore
/// LoggingBuilder::new()
///     .with_level(Level::DEBUG)
///     .with_span_events(SpanEvents::LIFECYCLE)
///     .init();
/// ```
#[derive(Default)]
pub struct LoggingBuilder {
    directives: Vec<String>,
    level: Option<tracing::Level>,
    span_events: SpanEvents,
    format: LogFormat,
    output: LogOutput,
    with_target: bool,
    with_thread_ids: bool,
    with_file: bool,
    with_line_number: bool,
    file_path: Option<PathBuf>,
    rotation: LogRotation,
    max_files: usize,
    diagnostics: Option<DiagnosticsLayer>,
}

impl LoggingBuilder {
    /// Create a new logging builder.
    pub fn new() -> Self {
        Self {
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            with_target: true,
            max_files: 5,
            ..Default::default()
        }
    }

    /// Create a LoggingBuilder from a LoggingConfig.
    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut builder = Self::new();

        builder.level = Some(config.level.to_tracing_level());
        builder.format = config.format;
        builder.output = config.output;
        builder.span_events = SpanEvents::from(&config.span_events);

        builder.with_target = true;
        builder.with_thread_ids = config.thread_ids;
        builder.with_file = config.file_location;
        builder.with_line_number = config.file_location;

        builder.file_path.clone_from(&config.file_path);
        builder.rotation = config.rotation;
        builder.max_files = config.max_files as usize;

        for (target, level) in &config.filters {
            builder
                .directives
                .push(format!("{}={}", target, level.as_str()));
        }

        builder
    }

    /// Set the global log level.
    pub fn with_level(mut self, level: tracing::Level) -> Self {
        self.level = Some(level);
        self
    }

    /// Add a filter directive, e.g. `jobhost_core=debug`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    /// Configure span events.
    pub fn with_span_events(mut self, events: SpanEvents) -> Self {
        self.span_events = events;
        self
    }

    /// Set the output format.
    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the output destination.
    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Include the target in log output.
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Include thread IDs in log output.
    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.with_thread_ids = enabled;
        self
    }

    /// Set file path for file output.
    pub fn file_path(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    /// Attach a diagnostics capture layer.
    pub fn diagnostics(mut self, layer: DiagnosticsLayer) -> Self {
        self.diagnostics = Some(layer);
        self
    }

    fn build_filter(&self) -> EnvFilter {
        let base_level = self.level.unwrap_or(tracing::Level::INFO);
        let base_filter = base_level.to_string().to_lowercase();

        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&base_filter));

        for directive in &self.directives {
            match directive.parse() {
                Ok(d) => filter = filter.add_directive(d),
                Err(e) => eprintln!("Ignoring invalid log directive '{directive}': {e}"),
            }
        }

        filter
    }

    fn file_appender(&self, path: &Path) -> Option<RollingFileAppender> {
        let rotation = match self.rotation {
            LogRotation::Never => Rotation::NEVER,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
        };
        let directory = path.parent().unwrap_or_else(|| Path::new("."));
        let prefix = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("jobhost");
        let suffix = path.extension().and_then(|s| s.to_str()).unwrap_or("log");

        RollingFileAppender::builder()
            .rotation(rotation)
            .filename_prefix(prefix)
            .filename_suffix(suffix)
            .max_log_files(self.max_files.max(1))
            .build(directory)
            .inspect_err(|e| eprintln!("Failed to open log file {}: {e}", path.display()))
            .ok()
    }

    /// Initialize the logging system.
    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Try to initialize the logging system, returning an error on failure.
    pub fn try_init(mut self) -> Result<(), TryInitError> {
        let filter = self.build_filter();
        let span_events = self.span_events.to_fmt_span();
        let diagnostics = self.diagnostics.take();

        macro_rules! configure_layer {
            ($layer:expr) => {
                $layer
                    .with_span_events(span_events)
                    .with_target(self.with_target)
                    .with_thread_ids(self.with_thread_ids)
                    .with_file(self.with_file)
                    .with_line_number(self.with_line_number)
            };
        }

        macro_rules! init_with_writer {
            ($writer:expr) => {
                match &self.format {
                    #[cfg(feature = "json-log")]
                    LogFormat::Json => {
                        let layer = fmt::layer()
                            .json()
                            .with_span_events(span_events)
                            .with_writer($writer);
                        tracing_subscriber::registry()
                            .with(layer)
                            .with(diagnostics)
                            .with(filter)
                            .try_init()
                    }
                    LogFormat::Compact => {
                        let layer = configure_layer!(fmt::layer().compact().with_writer($writer));
                        tracing_subscriber::registry()
                            .with(layer)
                            .with(diagnostics)
                            .with(filter)
                            .try_init()
                    }
                    LogFormat::Full => {
                        let layer = configure_layer!(fmt::layer().with_writer($writer));
                        tracing_subscriber::registry()
                            .with(layer)
                            .with(diagnostics)
                            .with(filter)
                            .try_init()
                    }
                    LogFormat::Pretty => {
                        let layer = configure_layer!(fmt::layer().pretty().with_writer($writer));
                        tracing_subscriber::registry()
                            .with(layer)
                            .with(diagnostics)
                            .with(filter)
                            .try_init()
                    }
                }
            };
        }

        let appender = match (&self.output, &self.file_path) {
            (LogOutput::File, Some(path)) => self.file_appender(path),
            _ => None,
        };

        match (&self.output, appender) {
            (LogOutput::Stderr, _) => init_with_writer!(std::io::stderr),
            (LogOutput::File, Some(appender)) => init_with_writer!(appender),
            (LogOutput::File, None) => {
                let result = init_with_writer!(std::io::stdout);
                warn!("File output unavailable, falling back to stdout");
                result
            }
            (LogOutput::Stdout, _) => init_with_writer!(std::io::stdout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_from_config_collects_filters() {
        let mut config = LoggingConfig::default();
        config.level = LogLevel::Warn;
        config.filters.insert("jobhost_core".into(), LogLevel::Trace);

        let builder = LoggingBuilder::from_config(&config);
        assert_eq!(builder.level, Some(tracing::Level::WARN));
        assert_eq!(builder.directives, vec!["jobhost_core=trace".to_string()]);
    }

    #[test]
    fn test_span_events_from_config() {
        let config = SpanEventConfig {
            new: true,
            close: true,
            ..SpanEventConfig::default()
        };
        let events = SpanEvents::from(&config);
        assert!(events.new && events.close);
        assert!(!events.enter && !events.exit);
    }
}
