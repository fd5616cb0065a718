//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use jobhost_telemetry::{AggregatorOptions, DiagnosticsOptions};
use serde::{Deserialize, Serialize};

use super::error::{ConfigError, ConfigResult};

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Logging subscriber settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Function-result aggregation.
    #[serde(default)]
    pub aggregator: AggregatorConfig,

    /// Diagnostic log-line capture.
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the lowercase level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to the `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line, abbreviated.
    #[default]
    Compact,
    /// Single-line with all span context.
    Full,
    /// Multi-line, human oriented.
    Pretty,
    /// Newline-delimited JSON.
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// The file named by [`LoggingConfig::file_path`].
    File,
}

/// Log file rotation period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging subscriber settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global level.
    #[serde(default)]
    pub level: LogLevel,

    /// Line format.
    #[serde(default)]
    pub format: LogFormat,

    /// Destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Span lifecycle events.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file names and line numbers.
    #[serde(default)]
    pub file_location: bool,

    /// Log file path, required for [`LogOutput::File`].
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// How often the log file rotates.
    #[serde(default)]
    pub rotation: LogRotation,

    /// Number of rotated files kept.
    #[serde(default = "default_max_files")]
    pub max_files: u32,

    /// Per-target levels, e.g. `jobhost_core = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            rotation: LogRotation::default(),
            max_files: default_max_files(),
            filters: HashMap::new(),
        }
    }
}

fn default_max_files() -> u32 {
    5
}

// =============================================================================
// Aggregation
// =============================================================================

/// Function-result aggregation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Whether completed invocations are aggregated at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Entries that trigger an immediate flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Period of the flush timer in milliseconds.
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            batch_size: default_batch_size(),
            flush_timeout_ms: default_flush_timeout_ms(),
        }
    }
}

impl AggregatorConfig {
    /// Converts to aggregator options.
    pub fn to_options(&self) -> AggregatorOptions {
        AggregatorOptions::default()
            .with_batch_size(self.batch_size)
            .with_flush_interval(Duration::from_millis(self.flush_timeout_ms))
    }
}

fn default_enabled() -> bool {
    true
}

fn default_batch_size() -> usize {
    1000
}

fn default_flush_timeout_ms() -> u64 {
    30_000
}

// =============================================================================
// Diagnostics
// =============================================================================

/// Diagnostic log-line capture settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Whether the capture layer is installed.
    #[serde(default)]
    pub enabled: bool,

    /// Most verbose level captured (trace, debug, info, warn, error).
    #[serde(default = "default_diagnostics_level")]
    pub level: String,

    /// Events whose target starts with this prefix are captured.
    #[serde(default = "default_target_prefix")]
    pub target_prefix: String,

    /// Period of the flush timer in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Lines that trigger an immediate flush.
    #[serde(default = "default_max_lines_per_flush")]
    pub max_lines_per_flush: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: default_diagnostics_level(),
            target_prefix: default_target_prefix(),
            flush_interval_ms: default_flush_interval_ms(),
            max_lines_per_flush: default_max_lines_per_flush(),
        }
    }
}

impl DiagnosticsConfig {
    /// Parses the configured level.
    pub fn level(&self) -> ConfigResult<tracing::Level> {
        self.level.parse().map_err(|_| {
            ConfigError::validation(format!(
                "Invalid diagnostics level: {}. Valid values are: trace, debug, info, warn, error",
                self.level
            ))
        })
    }

    /// Converts to capture options.
    pub fn to_options(&self) -> ConfigResult<DiagnosticsOptions> {
        Ok(DiagnosticsOptions {
            level: self.level()?,
            target_prefix: self.target_prefix.clone(),
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            max_lines_per_flush: self.max_lines_per_flush,
        })
    }
}

fn default_diagnostics_level() -> String {
    "warn".to_string()
}

fn default_target_prefix() -> String {
    jobhost_telemetry::diagnostics::DEFAULT_TARGET_PREFIX.to_string()
}

fn default_flush_interval_ms() -> u64 {
    10_000
}

fn default_max_lines_per_flush() -> usize {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HostConfig::default();
        assert!(config.aggregator.enabled);
        assert_eq!(config.aggregator.batch_size, 1000);
        assert_eq!(config.aggregator.flush_timeout_ms, 30_000);
        assert!(!config.diagnostics.enabled);
        assert_eq!(config.diagnostics.max_lines_per_flush, 30);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: HostConfig =
            serde_json::from_str(r#"{"aggregator": {"batch_size": 10}}"#).unwrap();
        assert_eq!(config.aggregator.batch_size, 10);
        assert_eq!(config.aggregator.flush_timeout_ms, 30_000);
        assert!(config.aggregator.enabled);
    }

    #[test]
    fn test_diagnostics_options() {
        let options = DiagnosticsConfig::default().to_options().unwrap();
        assert_eq!(options.level, tracing::Level::WARN);
        assert_eq!(options.flush_interval, Duration::from_secs(10));
        assert_eq!(options.target_prefix, "jobhost_diagnostics");

        let bad = DiagnosticsConfig {
            level: "loud".into(),
            ..DiagnosticsConfig::default()
        };
        assert!(bad.to_options().is_err());
    }
}
