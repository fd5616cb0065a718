//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{AggregatorConfig, DiagnosticsConfig, HostConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &HostConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_aggregator_config(&config.aggregator)?;
    validate_diagnostics_config(&config.diagnostics)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if let Some(target) = logging.filters.keys().find(|t| t.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Log filter target cannot be empty: {target:?}"
        )));
    }

    Ok(())
}

fn validate_aggregator_config(aggregator: &AggregatorConfig) -> ConfigResult<()> {
    if aggregator.batch_size == 0 {
        return Err(ConfigError::validation(
            "Aggregator batch size must be at least 1",
        ));
    }

    if aggregator.flush_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "Aggregator flush timeout must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_diagnostics_config(diagnostics: &DiagnosticsConfig) -> ConfigResult<()> {
    diagnostics.level()?;

    if diagnostics.target_prefix.is_empty() {
        return Err(ConfigError::missing_field("diagnostics.target_prefix"));
    }

    if diagnostics.max_lines_per_flush == 0 {
        return Err(ConfigError::validation(
            "Diagnostics max lines per flush must be at least 1",
        ));
    }

    if diagnostics.flush_interval_ms == 0 {
        return Err(ConfigError::validation(
            "Diagnostics flush interval must be greater than 0",
        ));
    }

    Ok(())
}
