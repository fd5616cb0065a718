//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config`: enables TOML configuration files (`jobhost.toml`, `host.toml`)
//! - `yaml-config`: enables YAML configuration files (`jobhost.yaml`, `jobhost.yml`)
//!
//! Both features can be enabled simultaneously; if so, both file formats are searched and loaded.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Profile-specific config file (`jobhost.{profile}.toml` / `jobhost.{profile}.yaml`)
//! 3. Main config file (`jobhost.toml` / `jobhost.yaml`)
//! 4. Environment variables (`JOBHOST_*`)
//! 5. Programmatic overrides
//!
//! # Environment Variable Mapping
//!
//! Environment variables are mapped using the `JOBHOST_` prefix with `__` as separator:
//!
//! - `JOBHOST_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `JOBHOST_AGGREGATOR__BATCH_SIZE=50` → `aggregator.batch_size = 50`
//! - `JOBHOST_DIAGNOSTICS__ENABLED=true` → `diagnostics.enabled = true`
//!
//! # Example
//!
//! ```rust,ignore
//! use jobhost_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::HostConfig;
use super::validation::validate_config;

/// Environment variable prefix.
const ENV_PREFIX: &str = "JOBHOST_";

/// Environment variable selecting the profile.
const PROFILE_VAR: &str = "JOBHOST_PROFILE";

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    /// Development profile (default).
    #[default]
    Development,
    /// Production profile.
    Production,
    /// Custom profile name.
    Custom(String),
}

impl Profile {
    /// Returns the profile name as a string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name; unknown names become [`Profile::Custom`].
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `JOBHOST_PROFILE`, defaulting to Development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_VAR)
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    /// Programmatic overrides, merged last.
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    /// Specific config file to load (overrides search).
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a new configuration loader with defaults.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds current directory to search paths.
    pub fn with_current_dir(self) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            self.search_path(cwd)
        } else {
            self
        }
    }

    /// Adds the user config directory (`<config>/jobhost`) to search paths.
    pub fn with_user_config_dir(self) -> Self {
        if let Some(config_dir) = dirs::config_dir() {
            self.search_path(config_dir.join("jobhost"))
        } else {
            self
        }
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges a configuration programmatically. Wins over every other source.
    pub fn merge(mut self, config: HostConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads, validates and returns the configuration.
    pub fn load(self) -> ConfigResult<HostConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: HostConfig = figment.extract()?;
        validate_config(&config)?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            aggregator_enabled = config.aggregator.enabled,
            diagnostics_enabled = config.diagnostics.enabled,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Builds the figment instance with all sources.
    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(HostConfig::default()));

        if let Some(path) = self.config_file.take() {
            if path.exists() {
                info!(path = %path.display(), "Loading configuration file");
                figment = Self::merge_config_file(figment, &path)?;
            } else {
                return Err(ConfigError::FileNotFound(path));
            }
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!("Loading environment variables with {ENV_PREFIX} prefix");
            figment = figment.merge(
                Env::prefixed(ENV_PREFIX)
                    .ignore(&["PROFILE"])
                    .split("__"),
            );
        }

        let overrides = std::mem::take(&mut self.figment);
        Ok(figment.merge(overrides))
    }

    /// Merges a single config file into the figment, dispatching on file extension.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => {
                let _ = figment;
                Err(ConfigError::UnsupportedFormat(ext.to_string()))
            }
        }
    }

    /// Resolves the effective list of search paths.
    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if self.search_paths.is_empty() {
            let mut paths = Vec::new();
            if let Ok(cwd) = std::env::current_dir() {
                paths.push(cwd);
            }
            if let Some(config_dir) = dirs::config_dir() {
                paths.push(config_dir.join("jobhost"));
            }
            paths
        } else {
            self.search_paths.clone()
        }
    }

    /// Searches one file format.
    ///
    /// For every `search_path × base_name`, a profile-specific variant is
    /// merged first, then the base file. Stops at the first base file found.
    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn load_format_files<F>(
        &self,
        mut figment: Figment,
        search_paths: &[PathBuf],
        base_names: &[&str],
        merge_fn: F,
    ) -> (Figment, bool)
    where
        F: Fn(Figment, &Path) -> Figment,
    {
        for search_path in search_paths {
            for base_name in base_names {
                let Some((stem, ext)) = base_name.rsplit_once('.') else {
                    continue;
                };

                let profile_path =
                    search_path.join(format!("{stem}.{}.{ext}", self.profile.as_str()));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    figment = merge_fn(figment, &profile_path);
                }

                let base_path = search_path.join(base_name);
                if base_path.exists() {
                    info!(path = %base_path.display(), "Loading configuration file");
                    figment = merge_fn(figment, &base_path);
                    return (figment, true);
                }
            }
        }
        (figment, false)
    }

    /// Searches for and loads configuration files from search paths.
    fn load_config_files(&self, figment: Figment) -> Figment {
        let search_paths = self.resolve_search_paths();
        #[allow(unused_mut)]
        let mut figment = figment;
        #[allow(unused_mut)]
        let mut found = false;

        #[cfg(feature = "toml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["jobhost.toml", "host.toml"],
                |fig, path| fig.merge(Toml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        #[cfg(feature = "yaml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["jobhost.yaml", "jobhost.yml", "host.yaml", "host.yml"],
                |fig, path| fig.merge(Yaml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        if !found {
            debug!(
                paths = search_paths.len(),
                "No configuration file found, using defaults"
            );
        }
        figment
    }
}

/// Loads the configuration from the default locations.
pub fn load_config() -> ConfigResult<HostConfig> {
    ConfigLoader::new().load()
}

/// Loads the configuration from one file plus the environment.
pub fn load_config_from_file(path: impl AsRef<Path>) -> ConfigResult<HostConfig> {
    let path = path.as_ref();
    if !path.exists() {
        warn!(path = %path.display(), "Configuration file does not exist");
    }
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;
    use crate::config::schema::LogLevel;

    #[test]
    fn test_default_config() {
        Jail::expect_with(|_jail| {
            let config = ConfigLoader::new().without_env().load().map_err(|e| e.to_string())?;
            assert_eq!(config, HostConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides() {
        Jail::expect_with(|jail| {
            jail.set_env("JOBHOST_AGGREGATOR__BATCH_SIZE", "50");
            jail.set_env("JOBHOST_DIAGNOSTICS__ENABLED", "true");
            jail.set_env("JOBHOST_LOGGING__LEVEL", "debug");

            let config = ConfigLoader::new().load().map_err(|e| e.to_string())?;
            assert_eq!(config.aggregator.batch_size, 50);
            assert!(config.diagnostics.enabled);
            assert_eq!(config.logging.level, LogLevel::Debug);
            Ok(())
        });
    }

    #[test]
    fn test_programmatic_merge_wins_over_env() {
        Jail::expect_with(|jail| {
            jail.set_env("JOBHOST_AGGREGATOR__BATCH_SIZE", "50");

            let mut overrides = HostConfig::default();
            overrides.aggregator.batch_size = 7;
            let config = ConfigLoader::new()
                .merge(overrides)
                .load()
                .map_err(|e| e.to_string())?;
            assert_eq!(config.aggregator.batch_size, 7);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_value_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("JOBHOST_AGGREGATOR__BATCH_SIZE", "0");
            let result = ConfigLoader::new().load();
            assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
            Ok(())
        });
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLoader::new()
            .without_env()
            .file("/nonexistent/jobhost.toml")
            .load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_profile_file_then_main_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "jobhost.production.toml",
                "[aggregator]\nbatch_size = 5\nflush_timeout_ms = 100\n",
            )?;
            jail.create_file("jobhost.toml", "[aggregator]\nbatch_size = 10\n")?;

            let config = ConfigLoader::new()
                .without_env()
                .search_path(jail.directory())
                .profile("prod")
                .load()
                .map_err(|e| e.to_string())?;
            assert_eq!(config.aggregator.batch_size, 10);
            assert_eq!(config.aggregator.flush_timeout_ms, 100);
            Ok(())
        });
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("PROD"), Profile::Production);
        assert_eq!(Profile::parse("dev"), Profile::Development);
        assert_eq!(Profile::parse("staging"), Profile::Custom("staging".into()));
    }

    #[test]
    fn test_profile_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("JOBHOST_PROFILE", "production");
            assert_eq!(Profile::from_env(), Profile::Production);
            Ok(())
        });
    }
}
