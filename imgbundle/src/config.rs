//! Configuration for bundle runs.
//!
//! [`BundleConfig`] is what a [`Bundler`](crate::Bundler) runs with.
//! [`ConfigFile`] is the persisted INI form, read from
//! `<config dir>/imgbundle/config.ini`; [`ConfigKey`] names its settings
//! for `config get/set/list`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::fetch::{DEFAULT_CONCURRENCY, DEFAULT_USER_AGENT};
use crate::fetch::naming::DEFAULT_ARCHIVE_NAME;

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Errors reading, writing or editing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("failed to write config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value '{value}' for {key}: {reason}")]
    Parse {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// Settings for one bundle run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleConfig {
    /// Maximum number of sources fetched at once.
    pub concurrency: usize,
    /// Archive base name; `.zip` is appended.
    pub archive_name: String,
    /// Directory the output is written to.
    pub output_dir: PathBuf,
    /// Per-request timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// User agent sent with requests.
    pub user_agent: String,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            output_dir: PathBuf::from("."),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl BundleConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from the persisted settings.
    pub fn from_config_file(file: &ConfigFile) -> Self {
        Self {
            concurrency: file.download.concurrency.max(1),
            archive_name: file.output.archive_name.clone(),
            output_dir: file.output.directory.clone(),
            timeout: file.download.timeout_secs.map(Duration::from_secs),
            user_agent: file.download.user_agent.clone(),
        }
    }

    /// Set the concurrency limit (clamped to at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the archive base name.
    pub fn with_archive_name(mut self, name: impl Into<String>) -> Self {
        self.archive_name = name.into();
        self
    }

    /// Set the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    pub concurrency: usize,
    /// `None` disables the timeout.
    pub timeout_secs: Option<u64>,
    pub user_agent: String,
}

/// `[output]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSettings {
    pub directory: PathBuf,
    pub archive_name: String,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Directory for daily log files. `None` logs to stderr only.
    pub directory: Option<PathBuf>,
    pub level: String,
}

/// Persisted configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub download: DownloadSettings,
    pub output: OutputSettings,
    pub logging: LoggingSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let defaults = BundleConfig::default();
        Self {
            download: DownloadSettings {
                concurrency: defaults.concurrency,
                timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
                user_agent: defaults.user_agent,
            },
            output: OutputSettings {
                directory: defaults.output_dir,
                archive_name: defaults.archive_name,
            },
            logging: LoggingSettings {
                directory: None,
                level: DEFAULT_LOG_LEVEL.to_string(),
            },
        }
    }
}

/// Path of the configuration file.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("imgbundle")
        .join("config.ini")
}

impl ConfigFile {
    /// Load from the default location. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Parse settings from INI content.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(content).map_err(|e| ConfigError::Read {
            path: PathBuf::from("<string>"),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|section| section.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            ini.with_section(Some(key.section()))
                .set(key.key_name(), key.get(self));
        }
        ini
    }

    /// Save to the default location, creating its directory.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating its directory.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        self.to_ini().write_to_file(path).map_err(write_err)
    }
}

/// A setting addressable as `section.key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    DownloadConcurrency,
    DownloadTimeout,
    DownloadUserAgent,
    OutputDirectory,
    OutputArchiveName,
    LoggingDirectory,
    LoggingLevel,
}

impl ConfigKey {
    /// Every key, grouped by section.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::DownloadConcurrency,
            ConfigKey::DownloadTimeout,
            ConfigKey::DownloadUserAgent,
            ConfigKey::OutputDirectory,
            ConfigKey::OutputArchiveName,
            ConfigKey::LoggingDirectory,
            ConfigKey::LoggingLevel,
        ]
    }

    /// Full `section.key` name.
    pub fn name(&self) -> &'static str {
        match self {
            ConfigKey::DownloadConcurrency => "download.concurrency",
            ConfigKey::DownloadTimeout => "download.timeout",
            ConfigKey::DownloadUserAgent => "download.user_agent",
            ConfigKey::OutputDirectory => "output.directory",
            ConfigKey::OutputArchiveName => "output.archive_name",
            ConfigKey::LoggingDirectory => "logging.directory",
            ConfigKey::LoggingLevel => "logging.level",
        }
    }

    /// INI section.
    pub fn section(&self) -> &'static str {
        self.split().0
    }

    /// Key within its section.
    pub fn key_name(&self) -> &'static str {
        self.split().1
    }

    fn split(&self) -> (&'static str, &'static str) {
        let name = self.name();
        name.split_once('.').unwrap_or((name, ""))
    }

    /// Current value as text. Unset optional values are empty.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::DownloadConcurrency => config.download.concurrency.to_string(),
            ConfigKey::DownloadTimeout => config
                .download
                .timeout_secs
                .map(|secs| secs.to_string())
                .unwrap_or_else(|| "0".to_string()),
            ConfigKey::DownloadUserAgent => config.download.user_agent.clone(),
            ConfigKey::OutputDirectory => config.output.directory.display().to_string(),
            ConfigKey::OutputArchiveName => config.output.archive_name.clone(),
            ConfigKey::LoggingDirectory => config
                .logging
                .directory
                .as_ref()
                .map(|dir| dir.display().to_string())
                .unwrap_or_default(),
            ConfigKey::LoggingLevel => config.logging.level.clone(),
        }
    }

    /// Validate and store `value`.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        let invalid = |reason: &str| ConfigError::Parse {
            key: self.name().to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        match self {
            ConfigKey::DownloadConcurrency => {
                let n: usize = value
                    .parse()
                    .map_err(|_| invalid("expected a positive integer"))?;
                if n == 0 {
                    return Err(invalid("must be at least 1"));
                }
                config.download.concurrency = n;
            }
            ConfigKey::DownloadTimeout => {
                config.download.timeout_secs = match value {
                    "" | "none" | "0" => None,
                    secs => Some(
                        secs.parse()
                            .map_err(|_| invalid("expected seconds, or 0 to disable"))?,
                    ),
                };
            }
            ConfigKey::DownloadUserAgent => {
                if value.is_empty() {
                    return Err(invalid("must not be empty"));
                }
                config.download.user_agent = value.to_string();
            }
            ConfigKey::OutputDirectory => {
                if value.is_empty() {
                    return Err(invalid("must not be empty"));
                }
                config.output.directory = expand_home(value);
            }
            ConfigKey::OutputArchiveName => {
                config.output.archive_name = value.to_string();
            }
            ConfigKey::LoggingDirectory => {
                config.logging.directory = if value.is_empty() {
                    None
                } else {
                    Some(expand_home(value))
                };
            }
            ConfigKey::LoggingLevel => {
                let level = value.to_ascii_lowercase();
                if !matches!(
                    level.as_str(),
                    "trace" | "debug" | "info" | "warn" | "error"
                ) {
                    return Err(invalid("expected trace, debug, info, warn or error"));
                }
                config.logging.level = level;
            }
        }
        Ok(())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Expand a leading `~` to the home directory.
fn expand_home(value: &str) -> PathBuf {
    match value.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches('/')),
            None => PathBuf::from(value),
        },
        _ => PathBuf::from(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bundle_config_defaults() {
        let config = BundleConfig::default();
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.archive_name, "images");
        assert_eq!(config.output_dir, PathBuf::from("."));
        assert_eq!(config.timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_bundle_config_builder_clamps_concurrency() {
        let config = BundleConfig::new()
            .with_concurrency(0)
            .with_timeout(None)
            .with_archive_name("trip")
            .with_output_dir("/tmp/out");

        assert_eq!(config.concurrency, 1);
        assert_eq!(config.timeout, None);
        assert_eq!(config.archive_name, "trip");
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_parse_ini() {
        let config = ConfigFile::parse(
            "[download]\nconcurrency = 8\ntimeout = 0\n\n[output]\ndirectory = /data\narchive_name = pics\n",
        )
        .unwrap();

        assert_eq!(config.download.concurrency, 8);
        assert_eq!(config.download.timeout_secs, None);
        assert_eq!(config.output.directory, PathBuf::from("/data"));
        assert_eq!(config.output.archive_name, "pics");
        assert_eq!(config.logging.level, "info");

        let bundle = BundleConfig::from_config_file(&config);
        assert_eq!(bundle.concurrency, 8);
        assert_eq!(bundle.timeout, None);
    }

    #[test]
    fn test_parse_rejects_invalid_value() {
        let result = ConfigFile::parse("[download]\nconcurrency = many\n");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        ConfigKey::DownloadConcurrency.set(&mut config, "12").unwrap();
        ConfigKey::LoggingDirectory.set(&mut config, "/var/log/imgbundle").unwrap();
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded.download.concurrency, 12);
        assert_eq!(
            loaded.logging.directory,
            Some(PathBuf::from("/var/log/imgbundle"))
        );
    }

    #[test]
    fn test_config_key_parse() {
        assert_eq!(
            "download.concurrency".parse::<ConfigKey>().unwrap(),
            ConfigKey::DownloadConcurrency
        );
        assert_eq!(
            "Logging.Level".parse::<ConfigKey>().unwrap(),
            ConfigKey::LoggingLevel
        );
        assert!(matches!(
            "download.nope".parse::<ConfigKey>(),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_config_key_sections() {
        assert_eq!(ConfigKey::OutputArchiveName.section(), "output");
        assert_eq!(ConfigKey::OutputArchiveName.key_name(), "archive_name");
    }

    #[test]
    fn test_config_key_validation() {
        let mut config = ConfigFile::default();
        assert!(ConfigKey::DownloadConcurrency.set(&mut config, "0").is_err());
        assert!(ConfigKey::LoggingLevel.set(&mut config, "loud").is_err());
        assert!(ConfigKey::DownloadTimeout.set(&mut config, "soon").is_err());

        ConfigKey::LoggingLevel.set(&mut config, "DEBUG").unwrap();
        assert_eq!(config.logging.level, "debug");

        ConfigKey::DownloadTimeout.set(&mut config, "none").unwrap();
        assert_eq!(ConfigKey::DownloadTimeout.get(&config), "0");
    }
}
