//! CLI error type and exit codes.

use std::fmt;

use imgbundle::config::ConfigError;
use imgbundle::logging::LoggingError;
use imgbundle::BundleError;

/// Exit code used when the user interrupted the run.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Errors surfaced to the user by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Bad or missing input (URLs, URL list file).
    Input(String),
    /// Configuration could not be read, written or applied.
    Config(String),
    /// Logging could not be set up.
    Logging(LoggingError),
    /// The async runtime or signal handler could not be set up.
    Runtime(String),
    /// The bundle run failed.
    Bundle(BundleError),
    /// Every source failed, so nothing was written.
    NothingSaved { failed: usize },
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Bundle(e) if e.is_cancelled() => EXIT_INTERRUPTED,
            CliError::Input(_) | CliError::Config(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Input(msg) => write!(f, "{}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(e) => write!(f, "{}", e),
            CliError::Runtime(msg) => write!(f, "Runtime error: {}", msg),
            CliError::Bundle(e) if e.is_cancelled() => write!(f, "Interrupted, nothing saved"),
            CliError::Bundle(e) => write!(f, "Download failed: {}", e),
            CliError::NothingSaved { failed } => {
                write!(f, "None of the {} images could be downloaded", failed)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Logging(e) => Some(e),
            CliError::Bundle(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BundleError> for CliError {
    fn from(e: BundleError) -> Self {
        CliError::Bundle(e)
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Runtime(e.to_string())
    }
}
