//! CLI error type.

use std::fmt;

use globelayer::config::ConfigError;
use globelayer::logging::LoggingError;
use globelayer::pyramid::BuildError;

/// Errors reported by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded, parsed or saved.
    Config(String),
    /// Logging could not be set up.
    Logging(String),
    /// The tile pyramid could not be started.
    Pyramid(String),
    /// Tile store could not be cleared.
    CacheClear(String),
    /// Tile store statistics could not be read.
    CacheStats(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(msg) => write!(f, "Logging error: {}", msg),
            CliError::Pyramid(msg) => write!(f, "Failed to start tile pyramid: {}", msg),
            CliError::CacheClear(msg) => write!(f, "Failed to clear tile store: {}", msg),
            CliError::CacheStats(msg) => write!(f, "Failed to read tile store: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e.to_string())
    }
}

impl From<BuildError> for CliError {
    fn from(e: BuildError) -> Self {
        CliError::Pyramid(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_conversion() {
        let err: CliError = ConfigError::UnknownKey("cache.bogus".to_string()).into();
        assert!(matches!(err, CliError::Config(_)));
        assert!(err.to_string().contains("cache.bogus"));
    }
}
