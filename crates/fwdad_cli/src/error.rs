//! CLI error types

use fwdad_core::config::ConfigError;
use fwdad_core::ForwardAdError;
use thiserror::Error;

/// Errors surfaced by `fwdad` commands
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be built
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A session operation failed
    #[error("Forward AD error: {0}")]
    ForwardAd(#[from] ForwardAdError),

    /// Bad command-line input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Output could not be serialised
    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

impl From<fwdad_core::EngineError> for CliError {
    fn from(err: fwdad_core::EngineError) -> Self {
        CliError::ForwardAd(err.into())
    }
}

/// Result alias for CLI commands
pub type Result<T> = std::result::Result<T, CliError>;
