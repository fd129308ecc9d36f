//! Error types shared across the archiver crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised by the shared utilities
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid log setting '{value}' for {setting}")]
    InvalidLogSetting { setting: &'static str, value: String },

    #[error("Logging initialization failed: {0}")]
    LoggingInit(String),
}

impl CommonError {
    pub(crate) fn invalid_log_setting(setting: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidLogSetting {
            setting,
            value: value.into(),
        }
    }
}
