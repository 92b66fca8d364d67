use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// A mandatory field is absent from a raw record
    #[error("Record {index}: missing mandatory field '{field}'")]
    MissingField { index: usize, field: String },

    /// A mandatory field is present but cannot be used
    #[error("Record {index}: invalid value for field '{field}': {reason}")]
    InvalidField {
        index: usize,
        field: String,
        reason: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Model training or prediction errors
    #[error("Training error: {0}")]
    Training(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the error is a data-quality fault in an input record
    pub fn is_record_error(&self) -> bool {
        matches!(
            self,
            AppError::MissingField { .. } | AppError::InvalidField { .. }
        )
    }

    /// Index of the offending record, for record-level errors
    pub fn record_index(&self) -> Option<usize> {
        match self {
            AppError::MissingField { index, .. } | AppError::InvalidField { index, .. } => {
                Some(*index)
            }
            _ => None,
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::MissingField { .. } => "MISSING_FIELD",
            AppError::InvalidField { .. } => "INVALID_FIELD",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Training(_) => "TRAINING_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Process exit code for this error (sysexits.h)
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::MissingField { .. }
            | AppError::InvalidField { .. }
            | AppError::Serialization(_) => 65,
            AppError::Configuration(_) | AppError::Validation(_) => 78,
            AppError::Io(_) => 74,
            AppError::Training(_) | AppError::Internal(_) => 70,
        }
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from toml::ser::Error
impl From<toml::ser::Error> for AppError {
    fn from(err: toml::ser::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
