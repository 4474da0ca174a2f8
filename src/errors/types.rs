//! Error type definitions for the conversion gateway

use staging_file_manager::StagingError;
use thiserror::Error;

/// Top-level application error type
///
/// Every variant maps to exactly one HTTP status in `web::responses`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Rejected upload or malformed request body
    #[error("{message}")]
    InvalidInput { message: String },

    /// Forged, expired or structurally broken session token
    #[error("Invalid session")]
    InvalidSession,

    /// No registry entry for the requested pair
    #[error("Conversion {from} to {to} not supported.")]
    UnsupportedConversion { from: String, to: String },

    /// A capability failed on one file of the batch
    #[error("Conversion failed: {file}: {cause}")]
    ConversionFailed {
        file: String,
        #[source]
        cause: ConversionError,
    },

    /// Download token invalid or its file is gone
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Staging directory failures
    #[error("Storage error: {0}")]
    Storage(#[from] StagingError),

    /// Zip packaging failures
    #[error("Archive error: {message}")]
    Archive { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Failure of a single conversion capability
#[derive(Error, Debug)]
pub enum ConversionError {
    /// The executable could not be started at all
    #[error("{tool} is not available: {source}")]
    ToolMissing {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The executable ran but exited unsuccessfully
    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// The tool reported success but the expected file was not written
    #[error("{tool} produced no output file")]
    NoOutput { tool: String },

    /// In-process library failure (image decoding, archive handling)
    #[error("{library}: {message}")]
    Library { library: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create an invalid input error with a custom message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an unsupported conversion error for a source/target pair
    pub fn unsupported<F: Into<String>, T: Into<String>>(from: F, to: T) -> Self {
        Self::UnsupportedConversion {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Create a conversion failure for the named file
    pub fn conversion_failed<F: Into<String>>(file: F, cause: ConversionError) -> Self {
        Self::ConversionFailed {
            file: file.into(),
            cause,
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found<R: Into<String>>(resource: R) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create an archive error
    pub fn archive<S: Into<String>>(message: S) -> Self {
        Self::Archive {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::internal(format!("background task failed: {err}"))
    }
}

impl ConversionError {
    pub fn library<L: Into<String>, M: ToString>(library: L, message: M) -> Self {
        Self::Library {
            library: library.into(),
            message: message.to_string(),
        }
    }
}
