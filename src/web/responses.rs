//! HTTP response types and error mapping
//!
//! Errors leave the service as `{success: false, error, timestamp}` with the
//! status chosen in [`status_for`].

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::AppError;

/// Standard error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub error: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ApiResponse {
    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            success: false,
            error: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

pub fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::InvalidInput { .. } | AppError::UnsupportedConversion { .. } => {
            StatusCode::BAD_REQUEST
        }
        AppError::InvalidSession => StatusCode::FORBIDDEN,
        AppError::NotFound { .. } => StatusCode::NOT_FOUND,
        AppError::ConversionFailed { .. }
        | AppError::Storage(_)
        | AppError::Archive { .. }
        | AppError::Configuration { .. }
        | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert AppError to an HTTP response
pub fn handle_error(error: AppError) -> Response {
    let status = status_for(&error);

    let message = match &error {
        // Conversion failures carry the tool's message back to the client.
        AppError::ConversionFailed { .. } => error.to_string(),
        AppError::Storage(_) | AppError::Archive { .. } | AppError::Internal { .. } => {
            error!("Request failed: {}", error);
            "Internal server error".to_string()
        }
        AppError::Configuration { .. } => {
            error!("Request failed: {}", error);
            "Server configuration error".to_string()
        }
        AppError::NotFound { .. } => "Not found".to_string(),
        _ => error.to_string(),
    };

    (status, Json(ApiResponse::error(message))).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        handle_error(self)
    }
}
