//! JSON error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::ArbiterError;

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code.
    pub error_code: String,
    /// Human-readable description.
    pub error: String,
}

impl From<&ArbiterError> for ErrorResponse {
    fn from(err: &ArbiterError) -> Self {
        Self {
            error_code: err.error_code().to_string(),
            error: err.to_string(),
        }
    }
}

impl IntoResponse for ArbiterError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}
