//! Error types for cla-signd

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cla_core::{ErrorKind, SignError};
use serde::Serialize;
use thiserror::Error;

/// Startup errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bootstrap error: {0}")]
    Bootstrap(#[from] SignError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Sign(#[from] SignError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Sign(err) => match err.kind() {
                ErrorKind::Validation => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                ErrorKind::Conflict => (StatusCode::CONFLICT, "CONFLICT"),
                ErrorKind::Configuration => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "CONFIGURATION_ERROR")
                }
                ErrorKind::Provider => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR"),
                ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        if status.is_server_error() {
            tracing::error!(code, error = %self, "request failed");
        } else {
            tracing::debug!(code, error = %self, "request rejected");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_errors_map_by_kind() {
        let cases = [
            (SignError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (SignError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                SignError::AlreadySigned {
                    company_id: "C".into(),
                    project_id: "P".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                SignError::IclaNotEnabled("P".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                SignError::CclaNotEnabled("P".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                SignError::provider("create envelope", Some(400), "bad"),
                StatusCode::BAD_GATEWAY,
            ),
            (
                SignError::Storage("down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status().0, expected);
        }
    }

    #[test]
    fn body_exposes_message_only() {
        let response =
            ApiError::from(SignError::NotFound("signature 'S'".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
