//! Error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::error;

use crate::services::ServiceError;
use crate::storage::StorageError;

/// Message returned for failures whose detail stays in the logs
pub const INTERNAL_ERROR: &str = "Internal error";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Too many requests")]
    TooManyRequests,

    /// A required setting is absent
    #[error("{0}")]
    NotConfigured(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Credenciales inválidas".to_string()),
            AppError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "Demasiados intentos, espere un momento".to_string(),
            ),
            AppError::NotConfigured(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            // Auth provider rejections carry a message meant for staff
            StorageError::Auth(msg) => AppError::BadRequest(msg),
            _ => AppError::Internal(INTERNAL_ERROR.to_string()),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Storage(e) => e.into(),
            ServiceError::Export(e) => {
                error!(error = %e, "Export failed");
                AppError::Internal(INTERNAL_ERROR.to_string())
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        error!(error = %e, "Database error");
        AppError::Internal(INTERNAL_ERROR.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statuses() {
        let cases = [
            (AppError::BadRequest("RUT inválido".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
            (AppError::TooManyRequests, StatusCode::TOO_MANY_REQUESTS),
            (AppError::NotConfigured("DATABASE_URL not configured"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_storage_errors_hide_detail() {
        let error: AppError = StorageError::Api {
            status: 500,
            body: "relation \"insumos\" does not exist".to_string(),
        }
        .into();
        assert!(matches!(error, AppError::Internal(ref msg) if msg == INTERNAL_ERROR));

        let error: AppError = StorageError::Auth("El correo electrónico ya está en uso".to_string()).into();
        assert!(matches!(error, AppError::BadRequest(_)));
    }
}
