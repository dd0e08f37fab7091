use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use meridian_core::error::AppError;

use crate::dto::ErrorResponse;

/// Wrapper so we can implement `IntoResponse` for `AppError`.
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            AppError::ValidationError(_) | AppError::UnknownEngine(_) => {
                (StatusCode::BAD_REQUEST, "validation_error")
            }
            AppError::SerializationError(_) => (StatusCode::BAD_REQUEST, "serialization_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            AppError::QueueError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "queue_error"),
            AppError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.0.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (AppError::ValidationError("no parts".into()), StatusCode::BAD_REQUEST),
            (AppError::UnknownEngine("yelp".into()), StatusCode::BAD_REQUEST),
            (AppError::NotFound("job".into()), StatusCode::NOT_FOUND),
            (AppError::DatabaseError("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::QueueError("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::Timeout(30), StatusCode::GATEWAY_TIMEOUT),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError(error).status().0, expected);
        }
    }
}
