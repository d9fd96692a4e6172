use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::{ChatError, StoreError};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

/// The request carried no usable caller handle.
#[derive(Debug, thiserror::Error)]
#[error("unauthenticated: {0}")]
pub struct Unauthenticated(pub &'static str);

impl AppError {
    pub fn status(&self) -> StatusCode {
        if let Some(err) = self.0.downcast_ref::<ChatError>() {
            return match err {
                ChatError::NotFound { .. } => StatusCode::NOT_FOUND,
                ChatError::NotParticipant { .. }
                | ChatError::Forbidden(_)
                | ChatError::NotSender { .. } => StatusCode::FORBIDDEN,
                ChatError::InvalidParent { .. }
                | ChatError::InsufficientParticipants { .. }
                | ChatError::EmptyBody => StatusCode::UNPROCESSABLE_ENTITY,
                ChatError::FanoutFailed { .. } | ChatError::StorageUnavailable(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                ChatError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
        }
        if self.0.is::<Unauthenticated>() {
            return StatusCode::UNAUTHORIZED;
        }
        match self.0.downcast_ref::<StoreError>() {
            Some(err) if err.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self.0, "request failed");
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
