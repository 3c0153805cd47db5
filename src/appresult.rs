use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

use crate::{auth::AuthError, res::FAIL, search::SearchError};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

/// Request-level refusals that map onto a specific HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum Reject {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unavailable(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        if let Some(reject) = self.0.downcast_ref::<Reject>() {
            return match reject {
                Reject::BadRequest(_) => StatusCode::BAD_REQUEST,
                Reject::Forbidden(_) => StatusCode::FORBIDDEN,
                Reject::NotFound(_) => StatusCode::NOT_FOUND,
                Reject::Conflict(_) => StatusCode::CONFLICT,
                Reject::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            };
        }
        if self.0.downcast_ref::<AuthError>().is_some() {
            return StatusCode::UNAUTHORIZED;
        }
        match self.0.downcast_ref::<SearchError>() {
            Some(SearchError::NotFound { .. }) => return StatusCode::NOT_FOUND,
            Some(SearchError::InvalidSegment(_) | SearchError::PageOutOfRange { .. }) => {
                return StatusCode::BAD_REQUEST;
            }
            _ => {}
        }
        if let Some(sqlx::Error::RowNotFound) = self.0.downcast_ref::<sqlx::Error>() {
            return StatusCode::NOT_FOUND;
        }
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(event = "request_failed", error = ?self.0);
        }

        (
            status,
            Json(json!({ "code": FAIL, "data": {}, "msg": self.0.to_string() })),
        )
            .into_response()
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
