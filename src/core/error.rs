use axum::{
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use tracing::{error, warn};

use crate::web::ui::error_page;

#[derive(Debug, thiserror::Error)]
pub enum EservicesError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Email error: {0}")]
    Email(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type EservicesResult<T> = Result<T, EservicesError>;

impl EservicesError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Database(diesel::result::Error::NotFound) => StatusCode::NOT_FOUND,
            Self::Database(_)
            | Self::Pool(_)
            | Self::Io(_)
            | Self::Email(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            Self::Database(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _
            ))
        )
    }
}

impl From<tokio::task::JoinError> for EservicesError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(format!("Blocking task failed: {e}"))
    }
}

impl IntoResponse for EservicesError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            Self::Unauthorized => return Redirect::to("/auth/login").into_response(),
            Self::RateLimited { retry_after_secs } => {
                warn!("Rate limit exceeded");
                return (
                    status,
                    [(header::RETRY_AFTER, retry_after_secs.to_string())],
                    Html(error_page(status)),
                )
                    .into_response();
            }
            _ if status.is_server_error() => error!("{self}"),
            _ => warn!("{self}"),
        }

        (status, Html(error_page(status))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            EservicesError::NotFound("ticket".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            EservicesError::Database(diesel::result::Error::NotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            EservicesError::RateLimited { retry_after_secs: 60 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            EservicesError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_are_not_rendered() {
        let response = EservicesError::Internal("secret connection string".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = EservicesError::RateLimited { retry_after_secs: 30 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
            Some("30")
        );
    }
}
