use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;
use tracing::error;

/// Domain errors surfaced to HTTP callers.
///
/// Everything inside the background upload worker stays terminal-local
/// (logged, status recorded) and never maps onto this type.
#[derive(Debug, Display)]
pub enum ApiError {
    #[display(fmt = "{}", _0)]
    Validation(String),
    #[display(fmt = "You have already clocked in today. Please clock out first.")]
    AlreadyClockedIn,
    #[display(fmt = "No active clock-in found for today. Please clock in first.")]
    NoActiveClockIn,
    #[display(fmt = "{} not found", _0)]
    NotFound(&'static str),
    #[display(fmt = "Admin only")]
    Forbidden,
    #[display(fmt = "Internal Server Error")]
    Internal,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::AlreadyClockedIn | ApiError::NoActiveClockIn => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "message": self.to_string() }))
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        error!(error = %e, "Database error");
        ApiError::Internal
    }
}
