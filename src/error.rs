use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed request input. Rejected before any upstream call.
    #[error("{0}")]
    Validation(String),

    /// VIN is well-formed but the provider could not resolve it.
    #[error("Vehicle not found for VIN {0}")]
    NotFound(String),

    /// Missing or rejected credentials for the upstream provider.
    #[error("Upstream authentication error: {0}")]
    UpstreamAuth(String),

    #[error("Upstream rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Upstream request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("Upstream provider error: {0}")]
    Upstream(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Upstream(_) | AppError::Json(_) => StatusCode::BAD_GATEWAY,
            AppError::Http(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            AppError::Http(_) => StatusCode::BAD_GATEWAY,
            AppError::UpstreamAuth(_) | AppError::Config(_) | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short client-facing label; the Display string goes into `details`.
    fn label(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "Invalid request",
            AppError::NotFound(_) => "Vehicle not found",
            AppError::UpstreamAuth(_) | AppError::Config(_) => "Server configuration error",
            AppError::RateLimited(_) => "Vehicle data provider rate limit exceeded, retry later",
            AppError::UpstreamTimeout(_) => "Vehicle data provider timed out, retry later",
            AppError::Http(e) if e.is_timeout() => "Vehicle data provider timed out, retry later",
            AppError::Upstream(_) | AppError::Http(_) | AppError::Json(_) => {
                "Vehicle data provider error"
            }
            AppError::Io(_) => "Internal server error",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = match &self {
            // Validation messages are written for the client already.
            AppError::Validation(msg) => ErrorBody {
                success: false,
                error: msg.clone(),
                details: None,
            },
            other => ErrorBody {
                success: false,
                error: other.label().to_string(),
                details: Some(other.to_string()),
            },
        };
        (status, Json(body)).into_response()
    }
}
