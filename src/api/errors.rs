use std::error::Error as StdError;
use std::fmt::Write as _;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub(crate) const GENERIC_INTERNAL_ERROR: &str = "Internal server error occurred";

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    traceback: Option<String>,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    NotFound(String),
    GatewayTimeout(String),
    Internal { message: String, traceback: Option<String> },
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant
    /// that only carries the context.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal { message: context.to_string(), traceback: None }
    }

    /// `Internal` variant exposing the error message and its cause chain.
    pub(crate) fn with_traceback(err: &(dyn StdError + 'static)) -> Self {
        Self::Internal { message: err.to_string(), traceback: Some(cause_chain(err)) }
    }
}

fn cause_chain(err: &(dyn StdError + 'static)) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let _ = write!(chain, "\ncaused by: {cause}");
        source = cause.source();
    }
    chain
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, traceback) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message, None),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message, None),
            ApiError::GatewayTimeout(message) => {
                tracing::warn!(error = %message, "Upstream timeout");
                (StatusCode::GATEWAY_TIMEOUT, message, None)
            }
            ApiError::Internal { message, traceback } => {
                tracing::error!(error = %message, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, message, traceback)
            }
        };

        (status, Json(ErrorResponse { error, traceback })).into_response()
    }
}
