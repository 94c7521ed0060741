use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;
use thiserror;

use crate::errors::Error as ConsoleError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("http invalid header name")]
    HTTPInvalidHeaderName(#[from] http::header::InvalidHeaderName),
    #[error("http invalid header value")]
    HTTPInvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("invalid request body: {0}")]
    InvalidRequestBody(String),

    #[error(transparent)]
    Console(#[from] ConsoleError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

#[inline]
fn into_error_response(status: StatusCode, error: &str, detail: Option<String>) -> Response {
    let body = ErrorBody {
        error: error.to_string(),
        detail,
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::Console(e) => console_error_to_response(e),
            Error::InvalidRequestBody(s) => {
                tracing::warn!("rejecting request body: {s}");
                into_error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to read request body",
                    None,
                )
            }
            Error::HTTPInvalidHeaderName(_) | Error::HTTPInvalidHeaderValue(_) => {
                tracing::warn!("{self}");
                into_error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        }
    }
}

/// Upstream statuses only pass through when they are errors themselves; anything else surfacing
/// as a failure is reported as a 500.
fn propagated_status(status: Option<StatusCode>) -> StatusCode {
    status
        .filter(|s| s.is_client_error() || s.is_server_error())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

#[inline]
fn console_error_to_response(e: ConsoleError) -> Response {
    match e {
        ConsoleError::Unauthenticated => {
            into_error_response(StatusCode::UNAUTHORIZED, "Authentication required", None)
        }
        ConsoleError::RepositoryNotFound(_) => {
            into_error_response(StatusCode::NOT_FOUND, "Repository not found", None)
        }
        ConsoleError::ManifestNotFound { .. } => {
            into_error_response(StatusCode::NOT_FOUND, "Manifest not found", Some(e.to_string()))
        }
        ConsoleError::UpstreamStatus { status, ref message } => {
            tracing::warn!("{e}: {message:?}");
            into_error_response(
                propagated_status(Some(status)),
                "Registry request failed",
                message.clone().or_else(|| Some(status.to_string())),
            )
        }
        ConsoleError::UpstreamRequest(ref inner) => {
            tracing::warn!("{e}");
            into_error_response(
                propagated_status(inner.status()),
                "Registry unavailable",
                None,
            )
        }
        ConsoleError::InvalidRepositoryName(_)
        | ConsoleError::InvalidReference(_)
        | ConsoleError::InvalidDigest(_)
        | ConsoleError::UnsupportedDigestAlgorithm(_) => {
            into_error_response(StatusCode::BAD_REQUEST, &e.to_string(), None)
        }
        ConsoleError::MalformedResponse(_)
        | ConsoleError::InvalidRegistryUrl(_)
        | ConsoleError::ConfigError(_)
        | ConsoleError::IOError(_) => {
            tracing::warn!("{e:?}");
            into_error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
        }
    }
}
