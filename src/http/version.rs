use axum::extract::State;
use axum::headers::authorization::{Authorization, Basic};
use axum::http::header::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::{Json, TypedHeader};
use http::StatusCode;
use serde::Serialize;

use super::auth::authenticate;
use super::errors::Result;
use super::Console;
use crate::registry::client::DOCKER_DISTRIBUTION_API_VERSION;
use crate::registry::RegistrySession;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionResponse {
    status: u16,
    api_version: Option<String>,
    authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
}

/// Check `GET /v2/`. Open to anonymous callers; credentials are forwarded only when they match
/// the configured pair.
pub(crate) async fn version(
    State(console): State<Console>,
    authorization: Option<TypedHeader<Authorization<Basic>>>,
) -> Result<Response> {
    let credentials = authenticate(&console, authorization.as_ref().map(|h| &h.0));
    let session = RegistrySession::new(console.upstream(), credentials);
    let upstream = session.check_version().await?;

    let api_version = upstream
        .header_str(&DOCKER_DISTRIBUTION_API_VERSION)
        .map(String::from);
    let data = (!upstream.is_success())
        .then(|| String::from_utf8_lossy(&upstream.body).into_owned())
        .filter(|d| !d.is_empty());

    let mut headers = HeaderMap::new();
    if let Some(v) = &api_version {
        headers.insert(DOCKER_DISTRIBUTION_API_VERSION.clone(), HeaderValue::from_str(v)?);
    }
    let status = if upstream.is_success() {
        StatusCode::OK
    } else {
        upstream.status
    };
    let response = VersionResponse {
        status: upstream.status.as_u16(),
        api_version,
        authenticated: upstream.status == StatusCode::OK,
        data,
    };
    Ok((status, headers, Json(response)).into_response())
}
