use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::{Deserialize, Serialize};

use super::errors::{Error, Result};
use super::Console;
use crate::oci_digest::validate_repository_name;
use crate::registry::{CatalogAggregator, RegistrySession, TagDetail};

#[derive(Debug, Deserialize)]
pub(crate) struct TagDetailsRequest {
    repository: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Serialize)]
struct TagDetailsResponse {
    tags: Vec<TagDetail>,
}

pub(crate) async fn tag_details(
    State(console): State<Console>,
    Extension(session): Extension<RegistrySession>,
    body: std::result::Result<Json<TagDetailsRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(request) = body.map_err(|e| Error::InvalidRequestBody(e.body_text()))?;
    validate_repository_name(&request.repository)?;

    let aggregator =
        CatalogAggregator::new(session, console.config().registry.max_concurrent_requests);
    let tags = aggregator
        .describe_tags(&request.repository, &request.tags)
        .await;

    Ok((StatusCode::OK, Json(TagDetailsResponse { tags })).into_response())
}
