use axum::extract::{Extension, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;

use super::errors::Result;
use super::Console;
use crate::registry::{CatalogAggregator, RegistrySession};

pub(crate) async fn registry_analytics(
    State(console): State<Console>,
    Extension(session): Extension<RegistrySession>,
) -> Result<Response> {
    let aggregator =
        CatalogAggregator::new(session, console.config().registry.max_concurrent_requests);
    let analytics = aggregator.analyze().await?;

    Ok((StatusCode::OK, Json(analytics)).into_response())
}
