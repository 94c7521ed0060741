use axum::extract::{Extension, Path, Query};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use http::StatusCode;
use serde::Deserialize;

use super::empty_string_as_none;
use super::errors::Result;
use crate::oci_digest::validate_repository_name;
use crate::registry::{fallback_created, Pagination, RegistrySession};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GetListParams {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    n: Option<u32>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    last: Option<String>,
}

impl From<GetListParams> for Pagination {
    fn from(params: GetListParams) -> Self {
        Pagination {
            n: params.n,
            last: params.last,
        }
    }
}

pub(crate) async fn list_tags(
    Extension(session): Extension<RegistrySession>,
    Path(name): Path<String>,
    Query(params): Query<GetListParams>,
) -> Result<Response> {
    validate_repository_name(&name)?;
    let page = session.list_tags(&name, &params.into()).await?;

    Ok((StatusCode::OK, Json(page)).into_response())
}

pub(crate) async fn get_tag_detail(
    Extension(session): Extension<RegistrySession>,
    Path((name, tag)): Path<(String, String)>,
) -> Result<Response> {
    validate_repository_name(&name)?;
    let detail = session
        .tag_detail(&name, &tag, &fallback_created(Utc::now()))
        .await?;

    Ok((StatusCode::OK, Json(detail)).into_response())
}
