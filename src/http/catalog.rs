use axum::extract::{Extension, Query};
use axum::http::header::{HeaderMap, HeaderValue, LINK};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;

use super::errors::Result;
use super::tags::GetListParams;
use crate::registry::RegistrySession;

pub(crate) async fn list_catalog(
    Extension(session): Extension<RegistrySession>,
    Query(params): Query<GetListParams>,
) -> Result<Response> {
    let page = session.list_catalog(&params.into()).await?;

    let mut headers = HeaderMap::new();
    if let Some(link) = &page.link {
        headers.insert(LINK, HeaderValue::from_str(link)?);
    }
    Ok((StatusCode::OK, headers, Json(page)).into_response())
}
