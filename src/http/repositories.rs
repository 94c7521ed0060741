use axum::extract::{Extension, Path};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;

use super::errors::Result;
use crate::oci_digest::validate_repository_name;
use crate::registry::RegistrySession;

pub(crate) async fn delete_repository(
    Extension(session): Extension<RegistrySession>,
    Path(name): Path<String>,
) -> Result<Response> {
    validate_repository_name(&name)?;
    let report = session.delete_repository(&name).await?;

    Ok((StatusCode::OK, Json(report)).into_response())
}
