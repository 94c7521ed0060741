use std::str::FromStr;

use axum::extract::{Extension, Path};
use axum::http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::{Method, StatusCode};
use serde::Serialize;

use super::errors::Result;
use crate::errors::Error as ConsoleError;
use crate::oci_digest::{validate_repository_name, ManifestRef};
use crate::registry::client::DOCKER_CONTENT_DIGEST;
use crate::registry::manifests::DOCKER_MANIFEST_V2;
use crate::registry::{RegistrySession, UpstreamRequest};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ManifestResponse {
    /// Manifest document as the registry sent it; a plain string if it wasn't JSON.
    manifest: serde_json::Value,
    digest: String,
    media_type: Option<String>,
    size: u64,
    layer_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    architecture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    os: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    success: bool,
    status: u16,
}

fn parse_target(name: &str, reference: &str) -> Result<ManifestRef> {
    validate_repository_name(name)?;
    Ok(ManifestRef::from_str(reference)?)
}

pub(crate) async fn get_manifest(
    Extension(session): Extension<RegistrySession>,
    Path((name, reference)): Path<(String, String)>,
) -> Result<Response> {
    let reference = parse_target(&name, &reference)?;
    let resolved = session.resolve_manifest(&name, &reference).await?;

    let size = resolved.image_size();
    let manifest = serde_json::from_slice(&resolved.body).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(&resolved.body).into_owned())
    });

    let mut headers = HeaderMap::new();
    if let Some(digest) = &resolved.digest {
        headers.insert(DOCKER_CONTENT_DIGEST.clone(), HeaderValue::from_str(digest)?);
    }

    let response = ManifestResponse {
        manifest,
        digest: resolved.digest.clone().unwrap_or_default(),
        media_type: resolved.media_type.clone(),
        size: size.total_size,
        layer_count: size.layer_count,
        architecture: resolved.architecture().map(String::from),
        os: resolved.os().map(String::from),
    };
    Ok((StatusCode::OK, headers, Json(response)).into_response())
}

/// Mirrors the upstream `HEAD`: same status, same `Docker-Content-Digest`, no body.
pub(crate) async fn head_manifest(
    Extension(session): Extension<RegistrySession>,
    Path((name, reference)): Path<(String, String)>,
) -> Result<Response> {
    let reference = parse_target(&name, &reference)?;
    let request = UpstreamRequest::new(Method::HEAD, format!("/v2/{name}/manifests/{reference}"))
        .accept(DOCKER_MANIFEST_V2);
    let upstream = session.send(request).await?;

    let mut headers = HeaderMap::new();
    if let Some(digest) = upstream.content_digest() {
        headers.insert(DOCKER_CONTENT_DIGEST.clone(), HeaderValue::from_str(digest)?);
    }
    if let Some(content_type) = upstream.header_str(&CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type)?);
    }
    Ok((upstream.status, headers).into_response())
}

/// Deletes one manifest by digest. Tags are rejected; the registry only deletes by digest.
pub(crate) async fn delete_manifest(
    Extension(session): Extension<RegistrySession>,
    Path((name, reference)): Path<(String, String)>,
) -> Result<Response> {
    let digest = match parse_target(&name, &reference)? {
        ManifestRef::Digest(d) => d,
        ManifestRef::Tag(t) => {
            return Err(ConsoleError::InvalidDigest(format!(
                "manifests can only be deleted by digest, got tag {t}"
            ))
            .into())
        }
    };

    let status = session.delete_manifest(&name, &String::from(&digest)).await?;
    let response = DeleteResponse {
        success: status.is_success(),
        status: status.as_u16(),
    };
    let status = if status.is_success() {
        StatusCode::OK
    } else if status.is_client_error() || status.is_server_error() {
        status
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((status, Json(response)).into_response())
}

#[cfg(test)]
mod test {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    use super::super::test_support::*;
    use super::*;
    use crate::registry::testing::FakeRegistry;

    const INDEX: &str = r#"{"manifests":[
        {"digest":"sha256:aaaa","platform":{"architecture":"arm64","os":"linux"}},
        {"digest":"sha256:bbbb","platform":{"architecture":"amd64","os":"linux"}}
    ]}"#;

    #[tokio::test]
    async fn get_resolves_index() {
        let fake = FakeRegistry::new();
        fake.respond_with_digest("GET", "/v2/app/manifests/latest", 200, INDEX, "sha256:1dx");
        fake.respond(
            "GET",
            "/v2/app/manifests/sha256:bbbb",
            200,
            r#"{"config":{"size":1},"layers":[{"size":2},{"size":3}]}"#,
        );
        let console = console(&fake);

        let response = call_authenticated(
            &console,
            "GET",
            "/api/registry/repositories/app/manifests/latest",
            Body::empty(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(&DOCKER_CONTENT_DIGEST)
                .and_then(|v| v.to_str().ok()),
            Some("sha256:1dx")
        );
        let body = json_body(response).await;
        assert_eq!(body["digest"], "sha256:1dx");
        assert_eq!(body["size"], 6);
        assert_eq!(body["layerCount"], 2);
        assert_eq!(body["architecture"], "amd64");
        assert_eq!(body["manifest"]["layers"][1]["size"], 3);
    }

    #[tokio::test]
    async fn get_missing_manifest_is_404() {
        let fake = FakeRegistry::new();
        let console = console(&fake);
        let response = call_authenticated(
            &console,
            "GET",
            "/api/registry/repositories/app/manifests/nope",
            Body::empty(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn head_mirrors_upstream() {
        let fake = FakeRegistry::new();
        fake.respond_with_digest("HEAD", "/v2/app/manifests/v1", 200, "", "sha256:ffff");
        let console = console(&fake);
        let request = Request::builder()
            .method("HEAD")
            .uri("/api/registry/repositories/app/manifests/v1")
            .header(http::header::AUTHORIZATION, basic_auth())
            .body(Body::empty())
            .unwrap();

        let response = call(&console, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(&DOCKER_CONTENT_DIGEST)
                .and_then(|v| v.to_str().ok()),
            Some("sha256:ffff")
        );
        assert_eq!(fake.calls()[0].accept.as_deref(), Some(DOCKER_MANIFEST_V2));
    }

    #[tokio::test]
    async fn delete_requires_digest() {
        let fake = FakeRegistry::new();
        let console = console(&fake);
        let response = call_authenticated(
            &console,
            "DELETE",
            "/api/registry/repositories/app/manifests/latest",
            Body::empty(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_by_digest() {
        let fake = FakeRegistry::new();
        fake.respond("DELETE", "/v2/app/manifests/sha256:abcd", 202, "");
        let console = console(&fake);
        let response = call_authenticated(
            &console,
            "DELETE",
            "/api/registry/repositories/app/manifests/sha256:abcd",
            Body::empty(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["status"], 202);
    }
}
