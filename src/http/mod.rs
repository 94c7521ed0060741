//! # Console HTTP
//!
//! Axum boundary for the admin console. Every route except the version check sits behind
//! [`auth::require_basic_auth`], which checks the caller's HTTP Basic credentials against the
//! configured pair and hands the matching [`RegistrySession`](crate::registry::RegistrySession)
//! to handlers as a request extension.
//!
//! Repository names containing `/` must be percent-encoded (`library%2Fnginx`) so they occupy a
//! single path segment.
use std::str::FromStr;
use std::sync::Arc;

use axum::http::header::{self, HeaderName, HeaderValue};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use http::Response as HttpResponse;
use http_body::Body;
use serde::{de, Deserialize, Deserializer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{self, TraceLayer};

mod errors;
pub(crate) use errors::Error;
pub(crate) use errors::Result;

pub(crate) mod auth;
mod analytics;
mod catalog;
mod manifests;
mod repositories;
mod tag_details;
mod tags;
mod version;

use crate::config::Config;
use crate::registry::Upstream;

/// Serde deserialization decorator to map empty Strings to None,
fn empty_string_as_none<'de, D, T>(de: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let opt = Option::<String>::deserialize(de)?;
    match opt.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => FromStr::from_str(s).map_err(de::Error::custom).map(Some),
    }
}

fn maybe_get_content_length(response: &HttpResponse<impl Body>) -> Option<HeaderValue> {
    response.body().size_hint().exact().map(HeaderValue::from)
}

/// Shared state of the console: the upstream transport and the process configuration. Both are
/// immutable after startup.
#[derive(Clone)]
pub struct Console {
    upstream: Arc<dyn Upstream>,
    config: Arc<Config>,
}

impl Console {
    pub fn new(upstream: Arc<dyn Upstream>, config: Config) -> Self {
        if config.credentials.is_none() {
            tracing::warn!("registry credentials not configured, all authenticated routes will reject");
        }
        Self {
            upstream,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn upstream(&self) -> Arc<dyn Upstream> {
        self.upstream.clone()
    }

    /// Return the [`axum::Router`] serving the console API.
    pub fn router(&self) -> Result<axum::Router> {
        let repository = Router::new()
            .route("/:name", axum::routing::delete(repositories::delete_repository))
            .route("/:name/tags", get(tags::list_tags))
            .route("/:name/tags/:tag", get(tags::get_tag_detail))
            .route(
                "/:name/manifests/:reference",
                get(manifests::get_manifest)
                    .head(manifests::head_manifest)
                    .delete(manifests::delete_manifest),
            );

        let authenticated = Router::new()
            .route("/api/registry/catalog", get(catalog::list_catalog))
            .nest("/api/registry/repositories", repository)
            .route("/api/tag-details", post(tag_details::tag_details))
            .route("/api/registry-analytics", get(analytics::registry_analytics))
            .route_layer(middleware::from_fn_with_state(
                self.clone(),
                auth::require_basic_auth,
            ));

        let app = Router::new()
            .route("/api/registry/version", get(version::version))
            .merge(authenticated)
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace::DefaultMakeSpan::new())
                    .on_response(trace::DefaultOnResponse::new())
                    .on_request(trace::DefaultOnRequest::new()),
            )
            .layer(SetResponseHeaderLayer::if_not_present(
                HeaderName::from_str("content-type")?,
                HeaderValue::from_str("application/json")?,
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::CONTENT_LENGTH,
                maybe_get_content_length,
            ))
            .with_state(self.clone());

        Ok(app)
    }
}
