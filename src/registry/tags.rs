//! Tag and catalog listing.
//!
//! Both endpoints share the distribution-spec pagination convention: `n` and `last` query
//! parameters on the request, and a `Link: <url>; rel="next"` header on the response when
//! another page exists. Nothing here drains pages automatically; callers that omit pagination
//! get whatever the registry returns for a single unparameterized request.
use http::{Method, StatusCode};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::client::{RegistrySession, UpstreamRequest};
use crate::errors::{Error, Result};

/// Pagination cursor for list endpoints.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Pagination {
    pub n: Option<u32>,
    pub last: Option<String>,
}

impl Pagination {
    fn apply(&self, mut request: UpstreamRequest) -> UpstreamRequest {
        if let Some(n) = self.n {
            request = request.query("n", n.to_string());
        }
        if let Some(last) = self.last.as_ref().filter(|l| !l.is_empty()) {
            request = request.query("last", last.clone());
        }
        request
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next: bool,
    pub next_url: Option<String>,
}

impl PageInfo {
    pub fn from_link_header(link: Option<&str>) -> Self {
        let next_url = link.and_then(next_link);
        Self {
            has_next: next_url.is_some(),
            next_url,
        }
    }
}

/// Extract the target of the `rel="next"` entry from a `Link` header value.
pub fn next_link(link: &str) -> Option<String> {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"<([^>]+)>\s*;\s*rel="?next"?"#).unwrap());
    RE.captures(link)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagPage {
    pub name: String,
    pub tags: Vec<String>,
    pub pagination: PageInfo,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPage {
    pub repositories: Vec<String>,
    pub pagination: PageInfo,
    /// Raw `Link` header, forwarded as-is to callers who want to follow it themselves.
    #[serde(skip)]
    pub link: Option<String>,
}

// registries return `"tags": null` for repositories whose tags have all been deleted
#[derive(Deserialize)]
struct RawTagList {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct RawCatalog {
    #[serde(default)]
    repositories: Option<Vec<String>>,
}

impl RegistrySession {
    /// List one page of tags for `repository`.
    pub async fn list_tags(&self, repository: &str, pagination: &Pagination) -> Result<TagPage> {
        let request = UpstreamRequest::new(Method::GET, format!("/v2/{repository}/tags/list"))
            .accept("application/json");
        let response = self.send(pagination.apply(request)).await?;

        if response.status == StatusCode::NOT_FOUND {
            return Err(Error::RepositoryNotFound(repository.to_string()));
        }
        if !response.is_success() {
            return Err(response.status_error());
        }

        let raw: RawTagList = serde_json::from_slice(&response.body).map_err(|e| {
            Error::MalformedResponse(format!("tag list for {repository}: {e}"))
        })?;

        Ok(TagPage {
            name: raw.name.unwrap_or_else(|| repository.to_string()),
            tags: raw.tags.unwrap_or_default(),
            pagination: PageInfo::from_link_header(response.link()),
        })
    }

    /// List one page of the registry catalog.
    pub async fn list_catalog(&self, pagination: &Pagination) -> Result<CatalogPage> {
        let request =
            UpstreamRequest::new(Method::GET, "/v2/_catalog").accept("application/json");
        let response = self.send(pagination.apply(request)).await?;

        if !response.is_success() {
            return Err(response.status_error());
        }

        let raw: RawCatalog = serde_json::from_slice(&response.body)
            .map_err(|e| Error::MalformedResponse(format!("catalog: {e}")))?;

        Ok(CatalogPage {
            repositories: raw.repositories.unwrap_or_default(),
            pagination: PageInfo::from_link_header(response.link()),
            link: response.link().map(String::from),
        })
    }
}
