//! Manifest resolution and size accounting.
//!
//! Registries hand back one of two very different documents from
//! `/v2/<name>/manifests/<reference>` depending on the image: a single-architecture manifest
//! with a config blob and layers, or a multi-architecture index that only points at other
//! manifests. [`ManifestSpec`] captures that distinction once so nothing downstream has to inspect
//! JSON fields to find out which one it is holding.
use bytes::Bytes;
use http::{Method, StatusCode};
use oci_spec::image::MediaType;
use serde::{Deserialize, Serialize};

use super::client::{RegistrySession, UpstreamRequest};
use super::types::{lenient, lenient_size};
use crate::errors::{Error, Result};
use crate::oci_digest::ManifestRef;

pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";

pub const PREFERRED_ARCHITECTURE: &str = "amd64";
pub const PREFERRED_OS: &str = "linux";

/// `Accept` value for a manifest fetch that may return either an index or a single manifest, in
/// preference order.
pub fn any_manifest_accept() -> String {
    [
        DOCKER_MANIFEST_LIST.to_string(),
        MediaType::ImageIndex.to_string(),
        DOCKER_MANIFEST_V2.to_string(),
        MediaType::ImageManifest.to_string(),
    ]
    .join(", ")
}

/// `Accept` value for a fetch that must yield a single-architecture manifest.
pub fn single_manifest_accept() -> String {
    [
        DOCKER_MANIFEST_V2.to_string(),
        MediaType::ImageManifest.to_string(),
    ]
    .join(", ")
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    #[serde(default, deserialize_with = "lenient")]
    pub architecture: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub os: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default, deserialize_with = "lenient")]
    pub media_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub digest: Option<String>,
    #[serde(default, deserialize_with = "lenient_size")]
    pub size: u64,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

/// Single-architecture manifest (Docker v2 schema 2 or OCI image manifest).
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    #[serde(default, deserialize_with = "lenient")]
    pub schema_version: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub media_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub config: Option<Descriptor>,
    #[serde(default, deserialize_with = "lenient")]
    pub layers: Vec<Descriptor>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
}

/// Multi-architecture manifest list or OCI image index. Never carries layers of its own.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestIndex {
    #[serde(default, deserialize_with = "lenient")]
    pub schema_version: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub media_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub manifests: Vec<Descriptor>,
}

impl ManifestIndex {
    /// Pick the linux/amd64 entry, or the first entry when there isn't one.
    pub fn select_platform(&self) -> Option<&Descriptor> {
        self.manifests
            .iter()
            .find(|d| {
                d.platform.as_ref().map_or(false, |p| {
                    p.architecture.as_deref() == Some(PREFERRED_ARCHITECTURE)
                        && p.os.as_deref() == Some(PREFERRED_OS)
                })
            })
            .or_else(|| self.manifests.first())
    }
}

/// Decoded manifest response body.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ManifestSpec {
    Image(ImageManifest),
    Index(ManifestIndex),
    /// Body that wasn't a JSON object. Kept verbatim; contributes nothing to sizes.
    Opaque(String),
}

impl From<&[u8]> for ManifestSpec {
    fn from(bs: &[u8]) -> Self {
        let value: serde_json::Value = match serde_json::from_slice(bs) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("manifest body is not json: {e}");
                return ManifestSpec::Opaque(String::from_utf8_lossy(bs).into_owned());
            }
        };
        if !value.is_object() {
            return ManifestSpec::Opaque(value.to_string());
        }

        let is_index = value
            .get("manifests")
            .and_then(|m| m.as_array())
            .map_or(false, |m| !m.is_empty());
        if is_index {
            if let Ok(index) = serde_json::from_value::<ManifestIndex>(value.clone()) {
                return ManifestSpec::Index(index);
            }
        }
        match serde_json::from_value::<ImageManifest>(value.clone()) {
            Ok(m) => ManifestSpec::Image(m),
            Err(_) => ManifestSpec::Opaque(value.to_string()),
        }
    }
}

/// Byte size and layer count of one resolved image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSize {
    pub total_size: u64,
    pub layer_count: usize,
}

impl ImageManifest {
    /// `sum(layer sizes) + config size`. The single definition of image size used everywhere a
    /// size is reported.
    pub fn image_size(&self) -> ImageSize {
        // absurd declared sizes pin the total at u64::MAX
        let layers = self.layers.iter().map(|l| l.size).fold(0, u64::saturating_add);
        let config = self.config.as_ref().map_or(0, |c| c.size);
        ImageSize {
            total_size: layers.saturating_add(config),
            layer_count: self.layers.len(),
        }
    }

    pub fn config_digest(&self) -> Option<&str> {
        self.config
            .as_ref()
            .and_then(|c| c.digest.as_deref())
            .filter(|d| !d.is_empty())
    }
}

impl ManifestSpec {
    pub fn image_size(&self) -> ImageSize {
        match self {
            ManifestSpec::Image(m) => m.image_size(),
            ManifestSpec::Index(_) | ManifestSpec::Opaque(_) => ImageSize::default(),
        }
    }

    pub fn as_image(&self) -> Option<&ImageManifest> {
        match self {
            ManifestSpec::Image(m) => Some(m),
            _ => None,
        }
    }
}

/// Outcome of resolving a tag or digest down to a single-architecture manifest.
#[derive(Clone, Debug)]
pub struct ResolvedManifest {
    /// `Docker-Content-Digest` of the first response. For an index this is the index digest, not
    /// the digest of the platform manifest picked from it.
    pub digest: Option<String>,
    /// The working manifest. Still an index if the platform-specific fetch failed.
    pub manifest: ManifestSpec,
    /// Platform of the index entry that was followed, if any.
    pub platform: Option<Platform>,
    pub media_type: Option<String>,
    pub body: Bytes,
}

impl ResolvedManifest {
    pub fn image_size(&self) -> ImageSize {
        self.manifest.image_size()
    }

    /// Architecture declared by the manifest itself, else by the index entry that led to it.
    pub fn architecture(&self) -> Option<&str> {
        self.manifest
            .as_image()
            .and_then(|m| m.architecture.as_deref())
            .or_else(|| self.platform.as_ref().and_then(|p| p.architecture.as_deref()))
    }

    pub fn os(&self) -> Option<&str> {
        self.manifest
            .as_image()
            .and_then(|m| m.os.as_deref())
            .or_else(|| self.platform.as_ref().and_then(|p| p.os.as_deref()))
    }
}

impl RegistrySession {
    /// Fetch `reference` in `repository`, following an index to its linux/amd64 (or first)
    /// entry. At most two upstream calls.
    pub async fn resolve_manifest(
        &self,
        repository: &str,
        reference: &ManifestRef,
    ) -> Result<ResolvedManifest> {
        let request = UpstreamRequest::new(
            Method::GET,
            format!("/v2/{repository}/manifests/{reference}"),
        )
        .accept(any_manifest_accept());
        let response = self.send(request).await?;

        if !response.is_success() {
            return Err(Error::ManifestNotFound {
                repository: repository.to_string(),
                reference: reference.to_string(),
                status: response.status,
            });
        }

        let digest = response.content_digest().map(String::from).or(match reference {
            ManifestRef::Digest(d) => Some(d.to_string()),
            ManifestRef::Tag(_) => None,
        });
        let media_type = response
            .header_str(&http::header::CONTENT_TYPE)
            .map(String::from);
        let manifest = ManifestSpec::from(response.body.as_ref());

        let mut resolved = ResolvedManifest {
            digest,
            manifest,
            platform: None,
            media_type,
            body: response.body,
        };

        let entry = match &resolved.manifest {
            ManifestSpec::Index(index) => index.select_platform().cloned(),
            _ => return Ok(resolved),
        };
        let Some(entry) = entry else {
            return Ok(resolved);
        };
        resolved.platform = entry.platform.clone();
        let Some(entry_digest) = entry.digest.filter(|d| !d.is_empty()) else {
            tracing::warn!(repository, %reference, "index entry has no digest");
            return Ok(resolved);
        };

        let request = UpstreamRequest::new(
            Method::GET,
            format!("/v2/{repository}/manifests/{entry_digest}"),
        )
        .accept(single_manifest_accept());
        match self.send(request).await {
            Ok(r) if r.is_success() => {
                resolved.media_type = r
                    .header_str(&http::header::CONTENT_TYPE)
                    .map(String::from);
                resolved.manifest = ManifestSpec::from(r.body.as_ref());
                resolved.body = r.body;
            }
            Ok(r) => {
                tracing::warn!(
                    repository,
                    %reference,
                    digest = %entry_digest,
                    status = %r.status,
                    "platform manifest fetch failed, keeping index"
                );
            }
            Err(e) => {
                tracing::warn!(
                    repository,
                    %reference,
                    digest = %entry_digest,
                    "platform manifest fetch failed, keeping index: {e}"
                );
            }
        }

        Ok(resolved)
    }

    /// `HEAD` a manifest and return its `Docker-Content-Digest`, if the registry sent one.
    pub async fn manifest_digest(
        &self,
        repository: &str,
        reference: &ManifestRef,
    ) -> Result<Option<String>> {
        let request = UpstreamRequest::new(
            Method::HEAD,
            format!("/v2/{repository}/manifests/{reference}"),
        )
        .accept(DOCKER_MANIFEST_V2);
        let response = self.send(request).await?;

        if !response.is_success() {
            return Err(Error::ManifestNotFound {
                repository: repository.to_string(),
                reference: reference.to_string(),
                status: response.status,
            });
        }
        Ok(response.content_digest().map(String::from))
    }

    /// `DELETE /v2/<name>/manifests/<digest>`. Returns the upstream status; callers decide what a
    /// non-2xx means for them.
    pub async fn delete_manifest(&self, repository: &str, digest: &str) -> Result<StatusCode> {
        let request =
            UpstreamRequest::new(Method::DELETE, format!("/v2/{repository}/manifests/{digest}"));
        let response = self.send(request).await?;
        if !response.is_success() {
            tracing::warn!(repository, digest, status = %response.status, "manifest delete rejected");
        }
        Ok(response.status)
    }
}
