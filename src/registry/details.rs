use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};

use super::client::RegistrySession;
use super::types::TagDetail;
use crate::errors::Result;
use crate::oci_digest::ManifestRef;

/// Timestamp used for `created` when an image config doesn't provide one. Computed once per
/// request so every tag in a response shares the same fallback.
pub fn fallback_created(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl RegistrySession {
    /// Resolve `tag` and build its [`TagDetail`]: manifest resolution, size accounting, then
    /// config inspection. Fails only when the tag itself can't be resolved; a config blob that
    /// can't be read leaves the manifest-derived fields in place.
    pub async fn tag_detail(
        &self,
        repository: &str,
        tag: &str,
        fallback_created: &str,
    ) -> Result<TagDetail> {
        let reference = ManifestRef::from_str(tag)?;
        let resolved = self.resolve_manifest(repository, &reference).await?;

        let size = resolved.image_size();
        let mut detail = TagDetail {
            name: tag.to_string(),
            digest: resolved.digest.clone().unwrap_or_default(),
            size: size.total_size,
            created: fallback_created.to_string(),
            architecture: resolved.architecture().map(String::from),
            os: resolved.os().map(String::from),
            layer_count: Some(size.layer_count),
            ..Default::default()
        };

        let config_digest = resolved.manifest.as_image().and_then(|m| m.config_digest());
        if let Some(config_digest) = config_digest {
            match self.fetch_image_config(repository, config_digest).await {
                Ok(config) => config.apply_to(&mut detail),
                Err(e) => {
                    tracing::warn!(repository, tag, config_digest, "unable to inspect image config: {e}");
                }
            }
        }

        Ok(detail)
    }

    /// Like [`RegistrySession::tag_detail`] but never fails; a tag that can't be resolved comes
    /// back with `error` set and zero size.
    pub async fn describe_tag(&self, repository: &str, tag: &str, fallback_created: &str) -> TagDetail {
        match self.tag_detail(repository, tag, fallback_created).await {
            Ok(detail) => detail,
            Err(e) => {
                tracing::warn!(repository, tag, "unable to resolve manifest: {e}");
                TagDetail::failed(tag, fallback_created, e.to_string())
            }
        }
    }
}
