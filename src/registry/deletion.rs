use std::str::FromStr;

use serde::Serialize;

use super::client::RegistrySession;
use super::tags::Pagination;
use crate::errors::{Error, Result};
use crate::oci_digest::{ManifestRef, OciDigest};

/// Attached to every deletion report. Deleting a manifest only unlinks it; blob storage is
/// reclaimed by the registry's own garbage collector.
pub const GC_NOTE: &str =
    "You may need to run garbage-collect on the registry host to free up space.";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestOutcome {
    pub tag: String,
    pub digest: String,
    pub deleted: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReport {
    pub success: bool,
    pub repository_name: String,
    pub total_tags: usize,
    pub deleted_tags: usize,
    /// Counted per tag: two tags sharing one digest count twice when both deletes succeed.
    pub deleted_manifests: usize,
    pub manifests: Vec<ManifestOutcome>,
    pub errors: Vec<String>,
    pub note: &'static str,
}

impl DeletionReport {
    fn new(repository: &str, total_tags: usize) -> Self {
        Self {
            success: false,
            repository_name: repository.to_string(),
            total_tags,
            deleted_tags: 0,
            deleted_manifests: 0,
            manifests: Vec::new(),
            errors: Vec::new(),
            note: GC_NOTE,
        }
    }

    fn finish(mut self) -> Self {
        let deleted = self.manifests.iter().filter(|m| m.deleted).count();
        self.deleted_tags = deleted;
        self.deleted_manifests = deleted;
        self.success = self.errors.is_empty();
        self
    }
}

impl RegistrySession {
    /// Delete every tagged manifest in `repository`.
    ///
    /// Tags are processed one at a time: `HEAD` for the digest, then `DELETE` by digest. A tag
    /// that fails either step is recorded in the report's `errors` and the run moves on. Only a
    /// repository that can't be listed at all fails the call.
    pub async fn delete_repository(&self, repository: &str) -> Result<DeletionReport> {
        let tags = self.list_tags(repository, &Pagination::default()).await?.tags;
        tracing::info!(repository, tags = tags.len(), "deleting repository manifests");

        let mut report = DeletionReport::new(repository, tags.len());
        for tag in &tags {
            match self.delete_tag(repository, tag).await {
                Ok(outcome) => {
                    if !outcome.deleted {
                        report.errors.push(format!(
                            "Delete failed for tag {} (digest {})",
                            outcome.tag, outcome.digest
                        ));
                    }
                    report.manifests.push(outcome);
                }
                Err(message) => {
                    tracing::warn!(repository, tag = %tag, "{message}");
                    report.errors.push(message);
                }
            }
        }

        let report = report.finish();
        tracing::info!(
            repository,
            deleted = report.deleted_tags,
            errors = report.errors.len(),
            "repository deletion finished"
        );
        Ok(report)
    }

    /// Resolve and delete a single tag. `Err` carries the message recorded in the report when the
    /// tag never reached the delete step.
    async fn delete_tag(&self, repository: &str, tag: &str) -> std::result::Result<ManifestOutcome, String> {
        let reference =
            ManifestRef::from_str(tag).map_err(|e| format!("Error deleting tag {tag}: {e}"))?;

        let digest = match self.manifest_digest(repository, &reference).await {
            Ok(Some(digest)) => digest,
            Ok(None) => return Err(format!("No digest for tag {tag}")),
            Err(Error::ManifestNotFound { status, .. }) => {
                return Err(format!("HEAD failed for tag {tag}: {}", status.as_u16()))
            }
            Err(e) => return Err(format!("Error deleting tag {tag}: {e}")),
        };
        // an unparseable header is as good as no header
        let digest = OciDigest::try_from(digest.as_str())
            .map_err(|_| format!("No digest for tag {tag}"))?;

        let digest = String::from(&digest);
        let deleted = match self.delete_manifest(repository, &digest).await {
            Ok(status) => status.is_success(),
            Err(e) => return Err(format!("Error deleting tag {tag}: {e}")),
        };

        Ok(ManifestOutcome {
            tag: tag.to_string(),
            digest,
            deleted,
        })
    }
}
