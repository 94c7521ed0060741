//! Client-side view of a Distribution Spec registry.
//!
//! Everything here hangs off [`RegistrySession`], an [`Upstream`] transport bound to one caller's
//! credentials. Reads never touch upstream state and nothing is cached between calls: every tag
//! detail, repository record and analytics summary is recomputed from the registry on demand.
pub mod client;
pub use client::{HttpUpstream, RegistrySession, Upstream, UpstreamRequest, UpstreamResponse};

pub mod tags;
pub use tags::{CatalogPage, PageInfo, Pagination, TagPage};

pub mod manifests;
pub use manifests::{ImageManifest, ImageSize, ManifestIndex, ManifestSpec, ResolvedManifest};

pub mod config_blob;
pub use config_blob::ImageConfig;

pub mod types;
pub use types::TagDetail;

pub mod details;
pub use details::fallback_created;

pub mod catalog;
pub use catalog::{CatalogAggregator, Insights, RegistryAnalytics, RepositoryRecord, Summary};

pub mod deletion;
pub use deletion::{DeletionReport, ManifestOutcome, GC_NOTE};

#[cfg(test)]
pub(crate) mod testing;
