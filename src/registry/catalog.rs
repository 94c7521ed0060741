//! Registry-wide aggregation.
//!
//! Every repository is aggregated independently: its tags are resolved as soon as its own tag
//! listing returns. All upstream calls of one run share a single pool of permits, so a slow
//! repository holds at most the permits it is actually using. Output order follows the
//! registry's order regardless of which requests finish first.
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Semaphore;

use super::client::RegistrySession;
use super::details::fallback_created;
use super::tags::Pagination;
use super::types::TagDetail;
use crate::errors::Result;

const LARGEST_REPOSITORIES: usize = 10;
const UNKNOWN_ARCHITECTURE: &str = "unknown";

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRecord {
    pub name: String,
    pub tags: Vec<TagDetail>,
    pub total_size: u64,
    pub layer_count: usize,
    pub tag_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RepositoryRecord {
    fn failed(name: &str, error: String) -> Self {
        Self {
            name: name.to_string(),
            error: Some(error),
            ..Default::default()
        }
    }

    fn tally(&mut self) {
        self.tag_count = self.tags.len();
        self.total_size = self.tags.iter().map(|t| t.size).fold(0, u64::saturating_add);
        self.layer_count = self.tags.iter().map(TagDetail::layer_count).sum();
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_repositories: usize,
    pub total_tags: usize,
    pub total_size: u64,
    pub total_layers: usize,
    pub average_repo_size: f64,
    pub average_tags_per_repo: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub largest_repositories: Vec<RepositoryRecord>,
    pub architecture_distribution: BTreeMap<String, usize>,
    pub repositories_with_errors: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryAnalytics {
    pub summary: Summary,
    pub repositories: Vec<RepositoryRecord>,
    pub insights: Insights,
}

impl RegistryAnalytics {
    /// Derive the registry-wide summary and insights from finished repository records.
    pub fn from_repositories(repositories: Vec<RepositoryRecord>) -> Self {
        let total_repositories = repositories.len();
        let total_tags: usize = repositories.iter().map(|r| r.tag_count).sum();
        let total_size = repositories
            .iter()
            .map(|r| r.total_size)
            .fold(0, u64::saturating_add);
        let total_layers: usize = repositories.iter().map(|r| r.layer_count).sum();
        let (average_repo_size, average_tags_per_repo) = if total_repositories > 0 {
            (
                total_size as f64 / total_repositories as f64,
                total_tags as f64 / total_repositories as f64,
            )
        } else {
            (0.0, 0.0)
        };

        let mut largest_repositories: Vec<RepositoryRecord> = repositories
            .iter()
            .filter(|r| r.error.is_none())
            .cloned()
            .collect();
        // stable sort keeps registry order among equally sized repositories
        largest_repositories.sort_by(|a, b| b.total_size.cmp(&a.total_size));
        largest_repositories.truncate(LARGEST_REPOSITORIES);

        let mut architecture_distribution = BTreeMap::new();
        for tag in repositories.iter().flat_map(|r| r.tags.iter()) {
            let arch = tag
                .architecture
                .as_deref()
                .filter(|a| !a.is_empty())
                .unwrap_or(UNKNOWN_ARCHITECTURE);
            *architecture_distribution.entry(arch.to_string()).or_insert(0) += 1;
        }

        let repositories_with_errors = repositories.iter().filter(|r| r.error.is_some()).count();

        Self {
            summary: Summary {
                total_repositories,
                total_tags,
                total_size,
                total_layers,
                average_repo_size,
                average_tags_per_repo,
            },
            repositories,
            insights: Insights {
                largest_repositories,
                architecture_distribution,
                repositories_with_errors,
            },
        }
    }
}

/// Aggregates tag, size and architecture data across the whole catalog.
#[derive(Clone)]
pub struct CatalogAggregator {
    session: RegistrySession,
    concurrency: usize,
}

impl CatalogAggregator {
    pub fn new(session: RegistrySession, concurrency: usize) -> Self {
        Self {
            session,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch the catalog (single unpaginated request) and aggregate every repository in it. Only
    /// a failure to retrieve the catalog itself is returned as an error.
    pub async fn analyze(&self) -> Result<RegistryAnalytics> {
        let catalog = self.session.list_catalog(&Pagination::default()).await?;
        Ok(self.analyze_repositories(catalog.repositories).await)
    }

    /// Describe an explicit list of tags from one repository, in the order given. Per-tag
    /// failures are reported inline.
    pub async fn describe_tags(&self, repository: &str, tags: &[String]) -> Vec<TagDetail> {
        let fallback = fallback_created(Utc::now());
        stream::iter(tags.to_vec())
            .map(|tag| {
                let session = self.session.clone();
                let repository = repository.to_string();
                let fallback = fallback.clone();
                async move { session.describe_tag(&repository, &tag, &fallback).await }
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }

    pub async fn analyze_repositories(&self, names: Vec<String>) -> RegistryAnalytics {
        tracing::info!(repositories = names.len(), "aggregating registry catalog");
        let pool = UpstreamPool {
            session: self.session.clone(),
            permits: Arc::new(Semaphore::new(self.concurrency)),
            width: self.concurrency,
            fallback: fallback_created(Utc::now()),
        };

        // every repository runs at once; only upstream calls wait on the pool
        let width = names.len().max(1);
        let repositories: Vec<RepositoryRecord> = stream::iter(names)
            .map(|name| {
                let pool = pool.clone();
                async move { pool.aggregate_repository(name).await }
            })
            .buffered(width)
            .collect()
            .await;

        RegistryAnalytics::from_repositories(repositories)
    }
}

/// Upstream work for one aggregation run. Tag listings and per-tag resolutions draw from the
/// same permits, so total in-flight upstream work never exceeds `width`.
#[derive(Clone)]
struct UpstreamPool {
    session: RegistrySession,
    permits: Arc<Semaphore>,
    width: usize,
    fallback: String,
}

impl UpstreamPool {
    async fn aggregate_repository(&self, name: String) -> RepositoryRecord {
        let listing = {
            let _permit = self.permits.acquire().await;
            self.session.list_tags(&name, &Pagination::default()).await
        };
        let tags = match listing {
            Ok(page) => page.tags,
            Err(e) => {
                tracing::warn!(repository = %name, "unable to list tags: {e}");
                return RepositoryRecord::failed(&name, e.to_string());
            }
        };

        let tags: Vec<TagDetail> = stream::iter(tags)
            .map(|tag| {
                let pool = self.clone();
                let name = name.clone();
                async move {
                    let _permit = pool.permits.acquire().await;
                    pool.session.describe_tag(&name, &tag, &pool.fallback).await
                }
            })
            .buffered(self.width)
            .collect()
            .await;

        let mut record = RepositoryRecord {
            name,
            tags,
            ..Default::default()
        };
        record.tally();
        record
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::registry::testing::FakeRegistry;

    fn image(layer: u64, config: u64) -> String {
        format!(
            r#"{{"schemaVersion":2,"config":{{"digest":"sha256:cfg{layer}","size":{config}}},"layers":[{{"size":{layer}}}]}}"#
        )
    }

    fn arch_config(arch: &str) -> String {
        format!(r#"{{"architecture":"{arch}","os":"linux","created":"2023-01-01T00:00:00Z"}}"#)
    }

    #[tokio::test]
    async fn repository_failure_is_isolated() {
        let fake = FakeRegistry::new();
        fake.respond("GET", "/v2/_catalog", 200, r#"{"repositories":["app","web"]}"#);
        fake.respond("GET", "/v2/app/tags/list", 200, r#"{"name":"app","tags":["latest","v1"]}"#);
        fake.respond("GET", "/v2/web/tags/list", 500, "");
        fake.respond_with_digest("GET", "/v2/app/manifests/latest", 200, &image(100, 50), "sha256:a");
        fake.respond_with_digest("GET", "/v2/app/manifests/v1", 200, &image(300, 50), "sha256:b");
        fake.respond("GET", "/v2/app/blobs/sha256:cfg100", 200, &arch_config("amd64"));
        fake.respond("GET", "/v2/app/blobs/sha256:cfg300", 200, &arch_config("arm64"));

        let analytics = CatalogAggregator::new(fake.session(), 4)
            .analyze()
            .await
            .unwrap();

        assert_eq!(analytics.repositories.len(), 2);
        let app = &analytics.repositories[0];
        assert_eq!(app.name, "app");
        assert!(app.error.is_none());
        assert_eq!(app.tag_count, 2);
        assert_eq!(app.total_size, 500);
        assert_eq!(app.layer_count, 2);
        assert_eq!(
            app.tags.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            vec!["latest", "v1"]
        );

        let web = &analytics.repositories[1];
        assert_eq!(web.name, "web");
        assert!(web.tags.is_empty());
        assert!(web.error.is_some());
        assert_eq!(web.total_size, 0);

        let summary = &analytics.summary;
        assert_eq!(summary.total_repositories, 2);
        assert_eq!(summary.total_tags, 2);
        assert_eq!(summary.total_size, 500);
        assert_eq!(summary.total_layers, 2);
        assert_eq!(summary.average_repo_size, 250.0);
        assert_eq!(summary.average_tags_per_repo, 1.0);

        let insights = &analytics.insights;
        assert_eq!(insights.repositories_with_errors, 1);
        assert_eq!(insights.largest_repositories.len(), 1);
        assert_eq!(insights.largest_repositories[0].name, "app");
        assert_eq!(insights.architecture_distribution.get("amd64"), Some(&1));
        assert_eq!(insights.architecture_distribution.get("arm64"), Some(&1));
    }

    #[tokio::test]
    async fn failed_tags_count_as_unknown_and_zero_size() {
        let fake = FakeRegistry::new();
        fake.respond("GET", "/v2/app/tags/list", 200, r#"{"tags":["ok","broken"]}"#);
        fake.respond("GET", "/v2/app/manifests/ok", 200, &image(10, 5));
        fake.respond("GET", "/v2/app/blobs/sha256:cfg10", 200, &arch_config("amd64"));

        let analytics = CatalogAggregator::new(fake.session(), 2)
            .analyze_repositories(vec!["app".to_string()])
            .await;

        let app = &analytics.repositories[0];
        assert_eq!(app.tag_count, 2);
        assert_eq!(app.total_size, 15);
        assert!(app.tags[1].error.is_some());
        assert_eq!(analytics.insights.architecture_distribution.get("unknown"), Some(&1));
        assert_eq!(analytics.insights.architecture_distribution.get("amd64"), Some(&1));
    }

    #[tokio::test]
    async fn empty_catalog() {
        let fake = FakeRegistry::new();
        fake.respond("GET", "/v2/_catalog", 200, r#"{"repositories":[]}"#);
        let analytics = CatalogAggregator::new(fake.session(), 4)
            .analyze()
            .await
            .unwrap();
        assert_eq!(analytics.summary, Summary::default());
        assert!(analytics.repositories.is_empty());
        assert_eq!(analytics.insights.repositories_with_errors, 0);
    }

    #[tokio::test]
    async fn catalog_failure_propagates() {
        let fake = FakeRegistry::new();
        fake.respond("GET", "/v2/_catalog", 401, "");
        assert!(CatalogAggregator::new(fake.session(), 4).analyze().await.is_err());
    }

    #[tokio::test]
    async fn concurrency_is_bounded_and_order_preserved() {
        let fake = FakeRegistry::new().with_delay(Duration::from_millis(5));
        let tags: Vec<String> = (0..12).map(|i| format!("t{i}")).collect();
        fake.respond(
            "GET",
            "/v2/app/tags/list",
            200,
            &serde_json::json!({ "tags": tags }).to_string(),
        );
        for (i, tag) in tags.iter().enumerate() {
            fake.respond("GET", &format!("/v2/app/manifests/{tag}"), 200, &image(i as u64, 0));
        }

        let analytics = CatalogAggregator::new(fake.session(), 3)
            .analyze_repositories(vec!["app".to_string()])
            .await;

        assert!(fake.max_in_flight() <= 3);
        let names: Vec<&str> = analytics.repositories[0]
            .tags
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, tags.iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(analytics.repositories[0].total_size, (0..12).sum::<u64>());
    }

    #[tokio::test]
    async fn slow_listing_does_not_hold_up_siblings() {
        let fake = FakeRegistry::new();
        fake.respond("GET", "/v2/_catalog", 200, r#"{"repositories":["app","slow"]}"#);
        fake.respond("GET", "/v2/app/tags/list", 200, r#"{"tags":["latest"]}"#);
        fake.respond("GET", "/v2/slow/tags/list", 200, r#"{"tags":["latest"]}"#);
        fake.delay_path("GET", "/v2/slow/tags/list", Duration::from_millis(300));
        fake.respond("GET", "/v2/app/manifests/latest", 200, &image(10, 1));
        fake.respond("GET", "/v2/slow/manifests/latest", 200, &image(20, 1));

        let analytics = CatalogAggregator::new(fake.session(), 16)
            .analyze()
            .await
            .unwrap();

        let paths: Vec<String> = fake.calls().into_iter().map(|c| c.path).collect();
        let position = |path: &str| paths.iter().position(|p| p == path).unwrap();
        assert!(position("/v2/app/manifests/latest") < position("/v2/slow/tags/list"));
        assert!(position("/v2/slow/tags/list") < position("/v2/slow/manifests/latest"));

        let names: Vec<&str> = analytics.repositories.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["app", "slow"]);
        assert_eq!(analytics.summary.total_size, 32);
    }

    #[tokio::test]
    async fn shared_pool_bounds_listings_and_tags_together() {
        let fake = FakeRegistry::new().with_delay(Duration::from_millis(5));
        let names: Vec<String> = (0..6).map(|i| format!("repo{i}")).collect();
        for name in &names {
            fake.respond("GET", &format!("/v2/{name}/tags/list"), 200, r#"{"tags":["a","b"]}"#);
            fake.respond("GET", &format!("/v2/{name}/manifests/a"), 200, &image(1, 0));
            fake.respond("GET", &format!("/v2/{name}/manifests/b"), 200, &image(2, 0));
        }

        let analytics = CatalogAggregator::new(fake.session(), 2)
            .analyze_repositories(names.clone())
            .await;

        assert!(fake.max_in_flight() <= 2);
        assert_eq!(
            analytics.repositories.iter().map(|r| r.name.clone()).collect::<Vec<_>>(),
            names
        );
        assert!(analytics.repositories.iter().all(|r| r.tag_count == 2));
    }

    #[test]
    fn totals_saturate_instead_of_overflowing() {
        let huge = |name: &str| RepositoryRecord {
            name: name.to_string(),
            tags: vec![
                TagDetail {
                    size: u64::MAX,
                    ..Default::default()
                },
                TagDetail {
                    size: 1,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let mut first = huge("a");
        first.tally();
        assert_eq!(first.total_size, u64::MAX);

        let analytics = RegistryAnalytics::from_repositories(vec![first.clone(), first]);
        assert_eq!(analytics.summary.total_size, u64::MAX);
    }

    #[test]
    fn largest_repositories_capped_and_sorted() {
        let repositories: Vec<RepositoryRecord> = (0..12u64)
            .map(|i| RepositoryRecord {
                name: format!("repo{i}"),
                total_size: i * 10,
                ..Default::default()
            })
            .collect();
        let analytics = RegistryAnalytics::from_repositories(repositories);
        let largest = &analytics.insights.largest_repositories;
        assert_eq!(largest.len(), 10);
        assert_eq!(largest[0].name, "repo11");
        assert_eq!(largest[9].name, "repo2");
    }
}
