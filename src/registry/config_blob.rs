use std::collections::BTreeMap;

use http::Method;
use serde::Deserialize;

use super::client::{RegistrySession, UpstreamRequest};
use super::types::{lenient, TagDetail};
use crate::errors::{Error, Result};

/// The subset of an image config blob (Docker image JSON or OCI image configuration) this crate
/// reports on. Every field is optional; anything malformed reads as absent.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ImageConfig {
    #[serde(default, deserialize_with = "lenient")]
    pub created: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub architecture: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub os: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub config: Option<ContainerConfig>,
    // older Docker builders only populate this one
    #[serde(default, deserialize_with = "lenient")]
    pub container_config: Option<ContainerConfig>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    #[serde(default, deserialize_with = "lenient")]
    pub cmd: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient")]
    pub entrypoint: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient")]
    pub env: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient")]
    pub working_dir: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub user: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub exposed_ports: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default, deserialize_with = "lenient")]
    pub volumes: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default, deserialize_with = "lenient")]
    pub labels: Option<BTreeMap<String, String>>,
}

impl ImageConfig {
    fn container(&self) -> Option<&ContainerConfig> {
        self.config.as_ref().or(self.container_config.as_ref())
    }

    /// Copy whatever this config declares onto `tag`. Fields the config doesn't carry are left
    /// alone, so values already taken from the manifest survive.
    pub fn apply_to(&self, tag: &mut TagDetail) {
        if let Some(created) = self.created.as_ref().filter(|c| !c.is_empty()) {
            tag.created = created.clone();
        }
        if let Some(architecture) = self.architecture.as_ref().filter(|a| !a.is_empty()) {
            tag.architecture = Some(architecture.clone());
        }
        if let Some(os) = self.os.as_ref().filter(|o| !o.is_empty()) {
            tag.os = Some(os.clone());
        }
        if self.author.is_some() {
            tag.author = self.author.clone();
        }

        let Some(container) = self.container() else {
            return;
        };
        if container.cmd.is_some() {
            tag.cmd = container.cmd.clone();
        }
        if container.entrypoint.is_some() {
            tag.entrypoint = container.entrypoint.clone();
        }
        if container.env.is_some() {
            tag.env = container.env.clone();
        }
        if container.working_dir.is_some() {
            tag.working_dir = container.working_dir.clone();
        }
        if container.user.is_some() {
            tag.user = container.user.clone();
        }
        if let Some(ports) = &container.exposed_ports {
            tag.exposed_ports = Some(ports.keys().cloned().collect());
        }
        if let Some(volumes) = &container.volumes {
            tag.volumes = Some(volumes.keys().cloned().collect());
        }
        if container.labels.is_some() {
            tag.labels = container.labels.clone();
        }
    }
}

impl RegistrySession {
    /// Fetch and decode the config blob `digest` from `repository`.
    pub async fn fetch_image_config(&self, repository: &str, digest: &str) -> Result<ImageConfig> {
        let request = UpstreamRequest::new(Method::GET, format!("/v2/{repository}/blobs/{digest}"));
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(response.status_error());
        }
        serde_json::from_slice(&response.body)
            .map_err(|e| Error::MalformedResponse(format!("config blob {digest}: {e}")))
    }
}
