use std::fmt;
use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::Result;

const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 16;

/// Process-wide configuration, read once at startup and shared immutably afterwards.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    pub registry: RegistryConfig,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the upstream Distribution API, eg `https://registry.example.com`.
    pub host: String,

    /// Per-call deadline for upstream requests. Absent means upstream calls may take as long as
    /// they take.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Width of the worker pool used when aggregating the whole catalog.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

/// HTTP Basic credentials. Used both to authenticate inbound callers and, unchanged, to
/// authenticate against the upstream registry.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 13030))
}

fn default_max_concurrent_requests() -> usize {
    DEFAULT_MAX_CONCURRENT_REQUESTS
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut f = File::open(path)?;
        let mut s = String::new();
        f.read_to_string(&mut s)?;
        Self::from_yaml(&s)
    }

    pub fn from_yaml(s: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(s)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.normalize();
        Ok(config)
    }

    /// Apply `REGISTRY_HOST`, `REGISTRY_USERNAME` and `REGISTRY_PASSWORD` overrides. Credentials
    /// are only replaced when both halves are available.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("REGISTRY_HOST").filter(|h| !h.is_empty()) {
            self.registry.host = host;
        }

        let username = lookup("REGISTRY_USERNAME").filter(|s| !s.is_empty());
        let password = lookup("REGISTRY_PASSWORD").filter(|s| !s.is_empty());
        match (username, password, self.credentials.as_mut()) {
            (Some(u), Some(p), _) => self.credentials = Some(Credentials::new(u, p)),
            (Some(u), None, Some(c)) => c.username = u,
            (None, Some(p), Some(c)) => c.password = p,
            _ => {}
        }
    }

    fn normalize(&mut self) {
        while self.registry.host.ends_with('/') {
            self.registry.host.pop();
        }
        if self.registry.max_concurrent_requests == 0 {
            tracing::warn!("max_concurrent_requests must be at least 1, using 1");
            self.registry.max_concurrent_requests = 1;
        }
    }
}

impl RegistryConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const BASIC: &str = r#"
registry:
  host: https://registry.example.com/
credentials:
  username: admin
  password: hunter2
"#;

    #[test]
    fn defaults_applied() {
        let mut config: Config = serde_yaml::from_str(BASIC).unwrap();
        config.normalize();
        assert_eq!(config.listen, default_listen());
        assert_eq!(config.registry.host, "https://registry.example.com");
        assert_eq!(config.registry.max_concurrent_requests, 16);
        assert_eq!(config.registry.timeout(), None);
        assert_eq!(
            config.credentials,
            Some(Credentials::new("admin", "hunter2"))
        );
    }

    #[test]
    fn zero_concurrency_clamped() {
        let mut config: Config = serde_yaml::from_str(
            "registry:\n  host: http://localhost:5000\n  max_concurrent_requests: 0\n",
        )
        .unwrap();
        config.normalize();
        assert_eq!(config.registry.max_concurrent_requests, 1);
        assert!(config.credentials.is_none());
    }

    #[test]
    fn env_overrides() {
        let mut config: Config = serde_yaml::from_str(BASIC).unwrap();
        config.apply_env_overrides(|key| match key {
            "REGISTRY_HOST" => Some("http://localhost:5000".to_string()),
            "REGISTRY_PASSWORD" => Some("swordfish".to_string()),
            _ => None,
        });
        assert_eq!(config.registry.host, "http://localhost:5000");
        assert_eq!(
            config.credentials,
            Some(Credentials::new("admin", "swordfish"))
        );
    }

    #[test]
    fn debug_redacts_password() {
        let s = format!("{:?}", Credentials::new("admin", "hunter2"));
        assert!(s.contains("admin"));
        assert!(!s.contains("hunter2"));
    }
}
