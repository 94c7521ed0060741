use http::StatusCode;
use thiserror;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("authentication required")]
    Unauthenticated,

    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("manifest not found: {repository}:{reference} ({status})")]
    ManifestNotFound {
        repository: String,
        reference: String,
        status: StatusCode,
    },

    #[error("upstream registry returned {status}")]
    UpstreamStatus {
        status: StatusCode,
        message: Option<String>,
    },

    #[error("upstream request failed: {0}")]
    UpstreamRequest(#[from] reqwest::Error),

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("invalid repository name: {0}")]
    InvalidRepositoryName(String),
    #[error("invalid reference: {0}")]
    InvalidReference(String),
    #[error("invalid digest: {0}")]
    InvalidDigest(String),
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedDigestAlgorithm(String),

    #[error("invalid registry url: {0}")]
    InvalidRegistryUrl(String),

    #[error("config deserialization error")]
    ConfigError(#[from] serde_yaml::Error),
    #[error("io error")]
    IOError(#[from] std::io::Error),
}

impl Error {
    /// Status code an upstream failure should surface with at the HTTP boundary, if it carries
    /// one.
    pub fn upstream_status(&self) -> Option<StatusCode> {
        match self {
            Error::UpstreamStatus { status, .. } => Some(*status),
            Error::ManifestNotFound { status, .. } => Some(*status),
            Error::RepositoryNotFound(_) => Some(StatusCode::NOT_FOUND),
            Error::UpstreamRequest(e) => e.status(),
            _ => None,
        }
    }
}
