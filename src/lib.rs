mod config;
pub use config::{Config, Credentials, RegistryConfig};

mod oci_digest;
pub use oci_digest::{validate_repository_name, ManifestRef, OciDigest};

mod errors;
pub use errors::{Error, Result};

pub mod http;
pub mod registry;
