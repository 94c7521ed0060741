use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{Error, Result};

// https://github.com/opencontainers/image-spec/blob/main/descriptor.md#digests
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OciDigest {
    algorithm: RegisteredImageSpecAlgorithm,
    encoded: String,
}

impl TryFrom<&str> for OciDigest {
    type Error = Error;
    fn try_from(s: &str) -> Result<Self> {
        let (algo, encoded) = match s.split_once(':') {
            Some((a, e)) if !a.is_empty() && !e.is_empty() => (a, e),
            _ => return Err(Error::InvalidDigest(s.to_string())),
        };
        let algorithm = match RegisteredImageSpecAlgorithm::try_from(algo) {
            Ok(a) => a,
            Err(_) => return Err(Error::InvalidDigest(s.to_string())),
        };
        if !encoded.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidDigest(s.to_string()));
        }

        Ok(Self {
            algorithm,
            encoded: encoded.to_string(),
        })
    }
}

impl From<&OciDigest> for String {
    fn from(d: &OciDigest) -> String {
        d.to_string()
    }
}

impl From<OciDigest> for String {
    fn from(d: OciDigest) -> String {
        d.to_string()
    }
}

impl fmt::Display for OciDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", String::from(&self.algorithm), self.encoded)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum RegisteredImageSpecAlgorithm {
    Sha256,
    Sha512,
}

impl TryFrom<&str> for RegisteredImageSpecAlgorithm {
    type Error = Error;

    fn try_from(a: &str) -> Result<Self> {
        match a {
            "sha512" => Ok(RegisteredImageSpecAlgorithm::Sha512),
            "sha256" => Ok(RegisteredImageSpecAlgorithm::Sha256),
            s => Err(Error::UnsupportedDigestAlgorithm(String::from(s))),
        }
    }
}

impl From<&RegisteredImageSpecAlgorithm> for String {
    fn from(a: &RegisteredImageSpecAlgorithm) -> String {
        match a {
            RegisteredImageSpecAlgorithm::Sha512 => String::from("sha512"),
            RegisteredImageSpecAlgorithm::Sha256 => String::from("sha256"),
        }
    }
}

/// The `<reference>` portion of `/v2/<name>/manifests/<reference>`. According to the
/// distribution specification:
///
/// > `<reference>` MUST be either (a) the digest of the manifest or (b) a tag.
///
/// and tags MUST match `[a-zA-Z0-9_][a-zA-Z0-9._-]{0,127}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManifestRef {
    Digest(OciDigest),
    Tag(String),
}

impl FromStr for ManifestRef {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Ok(dgst) = OciDigest::try_from(s) {
            return Ok(Self::Digest(dgst));
        }
        static RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_][a-zA-Z0-9._-]{0,127}$").unwrap());

        if RE.is_match(s) {
            return Ok(Self::Tag(String::from(s)));
        }

        Err(Error::InvalidReference(s.to_string()))
    }
}

impl fmt::Display for ManifestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestRef::Digest(d) => d.fmt(f),
            ManifestRef::Tag(t) => f.write_str(t),
        }
    }
}

/// Check a repository name against the distribution-spec `<name>` grammar before it gets
/// interpolated into an upstream URL.
pub fn validate_repository_name(name: &str) -> Result<()> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^[a-z0-9]+((\.|_|__|-+)[a-z0-9]+)*(/[a-z0-9]+((\.|_|__|-+)[a-z0-9]+)*)*$")
            .unwrap()
    });
    if name.len() <= 255 && RE.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidRepositoryName(name.to_string()))
    }
}
