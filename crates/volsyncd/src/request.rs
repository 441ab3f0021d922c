//! Sync request model.
//!
//! The wire format is a tagged union: `source.type` selects the kind and
//! `source.details` is an untyped map parsed into the matching typed record.
//! Parsing and cross-field validation happen before any strategy is
//! constructed; nothing in this module touches the network or filesystem.
//!
//! Passwords and encoded keys deserialize into [`SecretString`] so a stray
//! `{:?}` can never print them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::{Result, SyncError};

/// A request to synchronize one source into one target directory.
#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub source: Source,
    pub target: Target,
    /// Per-request override of the configured default, e.g. `"45s"`,
    /// `"10m"` or bare seconds.
    #[serde(default)]
    pub timeout: Option<String>,
}

/// Source kind tag plus its kind-specific detail map.
#[derive(Debug, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub kind: String,
    pub details: serde_json::Value,
}

/// Local destination directory. Created on demand; never assumed empty.
#[derive(Debug, Deserialize)]
pub struct Target {
    pub path: PathBuf,
}

impl Target {
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(SyncError::Validation("target path is required".to_string()));
        }
        if !self.path.is_absolute() {
            return Err(SyncError::Validation(format!(
                "target path must be absolute: '{}'",
                self.path.display()
            )));
        }
        Ok(())
    }
}

/// The supported source kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Ssh,
    Git,
    Http,
    S3,
}

impl SourceKind {
    /// Parses the wire tag; unknown tags are an unsupported-source error.
    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "ssh" => Ok(SourceKind::Ssh),
            "git" => Ok(SourceKind::Git),
            "http" => Ok(SourceKind::Http),
            "s3" => Ok(SourceKind::S3),
            other => Err(SyncError::UnsupportedSource(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Ssh => "ssh",
            SourceKind::Git => "git",
            SourceKind::Http => "http",
            SourceKind::S3 => "s3",
        }
    }
}

fn default_ssh_port() -> u16 {
    22
}

/// Remote filesystem source reached over SSH.
#[derive(Debug, Deserialize)]
pub struct SshDetails {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub user: String,
    /// Remote directory whose contents are mirrored.
    pub path: String,
    #[serde(default)]
    pub password: Option<SecretString>,
    /// Path to an already-mounted key file.
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    /// Base64-encoded private key carried in the request body.
    #[serde(default, rename = "privateKey")]
    pub private_key: Option<SecretString>,
}

impl SshDetails {
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let details: SshDetails = serde_json::from_value(value.clone())
            .map_err(|e| SyncError::Validation(format!("invalid ssh details: {}", e)))?;
        details.validate()?;
        Ok(details)
    }

    fn validate(&self) -> Result<()> {
        require_non_empty("host", &self.host)?;
        require_non_empty("user", &self.user)?;
        require_non_empty("path", &self.path)?;

        let has_key = secret_present(&self.private_key)
            || self.key_path.as_ref().is_some_and(|p| !p.as_os_str().is_empty());
        if secret_present(&self.password) && has_key {
            return Err(SyncError::Validation(
                "password and privateKey/key_path cannot be provided at the same time".to_string(),
            ));
        }
        Ok(())
    }
}

/// Version-control repository source.
#[derive(Debug, Deserialize)]
pub struct GitDetails {
    pub url: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub depth: Option<u32>,
    /// Username for HTTP(S) basic authentication.
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<SecretString>,
    /// Base64-encoded private key for SSH remotes.
    #[serde(default, rename = "privateKey")]
    pub private_key: Option<SecretString>,
}

impl GitDetails {
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let details: GitDetails = serde_json::from_value(value.clone())
            .map_err(|e| SyncError::Validation(format!("invalid git details: {}", e)))?;
        details.validate()?;
        Ok(details)
    }

    fn validate(&self) -> Result<()> {
        require_non_empty("url", &self.url)?;

        let has_user = self.user.as_ref().is_some_and(|u| !u.is_empty());
        let has_password = secret_present(&self.password);
        if (has_user || has_password) && secret_present(&self.private_key) {
            return Err(SyncError::Validation(
                "username/password and privateKey cannot be provided at the same time".to_string(),
            ));
        }
        if has_user && !has_password {
            return Err(SyncError::Validation(
                "password is required when username is provided".to_string(),
            ));
        }
        if has_password && !has_user {
            return Err(SyncError::Validation(
                "username is required when password is provided".to_string(),
            ));
        }
        Ok(())
    }

    /// Shallow-clone depth; defaults to 1.
    pub fn effective_depth(&self) -> u32 {
        match self.depth {
            Some(depth) if depth > 0 => depth,
            _ => 1,
        }
    }
}

/// Single-file HTTP source.
#[derive(Debug, Deserialize)]
pub struct HttpDetails {
    pub url: String,
}

impl HttpDetails {
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let details: HttpDetails = serde_json::from_value(value.clone())
            .map_err(|e| SyncError::Validation(format!("invalid http details: {}", e)))?;
        require_non_empty("url", &details.url)?;
        Ok(details)
    }
}

/// Object-store prefix source.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Details {
    pub endpoint_url: String,
    pub bucket_name: String,
    /// Key prefix to mirror.
    pub path: String,
    pub access_key: String,
    pub secret_key: SecretString,
    pub region: String,
}

impl S3Details {
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let details: S3Details = serde_json::from_value(value.clone())
            .map_err(|e| SyncError::Validation(format!("invalid s3 details: {}", e)))?;
        details.validate()?;
        Ok(details)
    }

    fn validate(&self) -> Result<()> {
        require_non_empty("endpointUrl", &self.endpoint_url)?;
        require_non_empty("bucketName", &self.bucket_name)?;
        require_non_empty("path", &self.path)?;
        require_non_empty("accessKey", &self.access_key)?;
        if self.secret_key.expose_secret().is_empty() {
            return Err(SyncError::Validation("secretKey is required".to_string()));
        }
        require_non_empty("region", &self.region)?;
        Ok(())
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(SyncError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn secret_present(secret: &Option<SecretString>) -> bool {
    secret
        .as_ref()
        .is_some_and(|s| !s.expose_secret().is_empty())
}

/// Parses a timeout value: either a bare integer (seconds) or an integer
/// with a `ms`, `s`, `m` or `h` suffix.
pub fn parse_timeout(value: &str) -> Result<Duration> {
    let value = value.trim();
    let invalid = || SyncError::Validation(format!("invalid timeout format: '{}'", value));

    if value.is_empty() {
        return Err(invalid());
    }
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let (number, unit) = value.split_at(
        value
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(invalid)?,
    );
    let amount: u64 = number.parse().map_err(|_| invalid())?;
    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount * 60)),
        "h" => Ok(Duration::from_secs(amount * 3600)),
        _ => Err(invalid()),
    }
}

/// Ensures a directory-like string ends with exactly one `/`.
///
/// Mirror transfers copy directory contents, not the directory itself, and
/// that distinction is the trailing separator.
pub fn with_trailing_slash(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("{}/", trimmed)
    }
}

/// Same normalization for local paths.
pub fn path_with_trailing_slash(path: &Path) -> String {
    with_trailing_slash(&path.to_string_lossy())
}
