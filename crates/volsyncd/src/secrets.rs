//! Ephemeral credential material.
//!
//! Private keys arrive base64-encoded inside the request body and must never
//! touch the logs or outlive the job that used them. [`KeyMaterial`]
//! materializes the decoded key as an access-restricted temporary file and
//! removes it on drop, so cleanup holds on every exit path.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{Result, SyncError};

/// A private key written to a short-lived, owner-only file.
///
/// The file lives in the system temp directory under a random name and is
/// created with `create_new` so an existing path is never reused. Dropping
/// the value deletes the file; a failed deletion is logged (path only) and
/// never panics.
#[derive(Debug)]
pub struct KeyMaterial {
    path: PathBuf,
}

impl KeyMaterial {
    /// Decodes a base64-encoded private key and writes it to disk.
    pub fn from_base64(encoded: &SecretString) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.expose_secret().trim())
            .map_err(|_| SyncError::Validation("private key must be base64 encoded".to_string()))?;
        Self::write(&bytes)
    }

    /// Copies an existing key file into a fresh restricted file.
    ///
    /// Mounted secret files are often group-readable; the copy guarantees
    /// the permissions the transfer shell insists on.
    pub fn from_file(source: &Path) -> Result<Self> {
        let bytes = fs::read(source).map_err(|e| SyncError::filesystem(source, e))?;
        Self::write(&bytes)
    }

    fn write(bytes: &[u8]) -> Result<Self> {
        let path = std::env::temp_dir().join(format!(".volsyncd-key-{}", uuid::Uuid::new_v4()));

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(&path)
            .map_err(|e| SyncError::filesystem(&path, e))?;
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|e| {
                let _ = fs::remove_file(&path);
                SyncError::filesystem(&path, e)
            })?;

        Ok(Self { path })
    }

    /// Location of the key file, for `-i` / `GIT_SSH_COMMAND` arguments.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!(
                "failed to remove ephemeral key file {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(content: &str) -> SecretString {
        SecretString::from(BASE64.encode(content))
    }

    #[test]
    fn decodes_and_materializes_key() {
        let key = KeyMaterial::from_base64(&encoded("-----BEGIN KEY-----\nabc\n")).unwrap();
        let on_disk = fs::read_to_string(key.path()).unwrap();
        assert_eq!(on_disk, "-----BEGIN KEY-----\nabc\n");
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let key = KeyMaterial::from_base64(&encoded("secret")).unwrap();
        let mode = fs::metadata(key.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn drop_removes_key_file() {
        let key = KeyMaterial::from_base64(&encoded("secret")).unwrap();
        let path = key.path().to_path_buf();
        assert!(path.exists());
        drop(key);
        assert!(!path.exists());
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = KeyMaterial::from_base64(&SecretString::from("not base64 !!".to_string())).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[test]
    fn copies_key_file_with_fresh_permissions() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("id_ed25519");
        fs::write(&source, "key bytes").unwrap();

        let key = KeyMaterial::from_file(&source).unwrap();
        assert_ne!(key.path(), source.as_path());
        assert_eq!(fs::read_to_string(key.path()).unwrap(), "key bytes");
    }

    #[test]
    fn missing_key_file_is_a_filesystem_error() {
        let err = KeyMaterial::from_file(Path::new("/nonexistent/id_rsa")).unwrap_err();
        assert!(matches!(err, SyncError::Filesystem { .. }));
    }
}
