//! Persisted pairing credentials.
//!
//! Each profile owns two small secret-bearing text files in a restricted
//! directory: a stable client identity created once and never regenerated,
//! and the device token obtained from PIN authentication.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

/// Result type for credential store operations.
pub type CredentialResult<T> = Result<T, CredentialError>;

/// Errors from the credential store.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No device token has been saved for the profile. Distinct from I/O
    /// failures so callers can prompt for a PIN instead.
    #[error("no saved device token for profile {0:?}")]
    TokenNotFound(String),

    /// Failed to create the credential directory.
    #[error("creating credential dir {path}: {source}")]
    Dir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read a credential file.
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write a credential file.
    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Directory-scoped store for per-profile identities and device tokens.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    /// Creates a store rooted at `dir`. The directory is created lazily on
    /// first write, with permissions restricted to the owner.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CredentialStore { dir: dir.into() }
    }

    /// Loads the client identity for `profile`, creating and persisting a new
    /// one on first call. Repeated calls return the same value.
    pub fn load_or_create_identity(&self, profile: &str) -> CredentialResult<String> {
        let path = self.dir.join(format!("{profile}_uuid"));

        match fs::read_to_string(&path) {
            Ok(data) => return Ok(data.trim().to_string()),
            Err(err) if err.kind() != io::ErrorKind::NotFound => {
                return Err(CredentialError::Read { path, source: err });
            }
            Err(_) => {}
        }

        self.ensure_dir()?;
        let identity = Uuid::new_v4().to_string().to_uppercase();
        write_secret(&path, &identity)?;
        Ok(identity)
    }

    /// Persists the device token for `profile`, replacing any previous one.
    pub fn save_token(&self, profile: &str, token: &str) -> CredentialResult<()> {
        self.ensure_dir()?;
        let path = self.dir.join(format!("{profile}_token"));
        write_secret(&path, token)
    }

    /// Loads the saved device token for `profile`.
    pub fn load_token(&self, profile: &str) -> CredentialResult<String> {
        let path = self.dir.join(format!("{profile}_token"));
        match fs::read_to_string(&path) {
            Ok(data) => Ok(data.trim().to_string()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(CredentialError::TokenNotFound(profile.to_string()))
            }
            Err(err) => Err(CredentialError::Read { path, source: err }),
        }
    }

    /// Returns true if a device token exists for `profile`.
    pub fn has_token(&self, profile: &str) -> bool {
        self.dir.join(format!("{profile}_token")).exists()
    }

    fn ensure_dir(&self) -> CredentialResult<()> {
        fs::create_dir_all(&self.dir).map_err(|source| CredentialError::Dir {
            path: self.dir.clone(),
            source,
        })?;
        restrict_permissions(&self.dir, 0o700).map_err(|source| CredentialError::Dir {
            path: self.dir.clone(),
            source,
        })
    }
}

fn write_secret(path: &Path, value: &str) -> CredentialResult<()> {
    fs::write(path, value).map_err(|source| CredentialError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    restrict_permissions(path, 0o600).map_err(|source| CredentialError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
