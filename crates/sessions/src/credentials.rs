//! Per-number credential directories.
//!
//! The messaging network owns the file format inside each directory; we
//! only create it, probe for the credentials file, and delete it.

use std::path::{Path, PathBuf};

use pb_domain::error::{Error, Result};
use pb_domain::PhoneNumber;

/// Presence of this file means the number has completed pairing before.
pub const CREDENTIALS_FILE: &str = "creds.json";

#[derive(Debug, Clone)]
pub struct CredentialStore {
    root: PathBuf,
}

impl CredentialStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir_for(&self, phone: &PhoneNumber) -> PathBuf {
        self.root.join(phone.dir_name())
    }

    /// Create the directory if missing and return its path.  Existing
    /// material is reused untouched.
    pub fn ensure_dir(&self, phone: &PhoneNumber) -> Result<PathBuf> {
        let dir = self.dir_for(phone);
        std::fs::create_dir_all(&dir).map_err(|e| Error::storage(&dir, e))?;
        Ok(dir)
    }

    pub fn has_credentials(&self, phone: &PhoneNumber) -> bool {
        self.dir_for(phone).join(CREDENTIALS_FILE).is_file()
    }

    /// Delete the directory recursively.  `Ok(false)` if it was already gone.
    pub fn remove(&self, phone: &PhoneNumber) -> Result<bool> {
        let dir = self.dir_for(phone);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::info!(phone = %phone, path = %dir.display(), "credential directory removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::storage(&dir, e)),
        }
    }
}
