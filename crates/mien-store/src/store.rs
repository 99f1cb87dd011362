//! Whole-blob JSON persistence for the enrollment [`Store`].
//!
//! A missing file loads as the empty store; a corrupt or structurally
//! invalid file is a hard error, surfaced instead of being papered over as
//! an empty database. Saves go through a temp file and an atomic rename so
//! a crash mid-write never leaves a torn blob behind.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;

use mien_core::Store;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store blob is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store blob at {path} is invalid: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Handle to the store blob on disk.
#[derive(Debug, Clone)]
pub struct StoreFile {
    path: PathBuf,
}

impl StoreFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the whole store. A missing file is the empty store.
    pub fn load(&self) -> Result<Store, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no store blob yet, starting empty");
                return Ok(Store::default());
            }
            Err(e) => return Err(e.into()),
        };

        let store: Store = serde_json::from_slice(&bytes)?;
        store.validate().map_err(|reason| StoreError::Invalid {
            path: self.path.clone(),
            reason,
        })?;

        tracing::debug!(
            path = %self.path.display(),
            identities = store.identities.len(),
            has_admin = store.admin.is_some(),
            "store loaded"
        );
        Ok(store)
    }

    /// Persist the whole store atomically (temp file + rename).
    pub fn save(&self, store: &Store) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let blob = serde_json::to_vec_pretty(store)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &blob)?;
        fs::rename(&tmp, &self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            identities = store.identities.len(),
            bytes = blob.len(),
            "store saved"
        );
        Ok(())
    }

    /// Clear admin and identities in one atomic write, returning the new
    /// empty store.
    pub fn reset(&self) -> Result<Store, StoreError> {
        let empty = Store::default();
        self.save(&empty)?;
        tracing::info!(path = %self.path.display(), "store reset");
        Ok(empty)
    }
}
