//! JSON-file store for validated devices.
//!
//! Whole-collection overwrite semantics: `save` replaces the file, `remove`
//! is load-filter-save. A missing, empty, or unreadable file loads as an
//! empty collection so a first run (or a truncated store) never blocks
//! startup.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::validation::ValidatedDevice;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("device store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("device store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub struct DeviceStore {
    path: PathBuf,
}

impl DeviceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored collection. Missing or empty files yield an empty
    /// collection; a corrupt file is logged and also yields empty rather
    /// than failing the caller.
    pub async fn load(&self) -> Result<Vec<ValidatedDevice>, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str(&raw) {
            Ok(devices) => Ok(devices),
            Err(err) => {
                warn!(
                    "device store at {} is unreadable, starting empty: {}",
                    self.path.display(),
                    err
                );
                Ok(Vec::new())
            }
        }
    }

    /// Overwrites the store with the given collection, creating parent
    /// directories on demand.
    pub async fn save(&self, devices: &[ValidatedDevice]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(devices)?;
        tokio::fs::write(&self.path, content).await?;
        debug!("{} devices saved to {}", devices.len(), self.path.display());
        Ok(())
    }

    /// Removes one device by id. Removing an id that is not stored is
    /// success.
    pub async fn remove(&self, device_id: &str) -> Result<(), StoreError> {
        let mut devices = self.load().await?;
        let before = devices.len();
        devices.retain(|device| device.id != device_id);
        if devices.len() == before {
            debug!("device {} not in store, nothing to remove", device_id);
        }
        self.save(&devices).await
    }
}
