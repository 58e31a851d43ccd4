//! Eligibility check and the move from live registry to validated set.
//!
//! Persistence comes first: the snapshot is written durably before the
//! in-memory validated set is touched, so a failed save surfaces as an error
//! and leaves the device live instead of silently losing the record.

use chrono::{DateTime, Local};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::persistence::{DeviceStore, StoreError};
use crate::registry::device_registry::DeviceState;

use super::ValidatedDevice;

#[derive(Debug, Error)]
pub enum ValidationError {
    /// Not every channel has confirmed since the last `log` reset.
    #[error("device {0} is not eligible for validation")]
    NotEligible(String),

    /// The id is not in the live registry.
    #[error("device {0} is not in the live registry")]
    UnknownDevice(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owns the in-memory validated set and its durable counterpart.
pub struct ValidationEngine {
    validated: HashMap<String, ValidatedDevice>,
    store: DeviceStore,
}

impl ValidationEngine {
    pub fn new(store: DeviceStore) -> Self {
        Self {
            validated: HashMap::new(),
            store,
        }
    }

    /// True iff every channel's `validated` flag is set.
    pub fn can_validate(device: &DeviceState) -> bool {
        device.all_signals_validated()
    }

    pub fn is_validated(&self, device_id: &str) -> bool {
        self.validated.contains_key(device_id)
    }

    /// Reloads the validated set from the store. Returns how many records
    /// were loaded; store read errors are logged, keeping whatever is
    /// already in memory.
    pub async fn load(&mut self) -> usize {
        match self.store.load().await {
            Ok(records) => {
                for mut record in records {
                    record.validation_date.get_or_insert(record.last_seen);
                    self.validated.insert(record.id.clone(), record);
                }
                self.validated.len()
            }
            Err(err) => {
                error!("could not load validated devices: {}", err);
                self.validated.len()
            }
        }
    }

    /// Validates a device: stamps it, snapshots it, persists the snapshot,
    /// then inserts it into the validated set.
    ///
    /// Persisting is idempotent - an id already durably stored is not
    /// appended again, so re-validation never duplicates records. On a
    /// store failure nothing is inserted and the error is returned; the
    /// caller must keep the device live.
    pub async fn validate(
        &mut self,
        mut device: DeviceState,
        now: DateTime<Local>,
    ) -> Result<ValidatedDevice, ValidationError> {
        if !Self::can_validate(&device) {
            return Err(ValidationError::NotEligible(device.id));
        }

        device.validated = true;
        device.last_seen = now;
        let snapshot = ValidatedDevice::from_state(&device, now);

        let mut records = self.store.load().await?;
        if records.iter().any(|record| record.id == snapshot.id) {
            debug!("device {} already stored, not appending", snapshot.id);
        } else {
            records.push(snapshot.clone());
            self.store.save(&records).await?;
        }

        self.validated.insert(snapshot.id.clone(), snapshot.clone());
        info!("device {} validated", snapshot.id);
        Ok(snapshot)
    }

    /// Removes a device from the durable store and the in-memory set.
    /// Unknown ids are success. The live registry is not touched; the
    /// device reappears there only upon a fresh event.
    pub async fn unvalidate(&mut self, device_id: &str) -> Result<(), ValidationError> {
        self.store.remove(device_id).await?;
        if self.validated.remove(device_id).is_some() {
            info!("device {} removed from validated set", device_id);
        } else {
            debug!("device {} was not validated, nothing to remove", device_id);
        }
        Ok(())
    }

    /// All validated devices, lexicographic by id.
    pub fn all(&self) -> Vec<ValidatedDevice> {
        let mut devices: Vec<ValidatedDevice> = self.validated.values().cloned().collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    pub fn len(&self) -> usize {
        self.validated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validated.is_empty()
    }
}
