//! # Validation Module
//!
//! Operator confirmation that a device's channels have all reported
//! activity. Validation freezes the device into a [`ValidatedDevice`]
//! snapshot, persists it, and retires the id from the live registry; from
//! then on the message router path ignores the device entirely.

pub mod validation_engine;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::registry::device_registry::{DeviceState, SignalState};

pub use validation_engine::{ValidationEngine, ValidationError};

/// Frozen snapshot of a [`DeviceState`] at the moment of validation.
///
/// Serialized to the device store as-is. Older store files (written by a
/// previous tool generation) carry no `validationDate`; on load it falls
/// back to `lastSeen`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedDevice {
    pub id: String,
    pub online: bool,
    pub validated: bool,
    pub last_seen: DateTime<Local>,
    pub signals: BTreeMap<String, SignalState>,
    #[serde(default)]
    pub validation_date: Option<DateTime<Local>>,
}

impl ValidatedDevice {
    pub fn from_state(device: &DeviceState, validation_date: DateTime<Local>) -> Self {
        Self {
            id: device.id.clone(),
            online: device.online,
            validated: device.validated,
            last_seen: device.last_seen,
            signals: device.signals.clone(),
            validation_date: Some(validation_date),
        }
    }

    /// The validation timestamp, falling back to `last_seen` for records
    /// stored without one.
    pub fn validated_at(&self) -> DateTime<Local> {
        self.validation_date.unwrap_or(self.last_seen)
    }
}
