//! # Persistence Module
//!
//! ## Why This Module Exists
//! Validated devices must survive restarts: an operator who confirmed a
//! device yesterday must not be asked to confirm it again today. This module
//! owns the durable side of that guarantee - a single JSON file holding the
//! validated collection - plus the plain-text export operators hand to the
//! customer.
//!
//! ## Error Handling Strategy
//! Reads follow a "fail-safe" approach: a missing, empty, or corrupt store
//! loads as an empty collection (logged, never fatal), so the monitor always
//! starts. Writes are the opposite - every save and remove reports a typed
//! [`StoreError`], because a failed save means a validation did not actually
//! complete and the caller has to know.
//!
//! ## Concurrency Notes
//! Access is read-modify-write from the single registry worker task; the
//! local process is the sole writer, so concurrent external modification is
//! last-writer-wins by design.

pub mod device_store;
pub mod export;

pub use device_store::{DeviceStore, StoreError};
