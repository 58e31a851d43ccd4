//! # Device Registry Module
//!
//! Tracks field devices that announce themselves over MQTT and aggregates
//! their per-channel signal activity into a live status view.
//!
//! ## Why This Module Exists
//!
//! The registry is the stateful heart of fieldmon. Devices on the factory
//! floor publish `log` heartbeats and `data` pulses for each of their three
//! monitored channels; the registry turns that raw stream into a coherent
//! per-device picture: is the device online, which channels have fired, and
//! is the device ready for operator validation.
//!
//! ## Module Architecture
//!
//! ```text
//! registry/
//! ├── message_router.rs   - (topic, payload) -> normalized DeviceEvent
//! ├── device_registry.rs  - synchronous device/channel state map
//! ├── timeout_scheduler.rs - per (device, channel) debounce timers
//! └── registry_worker.rs  - serializing actor that owns all of the above
//! ```
//!
//! ## Concurrency Model
//!
//! All mutation happens on one tokio task (the registry worker). Message
//! events, liveness sweep ticks, debounce expiries, and operator actions
//! arrive as actions on a single channel and are handled to completion one
//! at a time, so the state maps need no locking. Timers and the sweep
//! ticker are independent tasks that only *send* actions back to the worker.

pub mod device_registry;
pub mod message_router;
pub mod registry_worker;
pub mod timeout_scheduler;

pub use registry_worker::{RegistryHandle, RegistrySettings};
