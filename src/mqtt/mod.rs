//! # MQTT Integration Module
//!
//! Provides the broker connection fieldmon lives on: field devices announce
//! themselves under the `register` topic tree, and configuration commands go
//! back out on per-device `cmd` topics.
//!
//! ## Why This Module Exists
//!
//! Everything downstream of this module deals in clean, typed values; the
//! messy parts of MQTT - connection lifecycle, reconnects, subscriptions,
//! payload decoding - are contained here:
//! - Live broker connection with automatic reconnect and backoff
//! - Wildcard subscriptions for device `log` and `data` topics
//! - Connection state published over a watch channel for anyone who asks
//! - Inbound publishes forwarded as [`MqttMessage`] values over mpsc
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - broker configuration and topic filters
//! ├── message_manager.rs  - message representation
//! └── mqtt_handler.rs     - connection state machine and event loop
//! ```
//!
//! ## Design Philosophy
//!
//! - **Separation of Concerns**: configuration, message handling, and
//!   connection logic are cleanly separated
//! - **Channel Architecture**: the handler owns the rumqttc event loop task;
//!   consumers see only channels and the cloneable [`MqttHandle`]
//! - **Robust Connection Management**: subscriptions are re-established on
//!   every ConnAck, so a broker restart heals without intervention

pub mod config;
pub mod message_manager;
pub mod mqtt_handler;

pub use config::MqttConfig;
pub use message_manager::MqttMessage;
pub use mqtt_handler::{ConnectionState, MqttError, MqttHandle};
