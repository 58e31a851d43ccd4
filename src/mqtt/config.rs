//! Broker configuration and the register-tree topic filters.

use serde::{Deserialize, Serialize};

/// Wildcard filter for device heartbeats.
pub const LOG_FILTER: &str = "/dev/+/register/+/log";
/// Wildcard filter for per-channel signal pulses.
pub const DATA_FILTER: &str = "/dev/+/register/+/data/#";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            client_id: "fieldmon".to_string(),
            keep_alive_secs: 60,
        }
    }
}
