//! Runtime configuration.
//!
//! Resolved once at process start and immutable thereafter: a TOML file
//! under the user config directory, with environment variables taking
//! precedence over file values. Missing pieces fall back to defaults so the
//! monitor starts in a degraded-but-usable state rather than refusing to
//! run.

use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::mqtt::MqttConfig;

const CONFIG_DIR: &str = "fieldmon";
const CONFIG_FILE: &str = "config.toml";
const STORE_FILE: &str = "dbDevices.json";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct WifiSettings {
    /// Network SSID pushed to devices in configuration commands.
    pub ssid: String,
    /// Network password/key.
    pub password: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub mqtt: MqttConfig,
    pub wifi: WifiSettings,
    /// Overrides the device store location; defaults to
    /// `<data_dir>/fieldmon/dbDevices.json`.
    pub store_path: Option<PathBuf>,
}

impl Settings {
    /// Loads the settings file if present, then applies environment
    /// overrides.
    pub async fn load() -> Result<Self> {
        let path = Self::config_path();
        let mut settings = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => toml::from_str(&raw)
                .map_err(|e| eyre!("Failed to parse settings file {}: {}", path.display(), e))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("no settings file at {}, using defaults", path.display());
                Settings::default()
            }
            Err(err) => {
                return Err(eyre!(
                    "Failed to read settings file {}: {}",
                    path.display(),
                    err
                ))
            }
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Writes a default settings file if none exists yet, so operators have
    /// something to edit.
    pub async fn ensure_default_config() -> Result<()> {
        let path = Self::config_path();
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }
        let content = toml::to_string_pretty(&Settings::default())
            .map_err(|e| eyre!("Failed to serialize default settings: {}", e))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| eyre!("Failed to write default settings file: {}", e))?;
        info!("default settings written to {}", path.display());
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR)
            .join(CONFIG_FILE)
    }

    /// The device store location, configured or default.
    pub fn store_path(&self) -> PathBuf {
        self.store_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(CONFIG_DIR)
                .join(STORE_FILE)
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = env::var("MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Ok(port) = env::var("MQTT_PORT") {
            match port.parse() {
                Ok(port) => self.mqtt.port = port,
                Err(_) => warn!("MQTT_PORT is not a number, keeping {}", self.mqtt.port),
            }
        }
        if let Ok(username) = env::var("MQTT_USERNAME") {
            self.mqtt.username = username;
        }
        if let Ok(password) = env::var("MQTT_PASSWORD") {
            self.mqtt.password = password;
        }
        if let Ok(ssid) = env::var("WIFI_SSID") {
            self.wifi.ssid = ssid;
        }
        if let Ok(password) = env::var("WIFI_PASSWORD") {
            self.wifi.password = password;
        }
    }
}
