//! Outbound device configuration commands.
//!
//! A command is a named function-call string, `set.config(<JSON>)`,
//! published to the device's `cmd` topic. The three port pins are uniform:
//! one activation flag drives all of them, encoded as 0/1 the way the
//! firmware expects.

use serde_json::json;
use tracing::info;

use crate::mqtt::{MqttError, MqttHandle};
use crate::settings::Settings;

pub fn command_topic(device_id: &str) -> String {
    format!("/dev/device/register/{device_id}/cmd")
}

/// Builds the full `set.config(...)` payload for one device.
pub fn build_command(settings: &Settings, device_id: &str, activate: bool) -> String {
    let pin = u8::from(activate);
    let config = json!({
        "wifi": {
            "ssid": settings.wifi.ssid,
            "senha": settings.wifi.password,
            "device_password": "",
            "timezone": -3,
            "ap": 2,
            "il": 180
        },
        "mqtt": {
            "painel": false,
            "id": device_id,
            "nome": device_id,
            "porta": settings.mqtt.port,
            "client_id": "device/register",
            "broker": settings.mqtt.host,
            "usuario": settings.mqtt.username,
            "password": settings.mqtt.password
        },
        "pins": {
            "p1": pin,
            "p2": pin,
            "p3": pin,
            "tv": 30,
            "tc": 1000,
            "vp": 200
        }
    });
    format!("set.config({config})")
}

/// Builds configuration commands and hands them to the transport.
pub struct CommandPublisher {
    mqtt: MqttHandle,
    settings: Settings,
}

impl CommandPublisher {
    pub fn new(mqtt: MqttHandle, settings: Settings) -> Self {
        Self { mqtt, settings }
    }

    /// Sends the port activation command to one device. Fails with
    /// [`MqttError::NotConnected`] while the transport is down; no device
    /// state is touched either way.
    pub async fn send_config(&self, device_id: &str, activate: bool) -> Result<(), MqttError> {
        let topic = command_topic(device_id);
        let payload = build_command(&self.settings, device_id, activate);
        self.mqtt.publish(&topic, &payload).await?;
        info!(
            "configuration command sent to {} (ports {})",
            device_id,
            if activate { "on" } else { "off" }
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::WifiSettings;

    fn test_settings() -> Settings {
        Settings {
            mqtt: crate::mqtt::MqttConfig {
                host: "broker.local".to_string(),
                port: 8883,
                username: "user".to_string(),
                password: "secret".to_string(),
                ..Default::default()
            },
            wifi: WifiSettings {
                ssid: "PlantNet".to_string(),
                password: "wifi-secret".to_string(),
            },
            ..Default::default()
        }
    }

    fn parse_payload(payload: &str) -> serde_json::Value {
        let inner = payload
            .strip_prefix("set.config(")
            .and_then(|rest| rest.strip_suffix(')'))
            .expect("payload should be a set.config call");
        serde_json::from_str(inner).expect("payload body should be JSON")
    }

    #[test]
    fn command_topic_addresses_the_device() {
        assert_eq!(command_topic("ESP-01"), "/dev/device/register/ESP-01/cmd");
    }

    #[test]
    fn activation_drives_all_three_pins_uniformly() {
        let settings = test_settings();

        let on = parse_payload(&build_command(&settings, "ESP-01", true));
        for pin in ["p1", "p2", "p3"] {
            assert_eq!(on["pins"][pin], 1);
        }

        let off = parse_payload(&build_command(&settings, "ESP-01", false));
        for pin in ["p1", "p2", "p3"] {
            assert_eq!(off["pins"][pin], 0);
        }
    }

    #[test]
    fn payload_carries_broker_and_wifi_settings() {
        let settings = test_settings();
        let value = parse_payload(&build_command(&settings, "ESP-01", true));

        assert_eq!(value["wifi"]["ssid"], "PlantNet");
        assert_eq!(value["wifi"]["senha"], "wifi-secret");
        assert_eq!(value["wifi"]["timezone"], -3);
        assert_eq!(value["mqtt"]["broker"], "broker.local");
        assert_eq!(value["mqtt"]["porta"], 8883);
        assert_eq!(value["mqtt"]["usuario"], "user");
        assert_eq!(value["mqtt"]["id"], "ESP-01");
        assert_eq!(value["mqtt"]["nome"], "ESP-01");
        assert_eq!(value["mqtt"]["client_id"], "device/register");
        assert_eq!(value["pins"]["tv"], 30);
        assert_eq!(value["pins"]["tc"], 1000);
        assert_eq!(value["pins"]["vp"], 200);
    }
}
