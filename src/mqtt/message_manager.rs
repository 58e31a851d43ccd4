//! Message representation for the inbound channel.

use chrono::NaiveDateTime;
use std::fmt;

/// One publish received from the broker, stamped on arrival.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct MqttMessage {
    topic: String,
    payload: String,
    timestamp: NaiveDateTime,
}

impl fmt::Display for MqttMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let preview: String = self.payload.chars().take(24).collect();
        write!(f, "{} {} - {}", self.timestamp, self.topic, preview)
    }
}

impl MqttMessage {
    pub fn from_parts(topic: String, payload: String) -> Self {
        MqttMessage {
            topic,
            payload,
            timestamp: chrono::Local::now().naive_local(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_previews_the_payload() {
        let msg = MqttMessage::from_parts(
            "/dev/plant-a/register/ESP-01/log".to_string(),
            "a rather long payload that should get cut".to_string(),
        );
        let rendered = msg.to_string();
        assert!(rendered.contains("/dev/plant-a/register/ESP-01/log"));
        assert!(rendered.contains("a rather long payload th"));
        assert!(!rendered.contains("cut"));
    }
}
