//! Parses raw MQTT publishes into normalized device events.
//!
//! Device topics follow the structural form
//! `/dev/<site>/register/<deviceId>/<kind>[/<channel...>]`. The router
//! anchors on the `register` segment rather than fixed offsets, so both the
//! `log` and the deeper `data` topic shapes parse with one rule. Anything
//! that does not fit is transport noise and is dropped without side effects.

use super::device_registry::{DeviceEvent, EventKind};

/// First character of the broker's internal "Configuration data accepted!"
/// acknowledgment text. Payloads starting with it are noise, not events.
pub const ACK_SENTINEL: char = 'C';

/// Parses one `(topic, payload)` pair, or rejects it as noise.
///
/// For `data` topics the channel is the trailing segment, which tolerates
/// intermediate grouping segments published by some firmware revisions.
pub fn route(topic: &str, payload: &str) -> Option<DeviceEvent> {
    if payload.starts_with(ACK_SENTINEL) {
        return None;
    }

    let segments: Vec<&str> = topic.split('/').filter(|s| !s.is_empty()).collect();
    let anchor = segments.iter().position(|s| *s == "register")?;
    let device_id = *segments.get(anchor + 1)?;
    let kind = *segments.get(anchor + 2)?;

    let kind = match kind {
        "log" => EventKind::Log,
        "data" => {
            let channel = *segments.last().filter(|_| segments.len() > anchor + 3)?;
            EventKind::Data {
                channel: channel.to_string(),
            }
        }
        _ => return None,
    };

    Some(DeviceEvent {
        device_id: device_id.to_string(),
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_log_topic() {
        let event = route("/dev/plant-a/register/ESP-01/log", "boot ok").unwrap();
        assert_eq!(event.device_id, "ESP-01");
        assert_eq!(event.kind, EventKind::Log);
    }

    #[test]
    fn routes_data_topic_with_trailing_channel() {
        let event = route("/dev/plant-a/register/ESP-01/data/2", "1").unwrap();
        assert_eq!(event.device_id, "ESP-01");
        assert_eq!(
            event.kind,
            EventKind::Data {
                channel: "2".to_string()
            }
        );
    }

    #[test]
    fn data_channel_is_the_trailing_segment() {
        let event = route("/dev/plant-a/register/ESP-01/data/group/3", "1").unwrap();
        assert_eq!(
            event.kind,
            EventKind::Data {
                channel: "3".to_string()
            }
        );
    }

    #[test]
    fn drops_broker_acknowledgment_payload() {
        assert!(route("/dev/plant-a/register/ESP-01/log", "Configuration data accepted!").is_none());
    }

    #[test]
    fn drops_malformed_topics() {
        assert!(route("/foo/bar", "x").is_none());
        assert!(route("", "x").is_none());
        assert!(route("/dev/plant-a/register", "x").is_none());
        assert!(route("/dev/plant-a/register/ESP-01", "x").is_none());
        // data without a channel segment
        assert!(route("/dev/plant-a/register/ESP-01/data", "x").is_none());
    }

    #[test]
    fn drops_unknown_kinds() {
        assert!(route("/dev/device/register/ESP-01/cmd", "set.config({})").is_none());
        assert!(route("/dev/plant-a/register/ESP-01/status", "x").is_none());
    }
}
