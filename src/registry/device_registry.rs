//! Synchronous device state map: creation, channel confirmation, liveness.
//!
//! This is a pure state container. It never spawns tasks or performs I/O;
//! timer scheduling is requested through [`ApplyOutcome`] and executed by the
//! registry worker, which keeps this type trivially unit-testable with an
//! injected clock.

use chrono::{DateTime, Duration, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The fixed channel set every device reports on.
///
/// Channels are never created dynamically; a `data` event for a key outside
/// this set refreshes the device but confirms nothing.
pub const CHANNELS: [&str; 3] = ["1", "2", "3"];

/// Per-channel signal state.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SignalState {
    /// Tri-state enable flag. Initialized to `None` and kept untouched;
    /// present for forward compatibility with device firmware that reports it.
    pub enable: Option<bool>,
    /// True while the channel's debounce window has not elapsed since the
    /// last trigger.
    pub active: bool,
    /// True once a `data` event was observed for this channel since the last
    /// `log` reset.
    pub validated: bool,
}

/// Live state of a single field device.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    /// Unique id, taken from the device's topic path segment.
    pub id: String,
    /// True while recent activity was observed, false after the liveness
    /// threshold elapses.
    pub online: bool,
    /// Set by the validation engine at the moment the device is moved out of
    /// the live registry.
    pub validated: bool,
    /// Updated on every accepted event for this device.
    pub last_seen: DateTime<Local>,
    /// Signal state per channel; always exactly [`CHANNELS`].
    pub signals: BTreeMap<String, SignalState>,
}

impl DeviceState {
    pub fn new(id: impl Into<String>, now: DateTime<Local>) -> Self {
        let signals = CHANNELS
            .iter()
            .map(|channel| (channel.to_string(), SignalState::default()))
            .collect();

        Self {
            id: id.into(),
            online: true,
            validated: false,
            last_seen: now,
            signals,
        }
    }

    /// True iff every channel has confirmed since the last `log` reset.
    pub fn all_signals_validated(&self) -> bool {
        self.signals.values().all(|signal| signal.validated)
    }
}

/// What an incoming message means for a device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Device heartbeat; invalidates all prior channel confirmations.
    Log,
    /// Signal pulse on one channel.
    Data { channel: String },
}

/// Normalized event emitted by the message router.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceEvent {
    pub device_id: String,
    pub kind: EventKind,
}

/// Result of applying one event.
#[derive(Clone, Debug)]
pub struct ApplyOutcome {
    /// Updated state, for re-rendering.
    pub device: DeviceState,
    /// Channel whose debounce timer must be (re)armed, if any.
    pub debounce: Option<String>,
}

/// In-memory mapping of device id to live state.
///
/// A `BTreeMap` keeps [`DeviceRegistry::all`] lexicographic by id, which is
/// the display order.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, DeviceState>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a router event, creating the device on first sight.
    ///
    /// Every accepted event refreshes `last_seen` and forces `online`. A
    /// `log` event resets all channel confirmations; a `data` event on a
    /// known channel confirms it and requests a debounce (re)arm.
    pub fn apply_event(&mut self, event: &DeviceEvent, now: DateTime<Local>) -> ApplyOutcome {
        let device = self
            .devices
            .entry(event.device_id.clone())
            .or_insert_with(|| DeviceState::new(event.device_id.clone(), now));

        device.last_seen = now;
        device.online = true;

        let mut debounce = None;
        match &event.kind {
            EventKind::Log => {
                for signal in device.signals.values_mut() {
                    signal.validated = false;
                }
            }
            EventKind::Data { channel } => {
                if let Some(signal) = device.signals.get_mut(channel) {
                    signal.active = true;
                    signal.validated = true;
                    debounce = Some(channel.clone());
                }
            }
        }

        ApplyOutcome {
            device: device.clone(),
            debounce,
        }
    }

    /// Reverts a channel's `active` flag after its debounce window elapsed.
    ///
    /// A timer may fire after its device was validated or removed; that is a
    /// guarded no-op, not an error. `validated` is left untouched.
    pub fn expire_channel(&mut self, device_id: &str, channel: &str) -> bool {
        match self
            .devices
            .get_mut(device_id)
            .and_then(|device| device.signals.get_mut(channel))
        {
            Some(signal) if signal.active => {
                signal.active = false;
                true
            }
            _ => false,
        }
    }

    /// Recomputes `online` for every device from `now - last_seen` against
    /// the liveness threshold. Returns how many devices flipped.
    pub fn sweep_liveness(&mut self, now: DateTime<Local>, threshold: Duration) -> usize {
        let mut flipped = 0;
        for device in self.devices.values_mut() {
            let fresh = now - device.last_seen <= threshold;
            if device.online != fresh {
                device.online = fresh;
                flipped += 1;
            }
        }
        flipped
    }

    pub fn get(&self, device_id: &str) -> Option<&DeviceState> {
        self.devices.get(device_id)
    }

    pub fn remove(&mut self, device_id: &str) -> Option<DeviceState> {
        self.devices.remove(device_id)
    }

    /// All live devices, lexicographic by id.
    pub fn all(&self) -> Vec<DeviceState> {
        self.devices.values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_event(id: &str) -> DeviceEvent {
        DeviceEvent {
            device_id: id.to_string(),
            kind: EventKind::Log,
        }
    }

    fn data_event(id: &str, channel: &str) -> DeviceEvent {
        DeviceEvent {
            device_id: id.to_string(),
            kind: EventKind::Data {
                channel: channel.to_string(),
            },
        }
    }

    #[test]
    fn first_event_creates_device_with_fixed_channels() {
        let mut registry = DeviceRegistry::new();
        let now = Local::now();

        let outcome = registry.apply_event(&log_event("ESP-01"), now);

        assert!(outcome.device.online);
        assert!(!outcome.device.validated);
        assert_eq!(outcome.device.last_seen, now);
        assert_eq!(
            outcome.device.signals.keys().collect::<Vec<_>>(),
            vec!["1", "2", "3"]
        );
        for signal in outcome.device.signals.values() {
            assert_eq!(signal.enable, None);
            assert!(!signal.active);
            assert!(!signal.validated);
        }
        assert!(outcome.debounce.is_none());
    }

    #[test]
    fn data_event_confirms_channel_and_requests_debounce() {
        let mut registry = DeviceRegistry::new();
        let now = Local::now();

        let outcome = registry.apply_event(&data_event("ESP-01", "2"), now);

        let signal = &outcome.device.signals["2"];
        assert!(signal.active);
        assert!(signal.validated);
        assert_eq!(signal.enable, None);
        assert!(!outcome.device.signals["1"].validated);
        assert_eq!(outcome.debounce.as_deref(), Some("2"));
    }

    #[test]
    fn data_event_on_unknown_channel_still_refreshes_device() {
        let mut registry = DeviceRegistry::new();
        let created = Local::now() - Duration::seconds(60);
        registry.apply_event(&log_event("ESP-01"), created);

        let now = Local::now();
        let outcome = registry.apply_event(&data_event("ESP-01", "9"), now);

        assert_eq!(outcome.device.last_seen, now);
        assert!(outcome.debounce.is_none());
        assert_eq!(outcome.device.signals.len(), CHANNELS.len());
        assert!(!outcome.device.all_signals_validated());
    }

    #[test]
    fn log_event_resets_all_channel_confirmations() {
        let mut registry = DeviceRegistry::new();
        let now = Local::now();
        for channel in CHANNELS {
            registry.apply_event(&data_event("ESP-01", channel), now);
        }
        assert!(registry.get("ESP-01").unwrap().all_signals_validated());

        let outcome = registry.apply_event(&log_event("ESP-01"), now);

        assert!(!outcome.device.all_signals_validated());
        for signal in outcome.device.signals.values() {
            assert!(!signal.validated);
        }
    }

    #[test]
    fn expire_channel_clears_active_and_keeps_validated() {
        let mut registry = DeviceRegistry::new();
        registry.apply_event(&data_event("ESP-01", "1"), Local::now());

        assert!(registry.expire_channel("ESP-01", "1"));

        let signal = &registry.get("ESP-01").unwrap().signals["1"];
        assert!(!signal.active);
        assert!(signal.validated);

        // expiring again, or on missing targets, is a no-op
        assert!(!registry.expire_channel("ESP-01", "1"));
        assert!(!registry.expire_channel("ESP-01", "9"));
        assert!(!registry.expire_channel("ghost", "1"));
    }

    #[test]
    fn sweep_liveness_matches_recency_invariant() {
        let mut registry = DeviceRegistry::new();
        let now = Local::now();
        registry.apply_event(&log_event("stale"), now - Duration::milliseconds(40_000));
        registry.apply_event(&log_event("fresh"), now - Duration::milliseconds(1_000));

        let flipped = registry.sweep_liveness(now, Duration::milliseconds(29_500));

        assert_eq!(flipped, 1);
        for device in registry.all() {
            assert_eq!(
                device.online,
                now - device.last_seen <= Duration::milliseconds(29_500)
            );
        }
        assert!(!registry.get("stale").unwrap().online);
        assert!(registry.get("fresh").unwrap().online);

        // a second sweep changes nothing
        assert_eq!(registry.sweep_liveness(now, Duration::milliseconds(29_500)), 0);
    }

    #[test]
    fn all_is_ordered_by_id() {
        let mut registry = DeviceRegistry::new();
        let now = Local::now();
        for id in ["zeta", "alpha", "mid"] {
            registry.apply_event(&log_event(id), now);
        }

        let ids: Vec<String> = registry.all().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut registry = DeviceRegistry::new();
        registry.apply_event(&log_event("ESP-01"), Local::now());

        assert!(registry.remove("ESP-01").is_some());
        assert!(registry.remove("ESP-01").is_none());
        assert!(registry.is_empty());
    }
}
