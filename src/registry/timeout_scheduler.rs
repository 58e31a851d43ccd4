//! Per (device, channel) debounce timers for the `active` indicator.
//!
//! The original behavior is a debounce, not an accumulation: re-triggering a
//! channel replaces its pending timer. Each timer is a one-shot tokio task
//! that sends a [`RegistryAction::ChannelExpired`] back to the registry
//! worker when the window elapses; the worker performs the guarded state
//! mutation, so a timer firing after its device was validated or removed is
//! harmless.
//!
//! Aborting a task cannot recall an expiry that already fired and sits in
//! the action queue. Every armed timer therefore carries a generation tag,
//! and only the expiry matching the currently armed generation is honored -
//! a stale one from before a re-trigger is ignored instead of cutting the
//! fresh window short.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use super::registry_worker::RegistryAction;

pub struct TimeoutScheduler {
    window: Duration,
    expire_tx: mpsc::Sender<RegistryAction>,
    timers: HashMap<(String, String), (u64, JoinHandle<()>)>,
    generation: u64,
}

impl TimeoutScheduler {
    pub fn new(window: Duration, expire_tx: mpsc::Sender<RegistryAction>) -> Self {
        Self {
            window,
            expire_tx,
            timers: HashMap::new(),
            generation: 0,
        }
    }

    /// Arms the one-shot timer for `(device_id, channel)`, cancelling any
    /// pending timer for the same key.
    pub fn schedule(&mut self, device_id: &str, channel: &str) {
        let key = (device_id.to_string(), channel.to_string());
        if let Some((_, previous)) = self.timers.remove(&key) {
            previous.abort();
            trace!("re-armed debounce for {}/{}", device_id, channel);
        }

        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let expire_tx = self.expire_tx.clone();
        let window = self.window;
        let (id, ch) = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = expire_tx
                .send(RegistryAction::ChannelExpired {
                    device_id: id,
                    channel: ch,
                    generation,
                })
                .await;
        });

        self.timers.insert(key, (generation, handle));
    }

    /// Checks an expiry against the currently armed timer. Only a match
    /// drops the bookkeeping entry and returns true; a stale expiry (the
    /// timer was re-armed or cancelled after this one fired) returns false
    /// and must be ignored by the caller.
    pub fn acknowledge(&mut self, device_id: &str, channel: &str, generation: u64) -> bool {
        let key = (device_id.to_string(), channel.to_string());
        match self.timers.get(&key) {
            Some((current, _)) if *current == generation => {
                self.timers.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Aborts every pending timer for a device. Called on validation and
    /// removal; idempotent.
    pub fn cancel_device(&mut self, device_id: &str) {
        self.timers.retain(|(id, _), entry| {
            if id == device_id {
                entry.1.abort();
                false
            } else {
                true
            }
        });
    }

    pub fn pending(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for TimeoutScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.timers.values() {
            handle.abort();
        }
    }
}
