//! Registry Worker - the single owner of all device state.
//!
//! Modeled as an action-processing task: inbound MQTT messages, liveness
//! sweep ticks, debounce expiries, and operator actions all funnel into one
//! loop and are handled to completion in arrival order. The cloneable
//! [`RegistryHandle`] is the only way in; responses travel back over oneshot
//! channels. A watch channel broadcasts a fresh [`RegistrySnapshot`] after
//! every observable state change for whatever presentation sits on top.

use chrono::Local;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::mqtt::MqttMessage;
use crate::persistence::{export, DeviceStore};
use crate::validation::{ValidatedDevice, ValidationEngine, ValidationError};

use super::device_registry::{DeviceRegistry, DeviceState};
use super::message_router;
use super::timeout_scheduler::TimeoutScheduler;

/// Timing configuration for the registry subsystem.
///
/// # Examples
///
/// ```rust,ignore
/// // production timing
/// let settings = RegistrySettings::default();
///
/// // scaled-down windows for tests
/// let settings = RegistrySettings {
///     sweep_interval_ms: 50,
///     liveness_threshold_ms: 40,
///     debounce_window_ms: 100,
/// };
/// ```
#[derive(Clone, Debug)]
pub struct RegistrySettings {
    /// Period of the liveness sweep in milliseconds.
    pub sweep_interval_ms: u64,

    /// Liveness threshold in milliseconds. Deliberately just under the sweep
    /// period so a device that misses a single reporting tick flips to
    /// offline on the next sweep.
    pub liveness_threshold_ms: u64,

    /// Debounce window for a channel's `active` indicator in milliseconds.
    pub debounce_window_ms: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 30_000,
            liveness_threshold_ms: 29_500,
            debounce_window_ms: 1_000,
        }
    }
}

/// Point-in-time view of both device sets, for presentation.
#[derive(Clone, Debug, Default)]
pub struct RegistrySnapshot {
    pub devices: Vec<DeviceState>,
    pub validated: Vec<ValidatedDevice>,
}

/// Actions processed by the registry worker.
#[derive(Debug)]
pub enum RegistryAction {
    /// A debounce timer elapsed for `(device_id, channel)`.
    ChannelExpired {
        device_id: String,
        channel: String,
        generation: u64,
    },
    Devices {
        response_tx: oneshot::Sender<Vec<DeviceState>>,
    },
    Validated {
        response_tx: oneshot::Sender<Vec<ValidatedDevice>>,
    },
    Validate {
        device_id: String,
        response_tx: oneshot::Sender<Result<ValidatedDevice, ValidationError>>,
    },
    Unvalidate {
        device_id: String,
        response_tx: oneshot::Sender<Result<(), ValidationError>>,
    },
    Export {
        path: PathBuf,
        response_tx: oneshot::Sender<Result<usize, ValidationError>>,
    },
}

/// Handle for driving the registry worker.
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<RegistryAction>,
}

impl RegistryHandle {
    /// Spawns the worker task, which owns the registry, the timeout
    /// scheduler, and the validation engine. `message_rx` is the inbound
    /// MQTT stream; the internal sweep ticker runs at the configured period.
    pub fn spawn(
        settings: RegistrySettings,
        store: DeviceStore,
        message_rx: mpsc::Receiver<MqttMessage>,
        shutdown: CancellationToken,
    ) -> (Self, watch::Receiver<RegistrySnapshot>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let (update_tx, update_rx) = watch::channel(RegistrySnapshot::default());

        let worker = RegistryWorker {
            registry: DeviceRegistry::new(),
            scheduler: TimeoutScheduler::new(
                Duration::from_millis(settings.debounce_window_ms),
                tx.clone(),
            ),
            engine: ValidationEngine::new(store),
            settings,
            update_tx,
        };
        let task = tokio::spawn(worker.run(rx, message_rx, shutdown));

        (Self { tx }, update_rx, task)
    }

    /// All live devices, lexicographic by id.
    pub async fn devices(&self) -> Result<Vec<DeviceState>> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(RegistryAction::Devices { response_tx }).await?;
        Ok(response_rx.await?)
    }

    /// All validated devices, lexicographic by id.
    pub async fn validated(&self) -> Result<Vec<ValidatedDevice>> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(RegistryAction::Validated { response_tx }).await?;
        Ok(response_rx.await?)
    }

    /// Validates a live device, moving it into the validated set and the
    /// durable store.
    pub async fn validate(&self, device_id: &str) -> Result<ValidatedDevice> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(RegistryAction::Validate {
            device_id: device_id.to_string(),
            response_tx,
        })
        .await?;
        Ok(response_rx.await??)
    }

    /// Removes a device from the validated set and the durable store.
    pub async fn unvalidate(&self, device_id: &str) -> Result<()> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(RegistryAction::Unvalidate {
            device_id: device_id.to_string(),
            response_tx,
        })
        .await?;
        Ok(response_rx.await??)
    }

    /// Exports the validated list as plain text. Returns the number of
    /// exported devices.
    pub async fn export(&self, path: PathBuf) -> Result<usize> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(RegistryAction::Export { path, response_tx }).await?;
        Ok(response_rx.await??)
    }

    async fn send(&self, action: RegistryAction) -> Result<()> {
        self.tx
            .send(action)
            .await
            .map_err(|_| eyre!("registry worker is no longer running"))
    }
}

struct RegistryWorker {
    registry: DeviceRegistry,
    scheduler: TimeoutScheduler,
    engine: ValidationEngine,
    settings: RegistrySettings,
    update_tx: watch::Sender<RegistrySnapshot>,
}

impl RegistryWorker {
    async fn run(
        mut self,
        mut action_rx: mpsc::Receiver<RegistryAction>,
        mut message_rx: mpsc::Receiver<MqttMessage>,
        shutdown: CancellationToken,
    ) {
        let loaded = self.engine.load().await;
        info!("{} validated devices loaded from store", loaded);
        self.publish_snapshot();

        let mut sweep = tokio::time::interval(Duration::from_millis(self.settings.sweep_interval_ms));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sweep.tick() => self.handle_sweep(),
                message = message_rx.recv() => match message {
                    Some(message) => self.handle_message(message),
                    None => {
                        debug!("inbound message channel closed");
                        break;
                    }
                },
                action = action_rx.recv() => match action {
                    Some(action) => self.handle_action(action).await,
                    None => break,
                },
            }
        }
        info!("registry worker stopped");
    }

    fn handle_message(&mut self, message: MqttMessage) {
        let Some(event) = message_router::route(message.topic(), message.payload()) else {
            trace!("dropped noise on {}", message.topic());
            return;
        };

        if self.engine.is_validated(&event.device_id) {
            debug!("ignoring event for validated device {}", event.device_id);
            return;
        }

        let outcome = self.registry.apply_event(&event, Local::now());
        if let Some(channel) = outcome.debounce {
            debug!("device {}, channel {} triggered", event.device_id, channel);
            self.scheduler.schedule(&event.device_id, &channel);
        }
        self.publish_snapshot();
    }

    fn handle_sweep(&mut self) {
        let threshold = chrono::Duration::milliseconds(self.settings.liveness_threshold_ms as i64);
        let flipped = self.registry.sweep_liveness(Local::now(), threshold);
        if flipped > 0 {
            debug!("liveness sweep flipped {} devices", flipped);
            self.publish_snapshot();
        }
    }

    async fn handle_action(&mut self, action: RegistryAction) {
        match action {
            RegistryAction::ChannelExpired {
                device_id,
                channel,
                generation,
            } => {
                // a timer that fired right before a re-trigger leaves its
                // expiry in the queue; only the currently armed one counts
                if !self.scheduler.acknowledge(&device_id, &channel, generation) {
                    trace!("dropping stale debounce expiry for {}/{}", device_id, channel);
                    return;
                }
                if self.registry.expire_channel(&device_id, &channel) {
                    trace!("channel {} of {} back to inactive", channel, device_id);
                    self.publish_snapshot();
                }
            }
            RegistryAction::Devices { response_tx } => {
                let _ = response_tx.send(self.registry.all());
            }
            RegistryAction::Validated { response_tx } => {
                let _ = response_tx.send(self.engine.all());
            }
            RegistryAction::Validate {
                device_id,
                response_tx,
            } => {
                let result = self.validate_device(&device_id).await;
                if response_tx.send(result).is_err() {
                    warn!("validation caller went away");
                }
            }
            RegistryAction::Unvalidate {
                device_id,
                response_tx,
            } => {
                let result = self.engine.unvalidate(&device_id).await;
                if result.is_ok() {
                    self.publish_snapshot();
                }
                let _ = response_tx.send(result);
            }
            RegistryAction::Export { path, response_tx } => {
                let devices = self.engine.all();
                let result = match export::export_validated(&path, &devices).await {
                    Ok(()) => {
                        info!("{} validated devices exported to {}", devices.len(), path.display());
                        Ok(devices.len())
                    }
                    Err(err) => Err(err.into()),
                };
                let _ = response_tx.send(result);
            }
        }
    }

    /// Moves a device out of the live registry once the engine has durably
    /// persisted it. On a persistence failure the device stays live and
    /// keeps its timers; validation simply did not complete.
    async fn validate_device(
        &mut self,
        device_id: &str,
    ) -> Result<ValidatedDevice, ValidationError> {
        let device = self
            .registry
            .get(device_id)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownDevice(device_id.to_string()))?;

        let snapshot = self.engine.validate(device, Local::now()).await?;
        self.registry.remove(device_id);
        self.scheduler.cancel_device(device_id);
        self.publish_snapshot();
        Ok(snapshot)
    }

    fn publish_snapshot(&self) {
        self.update_tx.send_replace(RegistrySnapshot {
            devices: self.registry.all(),
            validated: self.engine.all(),
        });
    }
}
