//! Connection state machine and the rumqttc event loop task.

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::{MqttConfig, DATA_FILTER, LOG_FILTER};
use super::message_manager::MqttMessage;

/// Backoff between reconnect attempts after a poll error.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
    Reconnecting,
}

#[derive(Debug, Error)]
pub enum MqttError {
    /// Publish attempted while the broker connection is down. No state is
    /// mutated; the caller decides whether to retry.
    #[error("not connected to the broker")]
    NotConnected,

    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// Cloneable handle onto the broker connection.
///
/// Publishing checks the live connection state first so a disconnect
/// surfaces as [`MqttError::NotConnected`] instead of silently queueing
/// into a dead event loop.
#[derive(Clone)]
pub struct MqttHandle {
    client: AsyncClient,
    state_rx: watch::Receiver<ConnectionState>,
}

impl MqttHandle {
    /// Connects to the broker and spawns the event loop task. Inbound
    /// publishes are forwarded over `inbound_tx`; the task ends when the
    /// shutdown token fires or the inbound consumer goes away.
    pub fn spawn(
        config: MqttConfig,
        inbound_tx: mpsc::Sender<MqttMessage>,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if !config.username.is_empty() {
            options.set_credentials(config.username.clone(), config.password.clone());
        }

        let (client, eventloop) = AsyncClient::new(options, 100);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let task = tokio::spawn(connection_loop(
            client.clone(),
            eventloop,
            inbound_tx,
            state_tx,
            shutdown,
        ));

        (Self { client, state_rx }, task)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.state_rx.borrow(), ConnectionState::Connected)
    }

    pub async fn publish(&self, topic: &str, payload: &str) -> Result<(), MqttError> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }
}

async fn connection_loop(
    client: AsyncClient,
    mut eventloop: rumqttc::EventLoop,
    inbound_tx: mpsc::Sender<MqttMessage>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("mqtt shutdown requested");
                let _ = client.disconnect().await;
                let _ = state_tx.send(ConnectionState::Disconnected);
                break;
            }
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("connected to broker");
                    let _ = state_tx.send(ConnectionState::Connected);
                    for filter in [LOG_FILTER, DATA_FILTER] {
                        if let Err(err) = client.subscribe(filter, QoS::AtMostOnce).await {
                            error!("subscribe to {} failed: {}", filter, err);
                        } else {
                            debug!("subscribed to {}", filter);
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let payload = String::from_utf8_lossy(&publish.payload).to_string();
                    let message = MqttMessage::from_parts(publish.topic, payload);
                    if inbound_tx.send(message).await.is_err() {
                        warn!("inbound consumer gone, stopping mqtt event loop");
                        break;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt connection error: {err}, retrying in {RECONNECT_BACKOFF:?}");
                    let _ = state_tx.send(ConnectionState::Reconnecting);
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_while_disconnected_is_a_typed_failure() {
        // port 1 refuses connections, so the handle never reaches Connected
        let config = MqttConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..MqttConfig::default()
        };
        let (inbound_tx, _inbound_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let (handle, _task) = MqttHandle::spawn(config, inbound_tx, shutdown.clone());

        assert!(!handle.is_connected());
        let err = handle.publish("/dev/device/register/ESP-01/cmd", "x").await;
        assert!(matches!(err, Err(MqttError::NotConnected)));

        shutdown.cancel();
    }
}
