pub mod command;
pub mod mqtt;
pub mod persistence;
pub mod registry;
pub mod settings;
pub mod validation;

use std::path::PathBuf;

use color_eyre::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::command::CommandPublisher;
use crate::mqtt::{ConnectionState, MqttHandle};
use crate::persistence::DeviceStore;
use crate::registry::device_registry::DeviceState;
use crate::registry::{RegistryHandle, RegistrySettings};
use crate::settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let settings = setup_settings().await?;
    info!(
        "Broker: {}:{} as '{}'",
        settings.mqtt.host, settings.mqtt.port, settings.mqtt.client_id
    );

    let shutdown = CancellationToken::new();

    let (inbound_tx, inbound_rx) = mpsc::channel(100);
    let (mqtt_handle, mqtt_task) =
        MqttHandle::spawn(settings.mqtt.clone(), inbound_tx, shutdown.clone());

    let store = DeviceStore::new(settings.store_path());
    info!("Device store: {}", store.path().display());

    let (registry, mut updates, registry_task) = RegistryHandle::spawn(
        RegistrySettings::default(),
        store,
        inbound_rx,
        shutdown.clone(),
    );

    let publisher = CommandPublisher::new(mqtt_handle.clone(), settings.clone());

    let update_logger = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            debug!(
                "{} live devices, {} validated",
                snapshot.devices.len(),
                snapshot.validated.len()
            );
        }
    });

    run_console(&registry, &publisher, &mqtt_handle).await;

    info!("Shutting down");
    shutdown.cancel();
    let _ = registry_task.await;
    let _ = mqtt_task.await;
    update_logger.abort();
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

async fn setup_settings() -> Result<Settings> {
    Settings::ensure_default_config().await?;
    Settings::load().await
}

/// One parsed console line. Keeping the parse separate from the handlers
/// lets malformed input get a usage hint instead of the generic
/// unknown-command reply.
#[derive(Debug, PartialEq, Eq)]
enum ConsoleCommand<'a> {
    Help,
    Status,
    List,
    Validated,
    Validate(&'a str),
    Unvalidate(&'a str),
    Send { id: &'a str, activate: bool },
    Export(&'a str),
    Quit,
    Empty,
    Invalid(String),
}

fn parse_command(line: &str) -> ConsoleCommand<'_> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (None, _, _) => ConsoleCommand::Empty,
        (Some("help"), _, _) => ConsoleCommand::Help,
        (Some("status"), _, _) => ConsoleCommand::Status,
        (Some("list"), _, _) => ConsoleCommand::List,
        (Some("validated"), _, _) => ConsoleCommand::Validated,
        (Some("validate"), Some(id), _) => ConsoleCommand::Validate(id),
        (Some("validate"), None, _) => ConsoleCommand::Invalid("usage: validate <id>".to_string()),
        (Some("unvalidate"), Some(id), _) => ConsoleCommand::Unvalidate(id),
        (Some("unvalidate"), None, _) => {
            ConsoleCommand::Invalid("usage: unvalidate <id>".to_string())
        }
        (Some("send"), Some(id), Some("on")) => ConsoleCommand::Send { id, activate: true },
        (Some("send"), Some(id), Some("off")) => ConsoleCommand::Send { id, activate: false },
        (Some("send"), _, _) => ConsoleCommand::Invalid("usage: send <id> on|off".to_string()),
        (Some("export"), Some(path), _) => ConsoleCommand::Export(path),
        (Some("export"), None, _) => ConsoleCommand::Invalid("usage: export <path>".to_string()),
        (Some("quit" | "exit"), _, _) => ConsoleCommand::Quit,
        (Some(other), _, _) => {
            ConsoleCommand::Invalid(format!("unknown command '{other}' - type 'help'"))
        }
    }
}

/// Minimal operator console; the full windowing shell lives elsewhere.
async fn run_console(registry: &RegistryHandle, publisher: &CommandPublisher, mqtt: &MqttHandle) {
    println!("fieldmon ready - type 'help' for commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let result = match parse_command(&line) {
            ConsoleCommand::Help => {
                print_help();
                Ok(())
            }
            ConsoleCommand::Status => {
                let state = mqtt.connection_state();
                println!(
                    "broker: {}",
                    if state == ConnectionState::Connected {
                        "Conectado"
                    } else {
                        "Desconectado"
                    }
                );
                Ok(())
            }
            ConsoleCommand::List => match registry.devices().await {
                Ok(devices) => {
                    if devices.is_empty() {
                        println!("no live devices");
                    }
                    for device in &devices {
                        println!("{}", render_device(device));
                    }
                    Ok(())
                }
                Err(err) => Err(err),
            },
            ConsoleCommand::Validated => match registry.validated().await {
                Ok(devices) => {
                    if devices.is_empty() {
                        println!("no validated devices");
                    }
                    for device in &devices {
                        println!("{}", persistence::export::export_line(device));
                    }
                    Ok(())
                }
                Err(err) => Err(err),
            },
            ConsoleCommand::Validate(id) => registry
                .validate(id)
                .await
                .map(|snapshot| println!("device {} validated", snapshot.id)),
            ConsoleCommand::Unvalidate(id) => registry
                .unvalidate(id)
                .await
                .map(|_| println!("device {id} removed from validated set")),
            ConsoleCommand::Send { id, activate } => publisher
                .send_config(id, activate)
                .await
                .map(|_| println!("command sent to {id}"))
                .map_err(Into::into),
            ConsoleCommand::Export(path) => registry
                .export(PathBuf::from(path))
                .await
                .map(|count| println!("{count} devices exported to {path}")),
            ConsoleCommand::Quit => break,
            ConsoleCommand::Empty => Ok(()),
            ConsoleCommand::Invalid(message) => {
                println!("{message}");
                Ok(())
            }
        };

        if let Err(err) = result {
            println!("error: {err}");
        }
    }
}

fn print_help() {
    println!("commands:");
    println!("  list                live devices and channel state");
    println!("  validated           validated devices");
    println!("  validate <id>       confirm a device (all channels verified)");
    println!("  unvalidate <id>     remove a device from the validated set");
    println!("  send <id> on|off    push port configuration to a device");
    println!("  export <path>       write the validated list as text");
    println!("  status              broker connection state");
    println!("  quit                exit");
}

fn render_device(device: &DeviceState) -> String {
    let signals = device
        .signals
        .iter()
        .map(|(channel, signal)| {
            format!(
                "{}:{}{}",
                channel,
                if signal.validated { "V" } else { "." },
                if signal.active { "*" } else { " " }
            )
        })
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "{:<16} {:<8} {}  last seen {}{}",
        device.id,
        if device.online { "online" } else { "offline" },
        signals,
        device.last_seen.format("%H:%M:%S"),
        if device.all_signals_validated() {
            "  [ready to validate]"
        } else {
            ""
        }
    )
}
