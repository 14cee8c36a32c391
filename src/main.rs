pub mod command;
pub mod config;
pub mod controller;
pub mod mqtt;
pub mod serial;
pub mod telemetry;

use crate::command::{CommandArbiter, CommandRouter, Intent, RateLimiter, Translator};
use crate::config::BridgeConfig;
use crate::controller::ControllerHandle;
use crate::mqtt::MqttHandler;
use crate::telemetry::run_telemetry_loop;
use color_eyre::{eyre::eyre, Result};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = BridgeConfig::load().await?;
    debug!("Effective configuration: {:?}", config);

    run(config).await
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
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| Level::from_str(&value).ok())
        .unwrap_or(Level::INFO);

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

async fn run(config: BridgeConfig) -> Result<()> {
    let cancel = CancellationToken::new();

    // Serial link; without it there is nothing to bridge
    let (sink, mut reader) = serial::open(&config.serial)?;
    let arbiter = Arc::new(CommandArbiter::new(
        sink,
        RateLimiter::new(config.commands.update_interval()),
    ));
    let router = Arc::new(CommandRouter::new(
        Translator::new(config.commands.translator_settings()),
        Arc::clone(&arbiter),
    ));

    let mut mqtt = MqttHandler::new(config.broker.clone())?;
    let publisher = mqtt.publisher();

    let command_router = Arc::clone(&router);
    mqtt.subscribe(&config.broker.command_topic, move |msg| {
        match command_router.handle_broker_payload(&msg.payload) {
            Ok(Some(submission)) => debug!("Broker command {}: {:?}", msg, submission),
            Ok(None) => {}
            Err(e) => warn!("Broker command {} not delivered: {}", msg, e),
        }
    });

    // Serial reader; a dead device shuts the whole bridge down
    let telemetry_task = {
        let token = cancel.clone();
        let topic = config.broker.telemetry_topic.clone();
        let telemetry_config = config.telemetry.clone();
        tokio::task::spawn_blocking(move || {
            let result = run_telemetry_loop(
                &mut reader,
                &publisher,
                &topic,
                &telemetry_config,
                &token,
            );
            token.cancel();
            result
        })
    };

    // Microcontroller resets when the port opens
    tokio::time::sleep(Duration::from_millis(config.serial.startup_settle_ms)).await;

    let gamepad_task = if config.gamepad.enabled {
        Some(ControllerHandle::spawn(
            config.gamepad.clone(),
            Arc::clone(&router),
            cancel.clone(),
        ))
    } else {
        info!("Gamepad disabled by configuration");
        None
    };

    if let Err(e) = mqtt.connect().await {
        cancel.cancel();
        return Err(eyre!("Could not establish broker session: {}", e));
    }
    let broker_task = tokio::spawn(mqtt.run(cancel.clone()));

    let initial = Intent::ModeSet {
        mode: config.commands.initial_mode,
    };
    if let Err(e) = router.submit_intent(&initial) {
        error!("Failed to send initial mode: {}", e);
    }

    info!("Bridge running");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
        _ = cancel.cancelled() => warn!("A bridge loop stopped, shutting down"),
    }
    cancel.cancel();

    let limit = Duration::from_millis(config.runtime.shutdown_timeout_ms);
    match join_within("telemetry", telemetry_task, limit).await {
        Some(Ok(stats)) => info!("Telemetry: {:?}", stats),
        Some(Err(e)) => error!("Telemetry loop failed: {}", e),
        None => {}
    }
    if let Some(task) = gamepad_task {
        if let Some(Err(e)) = join_within("gamepad", task, limit).await {
            error!("Gamepad loop failed: {}", e);
        }
    }
    if let Some(status) = join_within("broker", broker_task, limit).await {
        info!(
            "Broker: {} messages received, {} connection errors",
            status.messages_received, status.connection_errors
        );
    }

    let stats = arbiter.stats();
    info!(
        "Commands: {} written, {} throttled, {} failed, {} unrecognized",
        stats.written(),
        stats.throttled(),
        stats.failed(),
        router.unrecognized()
    );
    info!("Fin");
    Ok(())
}

/// Waits up to `limit` for a task; a task that does not finish is abandoned.
async fn join_within<T>(name: &str, task: JoinHandle<T>, limit: Duration) -> Option<T> {
    match tokio::time::timeout(limit, task).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            error!("{} task panicked or was aborted: {}", name, e);
            None
        }
        Err(_) => {
            warn!("{} task did not stop within {:?}, abandoning it", name, limit);
            None
        }
    }
}
