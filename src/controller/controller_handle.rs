//! Controller Handle - runs the gamepad loop on a blocking thread
//!
//! Collects events from gilrs, dispatches them to intents and submits those through
//! the shared [`CommandRouter`]. The loop ends when the cancellation token fires.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::event_collector::{CollectorError, EventCollector, GamepadEvent, Initializing};
use super::event_processor::dispatch;
use crate::command::{CommandRouter, CommandSink, Submission};

/// Gamepad settings
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct ControllerSettings {
    /// Run the gamepad loop at all
    pub enabled: bool,

    /// Raw stick readings below this magnitude count as at rest
    pub deadzone: i32,

    /// Longest single wait for a gamepad event; bounds shutdown latency
    pub poll_timeout_ms: u64,

    /// Resend period for a stick held off rest
    pub repeat_interval_ms: u64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            deadzone: 500,
            poll_timeout_ms: 100,
            repeat_interval_ms: 100,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Collector error: {0}")]
    CollectorError(#[from] CollectorError),
}

pub struct ControllerHandle;

impl ControllerHandle {
    /// Spawns the gamepad loop; the task resolves when `cancel` fires.
    pub fn spawn<S>(
        settings: ControllerSettings,
        router: Arc<CommandRouter<S>>,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<(), ControllerError>>
    where
        S: CommandSink + 'static,
    {
        info!("Spawning gamepad loop with settings: {:?}", settings);

        tokio::task::spawn_blocking(move || {
            let poll_timeout = Duration::from_millis(settings.poll_timeout_ms);
            let repeat_interval = Duration::from_millis(settings.repeat_interval_ms);
            let mut collector = EventCollector::<Initializing>::create(settings)?.initialize();
            info!("Gamepad loop running");

            while !cancel.is_cancelled() {
                if let Some(event) = collector.next_event(poll_timeout) {
                    forward(&router, &event, Instant::now());
                }
                for event in collector.held_sticks(repeat_interval) {
                    forward(&router, &event, Instant::now());
                }
            }

            info!("Gamepad loop stopped");
            Ok(())
        })
    }
}

fn forward<S: CommandSink>(router: &CommandRouter<S>, event: &GamepadEvent, now: Instant) {
    let Some(intent) = dispatch(event) else {
        debug!("No binding for {:?}", event);
        return;
    };

    match router.submit_intent_at(&intent, now) {
        Ok(Submission::Written) => {}
        Ok(Submission::Throttled) => debug!("Gamepad {:?} throttled", intent),
        Err(e) => warn!("Gamepad command not delivered: {}", e),
    }
}
