//! Shared entry point for the broker and gamepad producers.

use super::{
    ArbiterError, CommandArbiter, CommandError, CommandSink, Intent, Submission, Translator,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Arbiter(#[from] ArbiterError),
}

/// Translator plus arbiter handle, cloned into every producer
pub struct CommandRouter<S: CommandSink> {
    translator: Translator,
    arbiter: Arc<CommandArbiter<S>>,
    unrecognized: AtomicU64,
}

impl<S: CommandSink> CommandRouter<S> {
    pub fn new(translator: Translator, arbiter: Arc<CommandArbiter<S>>) -> Self {
        Self {
            translator,
            arbiter,
            unrecognized: AtomicU64::new(0),
        }
    }

    pub fn arbiter(&self) -> &CommandArbiter<S> {
        &self.arbiter
    }

    /// Number of broker commands dropped because their `cmd` had no mapping.
    pub fn unrecognized(&self) -> u64 {
        self.unrecognized.load(Ordering::Relaxed)
    }

    pub fn submit_intent(&self, intent: &Intent) -> Result<Submission, ArbiterError> {
        self.submit_intent_at(intent, Instant::now())
    }

    pub fn submit_intent_at(
        &self,
        intent: &Intent,
        now: Instant,
    ) -> Result<Submission, ArbiterError> {
        let command = self.translator.translate(intent);
        debug!("{:?} -> {:?}", intent, command.body());
        self.arbiter.submit_at(&command, now)
    }

    /// Handles one message from the command topic.
    ///
    /// Returns `Ok(None)` for a `cmd` without mapping; such commands are ignored.
    pub fn handle_broker_payload(&self, payload: &[u8]) -> Result<Option<Submission>, RouteError> {
        match self.translator.intent_from_broker(payload) {
            Ok(intent) => Ok(Some(self.submit_intent(&intent)?)),
            Err(CommandError::UnrecognizedCommand(cmd)) => {
                self.unrecognized.fetch_add(1, Ordering::Relaxed);
                debug!("Ignoring unrecognized broker command {:?}", cmd);
                Ok(None)
            }
            Err(e) => {
                warn!("Dropping malformed broker command: {}", e);
                Err(e.into())
            }
        }
    }
}
