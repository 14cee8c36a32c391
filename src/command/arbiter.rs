//! Single serialization point for every outbound command.
//!
//! The sink and the [`RateLimiter`] live behind one mutex, so the throttle
//! read-modify-write and the write itself happen as one step. Producers hold an
//! `Arc<CommandArbiter<_>>` and call [`CommandArbiter::submit`] from their own thread.

use super::{RateLimiter, WireCommand};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, error};

/// Line-oriented byte sink the arbiter writes admitted commands to
pub trait CommandSink: Send {
    /// Writes one complete line; must not return before the bytes are handed off.
    fn write_line(&mut self, line: &[u8]) -> io::Result<()>;
}

/// Outcome of one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Passed the throttle and was written
    Written,
    /// Arrived inside the throttle interval and was discarded
    Throttled,
}

#[derive(Debug, thiserror::Error)]
pub enum ArbiterError {
    /// The sink rejected an admitted command; throttle state was still advanced
    #[error("Failed to write {command:?} to sink: {source}")]
    Write {
        command: String,
        #[source]
        source: io::Error,
    },

    /// Another producer panicked while holding the arbiter lock
    #[error("Arbiter lock poisoned")]
    LockPoisoned,
}

/// Running totals, readable without taking the arbiter lock
#[derive(Debug, Default)]
pub struct ArbiterStats {
    written: AtomicU64,
    throttled: AtomicU64,
    failed: AtomicU64,
}

impl ArbiterStats {
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn throttled(&self) -> u64 {
        self.throttled.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

struct ArbiterState<S> {
    limiter: RateLimiter,
    sink: S,
}

pub struct CommandArbiter<S: CommandSink> {
    state: Mutex<ArbiterState<S>>,
    stats: ArbiterStats,
}

impl<S: CommandSink> CommandArbiter<S> {
    pub fn new(sink: S, limiter: RateLimiter) -> Self {
        Self {
            state: Mutex::new(ArbiterState { limiter, sink }),
            stats: ArbiterStats::default(),
        }
    }

    pub fn stats(&self) -> &ArbiterStats {
        &self.stats
    }

    pub fn submit(&self, command: &WireCommand) -> Result<Submission, ArbiterError> {
        self.submit_at(command, Instant::now())
    }

    /// Like [`submit`](Self::submit) with an explicit admission time.
    ///
    /// `now` is taken as given; callers passing their own clock must keep it monotonic.
    pub fn submit_at(
        &self,
        command: &WireCommand,
        now: Instant,
    ) -> Result<Submission, ArbiterError> {
        let mut state = self.state.lock().map_err(|_| ArbiterError::LockPoisoned)?;

        if !state.limiter.admit(command, now) {
            self.stats.throttled.fetch_add(1, Ordering::Relaxed);
            debug!("Throttled {:?}", command.body());
            return Ok(Submission::Throttled);
        }

        match state.sink.write_line(command.as_bytes()) {
            Ok(()) => {
                self.stats.written.fetch_add(1, Ordering::Relaxed);
                debug!("Wrote {:?}", command.body());
                Ok(Submission::Written)
            }
            Err(source) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!("Serial write of {:?} failed: {}", command.body(), source);
                Err(ArbiterError::Write {
                    command: command.body().to_string(),
                    source,
                })
            }
        }
    }

    /// Consumes the arbiter and hands back its sink.
    pub fn into_sink(self) -> Result<S, ArbiterError> {
        self.state
            .into_inner()
            .map(|state| state.sink)
            .map_err(|_| ArbiterError::LockPoisoned)
    }
}
