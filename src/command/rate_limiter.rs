//! Minimum spacing between outbound commands.

use super::WireCommand;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default spacing between two non-important commands.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// Rate limiter for the serial command stream
///
/// Important commands always pass and restart the interval. Everything else passes only
/// once the interval since the last admitted command has elapsed; rejected commands are
/// dropped, not queued.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Minimal spacing between admitted non-important commands
    min_interval: Duration,

    /// Time of the last admitted command, `None` until the first admission
    last_admitted: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_admitted: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn last_admitted(&self) -> Option<Instant> {
        self.last_admitted
    }

    /// Decides whether `candidate` may be written at `now`, recording the admission.
    pub fn admit(&mut self, candidate: &WireCommand, now: Instant) -> bool {
        if candidate.is_important() {
            debug!("Important command {:?} bypasses throttle", candidate.body());
            self.last_admitted = Some(now);
            return true;
        }

        let due = match self.last_admitted {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
        };

        if due {
            self.last_admitted = Some(now);
        }
        due
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_UPDATE_INTERVAL)
    }
}
