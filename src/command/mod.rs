//! Command path from operator intent to the microcontroller's serial line.
//!
//! ```text
//! Broker ──┐
//!          ├──► Intent ──► Translator ──► WireCommand ──► Arbiter ──► Serial
//! Gamepad ─┘                                              (RateLimiter)
//! ```
//!
//! Both producers run concurrently. The [`arbiter::CommandArbiter`] is the only
//! place that touches the serial sink.

pub mod arbiter;
pub mod error;
pub mod rate_limiter;
pub mod router;
pub mod translator;

pub use arbiter::{ArbiterError, ArbiterStats, CommandArbiter, CommandSink, Submission};
pub use error::CommandError;
pub use rate_limiter::RateLimiter;
pub use router::{CommandRouter, RouteError};
pub use translator::{Translator, TranslatorSettings};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis of a discrete directional move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveAxis {
    X,
    Y,
}

/// Drive mode of the rover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveMode {
    /// Path following (`m: 1`)
    Follow,
    /// Manual tank drive (`m: 0`)
    Manual,
}

/// Motor side driven by one joystick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotorSide {
    Left,
    Right,
}

/// Source-agnostic operator action, before it is rendered to wire text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Discrete move; `magnitude` is counted in move steps and its sign is the direction.
    DirectionalMove { axis: MoveAxis, magnitude: i32 },
    ModeSet { mode: DriveMode },
    /// Raw joystick reading, joystick-device convention: ±32767, "up" negative.
    AxisValue { side: MotorSide, value: i32 },
}

/// Commands exempt from throttling. Dropping one of these can leave a motor running,
/// so every spacing variant the grammar allows is listed.
pub const IMPORTANT_COMMANDS: [&str; 8] = [
    "m:0", "m: 0", "m:1", "m: 1", "l:0", "l: 0", "r:0", "r: 0",
];

/// One line of the microcontroller command grammar.
///
/// Always ends in exactly one `\n` and never contains another newline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WireCommand {
    line: String,
}

impl WireCommand {
    /// Builds a command from its textual body, appending the terminating newline if it
    /// is missing.
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let body = text.strip_suffix('\n').unwrap_or(text);
        if body.contains('\n') {
            return Err(CommandError::EmbeddedNewline(body.to_string()));
        }
        if body.trim().is_empty() {
            return Err(CommandError::Empty);
        }

        let mut line = String::with_capacity(body.len() + 1);
        line.push_str(body);
        line.push('\n');
        Ok(Self { line })
    }

    /// Wraps text rendered by the translator, which never contains a newline.
    pub(crate) fn from_rendered(mut body: String) -> Self {
        debug_assert!(!body.contains('\n'));
        body.push('\n');
        Self { line: body }
    }

    /// Text without the terminating newline.
    pub fn body(&self) -> &str {
        &self.line[..self.line.len() - 1]
    }

    /// Bytes as written to the serial sink.
    pub fn as_bytes(&self) -> &[u8] {
        self.line.as_bytes()
    }

    pub fn is_important(&self) -> bool {
        IMPORTANT_COMMANDS.contains(&self.body())
    }
}

impl fmt::Display for WireCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.body())
    }
}
