//! Error definitions for the command path

use thiserror::Error;

/// Errors raised while turning operator input into wire commands
#[derive(Debug, Error)]
pub enum CommandError {
    /// A command body carried a newline before its terminator
    #[error("Command contains an embedded newline: {0:?}")]
    EmbeddedNewline(String),

    /// A command body was empty or whitespace only
    #[error("Command is empty")]
    Empty,

    /// Broker payload was not a JSON object with a string `cmd` field
    #[error("Malformed command payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// Broker `cmd` value with no known mapping
    #[error("Unrecognized command: {0}")]
    UnrecognizedCommand(String),
}
