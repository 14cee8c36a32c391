//! Telemetry ingestion: serial lines in, broker publications out.
//!
//! ```text
//! Serial ──► LineSource ──► parser::parse ──► TelemetryRecord ──► TelemetryPublisher
//! ```

pub mod parser;

pub use parser::{parse, TelemetryError};

use crate::mqtt::BrokerError;
use crate::serial::{LineSource, SerialError};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One position report, published once and then dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryRecord {
    pub latitude: String,
    pub longitude: String,
    pub rover: String,
}

impl TelemetryRecord {
    /// Broker payload; coordinates are inserted verbatim as JSON numbers, the rover
    /// name as an escaped JSON string.
    pub fn to_payload(&self) -> String {
        let rover = serde_json::Value::from(self.rover.as_str());
        format!(
            r#"{{"lat": {}, "long": {}, "rover": {}}}"#,
            self.latitude, self.longitude, rover
        )
    }
}

/// Outbound side of the broker, as seen by the ingestion loop
pub trait TelemetryPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError>;
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Name embedded in every published record
    pub rover_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            rover_name: "Dr. Polyver".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TelemetryStats {
    pub lines: u64,
    pub published: u64,
    pub malformed: u64,
    pub publish_failures: u64,
}

/// Reads lines until cancelled or the device fails, publishing every GPS line.
///
/// Bad lines and failed publications are logged and skipped.
pub fn run_telemetry_loop<L, P>(
    source: &mut L,
    publisher: &P,
    topic: &str,
    config: &TelemetryConfig,
    cancel: &CancellationToken,
) -> Result<TelemetryStats, SerialError>
where
    L: LineSource,
    P: TelemetryPublisher,
{
    info!("Starting telemetry loop, publishing to '{}'", topic);
    let mut stats = TelemetryStats::default();

    while !cancel.is_cancelled() {
        let line = match source.read_line()? {
            Some(line) => line,
            None => continue,
        };
        stats.lines += 1;
        debug!("Serial rx: {:?}", String::from_utf8_lossy(&line));

        let record = match parse(&line, &config.rover_name) {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(e) => {
                stats.malformed += 1;
                warn!("Skipping malformed GPS line: {}", e);
                continue;
            }
        };

        let payload = record.to_payload();
        debug!("Publishing to '{}': {}", topic, payload);
        match publisher.publish(topic, payload.into_bytes()) {
            Ok(()) => stats.published += 1,
            Err(e) => {
                stats.publish_failures += 1;
                warn!("Failed to publish telemetry: {}", e);
            }
        }
    }

    info!("Telemetry loop stopped: {:?}", stats);
    Ok(stats)
}
