use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Broker connection and topic settings
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host name
    pub endpoint: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Keep the broker-side session (subscriptions, queued QoS1 messages) across reconnects
    pub clean_session: bool,
    /// Mutual TLS with the certificate files below; plain TCP when false
    pub tls: bool,
    /// Paths may start with `~/`
    pub ca_file: String,
    pub cert_file: String,
    pub key_file: String,
    pub command_topic: String,
    pub telemetry_topic: String,
    /// Capacity of the client's outgoing request queue
    pub request_capacity: usize,
    /// How long startup waits for the first connection acknowledgement
    pub connect_timeout_secs: u64,
    /// Pause before the event loop retries after a connection error
    pub reconnect_delay_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            endpoint: "a1lc00egar11av-ats.iot.us-west-1.amazonaws.com".to_string(),
            port: 8883,
            client_id: "polyver1".to_string(),
            keep_alive_secs: 30,
            clean_session: false,
            tls: true,
            ca_file: "~/certs/Amazon-root-CA-1.pem".to_string(),
            cert_file: "~/certs/certificate.pem.crt".to_string(),
            key_file: "~/certs/private.pem.key".to_string(),
            command_topic: "Dr. Polyver/command".to_string(),
            telemetry_topic: "telemetry".to_string(),
            request_capacity: 100,
            connect_timeout_secs: 10,
            reconnect_delay_ms: 1000,
        }
    }
}

/// Resolves a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
