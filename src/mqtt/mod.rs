//! # MQTT Broker Link
//!
//! Connects the rover to the cloud broker over mutual TLS. Inbound messages on the
//! command topic are handed to a registered handler; telemetry goes out through the
//! cloneable [`MqttPublisher`](mqtt_handler::MqttPublisher).
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker, topic and certificate settings
//! ├── message_manager.rs  - Inbound message representation and handler type
//! └── mqtt_handler.rs     - Event loop, subscriptions and publishing
//! ```
//!
//! Reconnection is left to the `rumqttc` event loop: a failed poll is logged and the
//! next poll reconnects. When the broker comes back without the persisted session the
//! handler re-sends its subscriptions.

pub mod config;
pub mod message_manager;
pub mod mqtt_handler;

pub use config::MqttConfig;
pub use mqtt_handler::{MqttHandler, MqttPublisher};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Failed to read certificate {path}: {source}")]
    Certificate {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Broker connection failed: {0}")]
    Connection(String),

    #[error("Broker rejected subscription: {0}")]
    SubscriptionRejected(String),

    #[error("Failed to publish: {0}")]
    Publish(String),
}
