use chrono::NaiveDateTime;
use std::fmt;

/// Message received on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MQTTMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub timestamp: NaiveDateTime,
}

impl fmt::Display for MQTTMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let content = String::from_utf8_lossy(&self.payload);
        let preview: String = content.chars().take(40).collect();
        write!(f, "{} - {}: {}", self.timestamp, self.topic, preview)
    }
}

impl MQTTMessage {
    pub fn from_topic(topic: String, payload: Vec<u8>) -> Self {
        MQTTMessage {
            topic,
            payload,
            timestamp: chrono::Local::now().naive_local(),
        }
    }
}

/// Callback registered for one subscribed topic
pub type MessageHandler = Box<dyn Fn(&MQTTMessage) + Send + Sync>;
