use std::collections::HashMap;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS,
    SubscribeReasonCode, TlsConfiguration, Transport,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::{expand_home, MqttConfig};
use super::message_manager::{MQTTMessage, MessageHandler};
use super::BrokerError;
use crate::telemetry::TelemetryPublisher;

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Clone, Debug, Default)]
pub struct MQTTStatus {
    pub connection_state: ConnectionState,
    pub messages_received: usize,
    pub unrouted_messages: usize,
    pub connection_errors: usize,
    pub rejected_subscriptions: usize,
}

/// What a polled event meant for the session
#[derive(Debug, PartialEq, Eq)]
enum SessionEvent {
    Connected,
    Refused(ConnectReturnCode),
    Subscribed,
    SubscriptionRejected(Vec<SubscribeReasonCode>),
    Other,
}

/// Publishing half of the broker connection, cheap to clone into other tasks
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl TelemetryPublisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| BrokerError::Publish(e.to_string()))
    }
}

/// Owns the broker event loop and routes incoming messages to per-topic handlers
pub struct MqttHandler {
    status: MQTTStatus,
    client: AsyncClient,
    eventloop: EventLoop,
    config: MqttConfig,
    handlers: HashMap<String, MessageHandler>,
    // Subscriptions sent but not yet acknowledged
    pending_subacks: usize,
}

impl MqttHandler {
    pub fn new(config: MqttConfig) -> Result<Self, BrokerError> {
        let mqtt_options = build_options(&config)?;
        let (client, eventloop) = AsyncClient::new(mqtt_options, config.request_capacity);

        Ok(MqttHandler {
            status: MQTTStatus::default(),
            client,
            eventloop,
            config,
            handlers: HashMap::new(),
            pending_subacks: 0,
        })
    }

    pub fn status(&self) -> &MQTTStatus {
        &self.status
    }

    pub fn publisher(&self) -> MqttPublisher {
        MqttPublisher {
            client: self.client.clone(),
        }
    }

    /// Registers the handler for `topic`; the subscription is sent once connected.
    pub fn subscribe<F>(&mut self, topic: &str, handler: F)
    where
        F: Fn(&MQTTMessage) + Send + Sync + 'static,
    {
        info!("Registering handler for topic '{}'", topic);
        self.handlers.insert(topic.to_string(), Box::new(handler));
    }

    /// Waits for the first connection acknowledgement and the acknowledgement of
    /// every registered subscription.
    ///
    /// An unreachable broker or a rejected subscription is fatal for the caller.
    pub async fn connect(&mut self) -> Result<(), BrokerError> {
        info!(
            "Connecting to {}:{} with client id '{}'",
            self.config.endpoint, self.config.port, self.config.client_id
        );
        self.status.connection_state = ConnectionState::Connecting;

        let limit = Duration::from_secs(self.config.connect_timeout_secs);
        let handshake = async {
            loop {
                let event = match self.eventloop.poll().await {
                    Ok(event) => event,
                    Err(e) => return Err(BrokerError::Connection(e.to_string())),
                };
                match self.handle_event(event, true) {
                    SessionEvent::Connected | SessionEvent::Subscribed
                        if self.pending_subacks == 0 =>
                    {
                        return Ok(())
                    }
                    SessionEvent::Refused(code) => {
                        return Err(BrokerError::Connection(format!("refused: {:?}", code)))
                    }
                    SessionEvent::SubscriptionRejected(codes) => {
                        return Err(BrokerError::SubscriptionRejected(format!("{:?}", codes)))
                    }
                    _ => {}
                }
            }
        };

        match tokio::time::timeout(limit, handshake).await {
            Ok(Ok(())) => {
                info!("Connected!");
                Ok(())
            }
            Ok(Err(e)) => {
                self.status.connection_state = ConnectionState::Disconnected;
                Err(e)
            }
            Err(_) => {
                self.status.connection_state = ConnectionState::Disconnected;
                Err(BrokerError::Connection(format!(
                    "no acknowledgement within {}s",
                    self.config.connect_timeout_secs
                )))
            }
        }
    }

    /// Polls the event loop until cancelled, then disconnects.
    ///
    /// Connection errors are logged and retried by the client on the next poll. A
    /// rejected resubscription cancels `cancel`.
    pub async fn run(mut self, cancel: CancellationToken) -> MQTTStatus {
        info!("Starting MQTT event loop");
        let retry_delay = Duration::from_millis(self.config.reconnect_delay_ms);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                polled = self.eventloop.poll() => match polled {
                    Ok(event) => {
                        let handled = self.handle_event(event, false);
                        if let SessionEvent::SubscriptionRejected(_) = handled {
                            error!("Broker rejected a resubscription, no commands can arrive");
                            cancel.cancel();
                            break;
                        }
                    }
                    Err(e) => {
                        self.status.connection_errors += 1;
                        self.status.connection_state = ConnectionState::Reconnecting;
                        warn!("Connection interrupted: {}", e);
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(retry_delay) => {}
                        }
                    }
                },
            }
        }

        self.disconnect().await;
        self.status
    }

    async fn disconnect(&mut self) {
        info!("Disconnecting...");
        if let Err(e) = self.client.try_disconnect() {
            warn!("Failed to queue disconnect: {}", e);
            return;
        }

        let flush = async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(Duration::from_secs(1), flush).await.is_err() {
            warn!("Broker did not take the disconnect in time");
        }
        self.status.connection_state = ConnectionState::Disconnected;
        info!("Disconnected!");
    }

    fn handle_event(&mut self, event: Event, first_connect: bool) -> SessionEvent {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code != ConnectReturnCode::Success {
                    error!("Broker refused connection: {:?}", ack.code);
                    return SessionEvent::Refused(ack.code);
                }

                let resumed = self.status.connection_state == ConnectionState::Reconnecting;
                self.status.connection_state = ConnectionState::Connected;
                if resumed {
                    info!(
                        "Connection resumed, session present: {}",
                        ack.session_present
                    );
                }

                if first_connect || !ack.session_present {
                    if !first_connect {
                        info!("Session did not persist. Resubscribing to existing topics...");
                    }
                    self.subscribe_all();
                }
                SessionEvent::Connected
            }
            Event::Incoming(Packet::SubAck(ack)) => {
                self.pending_subacks = self.pending_subacks.saturating_sub(1);
                let rejected = ack
                    .return_codes
                    .iter()
                    .any(|code| *code == SubscribeReasonCode::Failure);
                if rejected {
                    self.status.rejected_subscriptions += 1;
                    error!("Broker rejected subscription: {:?}", ack.return_codes);
                    SessionEvent::SubscriptionRejected(ack.return_codes)
                } else {
                    debug!("Subscribed with {:?}", ack.return_codes);
                    SessionEvent::Subscribed
                }
            }
            Event::Incoming(Packet::Publish(publish)) => {
                let msg = MQTTMessage::from_topic(publish.topic, publish.payload.to_vec());
                self.route(&msg);
                SessionEvent::Other
            }
            other => {
                debug!("MQTT event: {:?}", other);
                SessionEvent::Other
            }
        }
    }

    fn subscribe_all(&mut self) {
        let mut sent = 0;
        for topic in self.handlers.keys() {
            info!("Subscribing to topic '{}'...", topic);
            match self.client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                Ok(()) => sent += 1,
                Err(e) => error!("Failed to subscribe to '{}': {}", topic, e),
            }
        }
        self.pending_subacks = sent;
    }

    fn route(&mut self, msg: &MQTTMessage) {
        self.status.messages_received += 1;
        debug!("Received {}", msg);

        match self.handlers.get(&msg.topic) {
            Some(handler) => handler(msg),
            None => {
                self.status.unrouted_messages += 1;
                warn!("No handler for topic '{}'", msg.topic);
            }
        }
    }
}

fn build_options(config: &MqttConfig) -> Result<MqttOptions, BrokerError> {
    let mut mqtt_options =
        MqttOptions::new(config.client_id.clone(), config.endpoint.clone(), config.port);
    mqtt_options
        .set_keep_alive(Duration::from_secs(config.keep_alive_secs))
        .set_clean_session(config.clean_session);

    if config.tls {
        let read = |path: &str| {
            let resolved = expand_home(path);
            std::fs::read(&resolved).map_err(|source| BrokerError::Certificate {
                path: resolved.display().to_string(),
                source,
            })
        };
        let tls = TlsConfiguration::Simple {
            ca: read(&config.ca_file)?,
            alpn: None,
            client_auth: Some((read(&config.cert_file)?, read(&config.key_file)?)),
        };
        mqtt_options.set_transport(Transport::tls_with_config(tls));
    }

    Ok(mqtt_options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, Publish, SubAck};
    use std::sync::{Arc, Mutex};

    fn plain_config() -> MqttConfig {
        MqttConfig {
            endpoint: "localhost".to_string(),
            port: 1883,
            tls: false,
            ..MqttConfig::default()
        }
    }

    #[test]
    fn options_follow_config() {
        let options = build_options(&plain_config()).unwrap();
        assert_eq!(options.client_id(), "polyver1");
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
        assert!(!options.clean_session());
    }

    #[test]
    fn missing_certificate_is_reported() {
        let config = MqttConfig {
            ca_file: "/nonexistent/polynode/ca.pem".to_string(),
            ..MqttConfig::default()
        };
        assert!(matches!(
            build_options(&config),
            Err(BrokerError::Certificate { ref path, .. }) if path == "/nonexistent/polynode/ca.pem"
        ));
    }

    #[tokio::test]
    async fn routes_publishes_by_topic() {
        let mut handler = MqttHandler::new(plain_config()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        handler.subscribe("Dr. Polyver/command", move |msg| {
            sink.lock().unwrap().push(msg.payload.clone());
        });

        let command = Publish::new("Dr. Polyver/command", QoS::AtLeastOnce, r#"{"cmd":"up"}"#);
        let other = Publish::new("elsewhere", QoS::AtLeastOnce, "x");
        handler.handle_event(Event::Incoming(Packet::Publish(command)), false);
        handler.handle_event(Event::Incoming(Packet::Publish(other)), false);

        assert_eq!(*seen.lock().unwrap(), vec![br#"{"cmd":"up"}"#.to_vec()]);
        assert_eq!(handler.status().messages_received, 2);
        assert_eq!(handler.status().unrouted_messages, 1);
    }

    #[tokio::test]
    async fn rejected_subscription_is_reported() {
        let mut handler = MqttHandler::new(plain_config()).unwrap();
        handler.subscribe("Dr. Polyver/command", |_| {});

        let connack = ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
        };
        assert_eq!(
            handler.handle_event(Event::Incoming(Packet::ConnAck(connack)), true),
            SessionEvent::Connected
        );
        assert_eq!(handler.pending_subacks, 1);

        let suback = SubAck {
            pkid: 1,
            return_codes: vec![SubscribeReasonCode::Failure],
        };
        assert_eq!(
            handler.handle_event(Event::Incoming(Packet::SubAck(suback)), true),
            SessionEvent::SubscriptionRejected(vec![SubscribeReasonCode::Failure])
        );
        assert_eq!(handler.status().rejected_subscriptions, 1);
        assert_eq!(handler.pending_subacks, 0);
    }

    #[tokio::test]
    async fn granted_subscription_completes_handshake() {
        let mut handler = MqttHandler::new(plain_config()).unwrap();
        handler.subscribe("Dr. Polyver/command", |_| {});
        handler.subscribe_all();

        let suback = SubAck {
            pkid: 1,
            return_codes: vec![SubscribeReasonCode::Success(QoS::AtLeastOnce)],
        };
        assert_eq!(
            handler.handle_event(Event::Incoming(Packet::SubAck(suback)), true),
            SessionEvent::Subscribed
        );
        assert_eq!(handler.pending_subacks, 0);
        assert_eq!(handler.status().rejected_subscriptions, 0);
    }
}
