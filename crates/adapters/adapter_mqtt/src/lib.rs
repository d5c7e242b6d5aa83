//! # mijiableht-adapter-mqtt
//!
//! MQTT publisher — owns the broker connection, announces each device to
//! Home Assistant exactly once per run, and publishes a retained state
//! JSON for every complete reading.
//!
//! ## Connection model
//!
//! A rumqttc [`AsyncClient`] with its event loop driven by a background
//! task. The event loop reconnects on its own; the task paces it with the
//! shared exponential back-off and tracks the [`PublisherState`]. An
//! authentication rejection is fatal and surfaces to the orchestrator
//! through the state watch.
//!
//! ## Back-pressure
//!
//! While disconnected, readings coalesce to the latest per device (retained
//! MQTT semantics make the latest value the only one that matters); a
//! counter records every superseded reading. Discovery for a device is
//! always observed by the broker before its first state publish.
//!
//! ## Dependency rule
//!
//! Same as the BLE adapter: depends on `mijiableht-app` and
//! `mijiableht-domain`.

mod config;
pub mod discovery;
mod error;
pub mod payload;

pub use config::MqttConfig;
pub use error::MqttError;

use std::collections::HashMap;
use std::time::Duration;

use chrono_tz::Tz;
use rumqttc::{
    AsyncClient, ConnAck, ConnectReturnCode, ConnectionError, Event, EventLoop, LastWill,
    MqttOptions, Packet, QoS, Transport,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use mijiableht_app::backoff::Backoff;
use mijiableht_domain::mac::MacAddress;
use mijiableht_domain::reading::CompleteReading;

/// Deadline for the initial broker connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
/// Deadline for a single publish; timed-out publishes are retried once.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Publisher lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    /// Initial connection attempt in flight.
    Connecting,
    Connected,
    /// Connection lost; the event loop is backing off and retrying.
    Reconnecting,
    /// The broker rejected our credentials. Fatal.
    AuthFailed,
    Stopped,
}

/// Per-device discovery bookkeeping.
struct DiscoveredDevice {
    /// Hash of the rendered configs last published for this device.
    config_hash: u64,
    /// Config topics, kept for the optional shutdown cleanup.
    topics: Vec<String>,
}

/// MQTT publisher owning the broker connection.
pub struct MqttPublisher {
    client: AsyncClient,
    config: MqttConfig,
    timezone: Tz,
    qos: QoS,
    state: watch::Receiver<PublisherState>,
    event_task: JoinHandle<()>,
    discovered: HashMap<String, DiscoveredDevice>,
    /// Latest unsent reading per device, kept while disconnected.
    pending: HashMap<MacAddress, CompleteReading>,
    dropped: u64,
}

impl MqttPublisher {
    /// Create the client and start connecting in the background.
    ///
    /// Use [`wait_for_connection`](Self::wait_for_connection) to block on
    /// the initial connection.
    #[must_use]
    pub fn connect(config: MqttConfig, timezone: Tz) -> Self {
        let mut options = MqttOptions::new(
            config.client_id.clone(),
            config.broker_host.clone(),
            config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(u64::from(config.keepalive)));
        options.set_clean_session(true);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username.clone(), password.clone());
        }
        if config.tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        let qos = qos_from(config.qos);
        options.set_last_will(LastWill::new(config.status_topic(), "offline", qos, true));

        let (client, event_loop) = AsyncClient::new(options, 64);
        let (state_tx, state) = watch::channel(PublisherState::Connecting);

        tracing::info!(
            broker = %config.broker_host,
            port = config.broker_port,
            "starting MQTT publisher"
        );

        let event_task = tokio::spawn(drive_event_loop(
            event_loop,
            state_tx,
            client.clone(),
            config.status_topic(),
            qos,
        ));

        Self {
            client,
            config,
            timezone,
            qos,
            state,
            event_task,
            discovered: HashMap::new(),
            pending: HashMap::new(),
            dropped: 0,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PublisherState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions (used by the orchestrator to detect a
    /// fatal authentication failure).
    #[must_use]
    pub fn state_watch(&self) -> watch::Receiver<PublisherState> {
        self.state.clone()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == PublisherState::Connected
    }

    /// Readings dropped (superseded) while the broker was unreachable.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    /// Readings currently queued for the next reconnect.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Wait until the publisher is connected, authentication fails, or the
    /// timeout elapses; returns the state observed last.
    pub async fn wait_for_connection(&self, timeout: Duration) -> PublisherState {
        let mut state = self.state.clone();
        let settled = async {
            loop {
                let current = *state.borrow_and_update();
                if matches!(
                    current,
                    PublisherState::Connected | PublisherState::AuthFailed
                ) {
                    return current;
                }
                if state.changed().await.is_err() {
                    return PublisherState::Stopped;
                }
            }
        };
        match tokio::time::timeout(timeout, settled).await {
            Ok(state) => state,
            Err(_) => self.state(),
        }
    }

    /// Publish one reading, announcing the device first if needed.
    ///
    /// Never fails the caller: while disconnected (or when a publish times
    /// out) the reading is parked as the device's pending state, superseding
    /// any reading already parked there.
    pub async fn publish(&mut self, reading: CompleteReading) {
        if !self.is_connected() {
            self.park(reading);
            return;
        }
        if let Err(err) = self.publish_now(&reading).await {
            tracing::warn!(
                mac = %reading.mac,
                error = %err,
                "publish failed, parking reading for reconnect"
            );
            self.park(reading);
        }
    }

    /// Re-publish the parked readings after a reconnect, discovery first.
    pub async fn flush_pending(&mut self) {
        if self.pending.is_empty() || !self.is_connected() {
            return;
        }
        tracing::info!(
            count = self.pending.len(),
            "flushing readings parked while disconnected"
        );
        let pending = std::mem::take(&mut self.pending);
        for (_, reading) in pending {
            if let Err(err) = self.publish_now(&reading).await {
                tracing::warn!(mac = %reading.mac, error = %err, "flush failed, re-parking");
                self.park(reading);
            }
        }
    }

    fn park(&mut self, reading: CompleteReading) {
        if self.pending.insert(reading.mac, reading).is_some() {
            self.dropped += 1;
        }
    }

    async fn publish_now(&mut self, reading: &CompleteReading) -> Result<(), MqttError> {
        self.ensure_discovery(reading).await?;

        let device_id = reading.mac.device_id();
        let topic = self.config.state_topic(&device_id);
        let payload = payload::state_payload(reading, self.timezone, self.config.statistics);
        let bytes = serde_json::to_vec(&payload).map_err(MqttError::Encode)?;
        self.publish_with_retry(&topic, bytes, self.config.retain).await?;

        tracing::info!(
            mac = %reading.mac,
            message_type = %reading.message_type,
            temperature = reading.temperature,
            humidity = reading.humidity,
            battery = reading.battery,
            "published state"
        );
        Ok(())
    }

    /// Publish the discovery configs for a device unless the exact same
    /// configs were already announced this run.
    async fn ensure_discovery(&mut self, reading: &CompleteReading) -> Result<(), MqttError> {
        let device_id = reading.mac.device_id();
        let messages = discovery::discovery_messages(
            &self.config,
            reading.mac,
            reading.friendly_name.as_deref(),
            reading.model,
        );
        let config_hash = discovery::config_hash(&messages);
        if self
            .discovered
            .get(&device_id)
            .is_some_and(|entry| entry.config_hash == config_hash)
        {
            return Ok(());
        }

        tracing::info!(mac = %reading.mac, "announcing device to Home Assistant");
        let topics: Vec<String> = messages.iter().map(|m| m.topic.clone()).collect();
        for message in messages {
            let bytes = serde_json::to_vec(&message.payload).map_err(MqttError::Encode)?;
            self.publish_with_retry(&message.topic, bytes, true).await?;
        }
        self.discovered
            .insert(device_id, DiscoveredDevice { config_hash, topics });
        Ok(())
    }

    /// Publish with the 5 s deadline, retrying a timed-out publish once.
    async fn publish_with_retry(
        &self,
        topic: &str,
        bytes: Vec<u8>,
        retain: bool,
    ) -> Result<(), MqttError> {
        let mut retried = false;
        loop {
            let attempt = self
                .client
                .publish(topic.to_string(), self.qos, retain, bytes.clone());
            match tokio::time::timeout(PUBLISH_TIMEOUT, attempt).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(err)) => return Err(MqttError::Client(err)),
                Err(_) if !retried => {
                    tracing::warn!(topic, "publish timed out, retrying once");
                    retried = true;
                }
                Err(_) => return Err(MqttError::PublishTimeout),
            }
        }
    }

    /// Disconnect cleanly: optionally remove the Home Assistant entities,
    /// mark the daemon offline, and stop the event loop.
    pub async fn shutdown(mut self) {
        if self.is_connected() {
            if self.config.discovery_cleanup {
                tracing::info!(
                    devices = self.discovered.len(),
                    "removing Home Assistant discovery entries"
                );
                let topics: Vec<String> = self
                    .discovered
                    .values()
                    .flat_map(|entry| entry.topics.iter().cloned())
                    .collect();
                for topic in topics {
                    if let Err(err) = self.publish_with_retry(&topic, Vec::new(), true).await {
                        tracing::warn!(topic, error = %err, "discovery cleanup publish failed");
                    }
                }
            }
            let status_topic = self.config.status_topic();
            if let Err(err) = self
                .publish_with_retry(&status_topic, b"offline".to_vec(), true)
                .await
            {
                tracing::warn!(error = %err, "failed to publish offline status");
            }
        }

        let _ = self.client.disconnect().await;
        self.event_task.abort();
        tracing::info!("MQTT publisher stopped");
    }
}

fn qos_from(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

fn is_auth_rejection(code: ConnectReturnCode) -> bool {
    matches!(
        code,
        ConnectReturnCode::NotAuthorized | ConnectReturnCode::BadUserNamePassword
    )
}


/// Drive the rumqttc event loop: track connection state, publish the
/// retained `online` marker after each connect, and pace reconnects with
/// the shared back-off.
async fn drive_event_loop(
    mut event_loop: EventLoop,
    state: watch::Sender<PublisherState>,
    client: AsyncClient,
    status_topic: String,
    qos: QoS,
) {
    let mut backoff = Backoff::standard();
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ConnAck { code, .. }))) => match code {
                ConnectReturnCode::Success => {
                    backoff.reset();
                    let _ = state.send_replace(PublisherState::Connected);
                    tracing::info!("connected to MQTT broker");
                    if let Err(err) = client
                        .publish(status_topic.clone(), qos, true, "online")
                        .await
                    {
                        tracing::warn!(error = %err, "failed to publish online status");
                    }
                }
                code if is_auth_rejection(code) => {
                    tracing::error!("MQTT authentication rejected by broker");
                    let _ = state.send_replace(PublisherState::AuthFailed);
                    return;
                }
                code => {
                    tracing::warn!(?code, "MQTT connection refused");
                    let _ = state.send_replace(PublisherState::Reconnecting);
                    tokio::time::sleep(backoff.next_delay()).await;
                }
            },
            Ok(_) => {}
            Err(ConnectionError::ConnectionRefused(code)) if is_auth_rejection(code) => {
                tracing::error!("MQTT authentication rejected by broker");
                let _ = state.send_replace(PublisherState::AuthFailed);
                return;
            }
            Err(err) => {
                let _ = state.send_replace(PublisherState::Reconnecting);
                let delay = backoff.next_delay();
                tracing::warn!(
                    error = %err,
                    backoff_ms = delay.as_millis() as u64,
                    attempt = backoff.attempts(),
                    "MQTT connection lost, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
