//! Orchestrator — wires Scanner → Cache → Publisher and owns the daemon
//! lifecycle.
//!
//! Startup order: publisher first (waiting up to 15 s for the initial
//! broker connection, failing fast on an authentication rejection), then
//! the scanner. The main loop pumps scanner events through the cache,
//! forwards emitted readings to the publisher, runs the 5 s cache tick,
//! and logs a status line every 5 minutes. Shutdown drains pending
//! readings with a bounded wait before disconnecting.

use std::time::Duration;

use chrono_tz::Tz;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use mijiableht_adapter_ble::{codec, BleError, BleScanner, ScanEvent, ScannerState};
use mijiableht_adapter_mqtt::{MqttPublisher, PublisherState, CONNECT_TIMEOUT};
use mijiableht_app::cache::SensorCache;
use mijiableht_domain::reading::CompleteReading;
use mijiableht_domain::time;

use crate::config::Config;

/// Cadence of the cache's periodic-emission sweep.
const TICK_PERIOD: Duration = Duration::from_secs(5);
/// Cadence of the status log line.
const STATUS_PERIOD: Duration = Duration::from_secs(300);
/// Bounded wait for flushing pending readings on shutdown.
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Fatal daemon failures, mapped to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// The BLE adapter could not be acquired.
    #[error("fatal BLE adapter error")]
    Ble(#[source] BleError),

    /// The scanner died and cannot recover.
    #[error("BLE scanner failed permanently")]
    ScannerFailed,

    /// The MQTT broker rejected our credentials.
    #[error("MQTT authentication failed")]
    AuthFailed,
}

impl DaemonError {
    /// Process exit code for this failure.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Ble(_) | Self::ScannerFailed => 3,
            Self::AuthFailed => 4,
        }
    }
}

/// Run the daemon until shutdown or a fatal error.
///
/// # Errors
///
/// Returns a [`DaemonError`] for fatal BLE or MQTT failures; transient
/// failures are retried internally forever.
pub async fn run(config: Config, timezone: Tz) -> Result<(), DaemonError> {
    let mut cache = SensorCache::new(config.cache_config(), config.friendly_names());

    let mut publisher = MqttPublisher::connect(config.mqtt.clone(), timezone);
    match publisher.wait_for_connection(CONNECT_TIMEOUT).await {
        PublisherState::AuthFailed => {
            publisher.shutdown().await;
            return Err(DaemonError::AuthFailed);
        }
        PublisherState::Connected => {}
        state => {
            tracing::warn!(?state, "broker not reachable yet, connecting in background");
        }
    }

    let mut scanner = BleScanner::new(config.bluetooth.clone());
    if let Err(err) = scanner.start().await {
        publisher.shutdown().await;
        return Err(DaemonError::Ble(err));
    }

    let mut events = scanner.subscribe();
    let mut scanner_state = scanner.state_watch();
    let mut publisher_state = publisher.state_watch();
    let mut tick = tokio::time::interval(TICK_PERIOD);
    let mut status = tokio::time::interval(STATUS_PERIOD);
    let mut backlog: u64 = 0;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    tracing::info!("daemon started, listening for MiBeacon advertisements");

    loop {
        tokio::select! {
            () = &mut shutdown => break,

            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(reading) = ingest_event(&mut cache, &event) {
                        publisher.publish(reading).await;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    backlog += n;
                    tracing::warn!(dropped = n, total = backlog, "scanner backlog, oldest events dropped");
                }
                Err(RecvError::Closed) => {
                    // The scanner task is gone; its state watch decides
                    // whether that was a stop or a failure.
                }
            },

            _ = tick.tick() => {
                for reading in cache.tick(time::now()) {
                    publisher.publish(reading).await;
                }
                publisher.flush_pending().await;
            }

            _ = status.tick() => {
                tracing::info!(
                    devices = cache.device_count(),
                    mqtt_connected = publisher.is_connected(),
                    parked = publisher.pending_count(),
                    dropped = publisher.dropped_count(),
                    frames_dropped = cache.counters().frames_dropped,
                    "status"
                );
            }

            _ = scanner_state.changed() => {
                if *scanner_state.borrow() == ScannerState::Failed {
                    publisher.shutdown().await;
                    return Err(DaemonError::ScannerFailed);
                }
            }

            _ = publisher_state.changed() => {
                match *publisher_state.borrow() {
                    PublisherState::AuthFailed => {
                        scanner.stop().await;
                        publisher.shutdown().await;
                        return Err(DaemonError::AuthFailed);
                    }
                    PublisherState::Connected => publisher.flush_pending().await,
                    _ => {}
                }
            }
        }
    }

    tracing::info!("shutting down");
    scanner.stop().await;

    let flush = drain_and_flush(&mut cache, &mut publisher, &mut events);
    if tokio::time::timeout(SHUTDOWN_FLUSH_TIMEOUT, flush).await.is_err() {
        tracing::warn!("shutdown flush did not complete within the deadline");
    }

    publisher.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

/// Decode one scanner event and feed it to the cache.
fn ingest_event(cache: &mut SensorCache, event: &ScanEvent) -> Option<CompleteReading> {
    match codec::decode(&event.service_data, event.mac, event.received_at) {
        Ok(frame) => cache.ingest(event.mac, event.rssi, Some(&frame), event.received_at),
        Err(err) => {
            tracing::debug!(mac = %event.mac, error = %err, "dropped undecodable frame");
            cache.record_dropped_frame();
            cache.ingest(event.mac, event.rssi, None, event.received_at)
        }
    }
}

/// Push any still-buffered scanner events through the cache, then flush the
/// publisher's parked readings.
async fn drain_and_flush(
    cache: &mut SensorCache,
    publisher: &mut MqttPublisher,
    events: &mut tokio::sync::broadcast::Receiver<ScanEvent>,
) {
    loop {
        match events.try_recv() {
            Ok(event) => {
                if let Some(reading) = ingest_event(cache, &event) {
                    publisher.publish(reading).await;
                }
            }
            Err(TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }
    publisher.flush_pending().await;
}

/// Wait for a shutdown signal (Ctrl-C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
