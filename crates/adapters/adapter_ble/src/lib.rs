//! # mijiableht-adapter-ble
//!
//! Passive BLE adapter — owns the host Bluetooth adapter, runs a single
//! continuous passive scan, and forwards every Xiaomi MiBeacon
//! advertisement (service-data UUID `0xFE95`) to the cache.
//!
//! ## How it works
//!
//! Mijia sensors broadcast their readings as service-data advertisements,
//! so the daemon never pairs, never writes GATT, and never drains a battery
//! by polling. The scanner emits raw `(mac, rssi, service_data,
//! received_at)` events; decoding happens downstream via [`codec`].
//!
//! ## Recovery
//!
//! Transient adapter errors put the scanner into `Reconnecting` with
//! exponential back-off (1 s doubling to 30 s, jittered). A missing adapter
//! or denied access is fatal and parks the scanner in `Failed`.
//!
//! ## Dependency rule
//!
//! Same as the MQTT adapter: depends on `mijiableht-app` and
//! `mijiableht-domain`.

mod config;
pub mod codec;
mod error;

pub use config::BleConfig;
pub use error::{BleError, FrameError};

use std::time::Duration;

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt as _;

use mijiableht_app::backoff::Backoff;
use mijiableht_domain::mac::MacAddress;
use mijiableht_domain::time::{self, Timestamp};

use codec::SERVICE_UUID_FE95;

/// Deadline for subscribing to adapter events.
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// One observed MiBeacon advertisement, undecoded.
#[derive(Debug, Clone)]
pub struct ScanEvent {
    pub mac: MacAddress,
    /// Signal strength in dBm at the receiving adapter.
    pub rssi: Option<i16>,
    /// Raw `0xFE95` service-data blob.
    pub service_data: Vec<u8>,
    pub received_at: Timestamp,
}

/// Scanner lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerState {
    Initial,
    Scanning,
    Stopped,
    /// Backing off after a transient adapter error.
    Reconnecting,
    /// Hard failure; the scanner will not recover.
    Failed,
}

/// Passive BLE scanner owning the host adapter.
///
/// [`start`](Self::start) and [`stop`](Self::stop) are idempotent. Events
/// fan out over a bounded broadcast channel: a lagging consumer loses the
/// oldest pending events (never the scan loop), and observes the loss as a
/// lag count it can surface as a backlog metric.
pub struct BleScanner {
    config: BleConfig,
    events: broadcast::Sender<ScanEvent>,
    state: watch::Sender<ScannerState>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl BleScanner {
    /// Create a scanner. No adapter is touched until [`start`](Self::start).
    #[must_use]
    pub fn new(config: BleConfig) -> Self {
        let (events, _) = broadcast::channel(config.channel_capacity.max(1));
        let (state, _) = watch::channel(ScannerState::Initial);
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            events,
            state,
            shutdown,
            task: None,
        }
    }

    /// Subscribe to scan events. Only events observed after the call are
    /// delivered.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ScannerState {
        *self.state.subscribe().borrow()
    }

    /// Watch lifecycle transitions (used by the orchestrator to detect a
    /// fatal scanner death).
    #[must_use]
    pub fn state_watch(&self) -> watch::Receiver<ScannerState> {
        self.state.subscribe()
    }

    /// Acquire the adapter and start the continuous passive scan.
    ///
    /// Idempotent: calling while already scanning is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BleError::AdapterUnavailable`] when no adapter exists at
    /// the configured index, [`BleError::PermissionDenied`] when the OS
    /// refuses access, or another [`BleError`] for adapter failures.
    pub async fn start(&mut self) -> Result<(), BleError> {
        if self.task.is_some() {
            return Ok(());
        }

        // Surface fatal adapter problems before spawning anything.
        acquire_adapter(self.config.adapter).await?;

        let config = self.config.clone();
        let events = self.events.clone();
        let state = self.state.clone();
        let shutdown = self.shutdown.subscribe();
        self.task = Some(tokio::spawn(run(config, events, state, shutdown)));
        Ok(())
    }

    /// Stop the scan and release the adapter. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = self.shutdown.send(true);
            let _ = task.await;
            tracing::info!("BLE scanner stopped");
        }
    }
}

async fn acquire_adapter(index: usize) -> Result<Adapter, BleError> {
    let manager = Manager::new().await.map_err(BleError::from)?;
    let adapters = manager.adapters().await.map_err(BleError::from)?;
    adapters
        .into_iter()
        .nth(index)
        .ok_or(BleError::AdapterUnavailable(index))
}

/// Reconnect loop: run scan sessions until shutdown or a fatal error.
async fn run(
    config: BleConfig,
    events: broadcast::Sender<ScanEvent>,
    state: watch::Sender<ScannerState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = Backoff::standard();
    loop {
        match scan_session(&config, &events, &state, &mut shutdown, &mut backoff).await {
            Ok(()) => {
                let _ = state.send_replace(ScannerState::Stopped);
                return;
            }
            Err(err) if err.is_fatal() => {
                tracing::error!(error = %err, "fatal BLE adapter error");
                let _ = state.send_replace(ScannerState::Failed);
                return;
            }
            Err(err) => {
                let _ = state.send_replace(ScannerState::Reconnecting);
                let delay = backoff.next_delay();
                tracing::warn!(
                    error = %err,
                    backoff_ms = delay.as_millis() as u64,
                    attempt = backoff.attempts(),
                    "BLE scan interrupted, reconnecting"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => {
                        let _ = state.send_replace(ScannerState::Stopped);
                        return;
                    }
                }
            }
        }
    }
}

/// One scan session: acquire the adapter, scan, and pump events until the
/// stream breaks or shutdown is requested.
async fn scan_session(
    config: &BleConfig,
    events: &broadcast::Sender<ScanEvent>,
    state: &watch::Sender<ScannerState>,
    shutdown: &mut watch::Receiver<bool>,
    backoff: &mut Backoff,
) -> Result<(), BleError> {
    let central = acquire_adapter(config.adapter).await?;

    let mut adapter_events = tokio::time::timeout(SUBSCRIBE_TIMEOUT, central.events())
        .await
        .map_err(|_| BleError::SubscribeTimeout)?
        .map_err(BleError::from)?;

    central
        .start_scan(ScanFilter {
            services: vec![SERVICE_UUID_FE95],
        })
        .await
        .map_err(BleError::from)?;

    let _ = state.send_replace(ScannerState::Scanning);
    backoff.reset();
    tracing::info!(adapter = config.adapter, "passive BLE scan started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = central.stop_scan().await;
                return Ok(());
            }
            event = adapter_events.next() => match event {
                Some(CentralEvent::ServiceDataAdvertisement { id, service_data }) => {
                    if let Some(data) = service_data.get(&SERVICE_UUID_FE95) {
                        forward_advertisement(&central, &id, data, events).await;
                    }
                }
                Some(_) => {}
                None => {
                    let _ = central.stop_scan().await;
                    return Err(BleError::Scan(btleplug::Error::RuntimeError(
                        "adapter event stream ended".to_string(),
                    )));
                }
            }
        }
    }
}

/// Resolve the advertising peripheral and publish the event.
///
/// Failures here are per-advertisement (the peripheral can vanish between
/// the event and the lookup) and are silently skipped — the sensor will
/// re-advertise within seconds.
async fn forward_advertisement(
    central: &Adapter,
    id: &PeripheralId,
    data: &[u8],
    events: &broadcast::Sender<ScanEvent>,
) {
    let Ok(peripheral) = central.peripheral(id).await else {
        return;
    };
    let rssi = match peripheral.properties().await {
        Ok(Some(properties)) => properties.rssi,
        _ => None,
    };
    let mac = MacAddress::new(peripheral.address().into_inner());

    tracing::trace!(mac = %mac, rssi, len = data.len(), "MiBeacon advertisement");

    // send fails only when no consumer is subscribed yet; the sensor
    // re-advertises at ~2 s cadence, so the event is simply dropped.
    let _ = events.send(ScanEvent {
        mac,
        rssi,
        service_data: data.to_vec(),
        received_at: time::now(),
    });
}
