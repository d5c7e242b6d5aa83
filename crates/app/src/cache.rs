//! Sensor cache — one record per device, merging partial readings into
//! complete ones and deciding when to publish.
//!
//! The cache is the only stateful hub in the daemon. It is single-writer by
//! design: the orchestrator loop owns it and feeds it scanner events in
//! arrival order, which gives every device a strict per-MAC publish order
//! for free.

use std::collections::HashMap;
use std::time::Duration;

use chrono::TimeDelta;

use mijiableht_domain::mac::MacAddress;
use mijiableht_domain::model::DeviceModel;
use mijiableht_domain::reading::{CompleteReading, DecodedFrame, MessageType, PartialReading};
use mijiableht_domain::signal::SignalQuality;
use mijiableht_domain::stats::DeviceStatistics;
use mijiableht_domain::time::Timestamp;

/// Window in seconds in which a repeated frame counter is treated as the
/// same frame.
const DUPLICATE_WINDOW_SECS: i64 = 2;

/// Publish policy knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Temperature delta (°C) that forces an immediate publish.
    pub temperature_threshold: f64,
    /// Humidity delta (% RH) that forces an immediate publish.
    pub humidity_threshold: f64,
    /// Heartbeat interval between publishes of unchanged values.
    pub publish_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            temperature_threshold: 0.2,
            humidity_threshold: 1.0,
            publish_interval: Duration::from_secs(300),
        }
    }
}

/// Counters for frames that never reached a record's values.
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheCounters {
    /// Frames rejected by the codec (encrypted, short, MAC mismatch).
    pub frames_dropped: u64,
    /// Frames suppressed as exact-duplicate repeats.
    pub duplicates_suppressed: u64,
}

/// Last-known value per field, refreshed by whichever advertisement carried
/// the field most recently.
#[derive(Debug, Clone, Copy)]
struct LatestValues {
    temperature: Option<f64>,
    humidity: Option<f64>,
    battery: Option<u8>,
    voltage_mv: Option<u16>,
    rssi: Option<i16>,
    last_seen: Timestamp,
}

/// Cache record for a single sensor. Created lazily on the first event for
/// an unseen MAC and never destroyed during a run.
#[derive(Debug)]
struct DeviceRecord {
    mac: MacAddress,
    friendly_name: Option<String>,
    model: DeviceModel,
    first_seen: Timestamp,
    latest: LatestValues,
    stats: DeviceStatistics,
    last_published: Option<(f64, f64)>,
    last_publish_at: Option<Timestamp>,
    last_frame: Option<(u8, Timestamp)>,
}

impl DeviceRecord {
    fn new(mac: MacAddress, friendly_name: Option<String>, first_seen: Timestamp) -> Self {
        Self {
            mac,
            friendly_name,
            model: DeviceModel::Unknown,
            first_seen,
            latest: LatestValues {
                temperature: None,
                humidity: None,
                battery: None,
                voltage_mv: None,
                rssi: None,
                last_seen: first_seen,
            },
            stats: DeviceStatistics::default(),
            last_published: None,
            last_publish_at: None,
            last_frame: None,
        }
    }

    /// True once temperature, humidity, and battery are all known.
    fn is_complete(&self) -> bool {
        self.latest.temperature.is_some()
            && self.latest.humidity.is_some()
            && self.latest.battery.is_some()
    }

    /// Apply one partial reading: refresh latest values and feed statistics.
    fn apply(&mut self, reading: &PartialReading) {
        if let Some(t) = reading.temperature {
            self.latest.temperature = Some(t);
            self.stats.temperature.record(t);
        }
        if let Some(h) = reading.humidity {
            self.latest.humidity = Some(h);
            self.stats.humidity.record(h);
        }
        if let Some(b) = reading.battery {
            self.latest.battery = Some(b);
            self.stats.battery.record(f64::from(b));
        }
        if let Some(v) = reading.voltage_mv {
            self.latest.voltage_mv = Some(v);
        }
        self.latest.last_seen = reading.received_at;
    }

    fn observe_rssi(&mut self, rssi: Option<i16>, received_at: Timestamp) {
        if let Some(rssi) = rssi {
            self.latest.rssi = Some(rssi);
            self.stats.rssi.record(f64::from(rssi));
        }
        self.latest.last_seen = received_at;
    }

    /// True when the same frame counter was seen within the duplicate window.
    fn is_duplicate(&self, frame_counter: u8, received_at: Timestamp) -> bool {
        self.last_frame.is_some_and(|(counter, at)| {
            counter == frame_counter
                && received_at - at < TimeDelta::seconds(DUPLICATE_WINDOW_SECS)
        })
    }

    /// Compare latest values against the last published ones.
    fn threshold_breached(&self, config: &CacheConfig) -> bool {
        let (Some(temperature), Some(humidity)) = (self.latest.temperature, self.latest.humidity)
        else {
            return false;
        };
        let Some((published_t, published_h)) = self.last_published else {
            return false;
        };
        (temperature - published_t).abs() >= config.temperature_threshold
            || (humidity - published_h).abs() >= config.humidity_threshold
    }

    fn periodic_due(&self, now: Timestamp, interval: Duration) -> bool {
        let Some(last) = self.last_publish_at else {
            return false;
        };
        let Ok(interval) = TimeDelta::from_std(interval) else {
            return false;
        };
        now - last >= interval
    }

    /// Snapshot a complete reading. Callers must hold `is_complete()`.
    fn build_reading(&self, message_type: MessageType) -> Option<CompleteReading> {
        Some(CompleteReading {
            mac: self.mac,
            friendly_name: self.friendly_name.clone(),
            model: self.model,
            temperature: self.latest.temperature?,
            humidity: self.latest.humidity?,
            battery: self.latest.battery?,
            voltage_mv: self.latest.voltage_mv,
            rssi: self.latest.rssi,
            signal: SignalQuality::from_rssi(self.latest.rssi),
            last_seen: self.latest.last_seen,
            message_type,
            statistics: self.stats,
        })
    }

    /// Record a publish: remember the published values, stamp the publish
    /// time, and reset the statistics. Runs in the same critical section as
    /// the snapshot in [`build_reading`](Self::build_reading), so no observer
    /// can see a half-reset state.
    fn mark_published(&mut self, published_at: Timestamp) {
        if let (Some(t), Some(h)) = (self.latest.temperature, self.latest.humidity) {
            self.last_published = Some((t, h));
        }
        self.last_publish_at = Some(published_at);
        self.stats.reset();
    }
}

/// Read-only view of one device record, for diagnostics.
#[derive(Debug, Clone)]
pub struct DeviceSnapshot {
    pub mac: MacAddress,
    pub friendly_name: Option<String>,
    pub model: DeviceModel,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub battery: Option<u8>,
    pub rssi: Option<i16>,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub last_publish_at: Option<Timestamp>,
    pub complete: bool,
}

/// Central cache for all discovered sensors.
pub struct SensorCache {
    config: CacheConfig,
    devices: HashMap<MacAddress, DeviceRecord>,
    friendly_names: HashMap<MacAddress, String>,
    counters: CacheCounters,
}

impl SensorCache {
    /// Create a cache with the given policy and static friendly names.
    #[must_use]
    pub fn new(config: CacheConfig, friendly_names: HashMap<MacAddress, String>) -> Self {
        Self {
            config,
            devices: HashMap::new(),
            friendly_names,
            counters: CacheCounters::default(),
        }
    }

    /// Number of devices discovered so far.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn counters(&self) -> CacheCounters {
        self.counters
    }

    /// Count a frame the codec rejected outright.
    pub fn record_dropped_frame(&mut self) {
        self.counters.frames_dropped += 1;
    }

    /// Ingest one scanner event.
    ///
    /// `frame` is the codec's output for the event's service data, or `None`
    /// when decoding failed. Ingest never fails: malformed frames degrade to
    /// an RSSI / last-seen touch on the record. Returns a reading when the
    /// event triggered an immediate (threshold-based) or opportunistic
    /// periodic publish.
    pub fn ingest(
        &mut self,
        mac: MacAddress,
        rssi: Option<i16>,
        frame: Option<&DecodedFrame>,
        received_at: Timestamp,
    ) -> Option<CompleteReading> {
        let config = self.config.clone();
        let record = self.record_for(mac, received_at);

        let Some(frame) = frame else {
            record.observe_rssi(rssi, received_at);
            return None;
        };

        if record.is_duplicate(frame.frame_counter, received_at) {
            record.observe_rssi(rssi, received_at);
            self.counters.duplicates_suppressed += 1;
            return None;
        }
        record.last_frame = Some((frame.frame_counter, received_at));

        if frame.model != DeviceModel::Unknown {
            record.model = frame.model;
        }

        record.observe_rssi(rssi, received_at);
        let mut applied = false;
        for reading in &frame.readings {
            if reading.validate().is_err() {
                continue;
            }
            record.apply(reading);
            applied = true;
        }
        if !applied || !record.is_complete() {
            return None;
        }

        let first = record.last_publish_at.is_none();
        let breached = record.threshold_breached(&config);
        let message_type = if first || breached {
            MessageType::ThresholdBased
        } else if record.periodic_due(received_at, config.publish_interval) {
            MessageType::Periodic
        } else {
            return None;
        };

        if first {
            tracing::info!(mac = %mac, "first complete reading, publishing immediately");
        } else if breached {
            tracing::debug!(mac = %mac, "threshold breached");
        }

        let reading = record.build_reading(message_type)?;
        record.mark_published(received_at);
        Some(reading)
    }

    /// Surface periodic heartbeats that no advertisement happened to carry
    /// out of [`ingest`](Self::ingest). Invoked by the orchestrator on a
    /// low-frequency timer.
    pub fn tick(&mut self, now: Timestamp) -> Vec<CompleteReading> {
        let mut due = Vec::new();
        for record in self.devices.values_mut() {
            if !record.is_complete() || !record.periodic_due(now, self.config.publish_interval) {
                continue;
            }

            if let Some(last_publish) = record.last_publish_at {
                if record.latest.last_seen < last_publish {
                    let silent_for = now - record.latest.last_seen;
                    tracing::warn!(
                        mac = %record.mac,
                        name = record.friendly_name.as_deref().unwrap_or(""),
                        silent_secs = silent_for.num_seconds(),
                        "sensor lost: no data since last publish"
                    );
                }
            }

            if let Some(reading) = record.build_reading(MessageType::Periodic) {
                record.mark_published(now);
                due.push(reading);
            }
        }
        due
    }

    /// Read-only copy of every device record, for diagnostics.
    #[must_use]
    pub fn snapshot(&self) -> Vec<DeviceSnapshot> {
        let mut devices: Vec<_> = self
            .devices
            .values()
            .map(|record| DeviceSnapshot {
                mac: record.mac,
                friendly_name: record.friendly_name.clone(),
                model: record.model,
                temperature: record.latest.temperature,
                humidity: record.latest.humidity,
                battery: record.latest.battery,
                rssi: record.latest.rssi,
                first_seen: record.first_seen,
                last_seen: record.latest.last_seen,
                last_publish_at: record.last_publish_at,
                complete: record.is_complete(),
            })
            .collect();
        devices.sort_by_key(|snapshot| snapshot.mac);
        devices
    }

    fn record_for(&mut self, mac: MacAddress, received_at: Timestamp) -> &mut DeviceRecord {
        let Self {
            devices,
            friendly_names,
            ..
        } = self;
        devices.entry(mac).or_insert_with(|| {
            let friendly_name = friendly_names.get(&mac).cloned();
            match &friendly_name {
                Some(name) => {
                    tracing::info!(mac = %mac, name = %name, "discovered new sensor");
                }
                None => tracing::info!(mac = %mac, "discovered new sensor"),
            }
            DeviceRecord::new(mac, friendly_name, received_at)
        })
    }
}
