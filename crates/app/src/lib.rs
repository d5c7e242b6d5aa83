//! # mijiableht-app
//!
//! Application layer — the stateful hub between the BLE scanner and the
//! MQTT publisher.
//!
//! ## Responsibilities
//! - [`cache::SensorCache`] — one record per device: merge partial readings,
//!   track per-field statistics, decide when a complete reading is emitted
//!   (first sighting, threshold breach, periodic heartbeat)
//! - [`backoff::Backoff`] — the retry policy both adapters use for
//!   transient infrastructure errors
//!
//! ## Dependency rule
//! Depends on `mijiableht-domain` only.
//! Never imports adapter crates. Adapters depend on *this* crate, not the
//! reverse.

pub mod backoff;
pub mod cache;
