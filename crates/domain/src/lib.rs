//! # mijiableht-domain
//!
//! Pure domain model for the mijiableht daemon — a passive collector for
//! Xiaomi Mijia BLE thermometers (LYWSD03MMC, LYWSDCGQ/01ZM).
//!
//! ## Responsibilities
//! - Foundational types: MAC addresses, error conventions, timestamps
//! - Define **readings** (partial readings assembled into complete ones)
//! - Define **value statistics** (per-field min/max/avg since last publish)
//! - Classify RSSI into qualitative signal labels
//! - Contain all invariant enforcement (value ranges, completeness)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.

pub mod error;
pub mod mac;
pub mod model;
pub mod reading;
pub mod signal;
pub mod stats;
pub mod time;
