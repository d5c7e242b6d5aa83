//! MiBeacon service-data codec.
//!
//! Pure functions operating on raw `&[u8]` slices — no BLE dependency
//! needed. A MiBeacon frame (service UUID `0xFE95`) carries:
//!
//! | Offset | Field | Type |
//! |--------|-------|------|
//! | 0–1 | Frame control | u16 LE (bit 3 encrypted, bit 5 capability) |
//! | 2–3 | Product id | u16 LE |
//! | 4 | Frame counter | u8 |
//! | 5–10 | MAC | 6 bytes LE |
//! | 11.. | Capability byte (when flagged), then TLVs | `type u16 LE ‖ len u8 ‖ value[len]` |
//!
//! Encrypted frames are rejected outright; truncated TLVs terminate parsing
//! but keep the readings decoded so far, which tolerates the occasional
//! clipped advertisement on weak links.

use mijiableht_domain::mac::MacAddress;
use mijiableht_domain::model::DeviceModel;
use mijiableht_domain::reading::{DecodedFrame, PartialReading, TEMPERATURE_MAX, TEMPERATURE_MIN};
use mijiableht_domain::time::Timestamp;

use crate::error::FrameError;

/// Xiaomi MiBeacon service-data UUID (16-bit `0xFE95`).
pub const SERVICE_UUID_FE95: uuid::Uuid =
    uuid::Uuid::from_u128(0x0000_FE95_0000_1000_8000_0080_5F9B_34FB);

/// Frame-control bit: payload is encrypted with a bindkey.
const FC_ENCRYPTED: u16 = 1 << 3;
/// Frame-control bit: a capability byte precedes the TLVs.
const FC_CAPABILITY: u16 = 1 << 5;

/// Fixed header length: frame control, product id, counter, MAC.
const HEADER_LEN: usize = 11;

const TLV_TEMPERATURE: u16 = 0x1004;
const TLV_HUMIDITY: u16 = 0x1006;
const TLV_BATTERY: u16 = 0x100A;
const TLV_VOLTAGE: u16 = 0x100B;
const TLV_TEMPERATURE_HUMIDITY: u16 = 0x100D;

/// Decode one MiBeacon service-data blob into typed partial readings.
///
/// Returns one [`PartialReading`] per decoded TLV, in frame order, so a
/// duplicated TLV within the frame is resolved by the consumer applying
/// them in sequence (last wins). Unknown TLV types are skipped. A value
/// outside its plausible range drops that field, not the frame.
///
/// # Errors
///
/// Returns [`FrameError`] for encrypted frames, frames shorter than the
/// 11-byte header, and frames whose embedded MAC does not match
/// `advertised_mac`. All are soft failures to be counted and dropped.
pub fn decode(
    service_data: &[u8],
    advertised_mac: MacAddress,
    received_at: Timestamp,
) -> Result<DecodedFrame, FrameError> {
    if service_data.len() < HEADER_LEN {
        return Err(FrameError::Short {
            actual: service_data.len(),
        });
    }

    let frame_control = u16::from_le_bytes([service_data[0], service_data[1]]);
    if frame_control & FC_ENCRYPTED != 0 {
        return Err(FrameError::Encrypted);
    }

    let product_id = u16::from_le_bytes([service_data[2], service_data[3]]);
    let model = DeviceModel::from_product_id(product_id);
    let frame_counter = service_data[4];

    let mut mac_le = [0u8; 6];
    mac_le.copy_from_slice(&service_data[5..11]);
    let embedded = MacAddress::from_le_bytes(mac_le);
    if embedded != advertised_mac {
        return Err(FrameError::MacMismatch {
            advertised: advertised_mac,
            embedded,
        });
    }

    let mut offset = HEADER_LEN;
    if frame_control & FC_CAPABILITY != 0 {
        offset += 1;
    }

    let mut readings = Vec::new();
    while offset + 3 <= service_data.len() {
        let tlv_type = u16::from_le_bytes([service_data[offset], service_data[offset + 1]]);
        let value_len = usize::from(service_data[offset + 2]);
        let value_start = offset + 3;
        let Some(value) = service_data.get(value_start..value_start + value_len) else {
            // Truncated TLV: keep what we decoded so far.
            break;
        };

        if let Some(reading) = decode_tlv(tlv_type, value, advertised_mac, received_at) {
            readings.push(reading);
        }
        offset = value_start + value_len;
    }

    Ok(DecodedFrame {
        model,
        frame_counter,
        readings,
    })
}

/// Decode one TLV value into a partial reading, or `None` when the type is
/// unknown, the value is shorter than its layout, or every field is out of
/// range.
fn decode_tlv(
    tlv_type: u16,
    value: &[u8],
    mac: MacAddress,
    received_at: Timestamp,
) -> Option<PartialReading> {
    let mut reading = PartialReading::empty(mac, received_at);
    match tlv_type {
        TLV_TEMPERATURE if value.len() >= 2 => {
            reading.temperature = temperature_tenths(value[0], value[1]);
        }
        TLV_HUMIDITY if value.len() >= 2 => {
            reading.humidity = humidity_tenths(value[0], value[1]);
        }
        TLV_BATTERY if !value.is_empty() => {
            reading.battery = (value[0] <= 100).then_some(value[0]);
        }
        TLV_VOLTAGE if value.len() >= 2 => {
            reading.voltage_mv = Some(u16::from_le_bytes([value[0], value[1]]));
        }
        TLV_TEMPERATURE_HUMIDITY if value.len() >= 4 => {
            reading.temperature = temperature_tenths(value[0], value[1]);
            reading.humidity = humidity_tenths(value[2], value[3]);
        }
        _ => return None,
    }
    reading.has_any_field().then_some(reading)
}

fn temperature_tenths(lo: u8, hi: u8) -> Option<f64> {
    let celsius = f64::from(i16::from_le_bytes([lo, hi])) / 10.0;
    (TEMPERATURE_MIN..=TEMPERATURE_MAX)
        .contains(&celsius)
        .then_some(celsius)
}

fn humidity_tenths(lo: u8, hi: u8) -> Option<f64> {
    let percent = f64::from(u16::from_le_bytes([lo, hi])) / 10.0;
    (0.0..=100.0).contains(&percent).then_some(percent)
}
