//! SpO2, temperature, HRV and blood-pressure normalization.
//!
//! Each history page either nests a list of readings or is itself one
//! reading. Readings outside the physiological band are dropped, never
//! clamped. Timestamps come from the entry's X3 `date`, falling back to
//! the time the fetch returned.

use std::ops::RangeInclusive;

use serde_json::Value;
use time::UtcOffset;
use tracing::debug;

use smartring_types::{BloodPressureSample, HrvSample, VitalSample};

use crate::payload::{self, RawHrvEntry, RawHrvPacket, RawSpo2Packet, RawTemperaturePacket};
use crate::timecodec::parse_x3_datetime;

/// Body temperatures the ring can plausibly report, in °C.
///
/// Firmware emits corrupted values outside this band.
pub const TEMPERATURE_RANGE: RangeInclusive<f64> = 34.0..=42.0;

fn timestamp(date: Option<&str>, offset: UtcOffset, request_ms: i64) -> i64 {
    date.and_then(|d| parse_x3_datetime(d, offset))
        .unwrap_or(request_ms)
}

/// Whether an SpO2 percentage is a real reading.
pub fn is_valid_spo2(value: f64) -> bool {
    value > 0.0
}

/// Whether a temperature is inside [`TEMPERATURE_RANGE`].
pub fn is_valid_temperature(value: f64) -> bool {
    TEMPERATURE_RANGE.contains(&value)
}

/// Accepted SpO2 readings.
pub fn spo2(packets: &[RawSpo2Packet], offset: UtcOffset, request_ms: i64) -> Vec<VitalSample> {
    let mut samples = Vec::new();
    for packet in packets {
        let entries = if packet.entries.is_empty() {
            std::slice::from_ref(&packet.flat)
        } else {
            packet.entries.as_slice()
        };
        for entry in entries {
            if let Some(value) = entry.value().filter(|v| is_valid_spo2(*v)) {
                samples.push(VitalSample {
                    value,
                    timestamp_ms: timestamp(entry.date.as_deref(), offset, request_ms),
                });
            }
        }
    }
    samples
}

/// Accepted temperature readings.
pub fn temperature(
    packets: &[RawTemperaturePacket],
    offset: UtcOffset,
    request_ms: i64,
) -> Vec<VitalSample> {
    let mut samples = Vec::new();
    let mut rejected = 0usize;
    for packet in packets {
        let nested = packet.nested();
        let entries = if nested.is_empty() {
            std::slice::from_ref(&packet.flat)
        } else {
            nested
        };
        for entry in entries {
            let Some(value) = entry.temperature else {
                continue;
            };
            if !is_valid_temperature(value) {
                rejected += 1;
                continue;
            }
            samples.push(VitalSample {
                value,
                timestamp_ms: timestamp(entry.date.as_deref(), offset, request_ms),
            });
        }
    }
    if rejected > 0 {
        debug!(rejected, "Dropped out-of-range temperature readings");
    }
    samples
}

fn hrv_entries(packets: &[RawHrvPacket]) -> Vec<RawHrvEntry> {
    let mut entries = Vec::new();
    for packet in packets {
        match packet.nested() {
            Some(nested) => entries.extend(nested),
            None => entries.push(packet.flat.clone()),
        }
    }
    entries
}

/// Accepted HRV readings (SDNN > 0).
pub fn hrv(packets: &[RawHrvPacket], offset: UtcOffset, request_ms: i64) -> Vec<HrvSample> {
    hrv_entries(packets)
        .into_iter()
        .filter_map(|entry| {
            let sdnn = entry.sdnn().filter(|v| *v > 0.0)?;
            Some(HrvSample {
                sdnn,
                heart_rate: entry.heart_rate.unwrap_or(0.0),
                stress: entry.stress.unwrap_or(0.0),
                timestamp_ms: timestamp(entry.date.as_deref(), offset, request_ms),
            })
        })
        .collect()
}

/// Blood-pressure estimates carried on HRV pages.
///
/// Both systolic and diastolic must be positive.
pub fn blood_pressure(
    packets: &[RawHrvPacket],
    offset: UtcOffset,
    request_ms: i64,
) -> Vec<BloodPressureSample> {
    let mut flat_and_nested: Vec<RawHrvEntry> = packets.iter().map(|p| p.flat.clone()).collect();
    for packet in packets {
        flat_and_nested.extend(packet.nested().unwrap_or_default());
    }
    flat_and_nested
        .into_iter()
        .filter_map(|entry| {
            let systolic = entry.high_pressure.filter(|v| *v > 0.0)?;
            let diastolic = entry.low_pressure.filter(|v| *v > 0.0)?;
            Some(BloodPressureSample {
                systolic,
                diastolic,
                heart_rate: entry.heart_rate.unwrap_or(0.0),
                timestamp_ms: timestamp(entry.date.as_deref(), offset, request_ms),
            })
        })
        .collect()
}

/// Normalize a `getSpO2Data` reply.
pub fn spo2_payload(payload: Value, offset: UtcOffset, request_ms: i64) -> Vec<VitalSample> {
    let packets: Vec<RawSpo2Packet> = payload::records(payload);
    spo2(&packets, offset, request_ms)
}

/// Normalize a `getTemperatureData` reply.
pub fn temperature_payload(payload: Value, offset: UtcOffset, request_ms: i64) -> Vec<VitalSample> {
    let packets: Vec<RawTemperaturePacket> = payload::records(payload);
    temperature(&packets, offset, request_ms)
}

/// Normalize a `getHRVData` reply into HRV readings.
pub fn hrv_payload(payload: Value, offset: UtcOffset, request_ms: i64) -> Vec<HrvSample> {
    let packets: Vec<RawHrvPacket> = payload::records(payload);
    hrv(&packets, offset, request_ms)
}

/// Normalize a `getHRVData` reply into blood-pressure estimates.
pub fn blood_pressure_payload(
    payload: Value,
    offset: UtcOffset,
    request_ms: i64,
) -> Vec<BloodPressureSample> {
    let packets: Vec<RawHrvPacket> = payload::records(payload);
    blood_pressure(&packets, offset, request_ms)
}
