//! Heart-rate history reconstruction.
//!
//! `getHeartRateData` pages come in two shapes: a flat `arrayDynamicHR`
//! with one packet-level start, or a list of `arrayContinuousHR` segments
//! each carrying its own start. Both are normalized into
//! [`HeartRateTrace`]s: a start time plus one value per minute.
//!
//! Start resolution falls back in a fixed order: explicit epoch field,
//! then the X3 `date` string, then the packet's own start (for segments),
//! then the time the fetch returned. Values ≤ 0 mean "no reading" and are
//! skipped without shifting the minutes of the values after them.

use serde_json::Value;
use time::UtcOffset;
use tracing::debug;

use smartring_types::{HeartRateSample, HeartRateSummary, HourRange, HourlyHeartRate};

use crate::payload::{self, RawHeartRatePacket};
use crate::timecodec::minutes_since_midnight;

const MINUTE_MS: i64 = 60_000;

/// A run of per-minute heart-rate values.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartRateTrace {
    /// Time of the first value (epoch ms).
    pub start_ms: i64,
    /// Raw values, one per minute. Values ≤ 0 are gaps.
    pub values: Vec<f64>,
}

impl HeartRateTrace {
    /// Valid readings with their minute index.
    pub fn readings(&self) -> impl Iterator<Item = (usize, u16)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| to_bpm(*v).map(|bpm| (i, bpm)))
    }

    /// Valid readings as timestamped samples.
    pub fn samples(&self) -> impl Iterator<Item = HeartRateSample> + '_ {
        self.readings().map(move |(i, bpm)| HeartRateSample {
            bpm,
            timestamp_ms: self.start_ms.saturating_add(i as i64 * MINUTE_MS),
        })
    }
}

fn to_bpm(value: f64) -> Option<u16> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    let rounded = value.round().min(f64::from(u16::MAX));
    (rounded >= 1.0).then_some(rounded as u16)
}

/// Normalize raw pages into traces.
///
/// `request_ms` is the last-resort timestamp: when the fetch returned.
pub fn normalize(
    packets: &[RawHeartRatePacket],
    offset: UtcOffset,
    request_ms: i64,
) -> Vec<HeartRateTrace> {
    let mut traces = Vec::new();
    for packet in packets {
        let packet_start = packet.start_ms(offset);
        if !packet.values.is_empty() {
            traces.push(HeartRateTrace {
                start_ms: packet_start.unwrap_or(request_ms),
                values: packet.values.clone(),
            });
            continue;
        }
        for segment in &packet.segments {
            if segment.values.is_empty() {
                continue;
            }
            traces.push(HeartRateTrace {
                start_ms: segment
                    .start_ms(offset)
                    .or(packet_start)
                    .unwrap_or(request_ms),
                values: segment.values.clone(),
            });
        }
    }
    traces
}

/// Normalize a `getHeartRateData` reply.
pub fn normalize_payload(payload: Value, offset: UtcOffset, request_ms: i64) -> Vec<HeartRateTrace> {
    let packets: Vec<RawHeartRatePacket> = payload::records(payload);
    let traces = normalize(&packets, offset, request_ms);
    debug!(
        packets = packets.len(),
        traces = traces.len(),
        "Normalized heart-rate history"
    );
    traces
}

/// Flatten traces into samples, dropping gaps.
pub fn samples(traces: &[HeartRateTrace]) -> Vec<HeartRateSample> {
    traces.iter().flat_map(HeartRateTrace::samples).collect()
}

/// Hour-of-day bucket of a minute count, clamped to `0..=23`.
///
/// Minute counts past midnight (a trace running into the next day) land
/// in hour 23 rather than wrapping.
pub fn hour_bucket(minute_of_day: i64) -> usize {
    minute_of_day.div_euclid(60).clamp(0, 23) as usize
}

fn empty_hours() -> HourlyHeartRate {
    std::array::from_fn(|hour| HourRange::empty(hour as u8))
}

/// Hourly min/max of traces.
///
/// A value at index `i` of a trace sits `i` minutes after the trace's
/// local start minute. Hours without readings stay empty.
pub fn hourly_ranges(traces: &[HeartRateTrace], offset: UtcOffset) -> HourlyHeartRate {
    let mut hours = empty_hours();
    for trace in traces {
        let start_minute = i64::from(minutes_since_midnight(trace.start_ms, offset));
        for (i, bpm) in trace.readings() {
            hours[hour_bucket(start_minute + i as i64)].record(bpm);
        }
    }
    hours
}

/// Hourly min/max of individually timestamped samples.
pub fn hourly_ranges_from_samples(
    samples: &[HeartRateSample],
    offset: UtcOffset,
) -> HourlyHeartRate {
    let mut hours = empty_hours();
    for sample in samples.iter().filter(|s| s.bpm > 0) {
        let minute = i64::from(minutes_since_midnight(sample.timestamp_ms, offset));
        hours[hour_bucket(minute)].record(sample.bpm);
    }
    hours
}

/// Baseline, range and spread of a set of samples.
///
/// `variability` is the population standard deviation of bpm. All fields
/// are zero for an empty set.
pub fn summarize(samples: &[HeartRateSample]) -> HeartRateSummary {
    let valid: Vec<f64> = samples
        .iter()
        .filter(|s| s.bpm > 0)
        .map(|s| f64::from(s.bpm))
        .collect();
    if valid.is_empty() {
        return HeartRateSummary::default();
    }

    let count = valid.len();
    let baseline = valid.iter().sum::<f64>() / count as f64;
    let variance = valid.iter().map(|v| (v - baseline).powi(2)).sum::<f64>() / count as f64;
    let min = samples.iter().filter(|s| s.bpm > 0).map(|s| s.bpm).min().unwrap_or(0);
    let max = samples.iter().map(|s| s.bpm).max().unwrap_or(0);

    HeartRateSummary {
        baseline,
        min,
        max,
        variability: variance.sqrt(),
        count,
    }
}
