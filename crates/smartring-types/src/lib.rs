//! Platform-agnostic types for smart ring health telemetry.
//!
//! This crate provides the clean domain values produced by `smartring-core`
//! after raw device packets have been reconstructed: sleep hypnograms,
//! heart-rate samples and hourly ranges, vitals, and device metadata.
//!
//! # Features
//!
//! - Sleep stages, segments, per-stage totals and summaries
//! - Heart-rate samples, hourly ranges and overnight summaries
//! - SpO2, temperature, HRV and blood-pressure samples
//! - Battery, step, firmware and connection types
//!
//! All timestamps are epoch milliseconds (`i64`), matching what the device
//! bridge reports.
//!
//! # Example
//!
//! ```
//! use smartring_types::{format_minutes, SleepStage};
//!
//! assert_eq!(SleepStage::from_device_code(1), SleepStage::Deep);
//! assert_eq!(format_minutes(85), "1h 25m");
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{
    Battery, BloodPressureSample, BluetoothState, BpmRange, ConnectionState, DeviceInfo,
    FirmwareInfo, Gender, HeartRateSample, HeartRateSummary, HourRange, HourlyHeartRate,
    HrvSample, SleepQuality, SleepScore, SleepScoreBreakdown, SleepSegment, SleepStage,
    SleepSummary, SleepTotals, Steps, UserProfile, VitalSample, format_minutes,
};
