//! Core types for smart ring telemetry.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Milliseconds in one minute.
const MINUTE_MS: i64 = 60_000;

/// Sleep stage of a single minute of the hypnogram.
///
/// The discriminants are ordered by depth so the hypnogram can be drawn
/// as lanes (awake on top, deep at the bottom).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum SleepStage {
    /// Awake, not worn, or no data.
    #[default]
    Awake = 0,
    /// Light ("core") sleep.
    Light = 1,
    /// REM sleep.
    Rem = 2,
    /// Deep sleep.
    Deep = 3,
}

impl SleepStage {
    /// Map a firmware stage code onto a stage.
    ///
    /// The ring reports `1` = deep, `2` = light, `3` = REM. Every other code
    /// (0, 4, 5, negative values) means awake or not worn.
    #[must_use]
    pub fn from_device_code(code: i64) -> Self {
        match code {
            1 => SleepStage::Deep,
            2 => SleepStage::Light,
            3 => SleepStage::Rem,
            _ => SleepStage::Awake,
        }
    }

    /// Lowercase label used in JSON and CLI output.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SleepStage::Awake => "awake",
            SleepStage::Light => "light",
            SleepStage::Rem => "rem",
            SleepStage::Deep => "deep",
        }
    }

    /// Whether this stage counts as sleep.
    #[must_use]
    pub fn is_asleep(&self) -> bool {
        !matches!(self, SleepStage::Awake)
    }
}

impl fmt::Display for SleepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SleepStage {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "awake" => Ok(SleepStage::Awake),
            "light" | "core" => Ok(SleepStage::Light),
            "rem" => Ok(SleepStage::Rem),
            "deep" => Ok(SleepStage::Deep),
            other => Err(ParseError::UnknownStage(other.to_string())),
        }
    }
}

/// A contiguous run of minutes sharing one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SleepSegment {
    /// Stage for the whole run.
    pub stage: SleepStage,
    /// Start of the run (epoch ms, inclusive).
    pub start_ms: i64,
    /// End of the run (epoch ms, exclusive).
    pub end_ms: i64,
}

impl SleepSegment {
    /// Length of the segment in whole minutes.
    #[must_use]
    pub fn duration_minutes(&self) -> u32 {
        ((self.end_ms - self.start_ms).max(0) / MINUTE_MS) as u32
    }
}

/// Per-stage minute totals for one night.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SleepTotals {
    /// Minutes of deep sleep.
    pub deep: u32,
    /// Minutes of light sleep.
    pub light: u32,
    /// Minutes of REM sleep.
    pub rem: u32,
    /// Minutes awake, unworn, or unmeasured.
    pub awake: u32,
}

impl SleepTotals {
    /// Add one minute of `stage`.
    pub fn add_minute(&mut self, stage: SleepStage) {
        match stage {
            SleepStage::Deep => self.deep += 1,
            SleepStage::Light => self.light += 1,
            SleepStage::Rem => self.rem += 1,
            SleepStage::Awake => self.awake += 1,
        }
    }

    /// Minutes recorded for a given stage.
    #[must_use]
    pub fn minutes(&self, stage: SleepStage) -> u32 {
        match stage {
            SleepStage::Deep => self.deep,
            SleepStage::Light => self.light,
            SleepStage::Rem => self.rem,
            SleepStage::Awake => self.awake,
        }
    }

    /// All minutes, awake included.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.deep + self.light + self.rem + self.awake
    }

    /// Minutes spent in any sleep stage.
    #[must_use]
    pub fn asleep(&self) -> u32 {
        self.deep + self.light + self.rem
    }
}

/// The reconstructed main sleep block of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SleepSummary {
    /// Bed time (epoch ms).
    pub start_ms: i64,
    /// Wake time (epoch ms).
    pub end_ms: i64,
    /// Length of the per-minute timeline.
    pub total_minutes: u32,
    /// Per-stage totals.
    pub totals: SleepTotals,
    /// Hypnogram segments in chronological order.
    pub segments: Vec<SleepSegment>,
    /// Light + deep share of the block, 0-100.
    pub score: u8,
    /// How many separate blocks (naps, main sleep) the fetch contained.
    pub block_count: usize,
}

impl SleepSummary {
    /// Time asleep formatted as `"7h 12m"`.
    #[must_use]
    pub fn time_asleep(&self) -> String {
        format_minutes(self.totals.asleep())
    }
}

/// Overall label for a [`SleepScore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SleepQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl SleepQuality {
    /// Label for a composite 0-100 score.
    #[must_use]
    pub fn from_score(score: u8) -> Self {
        match score {
            85.. => SleepQuality::Excellent,
            70..=84 => SleepQuality::Good,
            50..=69 => SleepQuality::Fair,
            _ => SleepQuality::Poor,
        }
    }
}

impl fmt::Display for SleepQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SleepQuality::Poor => write!(f, "Poor"),
            SleepQuality::Fair => write!(f, "Fair"),
            SleepQuality::Good => write!(f, "Good"),
            SleepQuality::Excellent => write!(f, "Excellent"),
        }
    }
}

/// Points awarded per category of the composite sleep score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SleepScoreBreakdown {
    /// Total duration, out of 35.
    pub duration: u8,
    /// Deep sleep share, out of 25.
    pub deep_sleep: u8,
    /// Little time awake, out of 25.
    pub efficiency: u8,
    /// REM share, out of 15.
    pub consistency: u8,
}

/// Composite sleep score with its breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SleepScore {
    pub score: u8,
    pub quality: SleepQuality,
    pub breakdown: SleepScoreBreakdown,
}

/// One heart-rate reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeartRateSample {
    /// Beats per minute (always > 0).
    pub bpm: u16,
    /// When the reading was taken (epoch ms).
    pub timestamp_ms: i64,
}

/// Minimum and maximum bpm seen within an hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BpmRange {
    pub min: u16,
    pub max: u16,
}

/// Heart-rate range for one hour of the day.
///
/// `range` is `None` when the hour was never measured, which is different
/// from a quiet hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HourRange {
    /// Hour of day, 0-23.
    pub hour: u8,
    /// Observed range, if any sample fell into this hour.
    pub range: Option<BpmRange>,
}

impl HourRange {
    /// An hour with no data.
    #[must_use]
    pub fn empty(hour: u8) -> Self {
        Self { hour, range: None }
    }

    /// Widen the range to include `bpm`.
    pub fn record(&mut self, bpm: u16) {
        self.range = Some(match self.range {
            None => BpmRange { min: bpm, max: bpm },
            Some(r) => BpmRange {
                min: r.min.min(bpm),
                max: r.max.max(bpm),
            },
        });
    }

    /// Whether any sample fell into this hour.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.range.is_some()
    }
}

/// Twenty-four hourly ranges, index = hour of day.
pub type HourlyHeartRate = [HourRange; 24];

/// Aggregate statistics over a set of heart-rate samples.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeartRateSummary {
    /// Mean bpm.
    pub baseline: f64,
    pub min: u16,
    pub max: u16,
    /// Population standard deviation of bpm.
    pub variability: f64,
    pub count: usize,
}

/// A timestamped SpO2 (%) or temperature (°C) reading.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VitalSample {
    pub value: f64,
    pub timestamp_ms: i64,
}

/// Heart-rate variability reading.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HrvSample {
    /// SDNN in milliseconds.
    pub sdnn: f64,
    pub heart_rate: f64,
    pub stress: f64,
    pub timestamp_ms: i64,
}

/// Blood pressure estimate reported alongside HRV.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BloodPressureSample {
    pub systolic: f64,
    pub diastolic: f64,
    pub heart_rate: f64,
    pub timestamp_ms: i64,
}

/// Battery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Battery {
    /// Charge level, 0-100.
    pub level: u8,
}

/// Daily activity totals.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Steps {
    pub steps: u32,
    /// Distance in metres.
    pub distance_m: f64,
    /// Energy in kcal.
    pub calories: f64,
    /// Active time in seconds.
    pub active_seconds: u32,
}

/// Firmware version information.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FirmwareInfo {
    pub hardware: String,
    pub software: String,
}

/// A ring seen during scanning or reported as connected.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceInfo {
    /// Peripheral identifier used to connect.
    pub id: String,
    pub name: Option<String>,
    pub mac: Option<String>,
    pub rssi: Option<i16>,
}

/// Wearer's sex as understood by the ring's calorie model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Numeric code expected by the bridge's `setUserInfo`.
    #[must_use]
    pub fn device_code(&self) -> u8 {
        match self {
            Gender::Male => 0,
            Gender::Female => 1,
        }
    }
}

/// Wearer profile pushed to the ring.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UserProfile {
    pub gender: Gender,
    pub age: u8,
    pub height_cm: f64,
    pub weight_kg: f64,
    /// Stride length in cm (the bridge defaults to 70).
    pub stride_cm: Option<f64>,
}

/// Link state reported by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    /// Interpret a bridge label. Unknown labels mean disconnected.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "connected" => ConnectionState::Connected,
            "connecting" => ConnectionState::Connecting,
            "disconnecting" => ConnectionState::Disconnecting,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Host Bluetooth adapter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BluetoothState {
    PoweredOn,
    PoweredOff,
    Unauthorized,
    Unsupported,
    #[default]
    Unknown,
}

impl BluetoothState {
    /// Interpret a bridge label.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "poweredon" | "powered_on" | "on" => BluetoothState::PoweredOn,
            "poweredoff" | "powered_off" | "off" => BluetoothState::PoweredOff,
            "unauthorized" => BluetoothState::Unauthorized,
            "unsupported" => BluetoothState::Unsupported,
            _ => BluetoothState::Unknown,
        }
    }
}

/// Format a minute count as `"1h 25m"`, `"45m"` or `"2h"`.
#[must_use]
pub fn format_minutes(minutes: u32) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    match (hours, mins) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}
