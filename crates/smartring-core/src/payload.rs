//! Raw payload shapes returned by the ring bridge.
//!
//! The vendor SDK's JSON is loosely typed: numbers arrive as strings, field
//! names change between firmware builds, arrays are sometimes missing or
//! `null`. Every raw struct here deserializes from *any* JSON object
//! without failing: unknown shapes collapse to `None`/empty. Field-name
//! variants are resolved once, by the accessor methods, so reconstruction
//! code only ever sees one canonical shape.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use time::UtcOffset;

use crate::timecodec::parse_x3_datetime;

/// Deserializers that never reject a value.
pub(crate) mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Interpret a JSON value as a finite number.
    pub fn as_number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|n| n.is_finite())
    }

    /// Number or numeric string; anything else is `None`.
    pub fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Value>::deserialize(deserializer)?
            .as_ref()
            .and_then(as_number))
    }

    /// Array of numbers; non-numeric items are skipped, non-arrays are empty.
    pub fn numbers<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::Array(items)) => items.iter().filter_map(as_number).collect(),
            _ => Vec::new(),
        })
    }

    /// Non-empty string; anything else is `None`.
    pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
            _ => None,
        })
    }

    /// Boolean, number (non-zero is true) or `"true"`/`"false"`.
    pub fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::Bool(b)) => Some(b),
            Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0),
            Some(Value::String(s)) => match s.trim() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        })
    }

    /// Array of objects; items that do not fit `T` are skipped.
    pub fn objects<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            _ => Vec::new(),
        })
    }
}

/// Extract the paginated record list of a bridge reply.
///
/// Accepts `{"data": [...]}`, `{"records": [...]}` or a bare array. Items
/// that are not objects of the expected shape are skipped.
pub fn records<T: DeserializeOwned>(payload: Value) -> Vec<T> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data").or_else(|| map.remove("records")) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}

/// Decode a single-object reply, falling back to the all-empty shape.
pub fn object<T: DeserializeOwned + Default>(payload: Value) -> T {
    serde_json::from_value(payload).unwrap_or_default()
}

/// Latest epoch accepted from the device: 9999-12-31 23:59:59.999 UTC.
const MAX_EPOCH_MS: i64 = 253_402_300_799_999;

/// Epoch milliseconds from a raw number, if it is a plausible instant.
fn positive_ms(value: Option<f64>) -> Option<i64> {
    value
        .filter(|v| v.is_finite() && *v > 0.0 && *v <= MAX_EPOCH_MS as f64)
        .map(|v| v as i64)
}

fn parse_date(date: Option<&str>, offset: UtcOffset) -> Option<i64> {
    date.and_then(|d| parse_x3_datetime(d, offset))
}

/// One page of sleep-quality history.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSleepPacket {
    #[serde(rename = "startTimestamp", default, deserialize_with = "lenient::number")]
    pub start_timestamp: Option<f64>,
    /// Either epoch ms or an X3 string, depending on the bridge build.
    #[serde(rename = "startTime", default)]
    pub start_time: Option<Value>,
    #[serde(rename = "startTime_SleepData", default, deserialize_with = "lenient::text")]
    pub start_time_text: Option<String>,
    #[serde(rename = "sleepUnitLength", default, deserialize_with = "lenient::number")]
    pub unit_length: Option<f64>,
    #[serde(rename = "arraySleepQuality", default, deserialize_with = "lenient::numbers")]
    pub stage_codes: Vec<f64>,
    #[serde(rename = "totalSleepTime", default, deserialize_with = "lenient::number")]
    pub total_sleep_time: Option<f64>,
}

impl RawSleepPacket {
    /// First usable start: epoch field, numeric `startTime`, then the X3 text.
    pub fn start_ms(&self, offset: UtcOffset) -> Option<i64> {
        positive_ms(self.start_timestamp)
            .or_else(|| match &self.start_time {
                Some(Value::String(s)) => parse_x3_datetime(s, offset),
                Some(other) => positive_ms(lenient::as_number(other)),
                None => None,
            })
            .or_else(|| parse_date(self.start_time_text.as_deref(), offset))
    }
}

/// One page of continuous heart-rate history.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawHeartRatePacket {
    #[serde(rename = "arrayDynamicHR", default, deserialize_with = "lenient::numbers")]
    pub values: Vec<f64>,
    #[serde(rename = "startTimestamp", default, deserialize_with = "lenient::number")]
    pub start_timestamp: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub date: Option<String>,
    #[serde(rename = "arrayContinuousHR", default, deserialize_with = "lenient::objects")]
    pub segments: Vec<RawHeartRateSegment>,
}

impl RawHeartRatePacket {
    /// Packet-level timestamp, if the packet carries a usable one.
    pub fn start_ms(&self, offset: UtcOffset) -> Option<i64> {
        positive_ms(self.start_timestamp).or_else(|| parse_date(self.date.as_deref(), offset))
    }
}

/// A nested run of heart-rate values with its own start.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawHeartRateSegment {
    #[serde(rename = "arrayHR", default, deserialize_with = "lenient::numbers")]
    pub values: Vec<f64>,
    #[serde(rename = "startTimestamp", default, deserialize_with = "lenient::number")]
    pub start_timestamp: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub date: Option<String>,
}

impl RawHeartRateSegment {
    pub fn start_ms(&self, offset: UtcOffset) -> Option<i64> {
        positive_ms(self.start_timestamp).or_else(|| parse_date(self.date.as_deref(), offset))
    }
}

/// One automatic SpO2 reading.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSpo2Entry {
    #[serde(rename = "automaticSpo2Data", default, deserialize_with = "lenient::number")]
    pub automatic: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub spo2: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub date: Option<String>,
}

impl RawSpo2Entry {
    pub fn value(&self) -> Option<f64> {
        self.automatic.or(self.spo2)
    }
}

/// One page of SpO2 history: a nested list, or a flat reading.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSpo2Packet {
    #[serde(rename = "arrayAutomaticSpo2Data", default, deserialize_with = "lenient::objects")]
    pub entries: Vec<RawSpo2Entry>,
    #[serde(flatten)]
    pub flat: RawSpo2Entry,
}

/// One temperature reading.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTemperatureEntry {
    #[serde(default, deserialize_with = "lenient::number")]
    pub temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub date: Option<String>,
}

/// One page of temperature history.
///
/// Some firmware builds spell the list `arrayemperatureData`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTemperaturePacket {
    #[serde(rename = "arrayemperatureData", default, deserialize_with = "lenient::objects")]
    pub misspelled_entries: Vec<RawTemperatureEntry>,
    #[serde(rename = "arrayTemperatureData", default, deserialize_with = "lenient::objects")]
    pub entries: Vec<RawTemperatureEntry>,
    #[serde(flatten)]
    pub flat: RawTemperatureEntry,
}

impl RawTemperaturePacket {
    /// The nested list under whichever name is populated.
    pub fn nested(&self) -> &[RawTemperatureEntry] {
        if self.misspelled_entries.is_empty() {
            &self.entries
        } else {
            &self.misspelled_entries
        }
    }
}

/// One HRV reading; blood pressure rides along on some firmware.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawHrvEntry {
    #[serde(default, deserialize_with = "lenient::number")]
    pub hrv: Option<f64>,
    #[serde(rename = "hrvValue", default, deserialize_with = "lenient::number")]
    pub hrv_value: Option<f64>,
    #[serde(rename = "heartRate", default, deserialize_with = "lenient::number")]
    pub heart_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub stress: Option<f64>,
    #[serde(rename = "HighPressure", default, deserialize_with = "lenient::number")]
    pub high_pressure: Option<f64>,
    #[serde(rename = "LowPressure", default, deserialize_with = "lenient::number")]
    pub low_pressure: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub date: Option<String>,
}

impl RawHrvEntry {
    /// SDNN in ms.
    pub fn sdnn(&self) -> Option<f64> {
        self.hrv.or(self.hrv_value)
    }
}

/// One page of HRV history.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawHrvPacket {
    #[serde(rename = "arrayHrvData", default)]
    pub entries: Option<Value>,
    #[serde(flatten)]
    pub flat: RawHrvEntry,
}

impl RawHrvPacket {
    /// The nested entries, or `None` when the packet is itself a reading.
    pub fn nested(&self) -> Option<Vec<RawHrvEntry>> {
        match &self.entries {
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// One day of activity totals.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawActivityEntry {
    #[serde(default, deserialize_with = "lenient::text")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub step: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub steps: Option<f64>,
    /// Kilometres.
    #[serde(default, deserialize_with = "lenient::number")]
    pub distance: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub calories: Option<f64>,
    #[serde(rename = "exerciseMinutes", default, deserialize_with = "lenient::number")]
    pub exercise_minutes: Option<f64>,
    #[serde(rename = "activeMinutes", default, deserialize_with = "lenient::number")]
    pub active_minutes: Option<f64>,
}

/// One page of activity history.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawActivityPacket {
    #[serde(rename = "arrayTotalActivityData", default, deserialize_with = "lenient::objects")]
    pub entries: Vec<RawActivityEntry>,
}

/// Reply of `getBatteryLevel`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBattery {
    #[serde(default, deserialize_with = "lenient::number")]
    pub battery: Option<f64>,
    #[serde(rename = "batteryLevel", default, deserialize_with = "lenient::number")]
    pub battery_level: Option<f64>,
}

/// Reply of `getFirmwareVersion`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFirmware {
    #[serde(default, deserialize_with = "lenient::text")]
    pub version: Option<String>,
    #[serde(rename = "hardwareVersion", default, deserialize_with = "lenient::text")]
    pub hardware_version: Option<String>,
}

/// Reply of `getDeviceTime`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDeviceTime {
    #[serde(default, deserialize_with = "lenient::text")]
    pub time: Option<String>,
}

/// Reply of `getMacAddress`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMac {
    #[serde(default, deserialize_with = "lenient::text")]
    pub mac: Option<String>,
}

/// Reply of `getStepGoal`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGoal {
    #[serde(default, deserialize_with = "lenient::number")]
    pub goal: Option<f64>,
}

/// Acknowledgement of a command that changes device state.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAck {
    #[serde(default, deserialize_with = "lenient::flag")]
    pub success: Option<bool>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub message: Option<String>,
}

/// A ring reported by scanning or by `getConnectedDevices`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDevice {
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub mac: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub rssi: Option<f64>,
}

/// Body of a push event. Each emitter fills a different subset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEventBody {
    #[serde(default, deserialize_with = "lenient::number")]
    pub heart_rate: Option<f64>,
    #[serde(default, rename = "singleHR", deserialize_with = "lenient::number")]
    pub single_hr: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub hr: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub steps: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub calories: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub distance: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub battery: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub spo2: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub timestamp: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub message: Option<String>,
}

impl RawEventBody {
    /// Heart rate from `heartRate`, `singleHR` or `hr`, first present wins.
    pub fn any_heart_rate(&self) -> Option<f64> {
        self.heart_rate.or(self.single_hr).or(self.hr)
    }

    /// Event time, or `now_ms` when missing or zero.
    pub fn timestamp_or(&self, now_ms: i64) -> i64 {
        positive_ms(self.timestamp).unwrap_or(now_ms)
    }
}
