//! Device status and daily activity normalization.

use serde_json::Value;
use time::UtcOffset;

use smartring_types::{Battery, DeviceInfo, FirmwareInfo, Steps};

use crate::payload::{
    self, RawActivityEntry, RawActivityPacket, RawBattery, RawDevice, RawDeviceTime, RawFirmware,
    RawGoal, RawMac,
};
use crate::timecodec::{format_x3_date, parse_x3_datetime};

const UNKNOWN_VERSION: &str = "Unknown";

/// Battery level from `battery` or `batteryLevel`, clamped to 0-100.
pub fn battery(payload: Value) -> Battery {
    let raw: RawBattery = payload::object(payload);
    let level = raw
        .battery
        .or(raw.battery_level)
        .unwrap_or(0.0)
        .round()
        .clamp(0.0, 100.0) as u8;
    Battery { level }
}

/// Firmware version; the ring reports a single version string.
pub fn firmware(payload: Value) -> FirmwareInfo {
    let raw: RawFirmware = payload::object(payload);
    let software = raw.version.unwrap_or_else(|| UNKNOWN_VERSION.to_string());
    let hardware = raw.hardware_version.unwrap_or_else(|| software.clone());
    FirmwareInfo { hardware, software }
}

/// The ring clock as epoch ms, if it reports a parseable time.
pub fn device_time(payload: Value, offset: UtcOffset) -> Option<i64> {
    let raw: RawDeviceTime = payload::object(payload);
    raw.time.and_then(|t| parse_x3_datetime(&t, offset))
}

/// MAC address, if reported.
pub fn mac_address(payload: Value) -> Option<String> {
    let raw: RawMac = payload::object(payload);
    raw.mac
}

/// Daily step goal; 0 when absent.
pub fn step_goal(payload: Value) -> u32 {
    let raw: RawGoal = payload::object(payload);
    raw.goal
        .filter(|g| *g > 0.0)
        .map(|g| g.round().min(f64::from(u32::MAX)) as u32)
        .unwrap_or(0)
}

fn to_steps(entry: &RawActivityEntry) -> Steps {
    let non_negative = |v: Option<f64>| v.unwrap_or(0.0).max(0.0);
    Steps {
        steps: non_negative(entry.step.or(entry.steps)).round() as u32,
        distance_m: non_negative(entry.distance) * 1000.0,
        calories: non_negative(entry.calories),
        active_seconds: (non_negative(entry.exercise_minutes.or(entry.active_minutes)) * 60.0)
            .round() as u32,
    }
}

/// Activity totals for the day containing `now_ms`.
///
/// Entries from every page are considered; the entry dated today wins,
/// otherwise the first entry. All zeros when there are no entries.
pub fn steps(packets: &[RawActivityPacket], offset: UtcOffset, now_ms: i64) -> Steps {
    let entries: Vec<&RawActivityEntry> = packets.iter().flat_map(|p| &p.entries).collect();
    let today = format_x3_date(now_ms, offset);
    let chosen = entries
        .iter()
        .find(|e| e.date.is_some() && e.date == today)
        .or_else(|| entries.first());
    chosen.map(|e| to_steps(e)).unwrap_or_default()
}

/// Normalize a `getStepsData` reply.
pub fn steps_payload(payload: Value, offset: UtcOffset, now_ms: i64) -> Steps {
    let packets: Vec<RawActivityPacket> = payload::records(payload);
    steps(&packets, offset, now_ms)
}

/// Rings listed by `getConnectedDevices` or a discovery event.
pub fn devices(payload: Value) -> Vec<DeviceInfo> {
    let raw: Vec<RawDevice> = match payload {
        Value::Object(_) => {
            let single: RawDevice = payload::object(payload.clone());
            if single.id.is_some() {
                vec![single]
            } else {
                payload::records(payload)
            }
        }
        other => payload::records(other),
    };
    raw.into_iter().filter_map(device).collect()
}

/// One device record; records without an id are skipped.
pub fn device(raw: RawDevice) -> Option<DeviceInfo> {
    Some(DeviceInfo {
        id: raw.id?,
        name: raw.name,
        mac: raw.mac,
        rssi: raw
            .rssi
            .map(|r| r.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(text: &str) -> i64 {
        parse_x3_datetime(text, UtcOffset::UTC).unwrap()
    }

    #[test]
    fn test_battery_variants() {
        assert_eq!(battery(json!({"battery": 80})).level, 80);
        assert_eq!(battery(json!({"batteryLevel": "55"})).level, 55);
        assert_eq!(battery(json!({"battery": 140})).level, 100);
        assert_eq!(battery(json!({"battery": -3})).level, 0);
        assert_eq!(battery(json!({})).level, 0);
    }

    #[test]
    fn test_firmware() {
        let info = firmware(json!({"version": "X3_V1.25"}));
        assert_eq!(info.software, "X3_V1.25");
        assert_eq!(info.hardware, "X3_V1.25");
        let info = firmware(json!({}));
        assert_eq!(info.software, "Unknown");
        assert_eq!(info.hardware, "Unknown");
    }

    #[test]
    fn test_scalar_replies() {
        assert_eq!(
            device_time(json!({"time": "2024.01.01 12:00:00"}), UtcOffset::UTC),
            Some(at("2024.01.01 12:00:00"))
        );
        assert_eq!(device_time(json!({"time": ""}), UtcOffset::UTC), None);
        assert_eq!(
            mac_address(json!({"mac": "AA:BB:CC:DD:EE:FF"})).as_deref(),
            Some("AA:BB:CC:DD:EE:FF")
        );
        assert_eq!(step_goal(json!({"goal": 8000})), 8000);
        assert_eq!(step_goal(json!({"goal": "abc"})), 0);
    }

    #[test]
    fn test_steps_picks_today() {
        let now = at("2024.03.05 15:00:00");
        let payload = json!({"data": [
            {"arrayTotalActivityData": [
                {"date": "2024.03.04", "step": 9000, "distance": 6.1, "calories": 300, "exerciseMinutes": 40}
            ]},
            {"arrayTotalActivityData": [
                {"date": "2024.03.05", "steps": 4200, "distance": 2.5, "calories": 150, "activeMinutes": 20}
            ]}
        ]});
        let steps = steps_payload(payload, UtcOffset::UTC, now);
        assert_eq!(steps.steps, 4200);
        assert!((steps.distance_m - 2500.0).abs() < 1e-6);
        assert_eq!(steps.calories, 150.0);
        assert_eq!(steps.active_seconds, 1200);
    }

    #[test]
    fn test_steps_falls_back_to_first_entry() {
        let now = at("2024.03.10 15:00:00");
        let payload = json!({"data": [{"arrayTotalActivityData": [
            {"date": "2024.03.04", "step": 9000},
            {"date": "2024.03.05", "step": 100}
        ]}]});
        assert_eq!(steps_payload(payload, UtcOffset::UTC, now).steps, 9000);
    }

    #[test]
    fn test_steps_empty_is_zero() {
        let steps = steps_payload(json!({"data": [{}]}), UtcOffset::UTC, 0);
        assert_eq!(steps, Steps::default());
    }

    #[test]
    fn test_devices() {
        let list = devices(json!([
            {"id": "peripheral-1", "name": "X3", "rssi": -61},
            {"name": "no id"}
        ]));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].rssi, Some(-61));

        let single = devices(json!({"id": "peripheral-2", "mac": "AA:BB"}));
        assert_eq!(single[0].mac.as_deref(), Some("AA:BB"));
    }
}
