//! Subcommand implementations.
//!
//! Each command renders to a `String`; `main` decides where it goes.

use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use serde_json::Value;
use smartring_core::timecodec::now_ms;
use smartring_core::{
    MockBridge, QueueMetricsSnapshot, RingClient, RingConfig, activity, heart_rate, sleep, vitals,
};
use smartring_types::{
    Battery, FirmwareInfo, HeartRateSample, HeartRateSummary, HourlyHeartRate, SleepScore,
    SleepSummary, Steps,
};
use time::UtcOffset;
use tracing::info;

use crate::format::{self, OutputFormat};

/// Peripheral id of the simulated ring.
const DEMO_RING_ID: &str = "ring-0001";

/// Vital sign selector for `vitals`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VitalKind {
    Spo2,
    Temperature,
    Hrv,
    Bp,
}

/// Read a captured bridge reply. `-` reads stdin.
pub fn read_payload(path: &Path) -> Result<Value> {
    let content = if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read payload from stdin")?;
        buf
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("Failed to read payload: {}", path.display()))?
    };
    serde_json::from_str(&content)
        .with_context(|| format!("Payload is not valid JSON: {}", path.display()))
}

#[derive(Serialize)]
struct SleepReport<'a> {
    summary: Option<&'a SleepSummary>,
    quality: Option<SleepScore>,
}

pub fn sleep(payload: Value, offset: UtcOffset, output: OutputFormat) -> Result<String> {
    let summary = sleep::reconstruct_payload(payload, offset);
    let quality = summary.as_ref().map(sleep::evaluate_quality);
    match output {
        OutputFormat::Json => format::json(&SleepReport {
            summary: summary.as_ref(),
            quality,
        }),
        OutputFormat::Text => Ok(match (&summary, &quality) {
            (Some(summary), Some(quality)) => format::sleep(summary, quality, offset),
            _ => "No sleep data\n".to_string(),
        }),
    }
}

#[derive(Serialize)]
struct HeartRateReport<'a> {
    samples: &'a [HeartRateSample],
    hourly: &'a HourlyHeartRate,
    summary: &'a HeartRateSummary,
}

pub fn heart_rate(payload: Value, offset: UtcOffset, output: OutputFormat) -> Result<String> {
    let traces = heart_rate::normalize_payload(payload, offset, now_ms());
    let samples = heart_rate::samples(&traces);
    let hourly = heart_rate::hourly_ranges(&traces, offset);
    let summary = heart_rate::summarize(&samples);
    match output {
        OutputFormat::Json => format::json(&HeartRateReport {
            samples: &samples,
            hourly: &hourly,
            summary: &summary,
        }),
        OutputFormat::Text => Ok(format::heart_rate(&samples, &hourly, &summary)),
    }
}

pub fn vitals(
    kind: VitalKind,
    payload: Value,
    offset: UtcOffset,
    output: OutputFormat,
) -> Result<String> {
    let received = now_ms();
    match kind {
        VitalKind::Spo2 => {
            let samples = vitals::spo2_payload(payload, offset, received);
            match output {
                OutputFormat::Json => format::json(&samples),
                OutputFormat::Text => Ok(format::vitals("SpO2", "%", &samples, offset)),
            }
        }
        VitalKind::Temperature => {
            let samples = vitals::temperature_payload(payload, offset, received);
            match output {
                OutputFormat::Json => format::json(&samples),
                OutputFormat::Text => Ok(format::vitals("Temperature", " °C", &samples, offset)),
            }
        }
        VitalKind::Hrv => {
            let samples = vitals::hrv_payload(payload, offset, received);
            match output {
                OutputFormat::Json => format::json(&samples),
                OutputFormat::Text => Ok(format::hrv(&samples, offset)),
            }
        }
        VitalKind::Bp => {
            let samples = vitals::blood_pressure_payload(payload, offset, received);
            match output {
                OutputFormat::Json => format::json(&samples),
                OutputFormat::Text => Ok(format::blood_pressure(&samples, offset)),
            }
        }
    }
}

pub fn steps(payload: Value, offset: UtcOffset, output: OutputFormat) -> Result<String> {
    let steps = activity::steps_payload(payload, offset, now_ms());
    match output {
        OutputFormat::Json => format::json(&steps),
        OutputFormat::Text => Ok(format::steps(&steps)),
    }
}

#[derive(Serialize)]
struct DemoReport {
    battery: Battery,
    firmware: FirmwareInfo,
    steps: Steps,
    sleep: Option<SleepSummary>,
    sleep_quality: Option<SleepScore>,
    heart_rate: HeartRateSummary,
    metrics: QueueMetricsSnapshot,
}

/// Drive the full client against a simulated ring.
pub async fn demo(config: RingConfig, output: OutputFormat) -> Result<String> {
    let offset = config.utc_offset();
    let bridge = Arc::new(MockBridge::with_sample_data());
    let client = RingClient::new(bridge, config).context("Failed to start ring client")?;

    info!("Connecting to simulated ring {}", DEMO_RING_ID);
    client.initialize().await?;
    client.connect(DEMO_RING_ID).await?;
    client.sync_time().await?;

    let battery = client.battery().await?;
    let firmware = client.firmware().await?;
    let steps = client.steps().await?;
    let night = client.sleep().await?;
    let sleep_quality = night.as_ref().map(sleep::evaluate_quality);
    let samples = client.heart_rate_samples().await?;
    let hourly = client.hourly_heart_rate().await?;
    let heart_rate = heart_rate::summarize(&samples);
    let metrics = client.metrics().snapshot();
    client.shutdown().await;

    match output {
        OutputFormat::Json => format::json(&DemoReport {
            battery,
            firmware,
            steps,
            sleep: night,
            sleep_quality,
            heart_rate,
            metrics,
        }),
        OutputFormat::Text => {
            let mut out = format!(
                "Ring {} (firmware {}), battery {}%\n\n",
                DEMO_RING_ID, firmware.software, battery.level
            );
            out.push_str(&format::steps(&steps));
            out.push('\n');
            match (&night, &sleep_quality) {
                (Some(night), Some(quality)) => {
                    out.push_str(&format::sleep(night, quality, offset));
                }
                _ => out.push_str("No sleep data\n"),
            }
            out.push('\n');
            out.push_str(&format::heart_rate(&samples, &hourly, &heart_rate));
            out.push('\n');
            out.push_str(&format::metrics(&metrics));
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sleep_payload() -> Value {
        json!({"data": [
            {"startTime_SleepData": "2024.01.02 00:15:00", "sleepUnitLength": 5, "arraySleepQuality": [2, 3]},
            {"startTime_SleepData": "2024.01.01 23:00:00", "sleepUnitLength": 5, "arraySleepQuality": [1, 1, 2]}
        ]})
    }

    #[test]
    fn test_sleep_json_report() {
        let out = sleep(sleep_payload(), UtcOffset::UTC, OutputFormat::Json).unwrap();
        let report: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(report["summary"]["total_minutes"], 85);
        assert_eq!(report["summary"]["score"], 24);
        assert!(report["quality"]["score"].is_number());
    }

    #[test]
    fn test_sleep_without_data() {
        let out = sleep(json!({"data": []}), UtcOffset::UTC, OutputFormat::Text).unwrap();
        assert_eq!(out, "No sleep data\n");
        let out = sleep(json!({}), UtcOffset::UTC, OutputFormat::Json).unwrap();
        let report: Value = serde_json::from_str(&out).unwrap();
        assert!(report["summary"].is_null());
    }

    #[test]
    fn test_temperature_filters_out_of_range() {
        let payload = json!({"data": [{"arrayemperatureData": [
            {"temperature": 50.0}, {"temperature": 36.5}
        ]}]});
        let out = vitals(
            VitalKind::Temperature,
            payload,
            UtcOffset::UTC,
            OutputFormat::Json,
        )
        .unwrap();
        let samples: Vec<Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0]["value"], 36.5);
    }

    #[test]
    fn test_read_payload_errors_are_contextual() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "not json").unwrap();
        let err = read_payload(&path).unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[tokio::test]
    async fn test_demo_json() {
        let config = RingConfig {
            utc_offset_minutes: Some(0),
            ..Default::default()
        };
        let out = demo(config, OutputFormat::Json).await.unwrap();
        let report: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(report["battery"]["level"], 82);
        assert_eq!(report["sleep"]["total_minutes"], 85);
        assert!(report["metrics"]["operations"]["getSleepData"].is_object());
    }
}
