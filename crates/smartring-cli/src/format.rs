//! Output formatting for text and JSON.

use std::fmt::Write as _;

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;
use smartring_core::QueueMetricsSnapshot;
use smartring_core::timecodec::format_x3_datetime;
use smartring_types::{
    BloodPressureSample, HeartRateSample, HeartRateSummary, HourlyHeartRate, HrvSample,
    SleepScore, SleepStage, SleepSummary, Steps, VitalSample, format_minutes,
};
use time::UtcOffset;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Serialize as pretty JSON.
pub fn json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn timestamp(ms: i64, offset: UtcOffset) -> String {
    format_x3_datetime(ms, offset).unwrap_or_else(|| ms.to_string())
}

pub fn sleep(summary: &SleepSummary, quality: &SleepScore, offset: UtcOffset) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Sleep {} -> {} ({})",
        timestamp(summary.start_ms, offset),
        timestamp(summary.end_ms, offset),
        format_minutes(summary.total_minutes)
    );
    for stage in [
        SleepStage::Deep,
        SleepStage::Light,
        SleepStage::Rem,
        SleepStage::Awake,
    ] {
        let _ = writeln!(
            out,
            "  {:<6} {:>7}",
            stage.as_str(),
            format_minutes(summary.totals.minutes(stage))
        );
    }
    let _ = writeln!(out, "  Asleep {:>7}", summary.time_asleep());
    let _ = writeln!(out, "Score:   {}", summary.score);
    let _ = writeln!(
        out,
        "Quality: {} ({}/100: duration {}, deep {}, efficiency {}, consistency {})",
        quality.quality,
        quality.score,
        quality.breakdown.duration,
        quality.breakdown.deep_sleep,
        quality.breakdown.efficiency,
        quality.breakdown.consistency
    );
    let _ = writeln!(out, "Blocks:  {}", summary.block_count);
    let _ = writeln!(out, "Segments:");
    for segment in &summary.segments {
        let _ = writeln!(
            out,
            "  {} {:<6} {}",
            timestamp(segment.start_ms, offset),
            segment.stage.as_str(),
            format_minutes(segment.duration_minutes())
        );
    }
    out
}

pub fn heart_rate(
    samples: &[HeartRateSample],
    hourly: &HourlyHeartRate,
    summary: &HeartRateSummary,
) -> String {
    let mut out = String::new();
    if samples.is_empty() {
        out.push_str("No heart-rate samples\n");
        return out;
    }
    let _ = writeln!(
        out,
        "Samples:     {}\nBaseline:    {:.1} bpm\nRange:       {}-{} bpm\nVariability: {:.1}",
        summary.count, summary.baseline, summary.min, summary.max, summary.variability
    );
    let _ = writeln!(out, "Hourly:");
    for hour in hourly.iter() {
        if let Some(range) = hour.range {
            let _ = writeln!(out, "  {:02}:00  {:>3}-{:<3}", hour.hour, range.min, range.max);
        }
    }
    out
}

pub fn vitals(title: &str, unit: &str, samples: &[VitalSample], offset: UtcOffset) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({} readings)", title, samples.len());
    for sample in samples {
        let _ = writeln!(
            out,
            "  {}  {:.1}{}",
            timestamp(sample.timestamp_ms, offset),
            sample.value,
            unit
        );
    }
    out
}

pub fn hrv(samples: &[HrvSample], offset: UtcOffset) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "HRV ({} readings)", samples.len());
    for sample in samples {
        let _ = writeln!(
            out,
            "  {}  SDNN {:.0} ms  HR {:.0}  stress {:.0}",
            timestamp(sample.timestamp_ms, offset),
            sample.sdnn,
            sample.heart_rate,
            sample.stress
        );
    }
    out
}

pub fn blood_pressure(samples: &[BloodPressureSample], offset: UtcOffset) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Blood pressure ({} readings)", samples.len());
    for sample in samples {
        let _ = writeln!(
            out,
            "  {}  {:.0}/{:.0} mmHg  HR {:.0}",
            timestamp(sample.timestamp_ms, offset),
            sample.systolic,
            sample.diastolic,
            sample.heart_rate
        );
    }
    out
}

pub fn steps(steps: &Steps) -> String {
    format!(
        "Steps:    {}\nDistance: {:.2} km\nCalories: {:.0} kcal\nActive:   {}\n",
        steps.steps,
        steps.distance_m / 1000.0,
        steps.calories,
        format_minutes(steps.active_seconds / 60)
    )
}

pub fn metrics(snapshot: &QueueMetricsSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Queue: {} calls, {:.0}% failed, {} busy retries, {} timeouts, {} cancels ({} failed)",
        snapshot.total_calls(),
        snapshot.failure_rate() * 100.0,
        snapshot.busy_retries,
        snapshot.timeouts,
        snapshot.cancels_issued,
        snapshot.cancel_failures
    );
    for (name, op) in &snapshot.operations {
        let _ = writeln!(
            out,
            "  {:<22} {:>3} ok {:>3} failed  avg {:.0} ms",
            name,
            op.success_count,
            op.failure_count,
            op.avg_duration_ms.unwrap_or(0.0)
        );
    }
    out
}
