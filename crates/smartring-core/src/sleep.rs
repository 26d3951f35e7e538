//! Sleep hypnogram reconstruction.
//!
//! The ring returns sleep history as pages of stage codes, each page with
//! its own start time and minutes-per-code unit. Pages arrive in arbitrary
//! order, may overlap (firmware duplicates pages) and may be separated by
//! gaps (naps, time off the finger). Reconstruction:
//!
//! 1. normalizes every page into a [`SleepRecord`], dropping pages without
//!    a usable start time;
//! 2. sorts records and greedily merges them into [`SleepBlock`]s, joining
//!    a record when it starts no more than [`MAX_GAP_MS`] after the block's
//!    current end;
//! 3. keeps the block with the latest end;
//! 4. paints a per-minute timeline of that block, later records (in sorted
//!    order) overwriting earlier ones where they overlap;
//! 5. walks the timeline once for per-stage totals and merged segments.
//!
//! Because step 4 follows sorted order, not arrival order, the result does
//! not depend on the order of the input pages.

use serde_json::Value;
use time::UtcOffset;
use tracing::debug;

use smartring_types::{
    SleepQuality, SleepScore, SleepScoreBreakdown, SleepSegment, SleepStage, SleepSummary,
    SleepTotals,
};

use crate::payload::{self, RawSleepPacket};

/// Largest gap between two records of the same block.
pub const MAX_GAP_MS: i64 = 60 * MINUTE_MS;

/// Longest span a single page may claim.
pub const MAX_RECORD_MINUTES: u32 = 24 * 60;

const MINUTE_MS: i64 = 60_000;

/// One normalized page of sleep history.
///
/// Field order defines the total order used for sorting, so equal starts
/// still sort deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SleepRecord {
    /// Start of the page (epoch ms).
    pub start_ms: i64,
    /// Span the page covers.
    pub duration_minutes: u32,
    /// Minutes represented by each stage code (at least 1).
    pub unit_minutes: u32,
    /// Stage per unit.
    pub stages: Vec<SleepStage>,
}

impl SleepRecord {
    /// Build a record from explicit parts.
    ///
    /// `duration_minutes` of `None` means "as long as the stage codes".
    pub fn new(
        start_ms: i64,
        unit_minutes: u32,
        stages: Vec<SleepStage>,
        duration_minutes: Option<u32>,
    ) -> Self {
        let unit_minutes = unit_minutes.max(1);
        let implied = u32::try_from(stages.len())
            .unwrap_or(u32::MAX)
            .saturating_mul(unit_minutes);
        let duration_minutes = duration_minutes
            .filter(|d| *d > 0)
            .unwrap_or(implied)
            .min(MAX_RECORD_MINUTES);
        Self {
            start_ms,
            duration_minutes,
            unit_minutes,
            stages,
        }
    }

    /// Normalize a raw page. Returns `None` when no start time resolves.
    pub fn from_packet(packet: &RawSleepPacket, offset: UtcOffset) -> Option<Self> {
        let start_ms = packet.start_ms(offset)?;
        let unit = packet
            .unit_length
            .filter(|u| *u >= 1.0)
            .map(|u| u.min(f64::from(MAX_RECORD_MINUTES)) as u32)
            .unwrap_or(1);
        let stages = packet.stage_codes.iter().map(|c| stage_from_code(*c)).collect();
        let duration = packet
            .total_sleep_time
            .filter(|d| *d > 0.0)
            .map(|d| d.min(f64::from(MAX_RECORD_MINUTES)).round() as u32);
        Some(Self::new(start_ms, unit, stages, duration))
    }

    /// End of the page (epoch ms, exclusive).
    pub fn end_ms(&self) -> i64 {
        self.start_ms
            .saturating_add(i64::from(self.duration_minutes) * MINUTE_MS)
    }
}

fn stage_from_code(code: f64) -> SleepStage {
    if code.fract() == 0.0 {
        SleepStage::from_device_code(code as i64)
    } else {
        SleepStage::Awake
    }
}

/// A maximal run of records separated by at most [`MAX_GAP_MS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SleepBlock {
    pub start_ms: i64,
    pub end_ms: i64,
    /// Member records in sorted order.
    pub records: Vec<SleepRecord>,
}

impl SleepBlock {
    fn open(record: SleepRecord) -> Self {
        Self {
            start_ms: record.start_ms,
            end_ms: record.end_ms(),
            records: vec![record],
        }
    }

    /// Length of the block's per-minute timeline.
    pub fn total_minutes(&self) -> u32 {
        let span = (self.end_ms - self.start_ms).max(0);
        u32::try_from(round_div(span, MINUTE_MS)).unwrap_or(u32::MAX)
    }

    /// Paint the per-minute stage timeline of this block.
    ///
    /// Minutes no record covers stay [`SleepStage::Awake`]. Where records
    /// overlap, the later record in sorted order wins.
    pub fn timeline(&self) -> Vec<SleepStage> {
        let len = self.total_minutes() as usize;
        let mut timeline = vec![SleepStage::Awake; len];
        for record in &self.records {
            let offset = round_div(record.start_ms - self.start_ms, MINUTE_MS);
            let unit = i64::from(record.unit_minutes);
            for (index, stage) in record.stages.iter().enumerate() {
                let first = offset + index as i64 * unit;
                for slot in first..first + unit {
                    if let Ok(slot) = usize::try_from(slot) {
                        if let Some(minute) = timeline.get_mut(slot) {
                            *minute = *stage;
                        }
                    }
                }
            }
        }
        timeline
    }
}

/// `numerator / denominator` rounded half up; `denominator` must be > 0.
fn round_div(numerator: i64, denominator: i64) -> i64 {
    (2 * numerator + denominator).div_euclid(2 * denominator)
}

/// Normalize every page that has a usable start time.
pub fn normalize_packets(packets: &[RawSleepPacket], offset: UtcOffset) -> Vec<SleepRecord> {
    packets
        .iter()
        .filter_map(|p| SleepRecord::from_packet(p, offset))
        .collect()
}

/// Sort records and merge them into blocks.
pub fn build_blocks(mut records: Vec<SleepRecord>) -> Vec<SleepBlock> {
    records.sort();
    let mut blocks: Vec<SleepBlock> = Vec::new();
    for record in records {
        match blocks.last_mut() {
            Some(block) if record.start_ms - block.end_ms <= MAX_GAP_MS => {
                block.end_ms = block.end_ms.max(record.end_ms());
                block.records.push(record);
            }
            _ => blocks.push(SleepBlock::open(record)),
        }
    }
    blocks
}

/// The block with the latest end; the earlier block wins a tie.
pub fn select_current(blocks: &[SleepBlock]) -> Option<&SleepBlock> {
    blocks
        .iter()
        .reduce(|best, block| if block.end_ms > best.end_ms { block } else { best })
}

/// Totals, segments and score of one block.
pub fn summarize(block: &SleepBlock, block_count: usize) -> SleepSummary {
    let timeline = block.timeline();
    let mut totals = SleepTotals::default();
    let mut segments: Vec<SleepSegment> = Vec::new();

    for (minute, stage) in timeline.iter().enumerate() {
        totals.add_minute(*stage);
        let start_ms = block.start_ms + minute as i64 * MINUTE_MS;
        let end_ms = start_ms + MINUTE_MS;
        match segments.last_mut() {
            Some(last) if last.stage == *stage => last.end_ms = end_ms,
            _ => segments.push(SleepSegment {
                stage: *stage,
                start_ms,
                end_ms,
            }),
        }
    }

    let total_minutes = timeline.len() as u32;
    SleepSummary {
        start_ms: block.start_ms,
        end_ms: block.end_ms,
        total_minutes,
        score: light_deep_score(&totals, total_minutes),
        totals,
        segments,
        block_count,
    }
}

/// Share of light and deep minutes, 0-100.
fn light_deep_score(totals: &SleepTotals, total_minutes: u32) -> u8 {
    if total_minutes == 0 {
        return 0;
    }
    let restful = i64::from(totals.deep + totals.light);
    round_div(100 * restful, i64::from(total_minutes)).clamp(0, 100) as u8
}

/// Reconstruct the current sleep block from normalized records.
///
/// Returns `None` when there are no records.
pub fn reconstruct(records: Vec<SleepRecord>) -> Option<SleepSummary> {
    let blocks = build_blocks(records);
    let current = select_current(&blocks)?;
    let summary = summarize(current, blocks.len());
    debug!(
        blocks = blocks.len(),
        minutes = summary.total_minutes,
        deep = summary.totals.deep,
        light = summary.totals.light,
        rem = summary.totals.rem,
        awake = summary.totals.awake,
        score = summary.score,
        "Reconstructed sleep block"
    );
    Some(summary)
}

/// Reconstruct straight from a `getSleepData` reply.
pub fn reconstruct_payload(payload: Value, offset: UtcOffset) -> Option<SleepSummary> {
    let packets: Vec<RawSleepPacket> = payload::records(payload);
    reconstruct(normalize_packets(&packets, offset))
}

/// Composite 0-100 sleep score of a night.
///
/// Duration (35 points, 7-9 h ideal), deep share (25, 15-25 % ideal),
/// little time awake (25) and REM share (15, 20-25 % ideal). Shares are
/// relative to time asleep.
pub fn evaluate_quality(summary: &SleepSummary) -> SleepScore {
    let totals = &summary.totals;
    let asleep = totals.asleep();
    let percent = |minutes: u32| -> f64 {
        if asleep == 0 {
            0.0
        } else {
            f64::from(minutes) / f64::from(asleep) * 100.0
        }
    };

    let duration = match asleep {
        420..=540 => 35,
        360..=419 | 541..=600 => 25,
        300..=359 | 601.. => 15,
        _ => 5,
    };

    let deep_pct = percent(totals.deep);
    let deep_sleep = if (15.0..=25.0).contains(&deep_pct) {
        25
    } else if (10.0..15.0).contains(&deep_pct) || (deep_pct > 25.0 && deep_pct <= 30.0) {
        18
    } else if (5.0..10.0).contains(&deep_pct) {
        10
    } else {
        5
    };

    let efficiency = if asleep == 0 {
        5
    } else {
        match percent(totals.awake) {
            p if p <= 5.0 => 25,
            p if p <= 10.0 => 20,
            p if p <= 15.0 => 15,
            p if p <= 20.0 => 10,
            _ => 5,
        }
    };

    let rem_pct = percent(totals.rem);
    let consistency = if (20.0..=25.0).contains(&rem_pct) {
        15
    } else if (15.0..20.0).contains(&rem_pct) || (rem_pct > 25.0 && rem_pct <= 30.0) {
        12
    } else if rem_pct >= 10.0 {
        8
    } else {
        5
    };

    let breakdown = SleepScoreBreakdown {
        duration,
        deep_sleep,
        efficiency,
        consistency,
    };
    let score = duration + deep_sleep + efficiency + consistency;
    SleepScore {
        score,
        quality: SleepQuality::from_score(score),
        breakdown,
    }
}
