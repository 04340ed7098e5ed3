//! Hour-bucketed response time series for the trailing 24 hours.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::Sample;

pub const HOUR_MS: i64 = 3_600_000;
pub const HOURS_PER_DAY: usize = 24;

/// Baseline for the synthetic series when nothing at all is known.
pub const DEFAULT_BASELINE_MS: u64 = 200;
/// Floor of the synthetic series.
const SYNTHETIC_FLOOR_MS: f64 = 100.0;

/// Mean response time for one hour slot. `None` is a gap, not zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HourlyPoint {
    pub hour_of_day: u32,
    pub response_time_ms: Option<u64>,
}

/// Whether a series was measured or generated as a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    Measured,
    Synthetic,
}

fn hour_key(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis().div_euclid(HOUR_MS)
}

/// First hour slot of the trailing window ending in the current hour.
fn first_slot(now: DateTime<Utc>) -> i64 {
    hour_key(now) - (HOURS_PER_DAY as i64 - 1)
}

fn hour_of_day(slot: i64) -> u32 {
    slot.rem_euclid(HOURS_PER_DAY as i64) as u32
}

/// Average the up samples of the last 24 hour slots, oldest slot first.
///
/// Returns `None` only when no sample at all falls in those slots. A day of
/// down samples is still measured: every slot is a gap.
pub fn compute_hourly_points(window: &[Sample], now: DateTime<Utc>) -> Option<Vec<HourlyPoint>> {
    let start = first_slot(now);
    let mut sums = [(0u64, 0u64); HOURS_PER_DAY];
    let mut observed = false;

    for sample in window.iter().filter(|s| s.time <= now) {
        let idx = hour_key(sample.time) - start;
        if !(0..HOURS_PER_DAY as i64).contains(&idx) {
            continue;
        }
        observed = true;
        if sample.status.is_up() {
            let slot = &mut sums[idx as usize];
            slot.0 += sample.response_time;
            slot.1 += 1;
        }
    }

    if !observed {
        return None;
    }

    Some(
        sums.iter()
            .enumerate()
            .map(|(i, &(sum, n))| HourlyPoint {
                hour_of_day: hour_of_day(start + i as i64),
                response_time_ms: (n > 0).then(|| (sum as f64 / n as f64).round() as u64),
            })
            .collect(),
    )
}

/// Placeholder series used only when there is nothing to measure.
///
/// Point `i` (0 = 23 hours ago, 23 = current hour) is
/// `max(100, baseline + 100 * sin(i / 4))`, rounded.
pub fn synthetic_series(baseline_ms: u64, now: DateTime<Utc>) -> Vec<HourlyPoint> {
    let start = first_slot(now);
    (0..HOURS_PER_DAY)
        .map(|i| {
            let value = baseline_ms as f64 + 100.0 * (i as f64 / 4.0).sin();
            HourlyPoint {
                hour_of_day: hour_of_day(start + i as i64),
                response_time_ms: Some(value.max(SYNTHETIC_FLOOR_MS).round() as u64),
            }
        })
        .collect()
}

/// Measured series when available, otherwise the synthetic fallback.
pub fn hourly_series(
    window: &[Sample],
    baseline_ms: Option<u64>,
    now: DateTime<Utc>,
) -> (Vec<HourlyPoint>, SeriesKind) {
    match compute_hourly_points(window, now) {
        Some(points) => (points, SeriesKind::Measured),
        None => (
            synthetic_series(baseline_ms.unwrap_or(DEFAULT_BASELINE_MS), now),
            SeriesKind::Synthetic,
        ),
    }
}

/// Mean of the non-gap points, rounded.
pub fn mean_response(points: &[HourlyPoint]) -> Option<u64> {
    let values: Vec<u64> = points.iter().filter_map(|p| p.response_time_ms).collect();
    if values.is_empty() {
        return None;
    }
    Some((values.iter().sum::<u64>() as f64 / values.len() as f64).round() as u64)
}
