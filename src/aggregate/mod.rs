//! Aggregation of sample windows into per-service snapshots.
//!
//! Everything here is a pure function of the window, the upstream report and
//! `now`, so repeated passes over identical input give identical snapshots.

mod classify;
mod days;
mod hours;

pub use classify::*;
pub use days::*;
pub use hours::*;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{Sample, ServiceId, ServiceInfo, Status};
use crate::source::Observation;

/// Everything the presenter needs for one service card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatusSnapshot {
    pub service_id: ServiceId,
    pub display_name: String,
    pub icon: Option<String>,
    /// `None` when neither the source nor the history knows the state.
    pub status: Option<Status>,
    pub uptime_percent: f64,
    pub current_response_time_ms: Option<u64>,
    pub avg_response_time_ms: Option<u64>,
    pub day_buckets: Vec<DayBucket>,
    pub hourly_points: Vec<HourlyPoint>,
    pub series: SeriesKind,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Share of up samples as a percentage with two decimals.
///
/// An empty window is 100: missing data is not evidence of failure.
pub fn compute_uptime_percent(window: &[Sample]) -> f64 {
    if window.is_empty() {
        return 100.0;
    }
    let up = window.iter().filter(|s| s.status.is_up()).count();
    round2(100.0 * up as f64 / window.len() as f64)
}

/// Build the snapshot for one service from its latest observation and its
/// history window.
pub fn aggregate_service(
    observation: &Observation,
    window: &[Sample],
    uptime_days: u32,
    now: DateTime<Utc>,
) -> ServiceStatusSnapshot {
    let ServiceInfo {
        id,
        display_name,
        icon,
    } = observation.service.clone();
    let latest = window.last();

    let status = observation.status.or(latest.map(|s| s.status));
    let current_response_time_ms = observation
        .response_time_ms
        .or(latest.map(|s| s.response_time));

    let uptime_percent = match observation.uptime_percent {
        Some(reported) if reported.is_finite() => round2(reported.clamp(0.0, 100.0)),
        _ => compute_uptime_percent(window),
    };

    let day_buckets = compute_day_buckets(
        window,
        observation.daily_minutes_down.as_deref(),
        uptime_days,
        now,
    );
    let (hourly_points, series) = hourly_series(window, current_response_time_ms, now);
    let avg_response_time_ms = match series {
        SeriesKind::Measured => mean_response(&hourly_points),
        SeriesKind::Synthetic => None,
    };

    ServiceStatusSnapshot {
        service_id: id,
        display_name,
        icon,
        status,
        uptime_percent,
        current_response_time_ms,
        avg_response_time_ms,
        day_buckets,
        hourly_points,
        series,
    }
}
