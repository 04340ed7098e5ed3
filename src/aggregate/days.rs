//! Day-bucketed uptime history for the uptime bar.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;

use super::classify::{classify_minutes_down, classify_up_ratio, Severity};
use crate::db::Sample;

pub const DAY_MS: i64 = 86_400_000;

/// What a day bucket was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DayMeasure {
    MinutesDown(f64),
    UpRatio(f64),
    NoData,
}

/// One cell of the uptime bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayBucket {
    /// Days before today; 0 is today.
    pub day_offset: u32,
    pub day: NaiveDate,
    pub measure: DayMeasure,
    pub severity: Severity,
}

/// UTC day number of a timestamp.
pub fn day_key(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis().div_euclid(DAY_MS)
}

/// Build exactly `uptime_days` buckets ending today, oldest first.
///
/// An upstream per-day downtime array (index 0 = today) takes priority over
/// the sample window. It is padded with no-data days when short and truncated
/// when long.
pub fn compute_day_buckets(
    window: &[Sample],
    daily_minutes_down: Option<&[f64]>,
    uptime_days: u32,
    now: DateTime<Utc>,
) -> Vec<DayBucket> {
    let measures: Vec<DayMeasure> = match daily_minutes_down {
        Some(minutes) if !minutes.is_empty() => from_minutes(minutes, uptime_days),
        _ => from_samples(window, uptime_days, now),
    };

    let today = now.date_naive();
    (0..uptime_days)
        .rev()
        .map(|offset| {
            let measure = measures[offset as usize];
            DayBucket {
                day_offset: offset,
                day: today - ChronoDuration::days(offset as i64),
                measure,
                severity: severity_of(measure),
            }
        })
        .collect()
}

fn severity_of(measure: DayMeasure) -> Severity {
    match measure {
        DayMeasure::MinutesDown(m) => classify_minutes_down(m),
        DayMeasure::UpRatio(r) => classify_up_ratio(r),
        DayMeasure::NoData => Severity::NoData,
    }
}

/// Measures indexed by day offset.
fn from_minutes(minutes: &[f64], uptime_days: u32) -> Vec<DayMeasure> {
    (0..uptime_days as usize)
        .map(|offset| match minutes.get(offset) {
            Some(m) if m.is_nan() => DayMeasure::NoData,
            Some(m) => DayMeasure::MinutesDown(m.max(0.0)),
            None => DayMeasure::NoData,
        })
        .collect()
}

/// Measures indexed by day offset.
fn from_samples(window: &[Sample], uptime_days: u32, now: DateTime<Utc>) -> Vec<DayMeasure> {
    let mut per_day: HashMap<i64, (u32, u32)> = HashMap::new();
    for sample in window {
        let entry = per_day.entry(day_key(sample.time)).or_insert((0, 0));
        if sample.status.is_up() {
            entry.0 += 1;
        }
        entry.1 += 1;
    }

    let today = day_key(now);
    (0..uptime_days as i64)
        .map(|offset| match per_day.get(&(today - offset)) {
            Some(&(up, total)) if total > 0 => DayMeasure::UpRatio(up as f64 / total as f64),
            _ => DayMeasure::NoData,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 18, 0, 0).unwrap()
    }

    fn severities(buckets: &[DayBucket]) -> Vec<Severity> {
        buckets.iter().map(|b| b.severity).collect()
    }

    #[test]
    fn test_minutes_scenario_newest_first_input() {
        let mut minutes = vec![0.0, 15.0, 45.0, 0.0];
        minutes.resize(90, 0.0);

        let buckets = compute_day_buckets(&[], Some(&minutes), 90, now());
        assert_eq!(buckets.len(), 90);

        // Output is oldest first, so today is last.
        let newest_first: Vec<Severity> = severities(&buckets).into_iter().rev().take(4).collect();
        assert_eq!(
            newest_first,
            vec![
                Severity::Operational,
                Severity::Degraded,
                Severity::Outage,
                Severity::Operational
            ]
        );
        assert_eq!(buckets[89].day_offset, 0);
        assert_eq!(buckets[89].day, NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());
        assert_eq!(buckets[0].day_offset, 89);
    }

    #[test]
    fn test_minutes_boundaries() {
        let buckets = compute_day_buckets(&[], Some(&[0.0, 29.0, 30.0]), 3, now());
        assert_eq!(
            severities(&buckets),
            vec![Severity::Outage, Severity::Degraded, Severity::Operational]
        );
    }

    #[test]
    fn test_short_array_pads_with_no_data() {
        let buckets = compute_day_buckets(&[], Some(&[5.0, 0.0]), 5, now());
        assert_eq!(buckets.len(), 5);
        assert_eq!(
            severities(&buckets),
            vec![
                Severity::NoData,
                Severity::NoData,
                Severity::NoData,
                Severity::Operational,
                Severity::Degraded
            ]
        );
    }

    #[test]
    fn test_long_array_truncates() {
        let minutes = vec![60.0; 200];
        let buckets = compute_day_buckets(&[], Some(&minutes), 90, now());
        assert_eq!(buckets.len(), 90);
        assert!(buckets.iter().all(|b| b.severity == Severity::Outage));
    }

    #[test]
    fn test_negative_minutes_clamp() {
        let buckets = compute_day_buckets(&[], Some(&[-3.0]), 1, now());
        assert_eq!(buckets[0].measure, DayMeasure::MinutesDown(0.0));
        assert_eq!(buckets[0].severity, Severity::Operational);
    }

    #[test]
    fn test_reconstructed_from_samples() {
        let today = now();
        let yesterday = today - ChronoDuration::days(1);
        let mut window = Vec::new();
        // Yesterday: 9 up of 10 -> 0.9, degraded.
        for i in 0..10 {
            let t = yesterday - ChronoDuration::minutes(i);
            window.push(if i == 0 { Sample::down(t, 0) } else { Sample::up(t, 100) });
        }
        // Today: all up.
        window.push(Sample::up(today - ChronoDuration::minutes(5), 100));
        window.sort_by_key(|s| s.time);

        let buckets = compute_day_buckets(&window, None, 4, today);
        assert_eq!(
            severities(&buckets),
            vec![
                Severity::NoData,
                Severity::NoData,
                Severity::Degraded,
                Severity::Operational
            ]
        );
        assert_eq!(buckets[2].measure, DayMeasure::UpRatio(0.9));
    }

    #[test]
    fn test_empty_window_is_all_no_data() {
        let buckets = compute_day_buckets(&[], None, 90, now());
        assert_eq!(buckets.len(), 90);
        assert!(buckets.iter().all(|b| b.severity == Severity::NoData));
    }

    #[test]
    fn test_empty_minutes_array_falls_back_to_samples() {
        let window = vec![Sample::down(now() - ChronoDuration::minutes(1), 0)];
        let buckets = compute_day_buckets(&window, Some(&[]), 2, now());
        assert_eq!(buckets[1].severity, Severity::Outage);
        assert_eq!(buckets[0].severity, Severity::NoData);
    }

    #[test]
    fn test_day_key_floors() {
        let t = Utc.timestamp_millis_opt(DAY_MS * 3 - 1).unwrap();
        assert_eq!(day_key(t), 2);
        let t = Utc.timestamp_millis_opt(DAY_MS * 3).unwrap();
        assert_eq!(day_key(t), 3);
    }
}
