//! Severity thresholds and the overall status banner.

use serde::Serialize;

use crate::db::Status;

/// Minutes of downtime in a day at which the day counts as an outage.
pub const OUTAGE_MINUTES: f64 = 30.0;
/// Up ratio at or above which a day is operational.
pub const OPERATIONAL_RATIO: f64 = 0.99;
/// Up ratio at or above which a day is degraded rather than an outage.
pub const DEGRADED_RATIO: f64 = 0.90;

/// Per-day severity shown in the uptime bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Operational,
    Degraded,
    Outage,
    /// No samples for the day. Never treated as healthy.
    NoData,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Operational => "Operational",
            Severity::Degraded => "Degraded",
            Severity::Outage => "Outage",
            Severity::NoData => "No data",
        }
    }
}

/// Classify a day from its downtime minutes.
pub fn classify_minutes_down(minutes: f64) -> Severity {
    if minutes.is_nan() {
        Severity::NoData
    } else if minutes <= 0.0 {
        Severity::Operational
    } else if minutes < OUTAGE_MINUTES {
        Severity::Degraded
    } else {
        Severity::Outage
    }
}

/// Classify a day from the fraction of up samples.
pub fn classify_up_ratio(ratio: f64) -> Severity {
    if ratio.is_nan() {
        Severity::NoData
    } else if ratio >= OPERATIONAL_RATIO {
        Severity::Operational
    } else if ratio >= DEGRADED_RATIO {
        Severity::Degraded
    } else {
        Severity::Outage
    }
}

/// Overall system state for the banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Operational,
    /// Reserved for per-service partial degradation. Binary per-service
    /// status never produces it.
    Degraded,
    Outage,
}

impl OverallStatus {
    pub fn headline(self) -> &'static str {
        match self {
            OverallStatus::Operational => "All systems operational",
            OverallStatus::Degraded => "Some systems degraded",
            OverallStatus::Outage => "Some systems are down",
        }
    }
}

/// Reduce per-service statuses to the banner state.
///
/// Returns `None` for an empty slice; callers must supply at least one status.
pub fn classify(statuses: &[Status]) -> Option<OverallStatus> {
    if statuses.is_empty() {
        return None;
    }

    if statuses.iter().any(|s| !s.is_up()) {
        Some(OverallStatus::Outage)
    } else {
        Some(OverallStatus::Operational)
    }
}
