//! Core data model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Up/down state of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Up,
    Down,
}

impl Status {
    /// Parse an upstream status string. Anything other than `up`/`down` is unknown.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Some(Status::Up),
            "down" => Some(Status::Down),
            _ => None,
        }
    }

    pub fn is_up(self) -> bool {
        self == Status::Up
    }
}

/// A single health observation. Immutable once recorded.
///
/// Serialized as `{time, responseTime, status}` with `time` in epoch milliseconds,
/// which is also the persisted history layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: DateTime<Utc>,
    pub response_time: u64,
    pub status: Status,
}

impl Sample {
    pub fn new(time: DateTime<Utc>, status: Status, response_time: u64) -> Self {
        Self {
            time,
            response_time,
            status,
        }
    }

    pub fn up(time: DateTime<Utc>, response_time: u64) -> Self {
        Self::new(time, Status::Up, response_time)
    }

    pub fn down(time: DateTime<Utc>, response_time: u64) -> Self {
        Self::new(time, Status::Down, response_time)
    }
}

/// Stable service identifier (slug).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(String);

impl ServiceId {
    pub fn new(slug: impl Into<String>) -> Self {
        Self(slug.into())
    }

    /// Derive a slug from a display name: lower-cased, whitespace runs become `-`.
    pub fn from_name(name: &str) -> Self {
        Self(
            name.to_lowercase()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("-"),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A monitored service as declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    /// Probe target for the direct-probe source.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

impl ServiceConfig {
    pub fn id(&self) -> ServiceId {
        match self.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => ServiceId::new(slug),
            _ => ServiceId::from_name(&self.name),
        }
    }

    pub fn info(&self) -> ServiceInfo {
        ServiceInfo {
            id: self.id(),
            display_name: self.name.clone(),
            icon: self.icon.clone(),
        }
    }
}

/// Display metadata carried alongside every observation and snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceInfo {
    pub id: ServiceId,
    pub display_name: String,
    pub icon: Option<String>,
}
