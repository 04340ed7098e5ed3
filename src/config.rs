//! Configuration module for statustrail.
//!
//! Loads configuration from environment variables with sensible defaults.

use chrono::Duration as ChronoDuration;
use std::collections::HashSet;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::db::ServiceConfig;

/// Configuration validation errors.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("duplicate service id: {0}")]
    DuplicateService(String),
    #[error("service {0} has no url to probe")]
    MissingUrl(String),
    #[error("{0} source needs STATUSTRAIL_SOURCE_URL")]
    MissingSourceUrl(&'static str),
    #[error("{0} source needs at least one service in STATUSTRAIL_SERVICES")]
    NoServices(&'static str),
    #[error("uptime days must be at least 1")]
    NoUptimeDays,
}

/// Which upstream shape the dashboard reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// `{base}/summary.json`, pre-aggregated across services.
    Summary,
    /// `{base}/{slug}/response-time.json` pairs per service.
    ResponseTime,
    /// `{base}/history/{slug}?hours=24` per service.
    Worker,
    /// Direct reachability checks against each service url.
    Probe,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Summary => "summary",
            SourceKind::ResponseTime => "response-time",
            SourceKind::Worker => "worker",
            SourceKind::Probe => "probe",
        }
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "summary" => Ok(SourceKind::Summary),
            "response-time" | "history" => Ok(SourceKind::ResponseTime),
            "worker" => Ok(SourceKind::Worker),
            "probe" => Ok(SourceKind::Probe),
            other => Err(format!("unknown source kind: {}", other)),
        }
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the status page (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite history cache; empty disables persistence
    pub db_path: String,
    pub source: SourceKind,
    /// Base URL of the upstream source
    pub source_url: String,
    pub services: Vec<ServiceConfig>,
    pub refresh_interval: Duration,
    pub fetch_timeout: Duration,
    pub uptime_days: u32,
    /// Overrides the per-source retention default when set
    pub retention_hours: Option<u32>,
    pub cache_key: String,
    pub title: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "statustrail.db".to_string(),
            source: SourceKind::Summary,
            source_url: String::new(),
            services: Vec::new(),
            refresh_interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
            uptime_days: 90,
            retention_hours: None,
            cache_key: "statustrail-history".to_string(),
            title: "Service Status".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `STATUSTRAIL_HTTP_PORT`: HTTP port (default: 8080)
    /// - `STATUSTRAIL_DB_PATH`: history cache file (default: "statustrail.db")
    /// - `STATUSTRAIL_SOURCE`: summary | response-time | worker | probe (default: summary)
    /// - `STATUSTRAIL_SOURCE_URL`: upstream base URL
    /// - `STATUSTRAIL_SERVICES`: JSON array of `{name, slug?, url?, icon?}`
    /// - `STATUSTRAIL_REFRESH_SECS`: refresh interval (default: 60)
    /// - `STATUSTRAIL_FETCH_TIMEOUT_SECS`: per-request timeout (default: 10)
    /// - `STATUSTRAIL_UPTIME_DAYS`: uptime bar length (default: 90)
    /// - `STATUSTRAIL_RETENTION_HOURS`: history retention override
    /// - `STATUSTRAIL_CACHE_KEY`: persisted record key
    /// - `STATUSTRAIL_TITLE`: page title
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port) = parse_var(&lookup, "STATUSTRAIL_HTTP_PORT") {
            cfg.http_port = port;
        }

        if let Some(db_path) = lookup("STATUSTRAIL_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(source) = parse_var(&lookup, "STATUSTRAIL_SOURCE") {
            cfg.source = source;
        }

        if let Some(url) = lookup("STATUSTRAIL_SOURCE_URL") {
            cfg.source_url = url.trim().trim_end_matches('/').to_string();
        }

        if let Some(raw) = lookup("STATUSTRAIL_SERVICES") {
            match serde_json::from_str(&raw) {
                Ok(services) => cfg.services = services,
                Err(e) => tracing::warn!("Ignoring STATUSTRAIL_SERVICES: {}", e),
            }
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "STATUSTRAIL_REFRESH_SECS") {
            cfg.refresh_interval = Duration::from_secs(secs.max(1));
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "STATUSTRAIL_FETCH_TIMEOUT_SECS") {
            cfg.fetch_timeout = Duration::from_secs(secs.max(1));
        }

        if let Some(days) = parse_var(&lookup, "STATUSTRAIL_UPTIME_DAYS") {
            cfg.uptime_days = days;
        }

        if let Some(hours) = parse_var(&lookup, "STATUSTRAIL_RETENTION_HOURS") {
            cfg.retention_hours = Some(hours);
        }

        if let Some(key) = lookup("STATUSTRAIL_CACHE_KEY") {
            cfg.cache_key = key;
        }

        if let Some(title) = lookup("STATUSTRAIL_TITLE") {
            cfg.title = title;
        }

        cfg
    }

    /// How long samples are kept. Direct probes keep a day; fetched sources
    /// keep enough to fill the uptime bar.
    pub fn retention(&self) -> ChronoDuration {
        let hours = self.retention_hours.unwrap_or(match self.source {
            SourceKind::Probe => 24,
            _ => self.uptime_days.saturating_mul(24),
        });
        ChronoDuration::hours(hours as i64)
    }

    pub fn persistence_enabled(&self) -> bool {
        !self.db_path.trim().is_empty()
    }

    /// Check the configuration is usable for the selected source.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.uptime_days == 0 {
            return Err(ConfigError::NoUptimeDays);
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            let id = service.id();
            if !seen.insert(id.clone()) {
                return Err(ConfigError::DuplicateService(id.to_string()));
            }
        }

        match self.source {
            SourceKind::Probe => {
                if self.services.is_empty() {
                    return Err(ConfigError::NoServices(self.source.as_str()));
                }
                if let Some(svc) = self.services.iter().find(|s| s.url.is_none()) {
                    return Err(ConfigError::MissingUrl(svc.name.clone()));
                }
            }
            SourceKind::ResponseTime | SourceKind::Worker => {
                if self.source_url.is_empty() {
                    return Err(ConfigError::MissingSourceUrl(self.source.as_str()));
                }
                if self.services.is_empty() {
                    return Err(ConfigError::NoServices(self.source.as_str()));
                }
            }
            SourceKind::Summary => {
                if self.source_url.is_empty() {
                    return Err(ConfigError::MissingSourceUrl(self.source.as_str()));
                }
            }
        }

        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}
