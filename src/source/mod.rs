//! Upstream sample sources.
//!
//! Supports a pre-aggregated summary, per-service history arrays and direct
//! probes. Every variant reports the same [`Observation`] shape so the
//! aggregation never needs to know where data came from.

mod history;
mod probe;
mod summary;

pub use history::*;
pub use probe::*;
pub use summary::*;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

use crate::config::{ServerConfig, SourceKind};
use crate::db::{Sample, ServiceConfig, ServiceInfo, Status};

/// Source error types.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned HTTP {0}")]
    HttpStatus(u16),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("no usable data: {0}")]
    Unavailable(String),
}

impl SourceError {
    fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            SourceError::Timeout(timeout)
        } else if let Some(status) = e.status() {
            SourceError::HttpStatus(status.as_u16())
        } else {
            SourceError::Transport(e.to_string())
        }
    }
}

/// What one collection pass learned about one service.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub service: ServiceInfo,
    /// New samples for the history store.
    pub samples: Vec<Sample>,
    /// Current state, when the source states it directly.
    pub status: Option<Status>,
    pub uptime_percent: Option<f64>,
    pub response_time_ms: Option<u64>,
    /// Downtime minutes per day, index 0 = today.
    pub daily_minutes_down: Option<Vec<f64>>,
}

impl Observation {
    pub fn empty(service: ServiceInfo) -> Self {
        Self {
            service,
            samples: Vec::new(),
            status: None,
            uptime_percent: None,
            response_time_ms: None,
            daily_minutes_down: None,
        }
    }

    pub fn from_samples(service: ServiceInfo, samples: Vec<Sample>) -> Self {
        Self {
            samples,
            ..Self::empty(service)
        }
    }
}

/// The configured upstream.
pub enum SampleSource {
    Summary(SummarySource),
    HistoryArray(HistorySource),
    DirectProbe(ProbeSource),
}

impl SampleSource {
    /// Build the source selected by the configuration.
    pub fn from_config(cfg: &ServerConfig) -> Result<Self, SourceError> {
        let client = build_client(cfg.fetch_timeout)?;
        let timeout = cfg.fetch_timeout;
        let base = cfg.source_url.clone();

        Ok(match cfg.source {
            SourceKind::Summary => {
                SampleSource::Summary(SummarySource::new(client, base, cfg.uptime_days, timeout))
            }
            SourceKind::ResponseTime => SampleSource::HistoryArray(HistorySource::new(
                client,
                base,
                HistoryFormat::ResponseTime,
                timeout,
            )),
            SourceKind::Worker => SampleSource::HistoryArray(HistorySource::new(
                client,
                base,
                HistoryFormat::Worker,
                timeout,
            )),
            SourceKind::Probe => SampleSource::DirectProbe(ProbeSource::new(client, timeout)),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            SampleSource::Summary(_) => "summary",
            SampleSource::HistoryArray(h) => h.format().as_str(),
            SampleSource::DirectProbe(_) => "probe",
        }
    }

    /// Run one collection pass.
    pub async fn collect(
        &self,
        services: &[ServiceConfig],
        now: DateTime<Utc>,
    ) -> Result<Vec<Observation>, SourceError> {
        match self {
            SampleSource::Summary(s) => s.collect(services, now).await,
            SampleSource::HistoryArray(h) => h.collect(services).await,
            SampleSource::DirectProbe(p) => Ok(p.collect(services).await),
        }
    }
}

/// HTTP client shared by every request of a source.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SourceError::Transport(e.to_string()))
}

/// GET a URL and decode its JSON body.
///
/// The client timeout covers the whole exchange; an expired request is
/// dropped, which aborts it.
pub async fn fetch_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<T, SourceError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SourceError::from_reqwest(e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::HttpStatus(status.as_u16()));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| SourceError::from_reqwest(e, timeout))?;

    serde_json::from_slice(&body).map_err(|e| SourceError::Malformed(e.to_string()))
}

/// Convert an upstream millisecond value to a non-negative integer.
pub(crate) fn to_millis(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::serve;
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use serde_json::{json, Value};

    #[test]
    fn test_to_millis() {
        assert_eq!(to_millis(180.4), 180);
        assert_eq!(to_millis(180.5), 181);
        assert_eq!(to_millis(-5.0), 0);
        assert_eq!(to_millis(f64::NAN), 0);
    }

    #[tokio::test]
    async fn test_fetch_json_errors() {
        let router = Router::new()
            .route("/ok", get(|| async { Json(json!({"a": 1})) }))
            .route("/broken", get(|| async { "{not json" }))
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }));
        let base = serve(router).await;
        let client = build_client(Duration::from_secs(5)).unwrap();
        let timeout = Duration::from_secs(5);

        let ok: Value = tokio_test::assert_ok!(fetch_json(&client, &format!("{}/ok", base), timeout).await);
        assert_eq!(ok["a"], 1);

        let broken = fetch_json::<Value>(&client, &format!("{}/broken", base), timeout).await;
        assert!(matches!(broken, Err(SourceError::Malformed(_))));

        let missing = fetch_json::<Value>(&client, &format!("{}/missing", base), timeout).await;
        assert!(matches!(missing, Err(SourceError::HttpStatus(404))));
    }

    #[tokio::test]
    async fn test_fetch_json_timeout() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        );
        let base = serve(router).await;
        let timeout = Duration::from_millis(200);
        let client = build_client(timeout).unwrap();

        let result = fetch_json::<Value>(&client, &format!("{}/slow", base), timeout).await;
        assert!(matches!(result, Err(SourceError::Timeout(_))));
    }
}
