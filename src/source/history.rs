//! Per-service history array sources.

use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;
use tokio::task::JoinSet;

use super::{fetch_json, to_millis, Observation, SourceError};
use crate::db::{Sample, ServiceConfig, ServiceId, Status};

/// Wire shape of a per-service history endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryFormat {
    /// `GET {base}/{slug}/response-time.json` -> `[[timestampMs, ms], ...]`
    ResponseTime,
    /// `GET {base}/history/{slug}?hours=24` -> `{data: [{time, responseTime}]}`
    Worker,
}

impl HistoryFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryFormat::ResponseTime => "response-time",
            HistoryFormat::Worker => "worker",
        }
    }

    pub fn url(self, base: &str, id: &ServiceId) -> String {
        let base = base.trim_end_matches('/');
        match self {
            HistoryFormat::ResponseTime => format!("{}/{}/response-time.json", base, id),
            HistoryFormat::Worker => format!("{}/history/{}?hours=24", base, id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WorkerHistory {
    #[serde(default)]
    data: Vec<WorkerPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkerPoint {
    time: i64,
    #[serde(default)]
    response_time: Option<f64>,
    #[serde(default)]
    status: Option<String>,
}

impl WorkerPoint {
    fn into_sample(self) -> Option<Sample> {
        let time = Utc.timestamp_millis_opt(self.time).single()?;
        let explicit = self.status.as_deref().and_then(Status::parse);
        let sample = match (explicit, self.response_time) {
            (Some(Status::Down), rt) | (None, rt @ None) => {
                Sample::down(time, rt.map(to_millis).unwrap_or(0))
            }
            (_, rt) => Sample::up(time, rt.map(to_millis).unwrap_or(0)),
        };
        Some(sample)
    }
}

/// Fetch a `[[timestampMs, responseTimeMs], ...]` series as up samples, oldest first.
pub async fn fetch_response_time(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<Sample>, SourceError> {
    let pairs: Vec<(i64, f64)> = fetch_json(client, url, timeout).await?;
    let mut samples: Vec<Sample> = pairs
        .into_iter()
        .filter_map(|(ts, ms)| {
            Utc.timestamp_millis_opt(ts)
                .single()
                .map(|time| Sample::up(time, to_millis(ms)))
        })
        .collect();
    samples.sort_by_key(|s| s.time);
    Ok(samples)
}

/// Fetch a worker history payload, oldest first.
pub async fn fetch_worker_history(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<Sample>, SourceError> {
    let history: WorkerHistory = fetch_json(client, url, timeout).await?;
    let mut samples: Vec<Sample> = history
        .data
        .into_iter()
        .filter_map(WorkerPoint::into_sample)
        .collect();
    samples.sort_by_key(|s| s.time);
    Ok(samples)
}

/// Source fetching one history array per configured service.
pub struct HistorySource {
    client: reqwest::Client,
    base_url: String,
    format: HistoryFormat,
    timeout: Duration,
}

impl HistorySource {
    pub fn new(client: reqwest::Client, base_url: String, format: HistoryFormat, timeout: Duration) -> Self {
        Self {
            client,
            base_url,
            format,
            timeout,
        }
    }

    pub fn format(&self) -> HistoryFormat {
        self.format
    }

    /// Fetch every service concurrently. A failed service yields an empty
    /// observation; the pass only fails when every service failed.
    pub async fn collect(&self, services: &[ServiceConfig]) -> Result<Vec<Observation>, SourceError> {
        if services.is_empty() {
            return Err(SourceError::Unavailable("no services configured".to_string()));
        }

        let mut set = JoinSet::new();
        for (idx, service) in services.iter().enumerate() {
            let client = self.client.clone();
            let url = self.format.url(&self.base_url, &service.id());
            let format = self.format;
            let timeout = self.timeout;
            set.spawn(async move {
                let result = match format {
                    HistoryFormat::ResponseTime => fetch_response_time(&client, &url, timeout).await,
                    HistoryFormat::Worker => fetch_worker_history(&client, &url, timeout).await,
                };
                (idx, result)
            });
        }

        let mut results: Vec<Option<Result<Vec<Sample>, SourceError>>> =
            (0..services.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, result)) => results[idx] = Some(result),
                Err(e) => tracing::warn!("History: fetch task failed: {}", e),
            }
        }

        let mut last_error = None;
        let mut failures = 0;
        let observations: Vec<Observation> = services
            .iter()
            .zip(results)
            .map(|(service, result)| match result {
                Some(Ok(samples)) => Observation::from_samples(service.info(), samples),
                Some(Err(e)) => {
                    tracing::warn!("History: fetch failed for {}: {}", service.name, e);
                    failures += 1;
                    last_error = Some(e);
                    Observation::empty(service.info())
                }
                None => {
                    failures += 1;
                    Observation::empty(service.info())
                }
            })
            .collect();

        if failures == services.len() {
            let reason = last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "all history fetches failed".to_string());
            return Err(SourceError::Unavailable(reason));
        }

        Ok(observations)
    }
}
