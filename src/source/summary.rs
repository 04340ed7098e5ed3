//! Pre-aggregated `summary.json` source.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinSet;

use super::{fetch_json, fetch_response_time, to_millis, Observation, SourceError};
use crate::db::{Sample, ServiceConfig, ServiceId, ServiceInfo, Status};

/// `summary.json` comes either wrapped in `{sites: [...]}` or as a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SummaryPayload {
    Wrapped { sites: Vec<Value> },
    Bare(Vec<Value>),
}

impl SummaryPayload {
    fn into_sites(self) -> Vec<Value> {
        match self {
            SummaryPayload::Wrapped { sites } => sites,
            SummaryPayload::Bare(sites) => sites,
        }
    }
}

/// One entry of the summary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSummary {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// `"99.95"`, `"99.95%"` or a bare number.
    #[serde(default)]
    pub uptime: Option<Value>,
    /// Current response time in milliseconds.
    #[serde(default)]
    pub time: Option<f64>,
    /// Either a newest-first array or a `{"YYYY-MM-DD": minutes}` map.
    #[serde(default)]
    pub daily_minutes_down: Option<Value>,
}

impl SiteSummary {
    pub fn id(&self) -> ServiceId {
        match self.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => ServiceId::new(slug),
            _ => ServiceId::from_name(&self.name),
        }
    }

    pub fn uptime_percent(&self) -> Option<f64> {
        match self.uptime.as_ref()? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
            _ => None,
        }
    }

    /// Downtime minutes per day, index 0 = today.
    ///
    /// The date map lists only days with downtime, so every unlisted day of
    /// the `days`-long window is 0 minutes. Dates outside the window are
    /// ignored.
    pub fn minutes_down(&self, today: NaiveDate, days: usize) -> Option<Vec<f64>> {
        match self.daily_minutes_down.as_ref()? {
            Value::Array(values) => Some(
                values
                    .iter()
                    .map(|v| v.as_f64().unwrap_or(f64::NAN))
                    .collect(),
            ),
            Value::Object(map) => {
                let mut by_offset = vec![0.0; days];
                for (date, minutes) in map {
                    let Ok(date) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
                        continue;
                    };
                    let offset = (today - date).num_days();
                    if offset < 0 || offset as usize >= days {
                        continue;
                    }
                    by_offset[offset as usize] += minutes.as_f64().unwrap_or(0.0);
                }
                Some(by_offset)
            }
            _ => None,
        }
    }
}

/// Source reading `{base}/summary.json`, plus each site's
/// `{base}/{slug}/response-time.json` series when published.
pub struct SummarySource {
    client: reqwest::Client,
    base_url: String,
    uptime_days: u32,
    timeout: Duration,
}

impl SummarySource {
    pub fn new(client: reqwest::Client, base_url: String, uptime_days: u32, timeout: Duration) -> Self {
        Self {
            client,
            base_url,
            uptime_days,
            timeout,
        }
    }

    pub fn summary_url(&self) -> String {
        format!("{}/summary.json", self.base_url.trim_end_matches('/'))
    }

    /// Fetch and parse the summary. Entries that fail to parse are skipped.
    pub async fn fetch_sites(&self) -> Result<Vec<SiteSummary>, SourceError> {
        let payload: SummaryPayload = fetch_json(&self.client, &self.summary_url(), self.timeout).await?;

        let sites: Vec<SiteSummary> = payload
            .into_sites()
            .into_iter()
            .filter_map(|raw| match serde_json::from_value(raw) {
                Ok(site) => Some(site),
                Err(e) => {
                    tracing::warn!("Skipping malformed summary entry: {}", e);
                    None
                }
            })
            .collect();

        if sites.is_empty() {
            return Err(SourceError::Unavailable("summary lists no sites".to_string()));
        }
        Ok(sites)
    }

    pub async fn collect(
        &self,
        services: &[ServiceConfig],
        now: DateTime<Utc>,
    ) -> Result<Vec<Observation>, SourceError> {
        let sites = self.fetch_sites().await?;
        let mut series = self.fetch_series(&sites).await;

        let configured: HashMap<ServiceId, &ServiceConfig> =
            services.iter().map(|s| (s.id(), s)).collect();
        let today = now.date_naive();

        let observations = sites
            .iter()
            .enumerate()
            .map(|(idx, site)| {
                let id = site.id();
                let overrides = configured.get(&id);
                let info = ServiceInfo {
                    display_name: overrides
                        .map(|s| s.name.clone())
                        .unwrap_or_else(|| site.name.clone()),
                    icon: overrides
                        .and_then(|s| s.icon.clone())
                        .or_else(|| site.icon.clone()),
                    id,
                };

                let status = site.status.as_deref().and_then(Status::parse);
                if status.is_none() {
                    tracing::debug!("Summary: unknown status {:?} for {}", site.status, site.name);
                }
                let response_time_ms = site.time.map(to_millis);

                let mut samples = series.remove(&idx).unwrap_or_default();
                if let Some(status) = status {
                    samples.push(Sample::new(now, status, response_time_ms.unwrap_or(0)));
                }

                Observation {
                    service: info,
                    samples,
                    status,
                    uptime_percent: site.uptime_percent(),
                    response_time_ms,
                    daily_minutes_down: site.minutes_down(today, self.uptime_days as usize),
                }
            })
            .collect();

        Ok(observations)
    }

    /// Fetch every site's response time series concurrently. Sites without a
    /// published series are simply absent from the result.
    async fn fetch_series(&self, sites: &[SiteSummary]) -> HashMap<usize, Vec<Sample>> {
        let mut set = JoinSet::new();
        for (idx, site) in sites.iter().enumerate() {
            let client = self.client.clone();
            let url = format!(
                "{}/{}/response-time.json",
                self.base_url.trim_end_matches('/'),
                site.id()
            );
            let timeout = self.timeout;
            set.spawn(async move { (idx, url.clone(), fetch_response_time(&client, &url, timeout).await) });
        }

        let mut series = HashMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, _, Ok(samples))) => {
                    series.insert(idx, samples);
                }
                Ok((_, url, Err(e))) => {
                    tracing::warn!("Summary: no response time series at {}: {}", url, e);
                }
                Err(e) => tracing::warn!("Summary: series task failed: {}", e),
            }
        }
        series
    }
}
