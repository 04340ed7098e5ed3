//! Direct reachability probes.

use chrono::Utc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

use super::{Observation, SourceError};
use crate::db::{Sample, ServiceConfig, ServiceInfo};

/// Run an HTTP probe against the given address.
///
/// Any HTTP response counts as reachable, whatever its status code; only a
/// network failure or timeout is an error. Returns latency in milliseconds.
pub async fn run_http_probe(
    client: &reqwest::Client,
    address: &str,
    timeout: Duration,
) -> Result<u64, SourceError> {
    let url = if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let start = Instant::now();

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| SourceError::from_reqwest(e, timeout))?;

    tracing::trace!("Probe {} answered {}", url, response.status());

    // Read the full body to measure complete transfer time
    let _body = response
        .bytes()
        .await
        .map_err(|e| SourceError::from_reqwest(e, timeout))?;

    let elapsed = start.elapsed();
    if elapsed >= timeout {
        return Err(SourceError::Timeout(timeout));
    }

    Ok(elapsed.as_millis() as u64)
}

/// Probe one address and turn the outcome into a sample.
pub async fn probe_sample(client: &reqwest::Client, address: &str, timeout: Duration) -> Sample {
    // Add jitter to avoid thundering herd
    let jitter = rand::random::<u64>() % 100;
    tokio::time::sleep(Duration::from_millis(jitter)).await;

    let time = Utc::now();
    let start = Instant::now();
    match run_http_probe(client, address, timeout).await {
        Ok(latency) => Sample::up(time, latency),
        Err(e) => {
            tracing::debug!("Probe failed for {}: {}", address, e);
            Sample::down(time, start.elapsed().as_millis() as u64)
        }
    }
}

/// Source probing each configured service url.
pub struct ProbeSource {
    client: reqwest::Client,
    timeout: Duration,
}

impl ProbeSource {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Probe every service concurrently. Each probe yields exactly one sample.
    pub async fn collect(&self, services: &[ServiceConfig]) -> Vec<Observation> {
        let mut set = JoinSet::new();
        for (idx, service) in services.iter().enumerate() {
            let Some(url) = service.url.clone() else {
                continue;
            };
            let client = self.client.clone();
            let timeout = self.timeout;
            set.spawn(async move { (idx, probe_sample(&client, &url, timeout).await) });
        }

        let mut samples: Vec<Option<Sample>> = vec![None; services.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, sample)) => samples[idx] = Some(sample),
                Err(e) => tracing::warn!("Probe task failed: {}", e),
            }
        }

        services
            .iter()
            .zip(samples)
            .map(|(service, sample)| probe_observation(service.info(), sample))
            .collect()
    }
}

fn probe_observation(info: ServiceInfo, sample: Option<Sample>) -> Observation {
    match sample {
        Some(sample) => Observation {
            status: Some(sample.status),
            response_time_ms: Some(sample.response_time),
            samples: vec![sample],
            ..Observation::empty(info)
        },
        None => Observation::empty(info),
    }
}

#[cfg(test)]
mod tests {
    use super::super::build_client;
    use super::super::test_support::serve;
    use super::*;
    use crate::db::Status;
    use axum::{http::StatusCode, routing::get, Router};

    #[tokio::test]
    async fn test_http_probe_invalid_url() {
        let timeout = Duration::from_millis(100);
        let client = build_client(timeout).unwrap();
        let result = run_http_probe(&client, "http://256.256.256.256", timeout).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_probe_source() {
        let router = Router::new()
            .route("/", get(|| async { "ok" }))
            .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let base = serve(router).await;

        let timeout = Duration::from_secs(2);
        let source = ProbeSource::new(build_client(timeout).unwrap(), timeout);
        let services = vec![
            ServiceConfig {
                name: "Website".to_string(),
                slug: None,
                url: Some(format!("{}/", base)),
                icon: None,
            },
            ServiceConfig {
                name: "Backend".to_string(),
                slug: None,
                url: Some(format!("{}/broken", base)),
                icon: None,
            },
            ServiceConfig {
                name: "Nowhere".to_string(),
                slug: None,
                // Nothing listens on port 1.
                url: Some("http://127.0.0.1:1".to_string()),
                icon: None,
            },
        ];

        let obs = source.collect(&services).await;
        assert_eq!(obs.len(), 3);
        assert_eq!(obs[0].status, Some(Status::Up));
        assert_eq!(obs[0].samples.len(), 1);
        // A 500 still proves the host is reachable.
        assert_eq!(obs[1].status, Some(Status::Up));
        assert_eq!(obs[2].status, Some(Status::Down));
        assert_eq!(obs[2].samples[0].status, Status::Down);
    }
}
