//! Dashboard session: owns the history, the source and the latest render.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::aggregate::{aggregate_service, classify, OverallStatus, ServiceStatusSnapshot};
use crate::config::ServerConfig;
use crate::db::{HistoryMap, HistoryStore, ServiceConfig, Status, Store};
use crate::scheduler::{process_retention, RetentionPolicy};
use crate::source::{Observation, SampleSource, SourceError};

/// Why a refresh produced no dashboard.
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("no service reported a status")]
    NoStatus,
}

/// What the presenter draws. Replaced wholesale on every refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Dashboard {
    /// Before the first refresh finished.
    Pending,
    Ready {
        overall: OverallStatus,
        services: Vec<ServiceStatusSnapshot>,
        updated_at: DateTime<Utc>,
        source: &'static str,
    },
    /// Nothing usable this tick. Shown instead of a stale or guessed banner.
    Unavailable { reason: String, at: DateTime<Utc> },
}

/// Aggregate every observed service against the history.
pub fn aggregate_all(
    history: &HistoryStore,
    observations: &[Observation],
    uptime_days: u32,
    now: DateTime<Utc>,
) -> Vec<ServiceStatusSnapshot> {
    observations
        .iter()
        .map(|obs| aggregate_service(obs, history.window(&obs.service.id), uptime_days, now))
        .collect()
}

pub struct DashboardSession {
    source: SampleSource,
    services: Vec<ServiceConfig>,
    history: RwLock<HistoryStore>,
    store: Option<Store>,
    cache_key: String,
    retention: RetentionPolicy,
    uptime_days: u32,
    current: RwLock<Arc<Dashboard>>,
}

impl DashboardSession {
    /// Create a session, restoring cached history when a store is given.
    pub fn new(cfg: &ServerConfig, source: SampleSource, store: Option<Store>) -> Self {
        let history = match store.as_ref().map(|s| s.load_history(&cfg.cache_key)) {
            Some(Ok(Some(map))) => {
                let history = HistoryStore::from_map(map);
                if history.is_empty() {
                    tracing::info!("History cache holds no samples");
                } else {
                    tracing::info!("Restored {} cached samples", history.len());
                }
                history
            }
            Some(Ok(None)) | None => HistoryStore::new(),
            Some(Err(e)) => {
                tracing::warn!("Failed to load history cache, starting empty: {}", e);
                HistoryStore::new()
            }
        };

        Self {
            source,
            services: cfg.services.clone(),
            history: RwLock::new(history),
            store,
            cache_key: cfg.cache_key.clone(),
            retention: RetentionPolicy::new(cfg.retention()),
            uptime_days: cfg.uptime_days,
            current: RwLock::new(Arc::new(Dashboard::Pending)),
        }
    }

    /// Latest render.
    pub async fn current(&self) -> Arc<Dashboard> {
        self.current.read().await.clone()
    }

    pub async fn history_len(&self) -> usize {
        self.history.read().await.len()
    }

    /// Collect, record, aggregate and publish one tick.
    pub async fn refresh(&self, now: DateTime<Utc>) -> Result<OverallStatus, RefreshError> {
        let result = self.run_pipeline(now).await;

        let dashboard = match &result {
            Ok((overall, services)) => Dashboard::Ready {
                overall: *overall,
                services: services.clone(),
                updated_at: now,
                source: self.source.name(),
            },
            Err(e) => Dashboard::Unavailable {
                reason: e.to_string(),
                at: now,
            },
        };
        *self.current.write().await = Arc::new(dashboard);

        result.map(|(overall, _)| overall)
    }

    async fn run_pipeline(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(OverallStatus, Vec<ServiceStatusSnapshot>), RefreshError> {
        let observations = self.source.collect(&self.services, now).await?;

        let (snapshots, to_save) = {
            let mut history = self.history.write().await;
            for obs in &observations {
                history.append_unseen(&obs.service.id, obs.samples.iter().cloned());
            }
            process_retention(&mut history, &self.retention, now);
            let to_save = self.store.is_some().then(|| history.as_map().clone());
            (aggregate_all(&history, &observations, self.uptime_days, now), to_save)
        };
        if let Some(map) = to_save {
            self.save(map).await;
        }

        let statuses: Vec<Status> = snapshots.iter().filter_map(|s| s.status).collect();
        let overall = classify(&statuses).ok_or(RefreshError::NoStatus)?;
        Ok((overall, snapshots))
    }

    /// Write a copy of the history to the cache on the blocking pool.
    /// Failures are logged, never fatal.
    async fn save(&self, map: HistoryMap) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let key = self.cache_key.clone();
        match tokio::task::spawn_blocking(move || store.save_history(&key, &map)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Failed to save history cache: {}", e),
            Err(e) => tracing::warn!("History cache write task failed: {}", e),
        }
    }

    /// Final cache write on shutdown.
    pub async fn persist(&self) {
        if self.store.is_none() {
            return;
        }
        let map = self.history.read().await.as_map().clone();
        self.save(map).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Severity;
    use crate::config::SourceKind;
    use crate::db::{Sample, ServiceId, ServiceInfo};
    use crate::source::test_support::serve;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use serde_json::{json, Value};
    use tempfile::NamedTempFile;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    async fn summary_session(summary: Value, store: Option<Store>) -> DashboardSession {
        let router = Router::new().route(
            "/summary.json",
            get(move || {
                let summary = summary.clone();
                async move { Json(summary) }
            }),
        );
        let cfg = ServerConfig {
            source_url: serve(router).await,
            ..ServerConfig::default()
        };
        let source = SampleSource::from_config(&cfg).unwrap();
        DashboardSession::new(&cfg, source, store)
    }

    #[tokio::test]
    async fn test_single_site_operational() {
        let session = summary_session(
            json!({"sites": [{"name": "Website", "status": "up", "uptime": "99.95", "time": 180}]}),
            None,
        )
        .await;
        assert_eq!(*session.current().await, Dashboard::Pending);

        let overall = session.refresh(now()).await.unwrap();
        assert_eq!(overall, OverallStatus::Operational);

        let dashboard = session.current().await;
        let Dashboard::Ready { services, source, .. } = dashboard.as_ref() else {
            panic!("expected ready dashboard, got {:?}", dashboard);
        };
        assert_eq!(*source, "summary");
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].uptime_percent, 99.95);
        assert_eq!(services[0].current_response_time_ms, Some(180));
        assert_eq!(services[0].day_buckets.len(), 90);
    }

    #[tokio::test]
    async fn test_one_down_is_outage() {
        let session = summary_session(
            json!({"sites": [
                {"name": "Website", "status": "up", "uptime": "100", "time": 100},
                {"name": "API", "status": "down", "uptime": "98.1", "time": 0},
                {"name": "Docs", "status": "up", "uptime": "100", "time": 90}
            ]}),
            None,
        )
        .await;
        assert_eq!(session.refresh(now()).await.unwrap(), OverallStatus::Outage);
    }

    #[tokio::test]
    async fn test_daily_minutes_scenario() {
        let mut minutes = vec![0, 15, 45, 0];
        minutes.resize(90, 0);
        let session = summary_session(
            json!([{"name": "Website", "status": "up", "uptime": "99.9", "time": 150, "dailyMinutesDown": minutes}]),
            None,
        )
        .await;
        session.refresh(now()).await.unwrap();

        let dashboard = session.current().await;
        let Dashboard::Ready { services, .. } = dashboard.as_ref() else {
            panic!("expected ready dashboard");
        };
        let newest_first: Vec<Severity> = services[0]
            .day_buckets
            .iter()
            .rev()
            .take(4)
            .map(|b| b.severity)
            .collect();
        assert_eq!(
            newest_first,
            vec![
                Severity::Operational,
                Severity::Degraded,
                Severity::Outage,
                Severity::Operational
            ]
        );
    }

    #[tokio::test]
    async fn test_transport_failure_is_unavailable() {
        let cfg = ServerConfig {
            // Nothing listens on port 1.
            source_url: "http://127.0.0.1:1".to_string(),
            ..ServerConfig::default()
        };
        let session = DashboardSession::new(&cfg, SampleSource::from_config(&cfg).unwrap(), None);

        let result = session.refresh(now()).await;
        assert!(matches!(result, Err(RefreshError::Source(_))));
        assert!(matches!(
            session.current().await.as_ref(),
            Dashboard::Unavailable { .. }
        ));
    }

    #[tokio::test]
    async fn test_no_known_status_is_unavailable() {
        let session = summary_session(json!([{"name": "Website", "status": "maintenance"}]), None).await;
        let result = session.refresh(now()).await;
        assert!(matches!(result, Err(RefreshError::NoStatus)));
    }

    #[tokio::test]
    async fn test_history_cached_between_sessions() {
        let tmp = NamedTempFile::new().unwrap();
        let summary = json!([{"name": "Website", "status": "up", "uptime": "100", "time": 120}]);

        let session = summary_session(summary.clone(), Some(Store::new(tmp.path()).unwrap())).await;
        session.refresh(now()).await.unwrap();
        session.refresh(now() + ChronoDuration::minutes(1)).await.unwrap();
        assert_eq!(session.history_len().await, 2);

        let restored = summary_session(summary, Some(Store::new(tmp.path()).unwrap())).await;
        assert_eq!(restored.history_len().await, 2);
    }

    #[tokio::test]
    async fn test_refresh_writes_cache_snapshot() {
        let tmp = NamedTempFile::new().unwrap();
        let summary = json!([{"name": "Website", "status": "up", "uptime": "100", "time": 120}]);
        let session = summary_session(summary, Some(Store::new(tmp.path()).unwrap())).await;
        session.refresh(now()).await.unwrap();

        let saved = Store::new(tmp.path())
            .unwrap()
            .load_history(&ServerConfig::default().cache_key)
            .unwrap()
            .unwrap();
        assert_eq!(&saved, session.history.read().await.as_map());
        assert_eq!(saved[&ServiceId::new("website")], vec![Sample::up(now(), 120)]);

        // The history lock is free again once the write has finished.
        assert!(session.history.try_write().is_ok());
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_cached_window() {
        let router = Router::new()
            .route(
                "/website/response-time.json",
                get(|| async { Json(json!([[1718445600000i64, 120]])) }),
            )
            .route("/api/response-time.json", get(|| async { StatusCode::BAD_GATEWAY }));
        let cfg = ServerConfig {
            source: SourceKind::ResponseTime,
            source_url: serve(router).await,
            services: serde_json::from_value(json!([{"name": "Website"}, {"name": "API"}])).unwrap(),
            ..ServerConfig::default()
        };
        let session = DashboardSession::new(&cfg, SampleSource::from_config(&cfg).unwrap(), None);
        {
            let mut history = session.history.write().await;
            history.append(&ServiceId::new("api"), Sample::down(now() - ChronoDuration::minutes(30), 0));
        }

        let overall = session.refresh(now()).await.unwrap();
        assert_eq!(overall, OverallStatus::Outage);

        let dashboard = session.current().await;
        let Dashboard::Ready { services, .. } = dashboard.as_ref() else {
            panic!("expected ready dashboard");
        };
        assert_eq!(services[0].status, Some(Status::Up));
        assert_eq!(services[1].status, Some(Status::Down));
        assert_eq!(services[1].uptime_percent, 0.0);
    }

    #[test]
    fn test_aggregate_all_is_idempotent() {
        let id = ServiceId::new("website");
        let mut history = HistoryStore::new();
        for i in 0..50 {
            let sample = if i % 7 == 0 {
                Sample::down(now() - ChronoDuration::hours(i), 0)
            } else {
                Sample::up(now() - ChronoDuration::hours(i), 100 + i as u64)
            };
            history.append(&id, sample);
        }
        let observations = vec![Observation::empty(ServiceInfo {
            id,
            display_name: "Website".to_string(),
            icon: None,
        })];

        let first = serde_json::to_vec(&aggregate_all(&history, &observations, 90, now())).unwrap();
        let second = serde_json::to_vec(&aggregate_all(&history, &observations, 90, now())).unwrap();
        assert_eq!(first, second);
    }
}
