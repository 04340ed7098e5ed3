//! Scheduler module driving periodic dashboard refreshes.

mod retention;

pub use retention::*;

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::aggregate::OverallStatus;
use crate::session::DashboardSession;

/// Whether a refresh is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Refreshing,
}

/// Result of asking for a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed(OverallStatus),
    /// The pipeline failed; the dashboard shows the unavailable state.
    Failed,
    /// Another refresh was already running.
    Skipped,
}

/// Runs the refresh pipeline on a fixed interval and on demand.
///
/// At most one refresh runs at a time. Ticks arriving while one is in flight
/// are skipped rather than queued.
pub struct RefreshScheduler {
    session: Arc<DashboardSession>,
    interval: Duration,
    gate: Arc<Semaphore>,
    stop: broadcast::Sender<()>,
}

impl RefreshScheduler {
    pub fn new(session: Arc<DashboardSession>, interval: Duration) -> Self {
        let (stop, _) = broadcast::channel(1);
        Self {
            session,
            interval,
            gate: Arc::new(Semaphore::new(1)),
            stop,
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.gate.available_permits() == 0 {
            SchedulerState::Refreshing
        } else {
            SchedulerState::Idle
        }
    }

    /// Refresh immediately unless a refresh is already running.
    pub async fn refresh_now(&self) -> RefreshOutcome {
        match self.gate.clone().try_acquire_owned() {
            Ok(permit) => run_refresh(&self.session, permit).await,
            Err(_) => {
                tracing::warn!("Manual refresh skipped: refresh already in progress");
                RefreshOutcome::Skipped
            }
        }
    }

    /// Start the tick loop. The first tick fires immediately.
    pub fn start(&self) -> JoinHandle<()> {
        let session = self.session.clone();
        let gate = self.gate.clone();
        let mut stop_rx = self.stop.subscribe();
        let period = self.interval;

        tracing::info!("Starting scheduler, refreshing every {:?}", period);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        break;
                    }
                    _ = interval.tick() => {
                        let permit = match gate.clone().try_acquire_owned() {
                            Ok(p) => p,
                            Err(_) => {
                                tracing::warn!("Skipping refresh tick: previous refresh still running");
                                continue;
                            }
                        };

                        let session = session.clone();
                        tokio::spawn(async move {
                            run_refresh(&session, permit).await;
                        });
                    }
                }
            }

            tracing::info!("Scheduler stopped");
        })
    }

    /// Stop ticking, wait for an in-flight refresh, then flush the cache.
    pub async fn shutdown(&self) {
        let _ = self.stop.send(());
        if let Ok(_permit) = self.gate.acquire().await {
            self.session.persist().await;
        }
    }
}

async fn run_refresh(session: &DashboardSession, _permit: OwnedSemaphorePermit) -> RefreshOutcome {
    match session.refresh(Utc::now()).await {
        Ok(overall) => {
            tracing::info!(
                "Refresh complete: {:?} ({} samples held)",
                overall,
                session.history_len().await
            );
            RefreshOutcome::Completed(overall)
        }
        Err(e) => {
            tracing::error!("Refresh failed: {}", e);
            RefreshOutcome::Failed
        }
    }
}
