//! Retention for the in-memory history.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::db::{HistoryStore, ServiceId};

/// How long samples stay in the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub horizon: ChronoDuration,
}

impl RetentionPolicy {
    pub fn new(horizon: ChronoDuration) -> Self {
        Self { horizon }
    }
}

/// Prune every service window. Returns the number of samples dropped.
pub fn process_retention(history: &mut HistoryStore, policy: &RetentionPolicy, now: DateTime<Utc>) -> usize {
    let ids: Vec<ServiceId> = history.service_ids().cloned().collect();
    let mut removed = 0;

    for id in ids {
        let n = history.prune(&id, policy.horizon, now);
        if n > 0 {
            tracing::debug!("Retention: dropped {} samples for {}", n, id);
        }
        removed += n;
    }

    removed
}
