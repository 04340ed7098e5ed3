//! In-memory per-service sample history.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;

use super::models::{Sample, ServiceId};

/// Persisted shape of the history: slug -> samples, oldest first.
pub type HistoryMap = BTreeMap<ServiceId, Vec<Sample>>;

/// Append-only, per-service sample windows ordered by timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryStore {
    windows: HistoryMap,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a persisted map. Windows are re-sorted since the
    /// record may have been written by something else.
    pub fn from_map(mut windows: HistoryMap) -> Self {
        for samples in windows.values_mut() {
            samples.sort_by_key(|s| s.time);
        }
        windows.retain(|_, samples| !samples.is_empty());
        Self { windows }
    }

    pub fn as_map(&self) -> &HistoryMap {
        &self.windows
    }

    /// Insert a sample in timestamp order. Equal timestamps are kept; the new
    /// sample lands after existing ones with the same time.
    pub fn append(&mut self, id: &ServiceId, sample: Sample) {
        let window = self.windows.entry(id.clone()).or_default();
        let pos = window.partition_point(|s| s.time <= sample.time);
        window.insert(pos, sample);
    }

    /// Append samples the window does not already hold.
    ///
    /// Sources that resend their whole series every tick go through here. A
    /// sample counts as held only when an identical one (time, status and
    /// response time) is present, so late points older than the newest sample
    /// still land. Returns how many samples were added.
    pub fn append_unseen(&mut self, id: &ServiceId, samples: impl IntoIterator<Item = Sample>) -> usize {
        let mut added = 0;
        for sample in samples {
            if !self.contains(id, &sample) {
                self.append(id, sample);
                added += 1;
            }
        }
        added
    }

    fn contains(&self, id: &ServiceId, sample: &Sample) -> bool {
        let window = self.window(id);
        let from = window.partition_point(|s| s.time < sample.time);
        window[from..]
            .iter()
            .take_while(|s| s.time == sample.time)
            .any(|s| s == sample)
    }

    /// Drop samples older than `now - horizon`. Returns the number removed.
    pub fn prune(&mut self, id: &ServiceId, horizon: ChronoDuration, now: DateTime<Utc>) -> usize {
        let cutoff = now - horizon;
        let Some(window) = self.windows.get_mut(id) else {
            return 0;
        };

        // Sorted, so everything before the first in-horizon sample goes.
        let keep_from = window.partition_point(|s| s.time < cutoff);
        window.drain(..keep_from);
        if window.is_empty() {
            self.windows.remove(id);
        }
        keep_from
    }

    /// Read-only view of a service's window, oldest first.
    pub fn window(&self, id: &ServiceId) -> &[Sample] {
        self.windows.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn service_ids(&self) -> impl Iterator<Item = &ServiceId> {
        self.windows.keys()
    }

    pub fn len(&self) -> usize {
        self.windows.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn test_append_keeps_timestamp_order() {
        let id = ServiceId::new("api");
        let mut store = HistoryStore::new();
        store.append(&id, Sample::up(at(10, 0), 100));
        store.append(&id, Sample::up(at(8, 0), 80));
        store.append(&id, Sample::down(at(9, 0), 0));
        store.append(&id, Sample::up(at(9, 0), 90));

        let times: Vec<_> = store.window(&id).iter().map(|s| s.time).collect();
        assert_eq!(times, vec![at(8, 0), at(9, 0), at(9, 0), at(10, 0)]);
        // Duplicate timestamps are both retained, in arrival order.
        assert_eq!(store.window(&id)[1].status, crate::db::Status::Down);
        assert_eq!(store.window(&id)[2].response_time, 90);
    }

    #[test]
    fn test_append_unseen_skips_replayed_samples() {
        let id = ServiceId::new("web");
        let mut store = HistoryStore::new();
        let series = vec![Sample::up(at(1, 0), 10), Sample::up(at(2, 0), 20)];
        assert_eq!(store.append_unseen(&id, series.clone()), 2);

        let mut replay = series;
        replay.push(Sample::up(at(3, 0), 30));
        assert_eq!(store.append_unseen(&id, replay), 1);
        assert_eq!(store.window(&id).len(), 3);
    }

    #[test]
    fn test_append_unseen_keeps_late_points() {
        let id = ServiceId::new("web");
        let mut store = HistoryStore::new();
        // First tick: one series point plus the current sample at 12:00.
        store.append_unseen(&id, vec![Sample::up(at(11, 0), 110), Sample::up(at(12, 0), 120)]);

        // Next tick the series has grown a point from before that sample.
        let added = store.append_unseen(
            &id,
            vec![Sample::up(at(11, 0), 110), Sample::up(at(11, 58), 115), Sample::up(at(12, 1), 121)],
        );
        assert_eq!(added, 2);

        let times: Vec<_> = store.window(&id).iter().map(|s| s.time).collect();
        assert_eq!(times, vec![at(11, 0), at(11, 58), at(12, 0), at(12, 1)]);
    }

    #[test]
    fn test_append_unseen_keeps_distinct_samples_at_same_time() {
        let id = ServiceId::new("web");
        let mut store = HistoryStore::new();
        store.append_unseen(&id, vec![Sample::up(at(9, 0), 90)]);
        assert_eq!(store.append_unseen(&id, vec![Sample::down(at(9, 0), 0)]), 1);
        assert_eq!(store.append_unseen(&id, vec![Sample::down(at(9, 0), 0)]), 0);
        assert_eq!(store.window(&id).len(), 2);
    }

    #[test]
    fn test_prune_respects_horizon() {
        let id = ServiceId::new("web");
        let now = Utc.with_ymd_and_hms(2024, 3, 11, 12, 0, 0).unwrap();
        let mut store = HistoryStore::new();
        store.append(&id, Sample::up(now - ChronoDuration::hours(30), 1));
        store.append(&id, Sample::up(now - ChronoDuration::hours(24) - ChronoDuration::seconds(1), 2));
        store.append(&id, Sample::up(now - ChronoDuration::hours(24), 3));
        store.append(&id, Sample::up(now - ChronoDuration::hours(1), 4));

        let removed = store.prune(&id, ChronoDuration::hours(24), now);
        assert_eq!(removed, 2);

        let cutoff = now - ChronoDuration::hours(24);
        assert!(store.window(&id).iter().all(|s| s.time >= cutoff));
        let kept: Vec<_> = store.window(&id).iter().map(|s| s.response_time).collect();
        assert_eq!(kept, vec![3, 4]);
    }

    #[test]
    fn test_prune_unknown_service_is_noop() {
        let mut store = HistoryStore::new();
        assert_eq!(store.prune(&ServiceId::new("nope"), ChronoDuration::hours(1), at(0, 0)), 0);
        assert!(store.window(&ServiceId::new("nope")).is_empty());
    }

    #[test]
    fn test_from_map_sorts_windows() {
        let id = ServiceId::new("db");
        let mut map = HistoryMap::new();
        map.insert(id.clone(), vec![Sample::up(at(5, 0), 5), Sample::up(at(4, 0), 4)]);
        map.insert(ServiceId::new("empty"), vec![]);

        let store = HistoryStore::from_map(map);
        assert_eq!(store.window(&id).last().map(|s| s.response_time), Some(5));
        assert_eq!(store.service_ids().count(), 1);
    }
}
