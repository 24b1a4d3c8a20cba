//! Rolling per-entity history
//!
//! Each scorer owns one store and is the only writer for its entities.
//! Eviction is lazy: writes prune the written entity, reads filter by the
//! window, and `purge` sweeps every entity on demand. There is no timer.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};

/// Anything stored in a history buffer carries its sample time
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Time-windowed, optionally length-capped sample buffers keyed by entity id
#[derive(Debug, Clone)]
pub struct HistoryStore<T> {
    entries: HashMap<String, VecDeque<T>>,
    window: Duration,
    max_samples: Option<usize>,
}

impl<T: Timestamped> HistoryStore<T> {
    /// Create a store retaining samples newer than `window`
    pub fn new(window: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            window,
            max_samples: None,
        }
    }

    /// Also cap each entity's buffer, dropping the oldest first
    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = Some(max_samples.max(1));
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Append a sample for `entity`, evicting expired and overflow samples
    pub fn record(&mut self, entity: &str, sample: T, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        let buffer = self.entries.entry(entity.to_string()).or_default();

        while buffer.front().is_some_and(|s| s.timestamp() < cutoff) {
            buffer.pop_front();
        }

        buffer.push_back(sample);

        if let Some(max) = self.max_samples {
            while buffer.len() > max {
                buffer.pop_front();
            }
        }
    }

    /// Samples within the window, oldest first
    pub fn samples(&self, entity: &str, now: DateTime<Utc>) -> Vec<&T> {
        self.samples_since(entity, now - self.window)
    }

    /// Samples at or after `since`, oldest first
    ///
    /// `since` is taken as given; only `samples` bounds a read by the window.
    pub fn samples_since(&self, entity: &str, since: DateTime<Utc>) -> Vec<&T> {
        let Some(buffer) = self.entries.get(entity) else {
            return Vec::new();
        };
        buffer.iter().filter(|s| s.timestamp() >= since).collect()
    }

    /// Most recent sample regardless of age
    pub fn latest(&self, entity: &str) -> Option<&T> {
        self.entries.get(entity).and_then(|b| b.back())
    }

    /// Drop every sample older than the window across all entities
    ///
    /// Returns the number of samples removed. Entities left empty are forgotten.
    pub fn purge(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        let mut removed = 0;

        for buffer in self.entries.values_mut() {
            let before = buffer.len();
            buffer.retain(|s| s.timestamp() >= cutoff);
            removed += before - buffer.len();
        }

        self.entries.retain(|_, buffer| !buffer.is_empty());
        removed
    }

    /// Number of entities with at least one stored sample
    pub fn entity_count(&self) -> usize {
        self.entries.len()
    }

    /// Stored sample count for one entity, including not-yet-evicted ones
    pub fn stored_len(&self, entity: &str) -> usize {
        self.entries.get(entity).map_or(0, |b| b.len())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Sample {
        at: DateTime<Utc>,
        value: f64,
    }

    impl Timestamped for Sample {
        fn timestamp(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[test]
    fn test_window_eviction_on_write() {
        let t0 = Utc::now();
        let mut store = HistoryStore::new(Duration::hours(24));

        store.record("a", Sample { at: t0, value: 1.0 }, t0);
        store.record(
            "a",
            Sample {
                at: t0 + Duration::hours(12),
                value: 2.0,
            },
            t0 + Duration::hours(12),
        );

        let later = t0 + Duration::hours(25);
        store.record("a", Sample { at: later, value: 3.0 }, later);

        assert_eq!(store.stored_len("a"), 2);
        let values: Vec<f64> = store.samples("a", later).iter().map(|s| s.value).collect();
        assert_eq!(values, vec![2.0, 3.0]);
    }

    #[test]
    fn test_reads_never_return_expired() {
        let t0 = Utc::now();
        let mut store = HistoryStore::new(Duration::hours(1));
        store.record("a", Sample { at: t0, value: 1.0 }, t0);

        // Not written since, but reads filter by window
        assert_eq!(store.samples("a", t0 + Duration::hours(2)).len(), 0);
        assert_eq!(store.stored_len("a"), 1);
        assert!(store.latest("a").is_some());
    }

    #[test]
    fn test_samples_since_uses_cutoff_as_given() {
        let t0 = Utc::now();
        let mut store = HistoryStore::new(Duration::hours(1));
        store.record("a", Sample { at: t0, value: 1.0 }, t0);
        let next = t0 + Duration::minutes(30);
        store.record("a", Sample { at: next, value: 2.0 }, next);

        // No write since; the first sample is stored but past the window
        let read_at = t0 + Duration::minutes(80);
        assert_eq!(store.samples("a", read_at).len(), 1);
        assert_eq!(store.samples_since("a", t0).len(), 2);
    }

    #[test]
    fn test_max_samples_drops_oldest() {
        let t0 = Utc::now();
        let mut store = HistoryStore::new(Duration::hours(24)).with_max_samples(3);

        for i in 0..5 {
            let at = t0 + Duration::minutes(i);
            store.record("a", Sample { at, value: i as f64 }, at);
        }

        let values: Vec<f64> = store
            .samples("a", t0 + Duration::minutes(5))
            .iter()
            .map(|s| s.value)
            .collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_purge_sweeps_all_entities() {
        let t0 = Utc::now();
        let mut store = HistoryStore::new(Duration::hours(72));
        store.record("old", Sample { at: t0, value: 1.0 }, t0);
        let fresh = t0 + Duration::hours(70);
        store.record("fresh", Sample { at: fresh, value: 1.0 }, fresh);

        let removed = store.purge(t0 + Duration::hours(73));
        assert_eq!(removed, 1);
        assert_eq!(store.entity_count(), 1);
        assert_eq!(store.stored_len("old"), 0);
    }
}
