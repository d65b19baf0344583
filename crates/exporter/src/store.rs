use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::sample::unix_now_ns;
use crate::sample::Sample;

/// How often the reaper sweeps expired entries out of the store.
const REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Concurrency-safe map of the most recent sample per identity.
///
/// All mutation and enumeration goes through one mutex. Writers that race on
/// the same identity resolve by lock-acquisition order, not by timestamp; a
/// late out-of-order arrival overwrites a newer one.
#[derive(Debug, Default)]
pub struct SampleStore {
    samples: Mutex<HashMap<String, Sample>>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write or overwrite the entry at the sample's identity.
    pub fn upsert(&self, sample: Sample) {
        let mut samples = self.samples.lock().expect("poisoned");
        samples.insert(sample.id.clone(), sample);
    }

    /// Upsert a whole normalized batch while holding the lock once.
    pub fn ingest(&self, batch: impl IntoIterator<Item = Sample>) {
        let mut samples = self.samples.lock().expect("poisoned");
        for sample in batch {
            samples.insert(sample.id.clone(), sample);
        }
    }

    /// Point-in-time copy of all current entries. The lock is released before
    /// the caller filters by expiry.
    pub fn snapshot(&self) -> Vec<Sample> {
        let samples = self.samples.lock().expect("poisoned");
        samples.values().cloned().collect()
    }

    /// Remove every entry older than `age_limit_ns` and return how many were
    /// evicted.
    pub fn evict_older_than(&self, age_limit_ns: i64) -> usize {
        let mut samples = self.samples.lock().expect("poisoned");
        let before = samples.len();
        samples.retain(|_, sample| sample.timestamp_ns >= age_limit_ns);
        before - samples.len()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().expect("poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Periodic eviction task. Runs until the token is cancelled; each tick takes
/// the store lock for one scan and drops everything past the expiry window.
pub async fn run_reaper(store: Arc<SampleStore>, sample_expiry: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(REAP_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::info!("Reaper task cancelled");
                break;
            }
            _ = ticker.tick() => {
                let age_limit_ns = unix_now_ns() - sample_expiry.as_nanos() as i64;
                let evicted = store.evict_older_than(age_limit_ns);
                if evicted > 0 {
                    tracing::debug!(evicted = evicted, remaining = store.len(), "Evicted expired samples");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;
    use crate::sample::Sample;

    fn sample(name: &str, value: f64, timestamp_ns: i64) -> Sample {
        Sample::new(name.to_string(), HashMap::new(), value, timestamp_ns)
    }

    #[test]
    fn upsert_with_same_identity_keeps_last_writer() {
        let store = SampleStore::new();
        store.upsert(sample("cpu", 1.0, 100));
        store.upsert(sample("cpu", 2.0, 50));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        // Last lock acquisition wins even though its timestamp is older.
        assert_eq!(snapshot[0].value, 2.0);
        assert_eq!(snapshot[0].timestamp_ns, 50);
    }

    #[test]
    fn upsert_with_distinct_identities_keeps_both() {
        let store = SampleStore::new();
        store.upsert(sample("cpu", 1.0, 100));
        store.upsert(sample("mem", 2.0, 100));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn ingest_stores_whole_batch() {
        let store = SampleStore::new();
        store.ingest(vec![
            sample("cpu", 1.0, 100),
            sample("mem", 2.0, 100),
            sample("cpu", 3.0, 100),
        ]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn evict_removes_only_entries_past_the_limit() {
        let store = SampleStore::new();
        store.upsert(sample("old", 1.0, 10));
        store.upsert(sample("boundary", 2.0, 100));
        store.upsert(sample("fresh", 3.0, 200));

        let evicted = store.evict_older_than(100);
        assert_eq!(evicted, 1);

        let mut names: Vec<String> = store.snapshot().into_iter().map(|s| s.name).collect();
        names.sort();
        assert_eq!(names, ["boundary", "fresh"]);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let store = SampleStore::new();
        store.upsert(sample("cpu", 1.0, 100));
        let snapshot = store.snapshot();
        store.upsert(sample("cpu", 2.0, 200));
        assert_eq!(snapshot[0].value, 1.0);
    }

    #[tokio::test]
    async fn concurrent_upserts_land_in_one_entry_per_identity() {
        let store = Arc::new(SampleStore::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..100 {
                    store.upsert(sample("cpu", (i * 100 + j) as f64, 100));
                    store.upsert(sample("mem", j as f64, 100));
                }
            }));
        }
        for handle in handles {
            handle.await.expect("task");
        }
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn reaper_stops_on_cancellation() {
        let store = Arc::new(SampleStore::new());
        let token = CancellationToken::new();
        let task = tokio::spawn(run_reaper(store, Duration::from_secs(300), token.clone()));
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("reaper should exit promptly")
            .expect("task");
    }
}
