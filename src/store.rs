//! Bounded activity store
//!
//! Append-only FIFO history of activity records. The store is owned by the
//! decision engine; readers elsewhere get an [`ActivityView`], a read-only
//! handle that always sees the latest published snapshot.
//!
//! The suspicious subset is never stored separately: it is filtered out of
//! the main log on demand, so it shares the log's capacity and eviction.

use crate::types::{ActivityRecord, ThreatLevel};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;

type Snapshot = Arc<Vec<Arc<ActivityRecord>>>;

/// Record counts by threat level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatCounts {
    pub total: u64,
    pub low: u64,
    pub medium: u64,
    pub high: u64,
    pub critical: u64,
    /// Records without a classification
    pub unclassified: u64,
}

impl ThreatCounts {
    fn tally<'a>(records: impl Iterator<Item = &'a Arc<ActivityRecord>>) -> Self {
        let mut counts = Self::default();
        for record in records {
            counts.total += 1;
            match record.threat_level() {
                Some(ThreatLevel::Low) => counts.low += 1,
                Some(ThreatLevel::Medium) => counts.medium += 1,
                Some(ThreatLevel::High) => counts.high += 1,
                Some(ThreatLevel::Critical) => counts.critical += 1,
                None => counts.unclassified += 1,
            }
        }
        counts
    }

    /// High plus critical
    pub fn suspicious(&self) -> u64 {
        self.high + self.critical
    }
}

/// Bounded, insertion-ordered activity log
pub struct ActivityStore {
    records: VecDeque<Arc<ActivityRecord>>,
    capacity: usize,
    published: watch::Sender<Snapshot>,
}

impl ActivityStore {
    /// Create an empty store holding at most `capacity` records
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (published, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            published,
        }
    }

    /// Append a record, evicting the oldest once over capacity
    pub(crate) fn append(&mut self, record: ActivityRecord) -> Arc<ActivityRecord> {
        let record = Arc::new(record);
        self.records.push_back(record.clone());

        while self.records.len() > self.capacity {
            if let Some(evicted) = self.records.pop_front() {
                tracing::debug!(
                    request_id = %evicted.event.request_id,
                    capacity = self.capacity,
                    "Activity record evicted"
                );
            }
        }

        self.publish();
        record
    }

    /// Replace the contents with previously persisted records
    ///
    /// Keeps the newest `capacity` records when more were persisted.
    pub(crate) fn restore(&mut self, records: Vec<ActivityRecord>) {
        let skip = records.len().saturating_sub(self.capacity);
        self.records = records.into_iter().skip(skip).map(Arc::new).collect();
        self.publish();
    }

    /// All records, oldest first
    pub fn snapshot(&self) -> Vec<Arc<ActivityRecord>> {
        self.records.iter().cloned().collect()
    }

    /// High and critical records, oldest first
    pub fn suspicious_snapshot(&self) -> Vec<Arc<ActivityRecord>> {
        self.records
            .iter()
            .filter(|r| r.is_suspicious())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn counts(&self) -> ThreatCounts {
        ThreatCounts::tally(self.records.iter())
    }

    /// Read-only handle that follows every mutation
    pub fn view(&self) -> ActivityView {
        ActivityView {
            rx: self.published.subscribe(),
        }
    }

    fn publish(&self) {
        self.published.send_replace(Arc::new(self.snapshot()));
    }
}

/// Read-only view of the activity store
///
/// Cheap to clone; usable from any context.
#[derive(Clone)]
pub struct ActivityView {
    rx: watch::Receiver<Snapshot>,
}

impl ActivityView {
    /// All records, oldest first
    pub fn snapshot(&self) -> Vec<Arc<ActivityRecord>> {
        self.rx.borrow().to_vec()
    }

    /// High and critical records, oldest first
    pub fn suspicious_snapshot(&self) -> Vec<Arc<ActivityRecord>> {
        self.rx
            .borrow()
            .iter()
            .filter(|r| r.is_suspicious())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.borrow().is_empty()
    }

    pub fn counts(&self) -> ThreatCounts {
        ThreatCounts::tally(self.rx.borrow().iter())
    }

    /// Wait for the next mutation
    ///
    /// Returns `false` once the owning store has been dropped.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Capability, ClassificationResult, PageOrigin, PermissionEvent};
    use std::collections::BTreeSet;

    fn record(level: Option<ThreatLevel>) -> ActivityRecord {
        let origin = PageOrigin::from_url("https://example.com/").unwrap();
        let event = PermissionEvent::pending(Capability::Camera, &origin);
        let classification = level.map(|threat_level| ClassificationResult {
            threat_level,
            anomaly_score: 0.5,
            reason: "test".to_string(),
            triggered_layers: BTreeSet::new(),
        });
        ActivityRecord::new(event, classification, None)
    }

    #[test]
    fn test_snapshot_keeps_last_capacity_in_order() {
        let mut store = ActivityStore::new(500);
        let mut ids = Vec::new();

        for _ in 0..737 {
            let r = store.append(record(Some(ThreatLevel::Low)));
            ids.push(r.event.request_id.clone());
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 500);
        let snapshot_ids: Vec<_> = snapshot.iter().map(|r| r.event.request_id.clone()).collect();
        assert_eq!(snapshot_ids, ids[ids.len() - 500..].to_vec());
    }

    #[test]
    fn test_501st_append_evicts_first() {
        let mut store = ActivityStore::new(500);
        let first = store.append(record(None));
        for _ in 0..499 {
            store.append(record(None));
        }
        assert_eq!(store.len(), 500);
        assert_eq!(store.snapshot()[0].event.request_id, first.event.request_id);

        store.append(record(None));
        assert_eq!(store.len(), 500);
        assert!(store
            .snapshot()
            .iter()
            .all(|r| r.event.request_id != first.event.request_id));
    }

    #[test]
    fn test_suspicious_is_derived_from_log() {
        let mut store = ActivityStore::new(3);
        let high = store.append(record(Some(ThreatLevel::High)));
        store.append(record(Some(ThreatLevel::Medium)));
        let critical = store.append(record(Some(ThreatLevel::Critical)));

        let suspicious = store.suspicious_snapshot();
        assert_eq!(suspicious.len(), 2);
        assert_eq!(suspicious[0].event.request_id, high.event.request_id);
        assert_eq!(suspicious[1].event.request_id, critical.event.request_id);

        // evicting the high record from the log removes it from the subset
        store.append(record(Some(ThreatLevel::Low)));
        let suspicious = store.suspicious_snapshot();
        assert_eq!(suspicious.len(), 1);
        assert_eq!(suspicious[0].event.request_id, critical.event.request_id);
    }

    #[test]
    fn test_counts() {
        let mut store = ActivityStore::new(10);
        store.append(record(Some(ThreatLevel::Low)));
        store.append(record(Some(ThreatLevel::High)));
        store.append(record(Some(ThreatLevel::Critical)));
        store.append(record(None));

        let counts = store.counts();
        assert_eq!(counts.total, 4);
        assert_eq!(counts.low, 1);
        assert_eq!(counts.unclassified, 1);
        assert_eq!(counts.suspicious(), 2);
    }

    #[test]
    fn test_restore_keeps_newest() {
        let mut store = ActivityStore::new(2);
        let records: Vec<_> = (0..3).map(|_| record(None)).collect();
        let newest: Vec<_> = records[1..].iter().map(|r| r.event.request_id.clone()).collect();

        store.restore(records);
        let ids: Vec<_> = store.snapshot().iter().map(|r| r.event.request_id.clone()).collect();
        assert_eq!(ids, newest);
    }

    #[tokio::test]
    async fn test_view_follows_mutations() {
        let mut store = ActivityStore::new(10);
        let mut view = store.view();
        assert!(view.is_empty());

        store.append(record(Some(ThreatLevel::Critical)));
        assert!(view.changed().await);
        assert_eq!(view.len(), 1);
        assert_eq!(view.suspicious_snapshot().len(), 1);
        assert_eq!(view.counts().critical, 1);

        drop(store);
        assert!(!view.changed().await);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut store = ActivityStore::new(0);
        store.append(record(None));
        store.append(record(None));
        assert_eq!(store.capacity(), 1);
        assert_eq!(store.len(), 1);
    }
}
