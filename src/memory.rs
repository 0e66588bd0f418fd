//! Bounded, newest-first log of activity outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::activity::ActivityResult;
use crate::persistence::{PersistenceError, Persister, MEMORY_KEY};

pub const MEMORY_CAPACITY: usize = 1000;

/// One recorded activity outcome
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryEntry {
    /// Stamped on record when absent
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub activity_type: String,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl MemoryEntry {
    pub fn from_result(activity: &str, result: &ActivityResult) -> Self {
        Self {
            timestamp: result.timestamp,
            activity_type: activity.to_string(),
            success: result.success,
            error: result.error.clone(),
            data: result.data.clone(),
            metadata: result.metadata.clone(),
        }
    }
}

/// Bounded newest-first log of activity outcomes
pub struct MemoryStore {
    entries: Mutex<VecDeque<MemoryEntry>>,
    capacity: usize,
    persister: Arc<Persister>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl MemoryStore {
    /// Load the stored log (if any), trimmed to `capacity`
    pub fn new(persister: Arc<Persister>, capacity: usize) -> Self {
        let mut entries: VecDeque<MemoryEntry> = persister.load(MEMORY_KEY).unwrap_or_default();
        entries.truncate(capacity);
        Self {
            entries: Mutex::new(entries),
            capacity,
            persister,
        }
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<MemoryEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Prepend an entry and persist. The entry stays in memory even when the
    /// write fails.
    pub fn record(&self, mut entry: MemoryEntry) -> Result<(), PersistenceError> {
        if entry.timestamp.is_none() {
            entry.timestamp = Some(Utc::now());
        }

        let mut entries = self.entries();
        entries.push_front(entry);
        entries.truncate(self.capacity);
        self.persister.save(MEMORY_KEY, &*entries)
    }

    /// Newest first
    pub fn recent(&self, limit: usize, offset: usize) -> Vec<MemoryEntry> {
        self.entries()
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Every entry of `activity_type`, newest first
    pub fn by_type(&self, activity_type: &str) -> Vec<MemoryEntry> {
        self.entries()
            .iter()
            .filter(|entry| entry.activity_type == activity_type)
            .cloned()
            .collect()
    }

    /// Entries at or after `cutoff`, in log order. Explicit timestamps may
    /// be back-dated, so the whole log is scanned.
    pub fn since(&self, cutoff: DateTime<Utc>) -> Vec<MemoryEntry> {
        self.entries()
            .iter()
            .filter(|entry| entry.timestamp.is_some_and(|ts| ts >= cutoff))
            .cloned()
            .collect()
    }

    pub fn clear(&self) -> Result<(), PersistenceError> {
        let mut entries = self.entries();
        entries.clear();
        self.persister.save(MEMORY_KEY, &*entries)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;
    use crate::persistence::PersistPolicy;
    use crate::test_support::FailingStore;
    use serde_json::json;

    fn persister() -> Arc<Persister> {
        Arc::new(Persister::new(Arc::new(InMemoryStore::new()), PersistPolicy::Drop))
    }

    fn entry(activity: &str, n: usize) -> MemoryEntry {
        MemoryEntry {
            timestamp: None,
            activity_type: activity.to_string(),
            success: true,
            error: None,
            data: Some(json!({ "n": n })),
            metadata: None,
        }
    }

    #[test]
    fn test_record_stamps_timestamp_and_prepends() {
        let memory = MemoryStore::new(persister(), MEMORY_CAPACITY);
        memory.record(entry("chat", 1)).unwrap();
        memory.record(entry("chat", 2)).unwrap();

        let recent = memory.recent(10, 0);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].data, Some(json!({"n": 2})));
        assert!(recent.iter().all(|e| e.timestamp.is_some()));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let memory = MemoryStore::new(persister(), MEMORY_CAPACITY);
        for n in 0..=MEMORY_CAPACITY {
            memory.record(entry("test", n)).unwrap();
        }

        assert_eq!(memory.len(), MEMORY_CAPACITY);
        let all = memory.recent(usize::MAX, 0);
        assert_eq!(all.first().unwrap().data, Some(json!({"n": MEMORY_CAPACITY})));
        assert_eq!(all.last().unwrap().data, Some(json!({"n": 1})));
        assert!(all.iter().all(|e| e.data != Some(json!({"n": 0}))));
        for pair in all.windows(2) {
            let newer = pair[0].data.as_ref().unwrap()["n"].as_u64().unwrap();
            let older = pair[1].data.as_ref().unwrap()["n"].as_u64().unwrap();
            assert_eq!(newer, older + 1);
        }
    }

    #[test]
    fn test_by_type_filters_in_newest_first_order() {
        let memory = MemoryStore::new(persister(), MEMORY_CAPACITY);
        memory.record(entry("draw", 1)).unwrap();
        memory.record(entry("chat", 2)).unwrap();
        memory.record(entry("draw", 3)).unwrap();
        memory.record(entry("chat", 4)).unwrap();
        memory.record(entry("draw", 5)).unwrap();

        let draws: Vec<u64> = memory
            .by_type("draw")
            .iter()
            .map(|e| e.data.as_ref().unwrap()["n"].as_u64().unwrap())
            .collect();
        assert_eq!(draws, vec![5, 3, 1]);
        assert_eq!(memory.by_type("chat").len(), 2);
    }

    #[test]
    fn test_recent_with_offset() {
        let memory = MemoryStore::new(persister(), MEMORY_CAPACITY);
        for n in 0..5 {
            memory.record(entry("test", n)).unwrap();
        }
        let page: Vec<u64> = memory
            .recent(2, 1)
            .iter()
            .map(|e| e.data.as_ref().unwrap()["n"].as_u64().unwrap())
            .collect();
        assert_eq!(page, vec![3, 2]);
        assert!(memory.recent(10, 10).is_empty());
    }

    #[test]
    fn test_since_stops_at_cutoff() {
        let memory = MemoryStore::new(persister(), MEMORY_CAPACITY);
        let mut old = entry("test", 0);
        old.timestamp = Some(Utc::now() - chrono::Duration::days(2));
        memory.record(old).unwrap();
        memory.record(entry("test", 1)).unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(1);
        assert_eq!(memory.since(cutoff).len(), 1);
    }

    #[test]
    fn test_since_skips_back_dated_entry_at_head() {
        let memory = MemoryStore::new(persister(), MEMORY_CAPACITY);
        memory.record(entry("test", 1)).unwrap();
        memory.record(entry("test", 2)).unwrap();
        let mut imported = entry("test", 3);
        imported.timestamp = Some(Utc::now() - chrono::Duration::days(3));
        memory.record(imported).unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(1);
        let recent: Vec<u64> = memory
            .since(cutoff)
            .iter()
            .map(|e| e.data.as_ref().unwrap()["n"].as_u64().unwrap())
            .collect();
        assert_eq!(recent, vec![2, 1]);
    }

    #[test]
    fn test_log_survives_reload_and_clear_persists() {
        let persister = persister();
        let memory = MemoryStore::new(persister.clone(), MEMORY_CAPACITY);
        memory.record(entry("nap", 1)).unwrap();

        let reloaded = MemoryStore::new(persister.clone(), MEMORY_CAPACITY);
        assert_eq!(reloaded.recent(10, 0), memory.recent(10, 0));

        reloaded.clear().unwrap();
        assert!(reloaded.is_empty());
        assert!(MemoryStore::new(persister, MEMORY_CAPACITY).is_empty());
    }

    #[test]
    fn test_write_failure_keeps_in_memory_log() {
        let dropping = Arc::new(Persister::new(Arc::new(FailingStore::new(usize::MAX)), PersistPolicy::Drop));
        let memory = MemoryStore::new(dropping, MEMORY_CAPACITY);
        assert!(memory.record(entry("chat", 1)).is_ok());
        assert_eq!(memory.len(), 1);

        let propagating = Arc::new(Persister::new(Arc::new(FailingStore::new(usize::MAX)), PersistPolicy::Propagate));
        let memory = MemoryStore::new(propagating, MEMORY_CAPACITY);
        assert!(memory.record(entry("chat", 1)).is_err());
        assert_eq!(memory.len(), 1);
    }
}
