//! Visit history log

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::storage::{self, HISTORY_KEY, KeyValueStore};

/// One accepted visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub url: String,
    pub title: String,
    /// Seconds since the Unix epoch
    pub visited_at: u64,
    #[serde(default)]
    pub icon_url: Option<String>,
}

impl HistoryEntry {
    /// Create an entry stamped with the current time
    pub fn now(url: impl Into<String>, title: impl Into<String>) -> Self {
        let visited_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            url: url.into(),
            title: title.into(),
            visited_at,
            icon_url: None,
        }
    }

    pub fn with_icon(mut self, icon_url: Option<String>) -> Self {
        self.icon_url = icon_url;
        self
    }
}

/// Capped, newest-first log of visits across all tabs
pub struct HistoryLog {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
    store: Arc<dyn KeyValueStore>,
}

impl HistoryLog {
    /// Load the log from `store`, trimming it to `capacity`
    pub fn restore(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        let mut entries: VecDeque<HistoryEntry> =
            storage::load_or_default(store.as_ref(), HISTORY_KEY);
        entries.truncate(capacity);
        Self {
            entries,
            capacity,
            store,
        }
    }

    /// Prepend a visit, evicting the oldest entries past capacity
    pub fn record(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
        self.persist();
    }

    /// Entries, newest first
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.persist();
    }

    fn persist(&self) {
        storage::persist(self.store.as_ref(), HISTORY_KEY, &self.entries);
    }
}
