//! Tab registry

use std::sync::Arc;

use tokio::sync::watch;

use super::tab::{DEFAULT_TAB_TITLE, TabId, TabRecord};
use crate::storage::{self, ACTIVE_TAB_KEY, KeyValueStore, TABS_KEY};

/// Published view of the session: display-ordered tabs plus the active id
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub tabs: Vec<TabRecord>,
    pub active_id: TabId,
}

/// Ordered, persisted list of tabs
///
/// The list is never empty and `active_id` always names a record in it.
/// Every mutation writes the full table through to the store.
pub struct TabRegistry {
    tabs: Vec<TabRecord>,
    active_id: TabId,
    store: Arc<dyn KeyValueStore>,
    state: watch::Sender<SessionState>,
}

impl TabRegistry {
    /// Restore the session from `store`, repairing it if needed
    ///
    /// An empty (or unreadable) table yields one blank active tab; a dangling
    /// active id is pointed at the first tab.
    pub fn restore(store: Arc<dyn KeyValueStore>) -> Self {
        let mut tabs: Vec<TabRecord> = storage::load_or_default(store.as_ref(), TABS_KEY);
        let stored_active: Option<TabId> = storage::load_or_default(store.as_ref(), ACTIVE_TAB_KEY);

        let mut repaired = false;
        if tabs.is_empty() {
            tabs.push(TabRecord::new(DEFAULT_TAB_TITLE, ""));
            repaired = true;
        }

        let active_id = match stored_active {
            Some(id) if tabs.iter().any(|t| t.id == id) => id,
            _ => {
                repaired = true;
                tabs[0].id
            }
        };

        let (state, _) = watch::channel(SessionState {
            tabs: tabs.clone(),
            active_id,
        });

        let registry = Self {
            tabs,
            active_id,
            store,
            state,
        };

        if repaired {
            registry.persist();
        }
        log::info!("Restored {} tab(s), active {}", registry.tabs.len(), active_id);
        registry
    }

    /// Append a new tab (not activated) and return it
    pub fn create(&mut self, title: &str, url: &str) -> TabRecord {
        let record = TabRecord::new(title, url);
        self.tabs.push(record.clone());
        log::debug!("Created tab {} ({:?})", record.id, url);
        self.persist();
        record
    }

    /// Make `id` the active tab; unknown ids are ignored
    pub fn set_active(&mut self, id: TabId) -> bool {
        if !self.contains(id) {
            log::warn!("set_active: unknown tab {}", id);
            return false;
        }
        self.active_id = id;
        self.persist();
        true
    }

    /// Remove a tab
    ///
    /// Deleting the active tab activates the first remaining one; deleting
    /// the last tab leaves a single fresh blank tab.
    pub fn delete(&mut self, id: TabId) -> bool {
        let Some(index) = self.position(id) else {
            log::warn!("delete: unknown tab {}", id);
            return false;
        };
        self.tabs.remove(index);

        if self.tabs.is_empty() {
            let blank = TabRecord::blank();
            self.active_id = blank.id;
            self.tabs.push(blank);
        } else if self.active_id == id {
            self.active_id = self.tabs[0].id;
        }

        log::debug!("Deleted tab {}, active now {}", id, self.active_id);
        self.persist();
        true
    }

    /// Record a completed navigation on a tab
    pub fn update_navigation(&mut self, id: TabId, url: &str, title: &str) -> bool {
        let Some(index) = self.position(id) else {
            log::warn!("update_navigation: unknown tab {}", id);
            return false;
        };
        self.tabs[index].record_visit(url, title);
        // Whole-table write on every visit
        self.persist();
        true
    }

    /// Drop every tab, leaving one blank active tab
    pub fn clear_all(&mut self) {
        let blank = TabRecord::blank();
        self.active_id = blank.id;
        self.tabs.clear();
        self.tabs.push(blank);
        log::info!("Cleared all tabs");
        self.persist();
    }

    /// All tabs in display order
    pub fn tabs(&self) -> &[TabRecord] {
        &self.tabs
    }

    /// Ids of all tabs in display order
    pub fn ids(&self) -> Vec<TabId> {
        self.tabs.iter().map(|t| t.id).collect()
    }

    pub fn active_id(&self) -> TabId {
        self.active_id
    }

    /// The active tab record
    pub fn active(&self) -> &TabRecord {
        // `active_id` always names a record; the fallback only guards the type
        self.get(self.active_id).unwrap_or(&self.tabs[0])
    }

    pub fn get(&self, id: TabId) -> Option<&TabRecord> {
        self.tabs.iter().find(|t| t.id == id)
    }

    pub fn contains(&self, id: TabId) -> bool {
        self.position(id).is_some()
    }

    /// Number of tabs (always at least one)
    pub fn count(&self) -> usize {
        self.tabs.len()
    }

    /// Watch the session for changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn position(&self, id: TabId) -> Option<usize> {
        self.tabs.iter().position(|t| t.id == id)
    }

    fn persist(&self) {
        storage::persist(self.store.as_ref(), TABS_KEY, &self.tabs);
        storage::persist(self.store.as_ref(), ACTIVE_TAB_KEY, &self.active_id);
        self.state.send_replace(SessionState {
            tabs: self.tabs.clone(),
            active_id: self.active_id,
        });
    }
}
