//! Lazily populated pool of live engines

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use super::{EngineEvent, EngineFactory, PageEngine, TabNavigationSink};
use crate::session::TabId;
use crate::snapshot::SnapshotCache;

/// A live engine together with its dedicated sink
#[derive(Clone)]
pub struct EngineHandle {
    pub engine: Arc<dyn PageEngine>,
    pub sink: Arc<TabNavigationSink>,
}

impl EngineHandle {
    pub fn tab_id(&self) -> TabId {
        self.sink.tab_id()
    }
}

struct PoolEntry {
    handle: EngineHandle,
    last_used: u64,
}

/// Engines keyed by tab id
///
/// Engines are created on first access and survive tab switches. When more
/// than `max_resident` are live, the least recently used one (never the one
/// being requested) is discarded; its tab reloads from the persisted URL on
/// the next activation.
pub struct EngineInstancePool {
    factory: Arc<dyn EngineFactory>,
    events: UnboundedSender<EngineEvent>,
    snapshots: Arc<SnapshotCache>,
    entries: HashMap<TabId, PoolEntry>,
    max_resident: usize,
    clock: u64,
}

impl EngineInstancePool {
    pub fn new(
        factory: Arc<dyn EngineFactory>,
        events: UnboundedSender<EngineEvent>,
        snapshots: Arc<SnapshotCache>,
        max_resident: usize,
    ) -> Self {
        Self {
            factory,
            events,
            snapshots,
            entries: HashMap::new(),
            max_resident: max_resident.max(1),
            clock: 0,
        }
    }

    /// Return the engine for `tab_id`, creating it on first access
    pub fn get(&mut self, tab_id: TabId) -> EngineHandle {
        self.clock += 1;
        let now = self.clock;

        if let Some(entry) = self.entries.get_mut(&tab_id) {
            entry.last_used = now;
            return entry.handle.clone();
        }

        let sink = Arc::new(TabNavigationSink::new(tab_id, self.events.clone()));
        let engine = self.factory.create(tab_id, sink.clone());
        let handle = EngineHandle { engine, sink };
        self.entries.insert(
            tab_id,
            PoolEntry {
                handle: handle.clone(),
                last_used: now,
            },
        );
        log::debug!("Created engine for tab {} ({} live)", tab_id, self.entries.len());

        self.evict_excess(tab_id);
        handle
    }

    /// Return the engine for `tab_id` without creating one
    pub fn peek(&self, tab_id: TabId) -> Option<EngineHandle> {
        self.entries.get(&tab_id).map(|e| e.handle.clone())
    }

    /// Tear down the engine for a deleted tab and drop its snapshot
    pub fn remove(&mut self, tab_id: TabId) {
        if let Some(entry) = self.entries.remove(&tab_id) {
            shutdown(&entry.handle);
            log::debug!("Removed engine for tab {}", tab_id);
        }
        self.snapshots.remove(tab_id);
    }

    /// Tear down every engine and drop all snapshots
    pub fn clear_all(&mut self) {
        for (_, entry) in self.entries.drain() {
            shutdown(&entry.handle);
        }
        self.snapshots.clear_all();
        log::info!("Cleared engine pool");
    }

    pub fn contains(&self, tab_id: TabId) -> bool {
        self.entries.contains_key(&tab_id)
    }

    /// Number of live engines
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_excess(&mut self, keep: TabId) {
        while self.entries.len() > self.max_resident {
            let victim = self
                .entries
                .iter()
                .filter(|(id, _)| **id != keep)
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| *id);

            let Some(victim) = victim else {
                break;
            };
            if let Some(entry) = self.entries.remove(&victim) {
                shutdown(&entry.handle);
                log::info!("Suspended idle engine for tab {}", victim);
            }
        }
    }
}

fn shutdown(handle: &EngineHandle) {
    handle.engine.stop_loading();
    handle.engine.clear_content();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ScriptedEngineFactory, ScriptedWeb};
    use tokio::sync::mpsc;

    fn pool(
        max_resident: usize,
    ) -> (EngineInstancePool, Arc<ScriptedEngineFactory>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = Arc::new(SnapshotCache::new(dir.path(), 300, 70));
        let factory = Arc::new(ScriptedEngineFactory::new(Arc::new(ScriptedWeb::new())));
        let (tx, _rx) = mpsc::unbounded_channel();
        let pool = EngineInstancePool::new(factory.clone(), tx, snapshots, max_resident);
        (pool, factory, dir)
    }

    #[test]
    fn test_get_is_idempotent() {
        let (mut pool, factory, _dir) = pool(8);
        let id = TabId::new();

        let first = pool.get(id);
        let second = pool.get(id);
        assert!(Arc::ptr_eq(&first.engine, &second.engine));
        assert!(Arc::ptr_eq(&first.sink, &second.sink));
        assert_eq!(factory.created(), 1);
        assert_eq!(first.tab_id(), id);
    }

    #[test]
    fn test_no_proactive_construction() {
        let (mut pool, factory, _dir) = pool(8);
        pool.get(TabId::new());
        assert_eq!(pool.len(), 1);
        assert!(pool.peek(TabId::new()).is_none());
        assert_eq!(factory.created(), 1);
    }

    #[test]
    fn test_remove_tears_down_engine() {
        let (mut pool, factory, _dir) = pool(8);
        let id = TabId::new();
        let first = pool.get(id);
        first.engine.load("https://example.com/");
        assert!(first.engine.has_content());

        pool.remove(id);
        assert!(!pool.contains(id));
        assert!(!first.engine.has_content());

        let second = pool.get(id);
        assert!(!Arc::ptr_eq(&first.engine, &second.engine));
        assert_eq!(factory.created(), 2);
    }

    #[test]
    fn test_clear_all() {
        let (mut pool, _factory, _dir) = pool(8);
        pool.get(TabId::new());
        pool.get(TabId::new());
        pool.clear_all();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let (mut pool, _factory, _dir) = pool(2);
        let a = TabId::new();
        let b = TabId::new();
        let c = TabId::new();

        pool.get(a);
        pool.get(b);
        pool.get(a);
        pool.get(c);

        assert_eq!(pool.len(), 2);
        assert!(pool.contains(a));
        assert!(!pool.contains(b));
        assert!(pool.contains(c));
    }
}
