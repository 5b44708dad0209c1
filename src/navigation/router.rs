//! Navigation router
//!
//! Owns the session: the tab registry, the engine pool and the visit log.
//! Presentation-layer intents come in as method calls; engine lifecycle
//! events come in over the pool's event channel. Exactly one engine handle
//! is bound as the active one at any time, and back/forward/reload always
//! dispatch through it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::address::normalize_address;
use super::filter::HistoryFilter;
use super::toolbar::{ToolbarController, ToolbarVisibility};
use crate::config::SessionConfig;
use crate::engine::{EngineEvent, EngineFactory, EngineHandle, EngineInstancePool, PageMetadata};
use crate::favicon::{FaviconCache, SiteImage};
use crate::session::{DEFAULT_TAB_TITLE, HistoryEntry, HistoryLog, SessionState, TabId, TabRegistry};
use crate::snapshot::{Snapshot, SnapshotCache};
use crate::storage::KeyValueStore;

/// What the presentation layer shows for the active tab
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationState {
    pub current_url: String,
    pub title: String,
    pub can_go_back: bool,
    pub can_go_forward: bool,
    /// Load progress in `0.0..=1.0`
    pub progress: f64,
    pub is_loading: bool,
    /// Set by an explicit reload until it finishes or fails
    pub is_refreshing: bool,
    /// Transient, non-fatal message such as a load failure
    pub notice: Option<String>,
}

pub struct NavigationRouter {
    registry: TabRegistry,
    history: HistoryLog,
    pool: EngineInstancePool,
    snapshots: Arc<SnapshotCache>,
    favicons: FaviconCache,
    filter: HistoryFilter,
    toolbar: ToolbarController,
    search_template: String,
    /// The single active engine/sink binding
    active: Option<EngineHandle>,
    events: UnboundedReceiver<EngineEvent>,
    state: watch::Sender<NavigationState>,
    toolbar_state: watch::Sender<ToolbarVisibility>,
    prefetches: Vec<JoinHandle<()>>,
}

impl NavigationRouter {
    /// Restore the session from `store` and activate its active tab
    pub fn new(
        config: &SessionConfig,
        store: Arc<dyn KeyValueStore>,
        factory: Arc<dyn EngineFactory>,
        snapshots: Arc<SnapshotCache>,
        favicons: FaviconCache,
    ) -> Self {
        let registry = TabRegistry::restore(store.clone());
        let history = HistoryLog::restore(store, config.history.capacity);
        let (events_tx, events) = mpsc::unbounded_channel();
        let pool = EngineInstancePool::new(
            factory,
            events_tx,
            snapshots.clone(),
            config.max_resident_engines,
        );
        let (state, _) = watch::channel(NavigationState::default());
        let (toolbar_state, _) = watch::channel(ToolbarVisibility::Visible);

        let mut router = Self {
            registry,
            history,
            pool,
            snapshots,
            favicons,
            filter: HistoryFilter::from_config(&config.history),
            toolbar: ToolbarController::new(config.toolbar.clone()),
            search_template: config.search.template.clone(),
            active: None,
            events,
            state,
            toolbar_state,
            prefetches: Vec::new(),
        };
        router.activate(router.registry.active_id());
        router
    }

    /// Load persisted snapshots, dropping those of tabs that no longer exist
    pub async fn restore_snapshots(&self) -> usize {
        let loaded = self.snapshots.load_all().await;
        let live: HashSet<TabId> = self.registry.ids().into_iter().collect();
        self.snapshots.retain(&live);
        loaded
    }

    // Intents

    /// Open a new tab on `url` (may be empty) and switch to it
    pub fn create_tab(&mut self, url: &str) -> TabId {
        let record = self.registry.create(DEFAULT_TAB_TITLE, url);
        self.switch_tab(record.id);
        record.id
    }

    /// Close a tab and tear down its engine
    pub fn delete_tab(&mut self, tab_id: TabId) -> bool {
        if !self.registry.contains(tab_id) {
            log::warn!("delete_tab: unknown tab {}", tab_id);
            return false;
        }
        let was_active = self.registry.active_id() == tab_id;

        self.pool.remove(tab_id);
        self.registry.delete(tab_id);
        if self.active_tab() == Some(tab_id) {
            self.active = None;
        }

        if was_active {
            self.activate(self.registry.active_id());
        }
        true
    }

    /// Make `tab_id` the active tab
    pub fn switch_tab(&mut self, tab_id: TabId) -> bool {
        if !self.registry.set_active(tab_id) {
            return false;
        }
        self.activate(tab_id);
        true
    }

    pub fn go_back(&mut self) {
        let handle = self.active_handle();
        if handle.engine.can_go_back() {
            handle.engine.go_back();
        }
        self.sync_from_active();
    }

    pub fn go_forward(&mut self) {
        let handle = self.active_handle();
        if handle.engine.can_go_forward() {
            handle.engine.go_forward();
        }
        self.sync_from_active();
    }

    pub fn reload(&mut self) {
        let handle = self.active_handle();
        if !handle.engine.has_content() {
            return;
        }
        self.state.send_modify(|state| {
            state.is_refreshing = true;
            state.notice = None;
        });
        handle.engine.reload();
        self.sync_from_active();
    }

    pub fn stop(&mut self) {
        self.active_handle().engine.stop_loading();
        self.state.send_modify(|state| {
            state.is_loading = false;
            state.is_refreshing = false;
        });
        self.sync_from_active();
    }

    /// Load address-bar text in the active tab
    ///
    /// Returns the URL actually loaded, or `None` for blank input.
    pub fn load_url(&mut self, text: &str) -> Option<String> {
        let url = normalize_address(text, &self.search_template)?;
        let handle = self.active_handle();

        self.toolbar.reset();
        self.publish_toolbar();
        self.state.send_modify(|state| state.notice = None);

        log::info!("Loading {} in tab {}", url, handle.tab_id());
        handle.engine.load(&url);
        self.sync_from_active();
        Some(url)
    }

    /// Close every tab, leaving a single blank one
    pub fn clear_all_tabs(&mut self) {
        self.active = None;
        self.pool.clear_all();
        self.registry.clear_all();
        self.activate(self.registry.active_id());
    }

    /// Forward a scroll callback from the active page
    pub fn scroll(
        &mut self,
        offset: f64,
        content_height: f64,
        viewport_height: f64,
    ) -> ToolbarVisibility {
        let visibility = self.toolbar.on_scroll(offset, content_height, viewport_height);
        self.publish_toolbar();
        visibility
    }

    pub fn dismiss_notice(&mut self) {
        self.state.send_modify(|state| state.notice = None);
    }

    // Engine events

    /// Apply one engine event
    pub async fn handle_event(&mut self, event: EngineEvent) {
        let tab_id = event.tab_id();
        if !self.pool.contains(tab_id) {
            log::debug!("Ignoring event for tab {} without a live engine", tab_id);
            return;
        }
        let is_active = self.active_tab() == Some(tab_id);

        match event {
            EngineEvent::Started { url, .. } => {
                log::debug!("Tab {} started {}", tab_id, url);
                if is_active {
                    // Engine-initiated navigations (link taps) also start a new page
                    if self.state.borrow().current_url != url {
                        self.toolbar.reset();
                        self.publish_toolbar();
                    }
                    self.state.send_modify(|state| {
                        state.is_loading = true;
                        state.notice = None;
                    });
                    self.sync_from_active();
                }
            }
            EngineEvent::Progress { progress, .. } => {
                if is_active {
                    self.state.send_modify(|state| state.progress = progress);
                }
            }
            EngineEvent::Finished { url, .. } => {
                if is_active {
                    self.state.send_modify(|state| {
                        state.is_loading = false;
                        state.is_refreshing = false;
                    });
                    self.sync_from_active();
                }
                self.handle_finish(tab_id, url).await;
            }
            EngineEvent::Failed { url, error, .. } => {
                log::warn!(
                    "Tab {} failed to load {}: {}",
                    tab_id,
                    url.as_deref().unwrap_or("page"),
                    error
                );
                if is_active {
                    let notice = match &url {
                        Some(url) => format!("Couldn't load {url}: {error}"),
                        None => format!("Couldn't load page: {error}"),
                    };
                    self.state.send_modify(|state| {
                        state.is_loading = false;
                        state.is_refreshing = false;
                        state.notice = Some(notice);
                    });
                    self.sync_from_active();
                }
            }
        }
    }

    /// Apply every event already queued; returns how many were handled
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event).await;
            handled += 1;
        }
        handled
    }

    /// Wait for the next engine event
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        self.events.recv().await
    }

    /// Handle events until none arrives for `idle`
    pub async fn run_until_idle(&mut self, idle: Duration) -> usize {
        let mut handled = 0;
        while let Ok(Some(event)) = tokio::time::timeout(idle, self.events.recv()).await {
            self.handle_event(event).await;
            handled += 1;
        }
        handled
    }

    /// Wait for background favicon fetches and snapshot writes
    pub async fn flush(&mut self) {
        for task in self.prefetches.drain(..) {
            if let Err(e) = task.await {
                log::warn!("Image prefetch task failed: {}", e);
            }
        }
        self.snapshots.flush().await;
    }

    async fn handle_finish(&mut self, tab_id: TabId, url: String) {
        let Some(handle) = self.pool.peek(tab_id) else {
            return;
        };
        // A newer navigation already replaced this page
        if handle.engine.url().as_deref() != Some(url.as_str()) {
            log::debug!("Tab {} moved on from {}, skipping", tab_id, url);
            return;
        }

        let metadata = match handle.engine.introspect().await {
            Ok(metadata) => metadata,
            Err(e) => {
                log::warn!("Introspection failed for tab {}: {}", tab_id, e);
                PageMetadata {
                    title: handle.engine.title(),
                    ..Default::default()
                }
            }
        };
        let final_url = url;
        let title = metadata.title.trim().to_string();

        self.snapshots.capture(tab_id, handle.engine.as_ref()).await;

        // The tab may have been closed while capturing
        if !self.registry.contains(tab_id) {
            return;
        }

        if let Err(reason) = self.filter.check(&final_url, &title) {
            log::debug!("Not recording {}: {}", final_url, reason);
            return;
        }

        self.history
            .record(HistoryEntry::now(&final_url, &title).with_icon(metadata.icon_url.clone()));
        self.registry.update_navigation(tab_id, &final_url, &title);
        if self.active_tab() == Some(tab_id) {
            self.sync_from_active();
        }
        self.prefetch_images(final_url, metadata);
    }

    fn prefetch_images(&mut self, page_url: String, metadata: PageMetadata) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let favicons = self.favicons.clone();
        self.prefetches.retain(|task| !task.is_finished());
        self.prefetches.push(runtime.spawn(async move {
            favicons.icon(&page_url, metadata.icon_url.as_deref()).await;
            if let Some(preview_url) = metadata.preview_image_url {
                favicons.preview_image(&preview_url).await;
            }
        }));
    }

    // Activation

    /// Bind `tab_id` as the active tab, loading its persisted URL if its engine is empty
    fn activate(&mut self, tab_id: TabId) {
        let handle = self.pool.get(tab_id);
        self.active = Some(handle.clone());

        self.toolbar.reset();
        self.publish_toolbar();
        self.state.send_modify(|state| {
            state.is_loading = false;
            state.is_refreshing = false;
            state.notice = None;
        });

        if !handle.engine.has_content() {
            if let Some(record) = self.registry.get(tab_id) {
                if !record.current_url.is_empty() {
                    log::debug!("Restoring tab {} at {}", tab_id, record.current_url);
                    handle.engine.load(&record.current_url);
                }
            }
        }
        self.sync_from_active();
    }

    /// The active handle, rebinding to the registry's active tab if needed
    fn active_handle(&mut self) -> EngineHandle {
        let active_id = self.registry.active_id();
        if let Some(handle) = &self.active {
            if handle.tab_id() == active_id && self.pool.contains(active_id) {
                return handle.clone();
            }
        }
        self.activate(active_id);
        self.pool.get(active_id)
    }

    /// Mirror the active engine, falling back to the persisted record
    fn sync_from_active(&self) {
        let Some(handle) = &self.active else {
            return;
        };
        let engine = &handle.engine;
        let record = self.registry.get(handle.tab_id());

        let (current_url, title) = match (engine.url(), record) {
            (Some(url), record) => {
                let title = engine.title();
                let title = if title.is_empty() {
                    record.map(|r| r.title.clone()).unwrap_or_default()
                } else {
                    title
                };
                (url, title)
            }
            (None, Some(record)) => (record.current_url.clone(), record.title.clone()),
            (None, None) => (String::new(), String::new()),
        };

        self.state.send_modify(|state| {
            state.current_url = current_url;
            state.title = title;
            state.can_go_back = engine.can_go_back();
            state.can_go_forward = engine.can_go_forward();
            state.progress = engine.progress();
        });
    }

    fn publish_toolbar(&self) {
        self.toolbar_state.send_if_modified(|visibility| {
            let changed = *visibility != self.toolbar.visibility();
            *visibility = self.toolbar.visibility();
            changed
        });
    }

    // Accessors

    pub fn navigation_state(&self) -> NavigationState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NavigationState> {
        self.state.subscribe()
    }

    pub fn subscribe_toolbar(&self) -> watch::Receiver<ToolbarVisibility> {
        self.toolbar_state.subscribe()
    }

    pub fn subscribe_session(&self) -> watch::Receiver<SessionState> {
        self.registry.subscribe()
    }

    pub fn toolbar_visibility(&self) -> ToolbarVisibility {
        self.toolbar.visibility()
    }

    /// Tab currently bound as active
    pub fn active_tab(&self) -> Option<TabId> {
        self.active.as_ref().map(EngineHandle::tab_id)
    }

    pub fn registry(&self) -> &TabRegistry {
        &self.registry
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn pool(&self) -> &EngineInstancePool {
        &self.pool
    }

    pub fn snapshot(&self, tab_id: TabId) -> Option<Snapshot> {
        self.snapshots.get(tab_id)
    }

    pub fn cached_icon(&self, page_url: &str) -> Option<SiteImage> {
        self.favicons.cached_icon(page_url)
    }

    pub fn favicons(&self) -> &FaviconCache {
        &self.favicons
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FaviconConfig;
    use crate::engine::{PageEngine, ScriptedEngineFactory, ScriptedSite, ScriptedWeb};
    use crate::favicon::StaticFetcher;
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;
    use tokio_test::{assert_pending, assert_ready};

    struct Harness {
        router: NavigationRouter,
        factory: Arc<ScriptedEngineFactory>,
        store: Arc<MemoryStore>,
        _dir: tempfile::TempDir,
    }

    fn web() -> ScriptedWeb {
        ScriptedWeb::new()
            .with_site("https://example.com", ScriptedSite::titled("Example Domain"))
            .with_site("https://rust-lang.org", ScriptedSite::titled("Rust"))
            .with_site("https://down.example.org", ScriptedSite::failing("connection refused"))
            .with_site("https://accounts.google.com/signin", ScriptedSite::titled("Sign in"))
    }

    fn harness_with_store(store: Arc<MemoryStore>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::default().with_data_dir(dir.path());
        let factory = Arc::new(ScriptedEngineFactory::new(Arc::new(web())));
        let snapshots = Arc::new(SnapshotCache::from_config(
            config.snapshot_dir(),
            &config.snapshot,
        ));
        let favicons = FaviconCache::new(Arc::new(StaticFetcher::new()), FaviconConfig::default());
        let router =
            NavigationRouter::new(&config, store.clone(), factory.clone(), snapshots, favicons);
        Harness {
            router,
            factory,
            store,
            _dir: dir,
        }
    }

    fn harness() -> Harness {
        harness_with_store(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_fresh_session_binds_blank_tab() {
        let h = harness();
        let active = h.router.registry().active_id();

        assert_eq!(h.router.registry().count(), 1);
        assert_eq!(h.router.active_tab(), Some(active));
        assert_eq!(h.factory.engine(active).unwrap().load_count(), 0);
        assert_eq!(h.router.navigation_state().title, DEFAULT_TAB_TITLE);
    }

    #[tokio::test]
    async fn test_load_records_history() {
        let mut h = harness();
        let tab = h.router.registry().active_id();

        assert_eq!(
            h.router.load_url("https://example.com"),
            Some("https://example.com".to_string())
        );
        h.router.process_pending().await;

        let entries: Vec<_> = h.router.history().entries().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "https://example.com");
        assert_eq!(entries[0].title, "Example Domain");

        let record = h.router.registry().get(tab).unwrap();
        assert_eq!(record.current_url, "https://example.com");
        assert_eq!(record.history, vec!["https://example.com".to_string()]);

        let state = h.router.navigation_state();
        assert_eq!(state.title, "Example Domain");
        assert!(!state.is_loading);
        assert!(h.router.snapshot(tab).is_some());
    }

    #[tokio::test]
    async fn test_local_pages_not_recorded() {
        let mut h = harness();
        h.router.load_url("https://example.com");
        h.router.process_pending().await;
        h.router.load_url("about:blank");
        h.router.process_pending().await;

        assert_eq!(h.router.history().len(), 1);
        assert_eq!(h.router.registry().active().current_url, "https://example.com");
        assert_eq!(h.router.navigation_state().current_url, "about:blank");
    }

    #[tokio::test]
    async fn test_auth_pages_not_recorded() {
        let mut h = harness();
        h.router.load_url("https://accounts.google.com/signin");
        h.router.process_pending().await;
        assert!(h.router.history().is_empty());
    }

    #[tokio::test]
    async fn test_create_tab_loads_and_activates() {
        let mut h = harness();
        let first = h.router.registry().active_id();

        let tab = h.router.create_tab("https://rust-lang.org");
        h.router.process_pending().await;

        assert_eq!(h.router.registry().active_id(), tab);
        assert_eq!(h.router.active_tab(), Some(tab));
        assert_eq!(h.factory.engine(tab).unwrap().load_count(), 1);
        assert_eq!(h.router.navigation_state().title, "Rust");
        // The untouched first tab never got a load
        assert_eq!(h.factory.engine(first).unwrap().load_count(), 0);
    }

    #[tokio::test]
    async fn test_switch_does_not_reload() {
        let mut h = harness();
        let first = h.router.registry().active_id();
        h.router.load_url("https://example.com");
        let second = h.router.create_tab("https://rust-lang.org");
        h.router.process_pending().await;

        assert!(h.router.switch_tab(first));
        assert_eq!(h.router.navigation_state().current_url, "https://example.com");
        assert!(h.router.switch_tab(second));
        assert_eq!(h.factory.engine(first).unwrap().load_count(), 1);
        assert_eq!(h.factory.engine(second).unwrap().load_count(), 1);
    }

    #[tokio::test]
    async fn test_switch_unknown_is_noop() {
        let mut h = harness();
        let active = h.router.registry().active_id();
        assert!(!h.router.switch_tab(TabId::new()));
        assert_eq!(h.router.active_tab(), Some(active));
    }

    #[tokio::test]
    async fn test_back_forward_dispatch_to_active() {
        let mut h = harness();
        h.router.load_url("https://example.com");
        h.router.load_url("https://rust-lang.org");
        h.router.process_pending().await;
        assert!(h.router.navigation_state().can_go_back);

        h.router.go_back();
        h.router.process_pending().await;
        let state = h.router.navigation_state();
        assert_eq!(state.current_url, "https://example.com");
        assert!(state.can_go_forward);

        h.router.go_forward();
        assert_eq!(h.router.navigation_state().current_url, "https://rust-lang.org");
    }

    #[tokio::test]
    async fn test_failure_sets_notice() {
        let mut h = harness();
        h.router.load_url("https://example.com");
        h.router.process_pending().await;
        h.router.reload();
        assert!(h.router.navigation_state().is_refreshing);
        h.router.process_pending().await;

        h.router.load_url("https://down.example.org");
        h.router.process_pending().await;

        let state = h.router.navigation_state();
        assert!(state.notice.as_deref().unwrap().contains("connection refused"));
        assert!(!state.is_loading);
        assert!(!state.is_refreshing);
        assert_eq!(state.current_url, "https://example.com");
        assert_eq!(h.router.registry().count(), 1);

        h.router.dismiss_notice();
        assert_eq!(h.router.navigation_state().notice, None);
    }

    #[tokio::test]
    async fn test_delete_active_rebinds() {
        let mut h = harness();
        let first = h.router.registry().active_id();
        let second = h.router.create_tab("https://rust-lang.org");
        h.router.process_pending().await;

        assert!(h.router.delete_tab(second));
        assert_eq!(h.router.active_tab(), Some(first));
        assert!(!h.router.pool().contains(second));
        assert!(h.router.snapshot(second).is_none());

        assert!(!h.router.delete_tab(second));
    }

    #[tokio::test]
    async fn test_delete_last_tab_leaves_fresh_blank() {
        let mut h = harness();
        let only = h.router.registry().active_id();
        h.router.delete_tab(only);

        let fresh = h.router.registry().active_id();
        assert_ne!(fresh, only);
        assert_eq!(h.router.registry().count(), 1);
        assert_eq!(h.router.active_tab(), Some(fresh));
    }

    #[tokio::test]
    async fn test_events_after_delete_are_dropped() {
        let mut h = harness();
        let tab = h.router.create_tab("https://rust-lang.org");
        // Events are queued but not yet handled
        h.router.delete_tab(tab);
        h.router.process_pending().await;

        assert!(h.router.history().is_empty());
        assert!(h.router.snapshot(tab).is_none());
    }

    #[tokio::test]
    async fn test_clear_all_tabs() {
        let mut h = harness();
        h.router.create_tab("https://example.com");
        h.router.create_tab("https://rust-lang.org");
        h.router.process_pending().await;

        h.router.clear_all_tabs();

        assert_eq!(h.router.registry().count(), 1);
        assert!(h.router.registry().active().is_blank());
        assert_eq!(h.router.pool().len(), 1);
        assert_eq!(h.router.navigation_state().current_url, "");
        // Visit history outlives the tabs
        assert_eq!(h.router.history().len(), 2);
    }

    #[tokio::test]
    async fn test_restored_tab_reloads_persisted_url() {
        let mut h = harness();
        h.router.load_url("https://example.com");
        h.router.process_pending().await;

        let restored = harness_with_store(h.store.clone());
        let active = restored.router.registry().active_id();
        let engine = restored.factory.engine(active).unwrap();
        assert_eq!(engine.load_count(), 1);
        assert_eq!(restored.router.navigation_state().current_url, "https://example.com");
        assert_eq!(restored.router.history().len(), 1);
    }

    #[tokio::test]
    async fn test_scroll_drives_toolbar() {
        let mut h = harness();
        let mut toolbar = h.router.subscribe_toolbar();
        for _ in 0..4 {
            h.router.scroll(1000.0, 5000.0, 800.0);
        }
        assert_eq!(h.router.scroll(1050.0, 5000.0, 800.0), ToolbarVisibility::Hidden);
        assert!(toolbar.has_changed().unwrap());
        assert_eq!(*toolbar.borrow_and_update(), ToolbarVisibility::Hidden);

        h.router.load_url("https://example.com");
        assert_eq!(h.router.toolbar_visibility(), ToolbarVisibility::Visible);
    }

    #[tokio::test]
    async fn test_search_text_becomes_query() {
        let mut h = harness();
        assert_eq!(
            h.router.load_url("rust ownership"),
            Some("https://www.google.com/search?q=rust+ownership".to_string())
        );
        assert_eq!(h.router.load_url("  "), None);
    }

    #[tokio::test]
    async fn test_engine_started_navigation_resets_toolbar() {
        let mut h = harness();
        let tab = h.router.registry().active_id();
        h.router.load_url("https://example.com");
        h.router.process_pending().await;

        for _ in 0..4 {
            h.router.scroll(1000.0, 5000.0, 800.0);
        }
        assert_eq!(h.router.scroll(1050.0, 5000.0, 800.0), ToolbarVisibility::Hidden);

        // Reloading the same page keeps the toolbar where it is
        h.router.reload();
        h.router.process_pending().await;
        assert_eq!(h.router.toolbar_visibility(), ToolbarVisibility::Hidden);

        // A link followed inside the page
        let mut toolbar = h.router.subscribe_toolbar();
        h.factory.engine(tab).unwrap().load("https://rust-lang.org");
        h.router.process_pending().await;

        assert_eq!(h.router.toolbar_visibility(), ToolbarVisibility::Visible);
        assert_eq!(*toolbar.borrow_and_update(), ToolbarVisibility::Visible);
        assert_eq!(h.router.navigation_state().current_url, "https://rust-lang.org");
    }

    #[tokio::test]
    async fn test_next_event_waits_for_engine() {
        let mut h = harness();
        {
            let mut next = tokio_test::task::spawn(h.router.next_event());
            assert_pending!(next.poll());
        }

        h.router.load_url("https://example.com");
        let mut next = tokio_test::task::spawn(h.router.next_event());
        let event = assert_ready!(next.poll());
        assert!(matches!(event, Some(EngineEvent::Started { .. })));
    }
}
