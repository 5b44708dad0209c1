//! Deterministic offline engine
//!
//! Serves pages from a fixed site table and completes every navigation
//! synchronously, which makes whole sessions reproducible without a network.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use image::{Rgba, RgbaImage};

use super::{
    BackForwardList, EngineFactory, NavigationDelegate, NavigationPolicy, PageEngine, PageMetadata,
};
use crate::session::TabId;
use crate::utils::{Result, TabdeckError};

/// Snapshot size of a scripted page (a phone-sized viewport)
const VIEWPORT: (u32, u32) = (390, 844);

/// One page in the scripted web
#[derive(Debug, Clone, Default)]
pub struct ScriptedSite {
    pub title: String,
    pub icon_url: Option<String>,
    pub preview_image_url: Option<String>,
    pub description: Option<String>,
    /// Fail every load with this message
    pub failure: Option<String>,
    /// Final URL after a server-side redirect
    pub redirect_to: Option<String>,
}

impl ScriptedSite {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn failing(error: impl Into<String>) -> Self {
        Self {
            failure: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_icon(mut self, icon_url: impl Into<String>) -> Self {
        self.icon_url = Some(icon_url.into());
        self
    }

    pub fn with_preview(mut self, preview_image_url: impl Into<String>) -> Self {
        self.preview_image_url = Some(preview_image_url.into());
        self
    }

    pub fn redirecting_to(mut self, url: impl Into<String>) -> Self {
        self.redirect_to = Some(url.into());
        self
    }
}

/// URL → page table; unknown URLs load as untitled pages
#[derive(Debug, Default)]
pub struct ScriptedWeb {
    sites: Mutex<HashMap<String, ScriptedSite>>,
}

impl ScriptedWeb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_site(self, url: impl Into<String>, site: ScriptedSite) -> Self {
        self.insert(url, site);
        self
    }

    pub fn insert(&self, url: impl Into<String>, site: ScriptedSite) {
        if let Ok(mut sites) = self.sites.lock() {
            sites.insert(url.into(), site);
        }
    }

    fn lookup(&self, url: &str) -> ScriptedSite {
        self.sites
            .lock()
            .ok()
            .and_then(|sites| sites.get(url).cloned())
            .unwrap_or_default()
    }
}

#[derive(Default)]
struct ScriptedState {
    list: BackForwardList,
    progress: f64,
}

/// Engine backed by a [`ScriptedWeb`]
pub struct ScriptedEngine {
    tab_id: TabId,
    web: Arc<ScriptedWeb>,
    delegate: Arc<dyn NavigationDelegate>,
    state: Mutex<ScriptedState>,
    loads: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(
        tab_id: TabId,
        web: Arc<ScriptedWeb>,
        delegate: Arc<dyn NavigationDelegate>,
    ) -> Self {
        Self {
            tab_id,
            web,
            delegate,
            state: Mutex::new(ScriptedState::default()),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    /// Number of navigations started on this engine
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, ScriptedState> {
        // A poisoned lock only means a test panicked mid-navigation
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run one navigation to completion; `commit` updates the list on success
    fn navigate(&self, url: &str, commit: impl FnOnce(&mut BackForwardList, &str)) {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.delegate.on_navigation_start(url);
        self.state().progress = 0.1;
        self.delegate.on_progress(0.1);

        let site = self.web.lookup(url);
        if let Some(error) = site.failure {
            self.state().progress = 0.0;
            self.delegate.on_fail(Some(url), &error);
            return;
        }

        let final_url = site.redirect_to.unwrap_or_else(|| url.to_string());
        {
            let mut state = self.state();
            commit(&mut state.list, &final_url);
            state.progress = 1.0;
        }
        self.delegate.on_progress(1.0);
        self.delegate.on_finish(&final_url);
    }

    fn current_site(&self) -> Option<(String, ScriptedSite)> {
        let url = self.state().list.current()?.to_string();
        let site = self.web.lookup(&url);
        Some((url, site))
    }
}

#[async_trait]
impl PageEngine for ScriptedEngine {
    fn load(&self, url: &str) {
        if self.delegate.on_decide_policy(url) == NavigationPolicy::Cancel {
            return;
        }
        self.navigate(url, |list, final_url| list.commit(final_url));
    }

    fn reload(&self) {
        let Some(url) = self.url() else {
            return;
        };
        // Reload keeps the list as is
        self.navigate(&url, |_, _| {});
    }

    fn go_back(&self) {
        let target = {
            let mut state = self.state();
            state.list.go_back().map(str::to_string)
        };
        if let Some(url) = target {
            self.navigate(&url, |_, _| {});
        }
    }

    fn go_forward(&self) {
        let target = {
            let mut state = self.state();
            state.list.go_forward().map(str::to_string)
        };
        if let Some(url) = target {
            self.navigate(&url, |_, _| {});
        }
    }

    fn stop_loading(&self) {
        // Loads complete synchronously; nothing is ever in progress
    }

    fn clear_content(&self) {
        let mut state = self.state();
        state.list.clear();
        state.progress = 0.0;
    }

    fn url(&self) -> Option<String> {
        self.state().list.current().map(str::to_string)
    }

    fn title(&self) -> String {
        self.current_site().map(|(_, site)| site.title).unwrap_or_default()
    }

    fn can_go_back(&self) -> bool {
        self.state().list.can_go_back()
    }

    fn can_go_forward(&self) -> bool {
        self.state().list.can_go_forward()
    }

    fn progress(&self) -> f64 {
        self.state().progress
    }

    async fn introspect(&self) -> Result<PageMetadata> {
        let (_, site) = self
            .current_site()
            .ok_or_else(|| TabdeckError::Engine("no page loaded".to_string()))?;
        Ok(PageMetadata {
            title: site.title,
            icon_url: site.icon_url,
            preview_image_url: site.preview_image_url,
            description: site.description,
        })
    }

    async fn capture_snapshot(&self) -> Result<RgbaImage> {
        let (url, _) = self
            .current_site()
            .ok_or_else(|| TabdeckError::Engine("nothing to capture".to_string()))?;

        // Tint derived from the URL so distinct pages give distinct images
        let mut hasher = DefaultHasher::new();
        url.hash(&mut hasher);
        let [r, g, b, ..] = hasher.finish().to_le_bytes();
        Ok(RgbaImage::from_pixel(VIEWPORT.0, VIEWPORT.1, Rgba([r, g, b, 255])))
    }
}

/// Creates [`ScriptedEngine`]s and keeps them reachable for inspection
pub struct ScriptedEngineFactory {
    web: Arc<ScriptedWeb>,
    engines: Mutex<HashMap<TabId, Arc<ScriptedEngine>>>,
    created: AtomicUsize,
}

impl ScriptedEngineFactory {
    pub fn new(web: Arc<ScriptedWeb>) -> Self {
        Self {
            web,
            engines: Mutex::new(HashMap::new()),
            created: AtomicUsize::new(0),
        }
    }

    /// Total engines created so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Most recent engine created for `tab_id`
    pub fn engine(&self, tab_id: TabId) -> Option<Arc<ScriptedEngine>> {
        self.engines.lock().ok()?.get(&tab_id).cloned()
    }
}

impl EngineFactory for ScriptedEngineFactory {
    fn create(&self, tab_id: TabId, delegate: Arc<dyn NavigationDelegate>) -> Arc<dyn PageEngine> {
        let engine = Arc::new(ScriptedEngine::new(tab_id, self.web.clone(), delegate));
        self.created.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut engines) = self.engines.lock() {
            engines.insert(tab_id, engine.clone());
        }
        engine
    }
}
