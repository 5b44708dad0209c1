//! Network-backed headless engine
//!
//! Fetches documents with `reqwest` and reads page metadata out of the parsed
//! HTML. There is no layout or painting; snapshots are placeholder rasters.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use markup5ever_rcdom::{Handle, NodeData};
use tokio::task::JoinHandle;
use url::Url;

use super::{
    BackForwardList, EngineFactory, NavigationDelegate, NavigationPolicy, PageEngine, PageMetadata,
};
use crate::session::TabId;
use crate::utils::{NetworkError, Result, TabdeckError};

const PAGE_TIMEOUT: Duration = Duration::from_secs(30);
const VIEWPORT: (u32, u32) = (390, 844);

#[derive(Default)]
struct HeadlessState {
    list: BackForwardList,
    metadata: Option<PageMetadata>,
    progress: f64,
}

type SharedState = Arc<Mutex<HeadlessState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, HeadlessState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum NavigationKind {
    /// New page; committed to the back/forward list on success
    Load,
    /// Reload or history traversal; the list is already positioned
    Revisit,
}

/// Engine that loads real pages over HTTP
pub struct HeadlessEngine {
    tab_id: TabId,
    client: reqwest::Client,
    delegate: Arc<dyn NavigationDelegate>,
    state: SharedState,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeadlessEngine {
    pub fn new(
        tab_id: TabId,
        client: reqwest::Client,
        delegate: Arc<dyn NavigationDelegate>,
    ) -> Self {
        Self {
            tab_id,
            client,
            delegate,
            state: Arc::new(Mutex::new(HeadlessState::default())),
            task: Mutex::new(None),
        }
    }

    fn navigate(&self, url: String, kind: NavigationKind) {
        self.abort_task();

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                log::error!("Tab {}: cannot load {} outside an async runtime", self.tab_id, url);
                self.delegate.on_fail(Some(&url), "no async runtime");
                return;
            }
        };

        let client = self.client.clone();
        let delegate = self.delegate.clone();
        let state = self.state.clone();
        let handle = runtime.spawn(async move {
            delegate.on_navigation_start(&url);
            lock(&state).progress = 0.1;
            delegate.on_progress(0.1);

            match fetch_document(&client, &url).await {
                Ok((final_url, html)) => {
                    delegate.on_progress(0.7);
                    let metadata = match html {
                        Some(html) => extract_metadata(&html, &final_url),
                        None => PageMetadata::default(),
                    };
                    {
                        let mut state = lock(&state);
                        if kind == NavigationKind::Load {
                            state.list.commit(final_url.clone());
                        }
                        state.metadata = Some(metadata);
                        state.progress = 1.0;
                    }
                    delegate.on_progress(1.0);
                    delegate.on_finish(&final_url);
                }
                Err(e) => {
                    lock(&state).progress = 0.0;
                    delegate.on_fail(Some(&url), &e.to_string());
                }
            }
        });

        if let Ok(mut task) = self.task.lock() {
            *task = Some(handle);
        }
    }

    fn abort_task(&self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

/// Fetch `url`, returning the final URL and the body for HTML documents
async fn fetch_document(client: &reqwest::Client, url: &str) -> Result<(String, Option<String>)> {
    let parsed = Url::parse(url).map_err(|_| NetworkError::InvalidUrl(url.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        // about:, data: and friends have nothing to fetch
        return Ok((url.to_string(), None));
    }

    let response = client.get(parsed).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(NetworkError::Http(status.as_u16()).into());
    }

    let final_url = response.url().to_string();
    let is_html = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("html"))
        .unwrap_or(true);

    let body = if is_html { Some(response.text().await?) } else { None };
    Ok((final_url, body))
}

#[async_trait]
impl PageEngine for HeadlessEngine {
    fn load(&self, url: &str) {
        if self.delegate.on_decide_policy(url) == NavigationPolicy::Cancel {
            return;
        }
        self.navigate(url.to_string(), NavigationKind::Load);
    }

    fn reload(&self) {
        if let Some(url) = self.url() {
            self.navigate(url, NavigationKind::Revisit);
        }
    }

    fn go_back(&self) {
        let target = lock(&self.state).list.go_back().map(str::to_string);
        if let Some(url) = target {
            self.navigate(url, NavigationKind::Revisit);
        }
    }

    fn go_forward(&self) {
        let target = lock(&self.state).list.go_forward().map(str::to_string);
        if let Some(url) = target {
            self.navigate(url, NavigationKind::Revisit);
        }
    }

    fn stop_loading(&self) {
        self.abort_task();
        let mut state = lock(&self.state);
        if state.progress < 1.0 {
            state.progress = 0.0;
        }
    }

    fn clear_content(&self) {
        self.abort_task();
        let mut state = lock(&self.state);
        state.list.clear();
        state.metadata = None;
        state.progress = 0.0;
    }

    fn url(&self) -> Option<String> {
        lock(&self.state).list.current().map(str::to_string)
    }

    fn title(&self) -> String {
        lock(&self.state)
            .metadata
            .as_ref()
            .map(|m| m.title.clone())
            .unwrap_or_default()
    }

    fn can_go_back(&self) -> bool {
        lock(&self.state).list.can_go_back()
    }

    fn can_go_forward(&self) -> bool {
        lock(&self.state).list.can_go_forward()
    }

    fn progress(&self) -> f64 {
        lock(&self.state).progress
    }

    async fn introspect(&self) -> Result<PageMetadata> {
        let state = lock(&self.state);
        if state.list.current().is_none() {
            return Err(TabdeckError::Engine("no page loaded".to_string()));
        }
        Ok(state.metadata.clone().unwrap_or_default())
    }

    async fn capture_snapshot(&self) -> Result<RgbaImage> {
        if !self.has_content() {
            return Err(TabdeckError::Engine("nothing to capture".to_string()));
        }
        Ok(placeholder_snapshot(VIEWPORT.0, VIEWPORT.1))
    }
}

/// Light page with a darker address-bar band
fn placeholder_snapshot(width: u32, height: u32) -> RgbaImage {
    let band = height / 12;
    RgbaImage::from_fn(width, height, |_, y| {
        if y < band {
            Rgba([200, 200, 200, 255])
        } else {
            Rgba([245, 245, 245, 255])
        }
    })
}

/// Creates [`HeadlessEngine`]s sharing one HTTP client
pub struct HeadlessEngineFactory {
    client: reqwest::Client,
}

impl HeadlessEngineFactory {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(PAGE_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

impl EngineFactory for HeadlessEngineFactory {
    fn create(&self, tab_id: TabId, delegate: Arc<dyn NavigationDelegate>) -> Arc<dyn PageEngine> {
        Arc::new(HeadlessEngine::new(tab_id, self.client.clone(), delegate))
    }
}

/// Read title, icon, preview image and description from an HTML document
pub fn extract_metadata(html: &str, base_url: &str) -> PageMetadata {
    use html5ever::tendril::TendrilSink;
    use html5ever::{ParseOpts, parse_document};
    use markup5ever_rcdom::RcDom;

    let dom = match parse_document(RcDom::default(), ParseOpts::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
    {
        Ok(dom) => dom,
        Err(e) => {
            log::warn!("Failed to parse {}: {}", base_url, e);
            return PageMetadata::default();
        }
    };

    let base = Url::parse(base_url).ok();
    let mut collector = MetadataCollector::default();
    collector.visit(&dom.document);

    let resolve = |href: String| match &base {
        Some(base) => base.join(&href).map(|u| u.to_string()).ok(),
        None => Url::parse(&href).ok().map(|u| u.to_string()),
    };

    PageMetadata {
        title: collector.title.unwrap_or_default(),
        icon_url: collector.touch_icon.or(collector.icon).and_then(&resolve),
        preview_image_url: collector.og_image.and_then(&resolve),
        description: collector.description,
    }
}

#[derive(Default)]
struct MetadataCollector {
    title: Option<String>,
    icon: Option<String>,
    touch_icon: Option<String>,
    og_image: Option<String>,
    description: Option<String>,
}

impl MetadataCollector {
    fn visit(&mut self, handle: &Handle) {
        if let NodeData::Element { name, attrs, .. } = &handle.data {
            let tag = name.local.as_ref();
            let attrs = attrs.borrow();
            let attr = |key: &str| {
                attrs
                    .iter()
                    .find(|a| a.name.local.as_ref() == key)
                    .map(|a| a.value.to_string())
            };

            match tag {
                "title" if self.title.is_none() => {
                    let text = extract_text(handle);
                    if !text.is_empty() {
                        self.title = Some(text);
                    }
                }
                "link" => {
                    let rel = attr("rel").unwrap_or_default().to_ascii_lowercase();
                    if let Some(href) = attr("href") {
                        if rel.contains("apple-touch-icon") {
                            self.touch_icon = self.touch_icon.take().or(Some(href));
                        } else if rel.split_whitespace().any(|r| r == "icon") {
                            self.icon = self.icon.take().or(Some(href));
                        }
                    }
                }
                "meta" => {
                    let key = attr("property").or_else(|| attr("name")).unwrap_or_default();
                    if let Some(content) = attr("content") {
                        match key.as_str() {
                            "og:image" | "twitter:image" => {
                                self.og_image = self.og_image.take().or(Some(content));
                            }
                            "description" | "og:description" => {
                                self.description = self.description.take().or(Some(content));
                            }
                            _ => {}
                        }
                    }
                }
                "script" | "style" => return,
                _ => {}
            }
        }

        for child in handle.children.borrow().iter() {
            self.visit(child);
        }
    }
}

fn extract_text(handle: &Handle) -> String {
    let mut text = String::new();

    fn collect(handle: &Handle, text: &mut String) {
        if let NodeData::Text { contents } = &handle.data {
            let s = contents.borrow().to_string();
            let s = s.trim();
            if !s.is_empty() {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(s);
            }
        }
        for child in handle.children.borrow().iter() {
            collect(child, text);
        }
    }

    collect(handle, &mut text);
    text
}
