//! Site icon and preview image cache
//!
//! Icons are keyed by normalized domain so `www.example.com` and
//! `example.com` share one entry. Preview images are keyed by their own URL
//! under a separate namespace. Concurrent requests for the same key share a
//! single fetch, and a caller that stops waiting never cancels the fetch for
//! the others.

mod fetcher;

pub use fetcher::{FetchedResource, HttpImageFetcher, ImageFetcher, StaticFetcher};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use image::RgbaImage;
use url::Url;

use crate::config::FaviconConfig;
use crate::utils::{NetworkError, Result, TabdeckError};

/// Decoded icon or preview image
pub type SiteImage = Arc<RgbaImage>;

type InFlight = Shared<BoxFuture<'static, Option<SiteImage>>>;

/// Which kind of image a request resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Icon,
    Preview,
}

struct ImageRequest {
    key: String,
    kind: ImageKind,
    candidates: Vec<String>,
    max_bytes: usize,
}

#[derive(Default)]
struct FaviconState {
    images: HashMap<String, SiteImage>,
    in_flight: HashMap<String, InFlight>,
    /// Bumped by `clear_all`; completions from older epochs are dropped
    epoch: u64,
}

/// Removes the in-flight entry once its fetch finishes, even if the task is aborted
struct InFlightGuard {
    state: Arc<Mutex<FaviconState>>,
    key: String,
    epoch: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if state.epoch == self.epoch {
            state.in_flight.remove(&self.key);
        }
    }
}

fn lock(state: &Mutex<FaviconState>) -> MutexGuard<'_, FaviconState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Cache of decoded site icons and preview images
#[derive(Clone)]
pub struct FaviconCache {
    fetcher: Arc<dyn ImageFetcher>,
    config: Arc<FaviconConfig>,
    state: Arc<Mutex<FaviconState>>,
}

impl FaviconCache {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, config: FaviconConfig) -> Self {
        Self {
            fetcher,
            config: Arc::new(config),
            state: Arc::new(Mutex::new(FaviconState::default())),
        }
    }

    /// Preview image when a preview hint is given and resolves, else the site icon
    pub async fn get(
        &self,
        page_url: &str,
        icon_hint: Option<&str>,
        preview_hint: Option<&str>,
    ) -> Option<SiteImage> {
        if let Some(preview_url) = preview_hint.filter(|u| !u.is_empty()) {
            if let Some(image) = self.preview_image(preview_url).await {
                return Some(image);
            }
        }
        self.icon(page_url, icon_hint).await
    }

    /// Resolve the site icon for `page_url`
    ///
    /// Candidates are tried in order: the page-declared hint, the
    /// conventional icon paths on the page host (https, then http), then
    /// the configured icon services.
    pub async fn icon(&self, page_url: &str, hint: Option<&str>) -> Option<SiteImage> {
        let Some(host) = page_host(page_url) else {
            log::debug!("No host in {page_url}, skipping icon lookup");
            return None;
        };
        let key = domain_of(&host).to_string();
        let candidates = self.icon_candidates(&host, &key, hint);
        self.resolve(ImageRequest {
            key,
            kind: ImageKind::Icon,
            candidates,
            max_bytes: self.config.max_icon_bytes,
        })
        .await
    }

    /// Resolve a page preview image
    pub async fn preview_image(&self, preview_url: &str) -> Option<SiteImage> {
        self.resolve(ImageRequest {
            key: preview_key(preview_url),
            kind: ImageKind::Preview,
            candidates: vec![preview_url.to_string()],
            max_bytes: self.config.max_preview_bytes,
        })
        .await
    }

    pub fn cached_icon(&self, page_url: &str) -> Option<SiteImage> {
        let key = icon_key(page_url)?;
        lock(&self.state).images.get(&key).cloned()
    }

    pub fn cached_preview(&self, preview_url: &str) -> Option<SiteImage> {
        lock(&self.state).images.get(&preview_key(preview_url)).cloned()
    }

    /// Number of cached images
    pub fn len(&self) -> usize {
        lock(&self.state).images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of fetches still running
    pub fn in_flight(&self) -> usize {
        lock(&self.state).in_flight.len()
    }

    /// Drop every cached image; fetches already running will not repopulate the cache
    pub fn clear_all(&self) {
        let mut state = lock(&self.state);
        state.images.clear();
        state.in_flight.clear();
        state.epoch += 1;
        log::debug!("Favicon cache cleared");
    }

    fn icon_candidates(&self, host: &str, domain: &str, hint: Option<&str>) -> Vec<String> {
        let mut candidates = Vec::new();
        if let Some(hint) = hint.filter(|h| !h.is_empty()) {
            candidates.push(hint.to_string());
        }
        for scheme in ["https", "http"] {
            for path in &self.config.conventional_paths {
                candidates.push(format!("{scheme}://{host}{path}"));
            }
        }
        for service in &self.config.services {
            candidates.push(service.replace("{domain}", domain));
        }
        candidates.dedup();
        candidates
    }

    async fn resolve(&self, request: ImageRequest) -> Option<SiteImage> {
        let flight = {
            let mut state = lock(&self.state);
            if let Some(image) = state.images.get(&request.key) {
                return Some(image.clone());
            }
            match state.in_flight.get(&request.key) {
                Some(flight) => flight.clone(),
                None => {
                    let key = request.key.clone();
                    let flight = self.start(request, state.epoch);
                    state.in_flight.insert(key, flight.clone());
                    flight
                }
            }
        };
        flight.await
    }

    /// Spawn the fetch so that dropping any one waiter leaves it running
    fn start(&self, request: ImageRequest, epoch: u64) -> InFlight {
        let fetcher = self.fetcher.clone();
        let config = self.config.clone();
        let state = self.state.clone();

        let task = tokio::spawn(async move {
            let _guard = InFlightGuard {
                state: state.clone(),
                key: request.key.clone(),
                epoch,
            };
            let image = fetch_first(fetcher.as_ref(), &config, &request).await;
            if let Some(image) = &image {
                let mut state = lock(&state);
                if state.epoch == epoch {
                    state.images.insert(request.key.clone(), image.clone());
                } else {
                    log::debug!("Discarding {} fetched before clear", request.key);
                }
            }
            image
        });

        async move {
            match task.await {
                Ok(image) => image,
                Err(e) => {
                    log::warn!("Image fetch task failed: {e}");
                    None
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Cache key for a page's icon: its host, lowercased, without `www.`
pub fn icon_key(page_url: &str) -> Option<String> {
    page_host(page_url).map(|host| domain_of(&host).to_string())
}

/// Cache key for a preview image
pub fn preview_key(preview_url: &str) -> String {
    format!("preview:{preview_url}")
}

fn page_host(page_url: &str) -> Option<String> {
    let trimmed = page_url.trim();
    let parsed = Url::parse(trimmed)
        .or_else(|_| Url::parse(&format!("https://{trimmed}")))
        .ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    (!host.is_empty()).then_some(host)
}

fn domain_of(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

async fn fetch_first(
    fetcher: &dyn ImageFetcher,
    config: &FaviconConfig,
    request: &ImageRequest,
) -> Option<SiteImage> {
    for url in &request.candidates {
        match fetch_candidate(fetcher, config, url, request.max_bytes).await {
            Ok(image) => {
                log::debug!("Resolved {:?} {} from {url}", request.kind, request.key);
                return Some(Arc::new(image));
            }
            Err(e) => log::debug!("Candidate {url} rejected: {e}"),
        }
    }
    log::info!("No usable {:?} for {}", request.kind, request.key);
    None
}

async fn fetch_candidate(
    fetcher: &dyn ImageFetcher,
    config: &FaviconConfig,
    url: &str,
    max_bytes: usize,
) -> Result<RgbaImage> {
    let fetched = tokio::time::timeout(config.timeout(), fetcher.fetch(url, max_bytes)).await;
    let resource = match fetched {
        Ok(resource) => resource?,
        Err(_) => return Err(NetworkError::Timeout.into()),
    };
    validate(&resource, max_bytes)?;

    let max_dimension = config.max_dimension;
    let body = resource.body;
    tokio::task::spawn_blocking(move || decode_image(&body, max_dimension))
        .await
        .map_err(|e| TabdeckError::Other(format!("decode task failed: {e}")))?
}

/// Accept only a 200 response with an image-like body within `max_bytes`
fn validate(resource: &FetchedResource, max_bytes: usize) -> std::result::Result<(), NetworkError> {
    if resource.status != 200 {
        return Err(NetworkError::Http(resource.status));
    }
    if let Some(content_type) = &resource.content_type {
        if !is_image_type(content_type) {
            return Err(NetworkError::ContentType(content_type.clone()));
        }
    }
    if resource.body.len() > max_bytes {
        return Err(NetworkError::TooLarge {
            size: resource.body.len(),
            limit: max_bytes,
        });
    }
    if resource.body.is_empty() {
        return Err(NetworkError::Request("empty body".to_string()));
    }
    Ok(())
}

fn is_image_type(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    mime.starts_with("image/") || mime == "application/octet-stream"
}

fn decode_image(bytes: &[u8], max_dimension: u32) -> Result<RgbaImage> {
    let image = image::load_from_memory(bytes)?;
    let image = if image.width() > max_dimension || image.height() > max_dimension {
        image.thumbnail(max_dimension, max_dimension)
    } else {
        image
    };
    Ok(image.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;
    use std::time::Duration;

    const HINT: &str = "https://example.com/static/icon.png";

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn cache(fetcher: StaticFetcher) -> (FaviconCache, Arc<StaticFetcher>) {
        let fetcher = Arc::new(fetcher);
        (FaviconCache::new(fetcher.clone(), FaviconConfig::default()), fetcher)
    }

    #[test]
    fn test_icon_key_normalization() {
        assert_eq!(icon_key("https://www.Example.com/a/b"), Some("example.com".to_string()));
        assert_eq!(icon_key("http://example.com"), Some("example.com".to_string()));
        assert_eq!(icon_key("example.com/path"), Some("example.com".to_string()));
        assert_eq!(icon_key("about:blank"), None);
        assert_eq!(
            preview_key("https://cdn.example.com/og.png"),
            "preview:https://cdn.example.com/og.png"
        );
    }

    #[test]
    fn test_candidate_order() {
        let (cache, _) = cache(StaticFetcher::new());
        let candidates = cache.icon_candidates("www.example.com", "example.com", Some(HINT));

        assert_eq!(candidates[0], HINT);
        assert_eq!(candidates[1], "https://www.example.com/apple-touch-icon.png");
        assert_eq!(candidates[5], "http://www.example.com/apple-touch-icon.png");
        assert_eq!(
            candidates.last().map(String::as_str),
            Some("https://logo.clearbit.com/example.com")
        );
        assert_eq!(candidates.len(), 1 + 2 * 4 + 3);
    }

    #[test]
    fn test_validate() {
        let body = vec![1u8; 16];
        assert!(validate(&FetchedResource::ok(Some("image/png"), body.clone()), 1024).is_ok());
        assert!(validate(&FetchedResource::ok(None, body.clone()), 1024).is_ok());
        let icon = FetchedResource::ok(Some("image/x-icon; charset=binary"), body.clone());
        assert!(validate(&icon, 1024).is_ok());
        let octets = FetchedResource::ok(Some("application/octet-stream"), body.clone());
        assert!(validate(&octets, 1024).is_ok());

        assert_eq!(
            validate(&FetchedResource::ok(Some("text/html"), body.clone()), 1024),
            Err(NetworkError::ContentType("text/html".to_string()))
        );
        assert_eq!(validate(&FetchedResource::status(404), 1024), Err(NetworkError::Http(404)));
        assert_eq!(
            validate(&FetchedResource::ok(Some("image/png"), body), 8),
            Err(NetworkError::TooLarge { size: 16, limit: 8 })
        );
    }

    #[test]
    fn test_preview_ceiling_is_larger() {
        let config = FaviconConfig::default();
        let body = vec![0u8; 2 * 1024 * 1024];
        let resource = FetchedResource::ok(Some("image/jpeg"), body);
        assert!(validate(&resource, config.max_icon_bytes).is_err());
        assert!(validate(&resource, config.max_preview_bytes).is_ok());
    }

    #[tokio::test]
    async fn test_hint_short_circuits() {
        let icon = FetchedResource::ok(Some("image/png"), png(32, 32));
        let (cache, fetcher) = cache(StaticFetcher::new().with(HINT, icon));

        let icon = cache.icon("https://www.example.com/", Some(HINT)).await.unwrap();

        assert_eq!(icon.dimensions(), (32, 32));
        assert_eq!(fetcher.calls(), vec![HINT.to_string()]);
        assert!(cache.cached_icon("https://example.com/other").is_some());
    }

    #[tokio::test]
    async fn test_oversized_icon_falls_through() {
        let fallback = "https://example.com/apple-touch-icon.png";
        let (cache, fetcher) = cache(
            StaticFetcher::new()
                .with(HINT, FetchedResource::ok(Some("image/png"), vec![0u8; 2 * 1024 * 1024]))
                .with(fallback, FetchedResource::ok(Some("image/png"), png(16, 16))),
        );

        let icon = cache.icon("https://example.com/", Some(HINT)).await;

        assert!(icon.is_some());
        assert_eq!(fetcher.calls(), vec![HINT.to_string(), fallback.to_string()]);
    }

    #[tokio::test]
    async fn test_wrong_content_type_falls_through() {
        let fallback = "https://example.com/apple-touch-icon.png";
        let (cache, _) = cache(
            StaticFetcher::new()
                .with(HINT, FetchedResource::ok(Some("text/html"), png(16, 16)))
                .with(fallback, FetchedResource::ok(Some("image/png"), png(24, 24))),
        );

        let icon = cache.icon("https://example.com/", Some(HINT)).await.unwrap();
        assert_eq!(icon.dimensions(), (24, 24));
    }

    #[tokio::test]
    async fn test_exhausted_candidates() {
        let (cache, fetcher) = cache(StaticFetcher::new().with_error(HINT, NetworkError::Timeout));

        assert!(cache.icon("https://example.com/", Some(HINT)).await.is_none());
        assert_eq!(fetcher.calls().len(), 12);
        assert!(cache.is_empty());
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_large_icon_downscaled() {
        let icon = FetchedResource::ok(Some("image/png"), png(512, 384));
        let (cache, _) = cache(StaticFetcher::new().with(HINT, icon));

        let icon = cache.icon("https://example.com/", Some(HINT)).await.unwrap();
        assert_eq!(icon.dimensions(), (256, 192));
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_fetch() {
        let (cache, fetcher) = cache(
            StaticFetcher::new()
                .with(HINT, FetchedResource::ok(Some("image/png"), png(32, 32)))
                .with_delay(Duration::from_millis(20)),
        );

        let requests = (0..8).map(|i| {
            let cache = cache.clone();
            let page = if i % 2 == 0 {
                "https://www.example.com/"
            } else {
                "https://example.com/news"
            };
            async move { cache.icon(page, Some(HINT)).await }
        });
        let results = futures::future::join_all(requests).await;

        assert_eq!(fetcher.calls().len(), 1);
        let first = results[0].clone().unwrap();
        assert!(results.iter().all(|r| r.as_ref().is_some_and(|i| Arc::ptr_eq(i, &first))));
    }

    #[tokio::test]
    async fn test_abandoned_request_still_populates_cache() {
        let (cache, _) = cache(
            StaticFetcher::new()
                .with(HINT, FetchedResource::ok(Some("image/png"), png(32, 32)))
                .with_delay(Duration::from_millis(50)),
        );

        let request = cache.icon("https://example.com/", Some(HINT));
        let abandoned = tokio::time::timeout(Duration::from_millis(5), request).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(cache.cached_icon("https://example.com/").is_some());
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_clear_discards_late_completion() {
        let (cache, _) = cache(
            StaticFetcher::new()
                .with(HINT, FetchedResource::ok(Some("image/png"), png(32, 32)))
                .with_delay(Duration::from_millis(30)),
        );

        let pending = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.icon("https://example.com/", Some(HINT)).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.clear_all();

        // The waiting caller still gets its image
        assert!(pending.await.unwrap().is_some());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_get_prefers_preview() {
        let preview = "https://cdn.example.com/og.jpg";
        let (cache, _) = cache(
            StaticFetcher::new()
                .with(HINT, FetchedResource::ok(Some("image/png"), png(16, 16)))
                .with(preview, FetchedResource::ok(Some("image/png"), png(120, 60))),
        );

        let image = cache.get("https://example.com/", Some(HINT), Some(preview)).await.unwrap();
        assert_eq!(image.dimensions(), (120, 60));
        assert!(cache.cached_preview(preview).is_some());
        assert!(cache.cached_icon("https://example.com/").is_none());

        // Missing preview falls back to the icon
        let image = cache
            .get("https://example.com/", Some(HINT), Some("https://cdn.example.com/missing.jpg"))
            .await
            .unwrap();
        assert_eq!(image.dimensions(), (16, 16));
    }
}
