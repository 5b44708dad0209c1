//! Page engines and the per-tab engine pool
//!
//! A [`PageEngine`] is one live rendering runtime bound to exactly one tab.
//! Engines report lifecycle callbacks through a [`NavigationDelegate`]
//! handed to them at construction; the pool pairs every engine with its own
//! [`TabNavigationSink`] that forwards those callbacks, tagged with the tab
//! id, onto a single event channel.

mod backforward;
mod delegate;
mod headless;
mod pool;
mod scripted;

pub use backforward::BackForwardList;
pub use delegate::{EngineEvent, NavigationDelegate, NavigationPolicy, TabNavigationSink};
pub use headless::{HeadlessEngine, HeadlessEngineFactory, extract_metadata};
pub use pool::{EngineHandle, EngineInstancePool};
pub use scripted::{ScriptedEngine, ScriptedEngineFactory, ScriptedSite, ScriptedWeb};

use std::sync::Arc;

use async_trait::async_trait;
use image::RgbaImage;

use crate::session::TabId;
use crate::utils::Result;

/// Result of the page-introspection step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetadata {
    pub title: String,
    pub icon_url: Option<String>,
    pub preview_image_url: Option<String>,
    pub description: Option<String>,
}

/// One embedded page-rendering runtime
///
/// Navigation methods are fire-and-forget; outcomes arrive through the
/// engine's [`NavigationDelegate`].
#[async_trait]
pub trait PageEngine: Send + Sync {
    fn load(&self, url: &str);
    fn reload(&self);
    fn go_back(&self);
    fn go_forward(&self);
    fn stop_loading(&self);
    /// Drop rendered content and navigation state
    fn clear_content(&self);

    /// URL of the committed page, `None` while the engine is empty
    fn url(&self) -> Option<String>;
    fn title(&self) -> String;
    fn can_go_back(&self) -> bool;
    fn can_go_forward(&self) -> bool;
    /// Load progress in `0.0..=1.0`
    fn progress(&self) -> f64;

    fn has_content(&self) -> bool {
        self.url().is_some()
    }

    /// Read title, icon and preview hints from the current page
    async fn introspect(&self) -> Result<PageMetadata>;

    /// Rasterize the current content
    async fn capture_snapshot(&self) -> Result<RgbaImage>;
}

/// Builds engines for the pool
pub trait EngineFactory: Send + Sync {
    fn create(&self, tab_id: TabId, delegate: Arc<dyn NavigationDelegate>) -> Arc<dyn PageEngine>;
}
