//! Navigation-event sinks

use tokio::sync::mpsc::UnboundedSender;

use crate::session::TabId;

/// Whether an engine may proceed with a navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationPolicy {
    Allow,
    Cancel,
}

/// Schemes an engine is allowed to navigate to
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "about", "data", "blob", "file"];

/// Lifecycle callbacks of one engine
pub trait NavigationDelegate: Send + Sync {
    fn on_navigation_start(&self, url: &str);
    fn on_progress(&self, progress: f64);
    fn on_finish(&self, url: &str);
    fn on_fail(&self, url: Option<&str>, error: &str);
    fn on_decide_policy(&self, url: &str) -> NavigationPolicy;
}

/// Engine callback, tagged with the tab it came from
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Started {
        tab_id: TabId,
        url: String,
    },
    Progress {
        tab_id: TabId,
        progress: f64,
    },
    Finished {
        tab_id: TabId,
        url: String,
    },
    Failed {
        tab_id: TabId,
        url: Option<String>,
        error: String,
    },
}

impl EngineEvent {
    pub fn tab_id(&self) -> TabId {
        match self {
            Self::Started { tab_id, .. }
            | Self::Progress { tab_id, .. }
            | Self::Finished { tab_id, .. }
            | Self::Failed { tab_id, .. } => *tab_id,
        }
    }
}

/// Sink paired 1:1 with an engine; forwards its callbacks to the router
#[derive(Debug)]
pub struct TabNavigationSink {
    tab_id: TabId,
    events: UnboundedSender<EngineEvent>,
}

impl TabNavigationSink {
    pub fn new(tab_id: TabId, events: UnboundedSender<EngineEvent>) -> Self {
        Self { tab_id, events }
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    fn send(&self, event: EngineEvent) {
        // The router may already be gone during shutdown
        if self.events.send(event).is_err() {
            log::debug!("Dropping engine event for tab {}: router closed", self.tab_id);
        }
    }
}

impl NavigationDelegate for TabNavigationSink {
    fn on_navigation_start(&self, url: &str) {
        self.send(EngineEvent::Started {
            tab_id: self.tab_id,
            url: url.to_string(),
        });
    }

    fn on_progress(&self, progress: f64) {
        self.send(EngineEvent::Progress {
            tab_id: self.tab_id,
            progress: progress.clamp(0.0, 1.0),
        });
    }

    fn on_finish(&self, url: &str) {
        self.send(EngineEvent::Finished {
            tab_id: self.tab_id,
            url: url.to_string(),
        });
    }

    fn on_fail(&self, url: Option<&str>, error: &str) {
        self.send(EngineEvent::Failed {
            tab_id: self.tab_id,
            url: url.map(str::to_string),
            error: error.to_string(),
        });
    }

    fn on_decide_policy(&self, url: &str) -> NavigationPolicy {
        match url::Url::parse(url) {
            Ok(parsed) if ALLOWED_SCHEMES.contains(&parsed.scheme()) => NavigationPolicy::Allow,
            Ok(parsed) => {
                log::info!(
                    "Tab {}: cancelled navigation to {} scheme",
                    self.tab_id,
                    parsed.scheme()
                );
                NavigationPolicy::Cancel
            }
            Err(e) => {
                log::warn!(
                    "Tab {}: cancelled navigation to unparseable {:?}: {}",
                    self.tab_id,
                    url,
                    e
                );
                NavigationPolicy::Cancel
            }
        }
    }
}
