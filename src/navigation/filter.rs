//! Which completed navigations enter the visit history

use thiserror::Error;
use url::Url;

use crate::config::HistoryConfig;

/// Schemes that never reach the history log
const LOCAL_SCHEMES: &[&str] = &["about", "blob", "data", "file"];

/// Shortest URL worth recording
const MIN_URL_LEN: usize = 10;

/// Why a visit was not recorded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("unparseable URL")]
    Malformed,
    #[error("local scheme {0}")]
    LocalScheme(String),
    #[error("missing title")]
    Untitled,
    #[error("no host")]
    NoHost,
    #[error("blocked host {0}")]
    BlockedHost(String),
    #[error("blocked path segment {0}")]
    BlockedPath(String),
    #[error("URL too short")]
    TooShort,
}

/// Rejects local pages, untitled pages and auth/SSO flows
#[derive(Debug, Clone)]
pub struct HistoryFilter {
    blocked_hosts: Vec<String>,
    blocked_path_segments: Vec<String>,
}

impl HistoryFilter {
    pub fn new(blocked_hosts: Vec<String>, blocked_path_segments: Vec<String>) -> Self {
        Self {
            blocked_hosts: blocked_hosts.into_iter().map(|h| h.to_ascii_lowercase()).collect(),
            blocked_path_segments: blocked_path_segments
                .into_iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(config.blocked_hosts.clone(), config.blocked_path_segments.clone())
    }

    /// Check a completed navigation; `Ok` means it should be recorded
    pub fn check(&self, url: &str, title: &str) -> Result<(), RejectReason> {
        let parsed = Url::parse(url).map_err(|_| RejectReason::Malformed)?;

        let scheme = parsed.scheme();
        if LOCAL_SCHEMES.contains(&scheme) {
            return Err(RejectReason::LocalScheme(scheme.to_string()));
        }

        if title.trim().chars().count() <= 1 {
            return Err(RejectReason::Untitled);
        }

        let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
        if host.is_empty() {
            return Err(RejectReason::NoHost);
        }
        if let Some(blocked) = self
            .blocked_hosts
            .iter()
            .find(|b| host == **b || host.ends_with(&format!(".{b}")))
        {
            return Err(RejectReason::BlockedHost(blocked.clone()));
        }

        let path = parsed.path().to_ascii_lowercase();
        let blocked = self.blocked_path_segments.iter().find(|s| path.contains(s.as_str()));
        if let Some(segment) = blocked {
            return Err(RejectReason::BlockedPath(segment.clone()));
        }

        if url.len() < MIN_URL_LEN {
            return Err(RejectReason::TooShort);
        }
        Ok(())
    }

    pub fn accepts(&self, url: &str, title: &str) -> bool {
        self.check(url, title).is_ok()
    }
}

impl Default for HistoryFilter {
    fn default() -> Self {
        Self::from_config(&HistoryConfig::default())
    }
}
