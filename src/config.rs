//! Session configuration
//!
//! Every field has a default, so a JSON config file only needs to name the
//! values it overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::utils::Result;

/// Top-level configuration for a browsing session
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// App-private directory for on-disk state
    pub data_dir: PathBuf,
    /// Maximum number of live engine instances kept resident
    pub max_resident_engines: usize,
    pub history: HistoryConfig,
    pub snapshot: SnapshotConfig,
    pub favicon: FaviconConfig,
    pub toolbar: ToolbarConfig,
    pub search: SearchConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("tabdeck-data"),
            max_resident_engines: 16,
            history: HistoryConfig::default(),
            snapshot: SnapshotConfig::default(),
            favicon: FaviconConfig::default(),
            toolbar: ToolbarConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Use `dir` as the data directory
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Directory holding per-tab snapshot files
    pub fn snapshot_dir(&self) -> PathBuf {
        match &self.snapshot.directory {
            Some(dir) => dir.clone(),
            None => self.data_dir.join("snapshots"),
        }
    }

    /// Directory backing the key-value store
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }
}

/// Visit-history filtering and capacity
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub capacity: usize,
    /// Hosts never recorded (matches the host itself and its subdomains)
    pub blocked_hosts: Vec<String>,
    /// Path fragments that mark auth/SSO flows
    pub blocked_path_segments: Vec<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            blocked_hosts: [
                "accounts.google.com",
                "login.microsoftonline.com",
                "login.live.com",
                "appleid.apple.com",
                "auth0.com",
                "okta.com",
                "login.yahoo.com",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            blocked_path_segments: ["/oauth", "/login", "/sso", "/callback", "/signin"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Tab snapshot rendering and storage
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Override for the snapshot directory
    pub directory: Option<PathBuf>,
    /// Snapshots are downsampled to this width
    pub target_width: u32,
    /// JPEG quality (1-100)
    pub quality: u8,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            directory: None,
            target_width: 300,
            quality: 70,
        }
    }
}

/// Icon and preview-image fetching
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FaviconConfig {
    pub timeout_secs: u64,
    pub max_icon_bytes: usize,
    pub max_preview_bytes: usize,
    /// Accepted images are scaled down to fit this square
    pub max_dimension: u32,
    /// Paths probed at the domain root, https first then http
    pub conventional_paths: Vec<String>,
    /// Lookup services; `{domain}` is replaced by the normalized domain
    pub services: Vec<String>,
    pub user_agent: String,
}

impl Default for FaviconConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_icon_bytes: 1024 * 1024,
            max_preview_bytes: 5 * 1024 * 1024,
            max_dimension: 256,
            conventional_paths: [
                "/apple-touch-icon.png",
                "/apple-touch-icon-precomposed.png",
                "/favicon.ico",
                "/favicon.png",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            services: [
                "https://www.google.com/s2/favicons?domain={domain}&sz=128",
                "https://icons.duckduckgo.com/ip3/{domain}.ico",
                "https://logo.clearbit.com/{domain}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            user_agent: format!("Tabdeck/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl FaviconConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Toolbar auto-hide thresholds, in points
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolbarConfig {
    /// Scroll callbacks ignored after (re)initialization
    pub ignored_callbacks: u32,
    /// Offsets below this always show the toolbar
    pub top_zone: f64,
    /// No transitions within this distance of the content end
    pub bottom_zone: f64,
    /// Deltas smaller than this are noise
    pub noise_floor: f64,
    /// Accumulated movement needed to flip state
    pub threshold: f64,
}

impl Default for ToolbarConfig {
    fn default() -> Self {
        Self {
            ignored_callbacks: 3,
            top_zone: 100.0,
            bottom_zone: 150.0,
            noise_floor: 8.0,
            threshold: 10.0,
        }
    }
}

/// Default search provider
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Query URL; `{query}` is replaced by the form-encoded input
    pub template: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            template: "https://www.google.com/search?q={query}".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.history.capacity, 1000);
        assert_eq!(config.favicon.max_icon_bytes, 1_048_576);
        assert_eq!(config.favicon.max_dimension, 256);
        assert_eq!(config.favicon.timeout(), Duration::from_secs(10));
        assert_eq!(config.snapshot_dir(), PathBuf::from("tabdeck-data/snapshots"));
    }

    #[test]
    fn test_partial_json_override() {
        let config: SessionConfig = serde_json::from_str(
            r#"{ "max_resident_engines": 4, "history": { "capacity": 50 } }"#,
        )
        .unwrap();
        assert_eq!(config.max_resident_engines, 4);
        assert_eq!(config.history.capacity, 50);
        // Unnamed nested fields keep their defaults
        assert!(config.history.blocked_path_segments.contains(&"/oauth".to_string()));
        assert_eq!(config.toolbar.noise_floor, 8.0);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "snapshot": { "target_width": 200 } }"#).unwrap();

        let config = SessionConfig::load(&path).unwrap();
        assert_eq!(config.snapshot.target_width, 200);
        assert_eq!(config.snapshot.quality, 70);
    }
}
