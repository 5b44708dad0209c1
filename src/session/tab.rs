//! Tab records

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title given to blank tabs
pub const DEFAULT_TAB_TITLE: &str = "New Tab";

/// Unique tab identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(Uuid);

impl TabId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for TabId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Persisted state of one tab
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabRecord {
    pub id: TabId,
    pub title: String,
    /// Every accepted visit, oldest first; duplicates are kept
    pub history: Vec<String>,
    pub current_url: String,
}

impl TabRecord {
    /// Create a record with a fresh id
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: TabId::new(),
            title: title.into(),
            history: Vec::new(),
            current_url: url.into(),
        }
    }

    /// Create an empty "New Tab" record
    pub fn blank() -> Self {
        Self::new(DEFAULT_TAB_TITLE, "")
    }

    /// Record a completed navigation
    pub fn record_visit(&mut self, url: &str, title: &str) {
        self.history.push(url.to_string());
        self.current_url = url.to_string();
        if !title.is_empty() {
            self.title = title.to_string();
        }
    }

    pub fn is_blank(&self) -> bool {
        self.current_url.is_empty()
    }
}
