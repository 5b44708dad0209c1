//! # Tabdeck - Multi-Tab Browsing Session Manager
//!
//! Manages many concurrent page engines ("tabs"), each with its own
//! navigation state, plus the caches that make a tab switcher and address
//! bar feel instant.
//!
//! ## Architecture
//!
//! The crate is organized into the following core modules:
//!
//! - **session**: Persisted tab registry and capped visit history
//! - **engine**: Page-engine interface, navigation sinks and the engine pool
//! - **snapshot**: Memory + disk cache of per-tab page snapshots
//! - **favicon**: Site icon / preview image cache with request coalescing
//! - **navigation**: Router tying intents and engine events to the session
//! - **storage**: Key-value persistence backends
//! - **config**: Session configuration
//! - **utils**: Shared error types

pub mod config;
pub mod engine;
pub mod favicon;
pub mod navigation;
pub mod session;
pub mod snapshot;
pub mod storage;
pub mod utils;

// Re-export main types for convenience
pub use config::SessionConfig;
pub use engine::{EngineInstancePool, PageEngine};
pub use favicon::FaviconCache;
pub use navigation::{NavigationRouter, NavigationState};
pub use session::{TabId, TabRecord, TabRegistry};
pub use snapshot::SnapshotCache;
pub use utils::error::{Result, TabdeckError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "Tabdeck";
