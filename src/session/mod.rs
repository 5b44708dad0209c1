//! Persisted browsing session
//!
//! - **tab**: tab identifiers and records
//! - **registry**: ordered tab list plus the active-tab pointer
//! - **history**: capped, newest-first log of accepted visits

mod history;
mod registry;
mod tab;

pub use history::{HistoryEntry, HistoryLog};
pub use registry::{SessionState, TabRegistry};
pub use tab::{DEFAULT_TAB_TITLE, TabId, TabRecord};
