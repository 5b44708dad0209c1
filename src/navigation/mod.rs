//! Navigation routing, address normalization, history filtering and toolbar state

mod address;
mod filter;
mod router;
mod toolbar;

pub use address::normalize_address;
pub use filter::{HistoryFilter, RejectReason};
pub use router::{NavigationRouter, NavigationState};
pub use toolbar::{ToolbarController, ToolbarVisibility};
