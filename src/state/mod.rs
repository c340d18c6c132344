//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `LinkState`: the per-link state machine (pending, fetching, persisted, ...)
//! - `RunStatus`: how a whole run ended (completed, aborted, interrupted)

mod link_state;
mod run_status;

// Re-export main types
pub use link_state::LinkState;
pub use run_status::RunStatus;
