//! State module for tracking crawl progress
//!
//! Each seed list URL is walked by a small state machine:
//! `ListPage -> [ThreadPage]* -> NextListPage -> ... -> Done`.
//!
//! # Components
//!
//! - `CrawlPhase`: the phase a seed's pagination walk is in
//! - `SeedCursor`: tracks the phase, the current list URL and the page budget

mod crawl_phase;

// Re-export main types
pub use crawl_phase::{CrawlPhase, SeedCursor};
