//! Console reports for the command-line surface
//!
//! This module renders:
//! - The configuration plan shown by `check`
//! - Per-forum crawl results
//! - Triage pass counts and output locations
//! - Batch manifests, chunk by chunk
//! - Individual alert findings

mod report;

pub use report::{
    print_batch_manifest, print_config_plan, print_crawl_summary, print_finding,
    print_triage_summary, render_batch_manifest, render_config_plan, render_crawl_summary,
    render_finding, render_triage_summary,
};
