//! Configuration module for Darkwatch
//!
//! This module handles loading, parsing, and validating the TOML configuration
//! document, including the per-forum selector profiles.
//!
//! # Example
//!
//! ```no_run
//! use darkwatch::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("darkwatch.toml")).unwrap();
//! println!("Forums configured: {}", config.forums.len());
//! ```

mod parser;
mod profile;
mod types;
mod validation;

// Re-export types
pub use profile::CompiledProfile;
pub use types::{
    BatchConfig, Config, CrawlerConfig, FetchConfig, ForumProfile, OutputConfig, PassSettings,
    QuarantineConfig, SelectorList, TriageConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
