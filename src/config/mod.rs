//! Configuration module for Sumi-Fetch
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_fetch::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("fetch.toml")).unwrap();
//! println!("New keys start at {} req/s", config.fetcher.initial_rate);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{AuthConfig, BatchConfig, Config, FetcherConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};

pub use validation::validate_target_url;
