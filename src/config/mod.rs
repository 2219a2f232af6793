//! Configuration module for Sumi-Engine
//!
//! This module handles loading, parsing, and validating TOML crawl configuration.
//!
//! # Example
//!
//! ```no_run
//! use sumi_engine::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawl.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.max_crawl_depth);
//! ```

mod parser;
mod types;
mod validation;

pub use types::CrawlConfig;

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
