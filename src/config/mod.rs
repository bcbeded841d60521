//! Configuration management for htmldir.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables (`HTMLDIR_*`)
//! - Built-in defaults

mod settings;

pub use settings::{Config, DEFAULT_OUTPUT_FILENAME, MAX_CHANNEL_CAPACITY};
