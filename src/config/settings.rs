//! Configuration settings and validation.

use crate::watcher::DEFAULT_CHANNEL_CAPACITY;
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Default name of the listing file written into each directory.
pub const DEFAULT_OUTPUT_FILENAME: &str = ".directory.html";

/// Largest accepted event channel bound.
pub const MAX_CHANNEL_CAPACITY: usize = 65_536;

/// Main configuration for htmldir.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the served tree. Listings link relative to it.
    pub base_dir: PathBuf,

    /// Write listings for the existing tree before watching it.
    pub regenerate_all: bool,

    /// Exit after the initial regeneration instead of watching.
    pub exit_after_regenerate: bool,

    /// Bound of the event channel between watcher and consumer.
    pub channel_capacity: usize,

    /// File name of the listing written into each directory.
    pub output_filename: String,

    /// Template file for listings; the built-in layout when `None`.
    pub template: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/"),
            regenerate_all: false,
            exit_after_regenerate: false,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            output_filename: DEFAULT_OUTPUT_FILENAME.to_string(),
            template: None,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    /// Create a configuration for `base_dir` with defaults elsewhere.
    ///
    /// A trailing separator on `base_dir` is dropped.
    #[must_use]
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: normalize_dir(base_dir.as_ref()),
            ..Self::default()
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if !self.base_dir.is_absolute() {
            return Err(Error::config(format!(
                "base directory '{}' must be absolute",
                self.base_dir.display()
            )));
        }

        match std::fs::metadata(&self.base_dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(Error::config(format!(
                    "base directory '{}' is not a directory",
                    self.base_dir.display()
                )));
            }
            Err(e) => {
                return Err(Error::config(format!(
                    "base directory '{}' is not accessible: {e}",
                    self.base_dir.display()
                )));
            }
        }

        if self.exit_after_regenerate && !self.regenerate_all {
            return Err(Error::config(
                "exit after regenerate requires regenerate all",
            ));
        }

        if self.channel_capacity == 0 {
            return Err(Error::config("channel_capacity cannot be 0"));
        }

        if self.channel_capacity > MAX_CHANNEL_CAPACITY {
            return Err(Error::config(format!(
                "channel_capacity cannot exceed {MAX_CHANNEL_CAPACITY}"
            )));
        }

        if self.output_filename.is_empty() {
            return Err(Error::config("output filename cannot be empty"));
        }

        if self.output_filename.contains(std::path::MAIN_SEPARATOR)
            || self.output_filename.contains('/')
        {
            return Err(Error::config(format!(
                "output filename '{}' cannot contain a path separator",
                self.output_filename
            )));
        }

        if let Some(template) = &self.template {
            if !template.is_file() {
                return Err(Error::config(format!(
                    "template '{}' is not a readable file",
                    template.display()
                )));
            }
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    /// Whether the tree is only regenerated once, without watching.
    #[must_use]
    pub const fn regenerate_only(&self) -> bool {
        self.regenerate_all && self.exit_after_regenerate
    }
}

/// Rebuild `path` from its components, dropping trailing separators.
fn normalize_dir(path: &Path) -> PathBuf {
    path.components().collect()
}
