//! Error types and Result aliases for htmldir.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`; the
//! watcher worker uses `WatcherError` directly so callers can tell fatal
//! conditions from recoverable ones.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using htmldir's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for htmldir operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Directory watching error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// Listing generation error.
    #[error("listing error: {0}")]
    Listing(#[from] ListingError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Directory watcher errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// The notification handle could not be opened.
    #[error("failed to initialise inotify: {0}")]
    Init(#[source] std::io::Error),

    /// A record in the read buffer was truncated or malformed.
    #[error("malformed notification record: needed {needed} bytes, {available} available")]
    Protocol { needed: usize, available: usize },

    /// Reading from the notification handle failed.
    #[error("failed to read notifications: {0}")]
    Read(#[source] std::io::Error),

    /// A directory could not be listed.
    #[error("failed to list '{path}': {source}")]
    Listing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The kernel rejected a watch.
    #[error("failed to watch '{path}': {source}")]
    WatchInstall {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The event receiver was dropped.
    #[error("event channel closed")]
    ChannelClosed,
}

/// Listing generation errors.
#[derive(Error, Debug)]
pub enum ListingError {
    /// The listing document could not be built.
    #[error("failed to render listing for '{path}': {reason}")]
    Render { path: PathBuf, reason: String },

    /// The listing document could not be written.
    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl WatcherError {
    /// Whether the worker loop must stop after this error.
    ///
    /// Listing and install failures are only recoverable while re-scanning a
    /// newly created subtree; during the initial walk the caller propagates
    /// them regardless of this classification.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Listing { .. } | Self::WatchInstall { .. })
    }

    pub(crate) fn listing(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Listing {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn watch_install(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WatchInstall {
            path: path.into(),
            source,
        }
    }
}

impl ListingError {
    /// Create a render error.
    pub fn render(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Render {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
