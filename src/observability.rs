//! Structured logging and tracing configuration.
//!
//! Provides setup for observability using the `tracing` crate with:
//! - Structured logging with JSON output option
//! - Configurable log levels, overridable through `RUST_LOG`
//! - Spans for the watcher worker and listing writes

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Initialize tracing with the given level and output format.
///
/// # Panics
///
/// Panics if tracing subscriber has already been initialized in this process.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default().with(env_filter).with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true);

        Registry::default().with(env_filter).with(fmt_layer).init();
    }

    tracing::debug!("Tracing initialized: level={}, json={}", level, json);
}

/// Spans used across the crate.
pub mod spans {
    use std::path::Path;

    use tracing::{info_span, Span};

    /// Span covering the lifetime of a watcher worker.
    #[must_use]
    pub fn watcher_span(root: &Path) -> Span {
        info_span!("watcher", root = %root.display())
    }

    /// Span for writing one directory listing.
    #[must_use]
    pub fn listing_span(dir: &Path) -> Span {
        info_span!("listing", dir = %dir.display())
    }
}
