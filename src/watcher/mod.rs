//! Recursive directory watching on inotify.
//!
//! This module provides:
//! - Parsing of raw inotify records into per-directory events
//! - A watch table kept in step with the directory tree
//! - Race-free coverage of directory trees created in a single burst
//! - A dedicated worker thread feeding a bounded event channel

mod events;
mod installer;
mod reconciler;
mod record;
mod stats;
mod sys;
mod table;
#[cfg(test)]
mod testing;
mod watcher;

pub use events::{Event, Mask, RawRecord, WatchId};
pub use installer::WATCH_MASK;
pub use record::{encode_record, parse_record, RecordReader, BUFFER_LEN, HEADER_LEN, NAME_MAX};
pub use stats::{WatcherStats, WatcherStatsSnapshot};
pub use sys::{Inotify, Notifier};
pub use table::WatchTable;
pub use watcher::{watch, DirWatcher, InitialWalk, WatchHandle, DEFAULT_CHANNEL_CAPACITY};
