//! htmldir library
//!
//! Recursive directory watching on Linux inotify, and HTML directory
//! listings kept up to date from the resulting event stream.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod listing;
pub mod observability;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
