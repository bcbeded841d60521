//! HTML directory listings driven by watcher events.
//!
//! Each directory under the base gets a listing file naming its
//! subdirectories and files, with links relative to the base so the tree
//! can be served as-is from a web root.

mod render;
mod template;
mod writer;

pub use render::{
    filesizestr, list_entries, relative_to_base, render_directory, EntryKind, ListingEntry,
};
pub use template::{ListingTemplate, DEFAULT_TEMPLATE};
pub use writer::{regenerate_all, should_render, write_listing, RegenerateSummary};
