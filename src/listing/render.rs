//! Building the listing document for one directory.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use url::Url;

use super::template::ListingTemplate;
use crate::error::ListingError;
use crate::Result;

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;
const TB: u64 = 1024 * GB;

const TIME_FORMAT: &str = "%d-%b-%Y  %H:%M:%S %Z";

/// Kind of a listed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryKind {
    Dir,
    File,
}

impl EntryKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dir => "DIR",
            Self::File => "FILE",
        }
    }
}

/// One row of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub kind: EntryKind,
    /// Display name; directories carry a trailing `/`.
    pub name: String,
    /// Percent-encoded link relative to the base.
    pub link: String,
    /// Human-readable size, empty for directories.
    pub size: String,
    pub modified: String,
}

/// Path of `dir` relative to `base`, without leading or trailing separator.
///
/// Empty for the base itself and for directories outside it.
#[must_use]
pub fn relative_to_base(base: &Path, dir: &Path) -> String {
    dir.strip_prefix(base)
        .map(|rel| rel.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Human-readable file size.
///
/// Sizes under 1 KiB are plain byte counts; KB and MB round up; GB and TB
/// keep one decimal.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn filesizestr(size: u64) -> String {
    match size {
        s if s < KB => s.to_string(),
        s if s < MB => format!("{}KB", s.div_ceil(KB)),
        s if s < GB => format!("{}MB", s.div_ceil(MB)),
        s if s < TB => format!("{:.1}GB", s as f64 / GB as f64),
        s => format!("{:.1}TB", s as f64 / TB as f64),
    }
}

fn format_modified(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(TIME_FORMAT).to_string()
}

/// Percent-encode a root-relative link.
///
/// The result holds no character that needs HTML escaping inside a quoted
/// attribute.
fn encode_link(origin: &Url, link: &str) -> String {
    let mut url = origin.clone();
    url.set_path(link);
    url.path().replace('&', "%26").replace('\'', "%27")
}

/// Collect the rows for `dir`, parent entry first.
///
/// Entries are read without following symbolic links; links themselves and
/// the listing file are left out. Directories come before files, each group
/// sorted by name.
///
/// # Errors
///
/// Returns `ListingError::Render` if the directory or its parent cannot be
/// read.
pub fn list_entries(
    base: &Path,
    dir: &Path,
    output_filename: &str,
) -> std::result::Result<Vec<ListingEntry>, ListingError> {
    let origin = Url::parse("http://localhost/")
        .map_err(|e| ListingError::render(dir, format!("link base: {e}")))?;
    let relative = relative_to_base(base, dir);

    let mut entries = Vec::new();
    for item in fs::read_dir(dir)
        .map_err(|e| ListingError::render(dir, format!("cannot read directory: {e}")))?
    {
        let item = match item {
            Ok(item) => item,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        let name = item.file_name().to_string_lossy().into_owned();
        if name == output_filename {
            continue;
        }

        // Entry may vanish between readdir and lstat.
        let Ok(meta) = item.metadata() else {
            tracing::debug!(dir = %dir.display(), name = %name, "Entry vanished");
            continue;
        };
        if meta.file_type().is_symlink() {
            continue;
        }

        let (kind, name, size) = if meta.is_dir() {
            (EntryKind::Dir, format!("{name}/"), String::new())
        } else {
            (EntryKind::File, name, filesizestr(meta.len()))
        };
        let link = if relative.is_empty() {
            format!("/{name}")
        } else {
            format!("/{relative}/{name}")
        };
        let modified = meta.modified().map(format_modified).unwrap_or_default();

        entries.push(ListingEntry {
            kind,
            link: encode_link(&origin, &link),
            name,
            size,
            modified,
        });
    }
    entries.sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));

    if !relative.is_empty() {
        let parent = dir.parent().unwrap_or(base);
        let meta = fs::symlink_metadata(parent)
            .map_err(|e| ListingError::render(dir, format!("cannot read parent: {e}")))?;
        let parent_rel = relative_to_base(base, parent);
        let link = if parent_rel.is_empty() {
            "/".to_string()
        } else {
            format!("/{parent_rel}/")
        };

        entries.insert(
            0,
            ListingEntry {
                kind: EntryKind::Dir,
                name: "../".to_string(),
                link: encode_link(&origin, &link),
                size: String::new(),
                modified: meta.modified().map(format_modified).unwrap_or_default(),
            },
        );
    }

    Ok(entries)
}

/// Render the listing document for `dir` through `template`.
///
/// # Errors
///
/// Returns an error if the directory cannot be read or the template fails.
pub fn render_directory(
    base: &Path,
    dir: &Path,
    output_filename: &str,
    template: &ListingTemplate,
) -> Result<String> {
    let entries = list_entries(base, dir, output_filename)?;
    Ok(template.render(dir, &relative_to_base(base, dir), &entries)?)
}
