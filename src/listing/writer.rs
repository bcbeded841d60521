//! Writing listings to disk.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::render::render_directory;
use super::template::ListingTemplate;
use crate::error::ListingError;
use crate::observability::spans;
use crate::watcher::Event;
use crate::Result;

/// Outcome of a full regeneration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegenerateSummary {
    pub written: usize,
    pub failed: usize,
}

/// Whether `event` should trigger a new listing for its directory.
///
/// Changes to the listing file itself are ignored, so writing a listing
/// never triggers another one.
#[must_use]
pub fn should_render(event: &Event, output_filename: &str) -> bool {
    !event.names(output_filename)
}

/// Render the listing for `dir` through `template` and write it to
/// `dir/output_filename`.
///
/// Returns the path written.
///
/// # Errors
///
/// Returns an error if the directory cannot be read or the file cannot be
/// written.
pub fn write_listing(
    base: &Path,
    dir: &Path,
    output_filename: &str,
    template: &ListingTemplate,
) -> Result<PathBuf> {
    let span = spans::listing_span(dir);
    let _guard = span.enter();

    let document = render_directory(base, dir, output_filename, template)?;
    let target = dir.join(output_filename);

    write_document(&target, &document).map_err(|source| ListingError::Write {
        path: target.clone(),
        source,
    })?;

    tracing::debug!(path = %target.display(), bytes = document.len(), "Listing written");
    Ok(target)
}

fn write_document(target: &Path, document: &str) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(target)?);
    writer.write_all(document.as_bytes())?;
    writer.flush()
}

/// Write a listing into every directory under `base`, `base` included.
///
/// Symbolic links are not followed. A directory that fails is logged and
/// counted; the walk carries on.
pub fn regenerate_all(
    base: &Path,
    output_filename: &str,
    template: &ListingTemplate,
) -> RegenerateSummary {
    let mut summary = RegenerateSummary::default();

    tracing::info!(path = %base.display(), "Regenerating all listings");

    for entry in WalkDir::new(base).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Error walking directory");
                summary.failed += 1;
                continue;
            }
        };

        if !entry.file_type().is_dir() {
            continue;
        }

        match write_listing(base, entry.path(), output_filename, template) {
            Ok(_) => summary.written += 1,
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "Failed to write listing");
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        path = %base.display(),
        written = summary.written,
        failed = summary.failed,
        "Regeneration complete"
    );

    summary
}
