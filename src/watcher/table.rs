//! Watch table: which directories are currently covered, and by which watch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::events::WatchId;
use super::sys::Notifier;

/// Bidirectional map between live watches and absolute directory paths.
///
/// Every id in the table names a watch the notifier still holds, and every
/// watched directory has exactly one entry.
#[derive(Debug, Default)]
pub struct WatchTable {
    by_id: HashMap<WatchId, PathBuf>,
    by_path: HashMap<PathBuf, WatchId>,
}

impl WatchTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` watches `path`.
    ///
    /// Returns the id previously recorded for `path` if it differs from `id`;
    /// that watch belonged to a directory that has since been replaced and
    /// should be released by the caller.
    pub fn put(&mut self, id: WatchId, path: PathBuf) -> Option<WatchId> {
        debug_assert!(!path.as_os_str().is_empty(), "watch table entries need a path");

        if let Some(old_path) = self.by_id.get(&id) {
            if old_path != &path {
                self.by_path.remove(old_path);
            }
        }

        let displaced = self
            .by_path
            .insert(path.clone(), id)
            .filter(|&previous| previous != id);
        if let Some(previous) = displaced {
            self.by_id.remove(&previous);
        }

        self.by_id.insert(id, path);
        self.check_consistency();
        displaced
    }

    /// Path watched by `id`.
    #[must_use]
    pub fn get(&self, id: WatchId) -> Option<&Path> {
        self.by_id.get(&id).map(PathBuf::as_path)
    }

    /// Watch covering `path`.
    #[must_use]
    pub fn id_of(&self, path: &Path) -> Option<WatchId> {
        self.by_path.get(path).copied()
    }

    #[must_use]
    pub fn contains_path(&self, path: &Path) -> bool {
        self.by_path.contains_key(path)
    }

    /// Forget `id` without touching the underlying watch.
    pub fn remove_by_id(&mut self, id: WatchId) -> Option<PathBuf> {
        let path = self.by_id.remove(&id)?;
        self.by_path.remove(&path);
        self.check_consistency();
        Some(path)
    }

    /// Remove `root` and every entry beneath it, releasing each watch.
    ///
    /// Release failures are ignored: the kernel drops watches on its own when
    /// their directory goes away. Returns the removed entries.
    pub fn remove_subtree<N: Notifier>(
        &mut self,
        root: &Path,
        notifier: &mut N,
    ) -> Vec<(WatchId, PathBuf)> {
        let doomed: Vec<WatchId> = self
            .by_id
            .iter()
            .filter(|(_, path)| path.starts_with(root))
            .map(|(&id, _)| id)
            .collect();

        let mut removed = Vec::with_capacity(doomed.len());
        for id in doomed {
            if let Some(path) = self.remove_by_id(id) {
                if let Err(e) = notifier.remove_watch(id) {
                    tracing::trace!(wd = %id, error = %e, "Watch already released");
                }
                removed.push((id, path));
            }
        }
        removed
    }

    /// Release every watch and empty the table.
    pub fn clear<N: Notifier>(&mut self, notifier: &mut N) -> usize {
        let count = self.by_id.len();
        for (id, _) in self.by_id.drain() {
            if let Err(e) = notifier.remove_watch(id) {
                tracing::trace!(wd = %id, error = %e, "Watch already released");
            }
        }
        self.by_path.clear();
        count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Watched paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.by_path.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn check_consistency(&self) {
        debug_assert_eq!(
            self.by_id.len(),
            self.by_path.len(),
            "watch table directions out of step"
        );
    }
}
