//! Installing watches on single directories and on whole trees.

use std::io;
use std::path::Path;

use walkdir::WalkDir;

use super::events::{Event, Mask, WatchId};
use super::sys::Notifier;
use super::watcher::DirWatcher;
use crate::error::WatcherError;

/// Change kinds requested for every watched directory.
///
/// Entry created, deleted, attributes changed, moved in, moved out, and the
/// watch itself going away; directories only, symlinks not followed.
pub const WATCH_MASK: Mask = Mask::CREATE
    .union(Mask::DELETE)
    .union(Mask::ATTRIB)
    .union(Mask::MOVED_TO)
    .union(Mask::MOVED_FROM)
    .union(Mask::IGNORED)
    .union(Mask::ONLYDIR)
    .union(Mask::DONT_FOLLOW);

impl<N: Notifier> DirWatcher<N> {
    /// Watch a single directory and record it in the table.
    ///
    /// # Errors
    ///
    /// Returns `WatcherError::WatchInstall` if the kernel rejects the watch,
    /// e.g. because the directory is gone or unreadable.
    pub fn install(&mut self, path: &Path) -> Result<WatchId, WatcherError> {
        if path.as_os_str().is_empty() {
            return Err(WatcherError::watch_install(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "empty path"),
            ));
        }

        let id = self
            .notifier
            .add_watch(path, WATCH_MASK)
            .map_err(|e| WatcherError::watch_install(path, e))?;

        let known = self.table.get(id).is_some();
        if let Some(stale) = self.table.put(id, path.to_path_buf()) {
            tracing::debug!(path = %path.display(), wd = %stale, "Replacing stale watch");
            if let Err(e) = self.notifier.remove_watch(stale) {
                tracing::trace!(wd = %stale, error = %e, "Stale watch already released");
            }
            self.stats.watches_removed(1);
        }
        if !known {
            self.stats.watch_added();
            tracing::debug!(path = %path.display(), wd = %id, "Watching directory");
        }
        Ok(id)
    }

    /// Watch `root` and every directory beneath it.
    ///
    /// Walks depth-first without following symbolic links. When
    /// `emit_synthesized` is set, each directory gets a synthesized event
    /// right after its watch is in place. Stops at the first failure; watches
    /// installed before it stay in place.
    ///
    /// # Errors
    ///
    /// Returns `WatcherError::Listing` if part of the tree cannot be read,
    /// `WatcherError::WatchInstall` if a watch is rejected, and
    /// `WatcherError::ChannelClosed` if the receiver is gone.
    pub fn install_tree(&mut self, root: &Path, emit_synthesized: bool) -> Result<usize, WatcherError> {
        let mut installed = 0;

        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                WatcherError::listing(path, e.into())
            })?;

            if !entry.file_type().is_dir() {
                continue;
            }

            self.install(entry.path())?;
            if emit_synthesized {
                self.send(Event::synthesized(entry.path().to_path_buf()))?;
            }
            installed += 1;
        }

        Ok(installed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::testing::MockNotifier;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn drain(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_watch_mask_requests_structural_changes_only() {
        assert!(WATCH_MASK.contains(Mask::CREATE | Mask::DELETE | Mask::ATTRIB));
        assert!(WATCH_MASK.contains(Mask::MOVED_FROM | Mask::MOVED_TO));
        assert!(WATCH_MASK.contains(Mask::ONLYDIR | Mask::DONT_FOLLOW));
        assert!(!WATCH_MASK.intersects(Mask::MODIFY | Mask::ACCESS | Mask::OPEN));
        assert_eq!(WATCH_MASK.bits(), 0x0300_83C4);
    }

    #[test]
    fn test_install_tree_watches_directories_only() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::create_dir(root.join("c")).unwrap();
        fs::write(root.join("a/file.txt"), "x").unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let mut watcher = DirWatcher::new(MockNotifier::new(), tx);

        let installed = watcher.install_tree(root, false).unwrap();
        assert_eq!(installed, 4);
        assert_eq!(
            watcher.table().paths(),
            vec![
                root.to_path_buf(),
                root.join("a"),
                root.join("a/b"),
                root.join("c")
            ]
        );
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_install_tree_emits_after_each_install() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("b/c")).unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let mut watcher = DirWatcher::new(MockNotifier::new(), tx);
        watcher.install_tree(root, true).unwrap();

        let events = drain(&mut rx);
        let dirs: Vec<PathBuf> = events.iter().map(|e| e.dir.clone()).collect();
        assert_eq!(dirs, vec![root.to_path_buf(), root.join("b"), root.join("b/c")]);
        assert!(events.iter().all(Event::is_synthesized));
        for dir in &dirs {
            assert!(watcher.table().contains_path(dir));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_install_tree_does_not_follow_symlinks() {
        let tmp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::create_dir(outside.path().join("elsewhere")).unwrap();
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("link")).unwrap();

        let (tx, _rx) = mpsc::channel(16);
        let mut watcher = DirWatcher::new(MockNotifier::new(), tx);
        watcher.install_tree(tmp.path(), false).unwrap();

        assert_eq!(watcher.table().paths(), vec![tmp.path().to_path_buf()]);
    }

    #[test]
    fn test_install_tree_aborts_on_rejected_watch() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("a")).unwrap();
        fs::create_dir_all(root.join("b")).unwrap();

        let mut notifier = MockNotifier::new();
        notifier.reject(root.join("a"));
        let (tx, _rx) = mpsc::channel(16);
        let mut watcher = DirWatcher::new(notifier, tx);

        let err = watcher.install_tree(root, false).unwrap_err();
        assert!(matches!(err, WatcherError::WatchInstall { ref path, .. } if path == &root.join("a")));
        // The root was watched before the failure; nothing is rolled back.
        assert!(watcher.table().contains_path(root));
        assert!(!watcher.table().contains_path(&root.join("b")));
    }

    #[test]
    fn test_install_tree_missing_root_is_listing_error() {
        let tmp = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::channel(16);
        let mut watcher = DirWatcher::new(MockNotifier::new(), tx);

        let err = watcher.install_tree(&tmp.path().join("missing"), false).unwrap_err();
        assert!(matches!(err, WatcherError::Listing { .. }));
    }

    #[test]
    fn test_install_rejects_empty_path() {
        let (tx, _rx) = mpsc::channel(16);
        let mut watcher = DirWatcher::new(MockNotifier::new(), tx);
        assert!(watcher.install(Path::new("")).is_err());
        assert!(watcher.table().is_empty());
    }
}
