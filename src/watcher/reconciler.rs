//! Turning kernel records into watch table updates and outgoing events.
//!
//! Each record is handled on its own; what to do is decided entirely by
//! its mask:
//!
//! - `IN_IGNORED`: the kernel dropped the watch. Forget the directory and
//!   everything below it. Nothing is forwarded.
//! - a subdirectory deleted or moved out: forget that subtree, then forward.
//! - a subdirectory created or moved in: watch it and any directories
//!   already inside it, then forward.
//! - anything else: forward.
//!
//! Table updates always finish before the record's event is sent, so a
//! consumer re-reading the directory sees coverage that matches it.

use std::fs;
use std::path::{Path, PathBuf};

use super::events::{Event, Mask, WatchId};
use super::sys::Notifier;
use super::watcher::DirWatcher;
use crate::error::WatcherError;

const GONE: Mask = Mask::DELETE.union(Mask::MOVED_FROM);
const ARRIVED: Mask = Mask::CREATE.union(Mask::MOVED_TO);

impl<N: Notifier> DirWatcher<N> {
    /// Apply one record reported on watch `wd`.
    ///
    /// # Errors
    ///
    /// Only `WatcherError::ChannelClosed`; listing and install failures while
    /// re-scanning a new subtree are logged and skipped.
    pub fn reconcile(&mut self, wd: WatchId, event: Event) -> Result<(), WatcherError> {
        if event.mask.contains(Mask::IGNORED) {
            let removed = self.forget_subtree(&event.dir);
            tracing::debug!(
                wd = %wd,
                path = %event.dir.display(),
                removed,
                "Watch dropped by kernel"
            );
            return Ok(());
        }

        if event.mask.contains(Mask::ISDIR) && !event.mask.contains(Mask::ATTRIB) {
            if let Some(child) = event.entry_path() {
                if event.mask.intersects(GONE) {
                    let removed = self.forget_subtree(&child);
                    tracing::debug!(path = %child.display(), removed, "Directory left the tree");
                }
                if event.mask.intersects(ARRIVED) {
                    tracing::debug!(path = %child.display(), "Directory entered the tree");
                    self.watch_new_subtree(&child)?;
                }
            }
        }

        self.send(event)
    }

    /// Watch a directory that just appeared, and everything already in it.
    ///
    /// The directory's children may have been created before its watch
    /// existed, so no record will ever report them. Each directory is
    /// listed right after it is watched and its unwatched subdirectories
    /// are handled the same way, parents before children. Every directory
    /// watched here gets one synthesized event.
    ///
    /// # Errors
    ///
    /// Only fatal errors, in practice `WatcherError::ChannelClosed`.
    pub fn watch_new_subtree(&mut self, path: &Path) -> Result<(), WatcherError> {
        let mut pending = vec![path.to_path_buf()];

        while let Some(dir) = pending.pop() {
            match self.install(&dir) {
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping new directory");
                    continue;
                }
            }
            self.send(Event::synthesized(dir.clone()))?;

            match self.unwatched_subdirs(&dir) {
                Ok(children) => pending.extend(children.into_iter().rev()),
                Err(e) => tracing::warn!(error = %e, "Abandoning scan of new directory"),
            }
        }
        Ok(())
    }

    /// Subdirectories of `dir` not yet in the table, sorted by name.
    fn unwatched_subdirs(&self, dir: &Path) -> Result<Vec<PathBuf>, WatcherError> {
        let entries = fs::read_dir(dir).map_err(|e| WatcherError::listing(dir, e))?;

        let mut children = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(path = %dir.display(), error = %e, "Error reading directory entry");
                    continue;
                }
            };
            // `DirEntry::file_type` does not follow symlinks.
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            if is_dir {
                let child = entry.path();
                if !self.table.contains_path(&child) {
                    children.push(child);
                }
            }
        }
        children.sort();
        Ok(children)
    }

    fn forget_subtree(&mut self, root: &Path) -> usize {
        let removed = self.table.remove_subtree(root, &mut self.notifier);
        for (wd, path) in &removed {
            tracing::trace!(wd = %wd, path = %path.display(), "Unwatched directory");
        }
        self.stats.watches_removed(removed.len());
        removed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::record::encode_record;
    use crate::watcher::testing::MockNotifier;
    use std::ffi::OsString;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct Harness {
        tmp: TempDir,
        root: PathBuf,
        watcher: DirWatcher<MockNotifier>,
        rx: mpsc::Receiver<Event>,
    }

    impl Harness {
        /// Root `a` containing `a/b`, fully watched, initial events drained.
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let root = tmp.path().join("a");
            fs::create_dir_all(root.join("b")).unwrap();

            let (tx, rx) = mpsc::channel(256);
            let mut watcher = DirWatcher::new(MockNotifier::new(), tx);
            watcher.install_tree(&root, true).unwrap();

            let mut harness = Self {
                tmp,
                root,
                watcher,
                rx,
            };
            let initial = harness.drain();
            assert_eq!(initial.len(), 2);
            harness
        }

        fn record(&self, dir: &Path, mask: Mask, name: Option<&str>) -> (WatchId, Event) {
            let wd = self.watcher.table().id_of(dir).unwrap();
            let event = Event {
                dir: dir.to_path_buf(),
                mask,
                cookie: 0,
                name: name.map(OsString::from),
            };
            (wd, event)
        }

        fn apply(&mut self, dir: &Path, mask: Mask, name: Option<&str>) {
            let (wd, event) = self.record(dir, mask, name);
            self.watcher.reconcile(wd, event).unwrap();
        }

        fn drain(&mut self) -> Vec<Event> {
            let mut events = Vec::new();
            while let Ok(event) = self.rx.try_recv() {
                events.push(event);
            }
            events
        }

        /// Directories under the root according to the filesystem.
        fn directories_on_disk(&self) -> Vec<PathBuf> {
            let mut dirs: Vec<PathBuf> = walkdir::WalkDir::new(&self.root)
                .follow_links(false)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_dir())
                .map(|e| e.path().to_path_buf())
                .collect();
            dirs.sort();
            dirs
        }
    }

    #[test]
    fn test_file_change_forwards_without_table_change() {
        let mut h = Harness::new();
        let b = h.root.join("b");
        fs::write(b.join("notes.txt"), "x").unwrap();

        h.apply(&b, Mask::CREATE, Some("notes.txt"));

        let events = h.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].dir, b);
        assert!(events[0].names("notes.txt"));
        assert_eq!(h.watcher.table().len(), 2);
    }

    #[test]
    fn test_attribute_change_on_watched_directory_has_no_name() {
        let mut h = Harness::new();
        let root = h.root.clone();

        h.apply(&root, Mask::ATTRIB, None);

        let events = h.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].dir, root);
        assert!(events[0].name.is_none());
    }

    #[test]
    fn test_attribute_change_on_subdirectory_is_forwarded_only() {
        let mut h = Harness::new();
        let root = h.root.clone();

        h.apply(&root, Mask::ATTRIB | Mask::ISDIR, Some("b"));

        assert_eq!(h.drain().len(), 1);
        assert_eq!(h.watcher.table().len(), 2);
        assert!(h.watcher.notifier().removed().is_empty());
    }

    #[test]
    fn test_new_directory_event_order() {
        let mut h = Harness::new();
        let root = h.root.clone();
        fs::create_dir(root.join("fresh")).unwrap();

        h.apply(&root, Mask::CREATE | Mask::ISDIR, Some("fresh"));

        let events = h.drain();
        assert_eq!(events.len(), 2);
        assert!(events[0].is_synthesized());
        assert_eq!(events[0].dir, root.join("fresh"));
        assert!(!events[1].is_synthesized());
        assert_eq!(events[1].dir, root);
        assert!(events[1].names("fresh"));
        assert!(h.watcher.table().contains_path(&root.join("fresh")));
    }

    #[test]
    fn test_nested_burst_is_fully_watched() {
        let mut h = Harness::new();
        let b = h.root.join("b");
        // c, d and e all exist before the single record for c is read.
        fs::create_dir_all(b.join("c/d/e")).unwrap();
        fs::write(b.join("c/d/page.txt"), "x").unwrap();

        h.apply(&b, Mask::CREATE | Mask::ISDIR, Some("c"));

        let events = h.drain();
        let dirs: Vec<PathBuf> = events.iter().map(|e| e.dir.clone()).collect();
        assert_eq!(
            dirs,
            vec![b.join("c"), b.join("c/d"), b.join("c/d/e"), b.clone()]
        );
        assert!(events[..3].iter().all(Event::is_synthesized));
        assert!(events[3].names("c"));

        assert_eq!(h.watcher.table().paths(), h.directories_on_disk());
        assert_eq!(h.watcher.table().len(), 5);
    }

    #[test]
    fn test_wide_burst_synthesizes_each_directory_once() {
        let mut h = Harness::new();
        let root = h.root.clone();
        let top = root.join("pasted");
        for i in 0..10 {
            fs::create_dir_all(top.join(format!("dir{i}/inner"))).unwrap();
        }

        h.apply(&root, Mask::MOVED_TO | Mask::ISDIR, Some("pasted"));

        let events = h.drain();
        let synthesized: Vec<&Event> = events.iter().filter(|e| e.is_synthesized()).collect();
        assert_eq!(synthesized.len(), 21);
        let mut unique: Vec<&PathBuf> = synthesized.iter().map(|e| &e.dir).collect();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 21);

        assert_eq!(h.watcher.table().paths(), h.directories_on_disk());
    }

    #[test]
    fn test_rescan_skips_directories_already_watched() {
        let mut h = Harness::new();
        let root = h.root.clone();
        let b = root.join("b");
        fs::create_dir(b.join("inner")).unwrap();
        h.watcher.install(&b.join("inner")).unwrap();

        // A re-announced b must not re-process its already-watched child.
        h.apply(&root, Mask::MOVED_TO | Mask::ISDIR, Some("b"));

        let events = h.drain();
        let synthesized: Vec<PathBuf> = events
            .iter()
            .filter(|e| e.is_synthesized())
            .map(|e| e.dir.clone())
            .collect();
        assert_eq!(synthesized, vec![b]);
    }

    #[test]
    fn test_deleting_directory_removes_subtree() {
        let mut h = Harness::new();
        let root = h.root.clone();
        let b = root.join("b");
        fs::create_dir_all(b.join("c/d/e")).unwrap();
        h.apply(&b, Mask::CREATE | Mask::ISDIR, Some("c"));
        h.drain();
        assert_eq!(h.watcher.table().len(), 5);
        let stale_wd = h.watcher.table().id_of(&b.join("c/d")).unwrap();

        fs::remove_dir_all(&b).unwrap();
        h.apply(&root, Mask::DELETE | Mask::ISDIR, Some("b"));

        assert_eq!(h.watcher.notifier().removed().len(), 4);
        assert_eq!(h.watcher.table().paths(), vec![root.clone()]);
        let events = h.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].dir, root);
        assert!(events[0].names("b"));

        // Late records for removed watches never reach the consumer.
        let mut chunk = encode_record(stale_wd, Mask::IGNORED, 0, None);
        chunk.extend(encode_record(stale_wd, Mask::CREATE, 0, Some("late.txt")));
        h.watcher.notifier_mut().push_read(chunk);
        assert!(matches!(h.watcher.step(), Err(WatcherError::Read(_))));
        assert!(h.drain().is_empty());
    }

    #[test]
    fn test_moved_out_directory_removes_subtree() {
        let mut h = Harness::new();
        let root = h.root.clone();
        let outside = h.tmp.path().join("outside");
        fs::rename(root.join("b"), &outside).unwrap();

        h.apply(&root, Mask::MOVED_FROM | Mask::ISDIR, Some("b"));

        assert_eq!(h.watcher.table().paths(), vec![root.clone()]);
        assert_eq!(h.drain().len(), 1);
    }

    #[test]
    fn test_rename_within_tree_rewatches_new_location() {
        let mut h = Harness::new();
        let root = h.root.clone();
        fs::create_dir(root.join("b/kid")).unwrap();
        h.apply(&root.join("b"), Mask::CREATE | Mask::ISDIR, Some("kid"));
        h.drain();

        fs::rename(root.join("b"), root.join("renamed")).unwrap();
        h.apply(&root, Mask::MOVED_FROM | Mask::ISDIR, Some("b"));
        h.apply(&root, Mask::MOVED_TO | Mask::ISDIR, Some("renamed"));

        assert_eq!(h.watcher.table().paths(), h.directories_on_disk());
        let events = h.drain();
        let synthesized: Vec<PathBuf> = events
            .iter()
            .filter(|e| e.is_synthesized())
            .map(|e| e.dir.clone())
            .collect();
        assert_eq!(synthesized, vec![root.join("renamed"), root.join("renamed/kid")]);
    }

    #[test]
    fn test_ignored_removes_subtree_and_forwards_nothing() {
        let mut h = Harness::new();
        let b = h.root.join("b");

        h.apply(&b, Mask::IGNORED, None);

        assert!(!h.watcher.table().contains_path(&b));
        assert_eq!(h.watcher.table().len(), 1);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn test_ignored_for_unknown_watch_is_noop() {
        let mut h = Harness::new();
        let b = h.root.join("b");
        let (wd, event) = h.record(&b, Mask::IGNORED, None);
        h.watcher.reconcile(wd, event.clone()).unwrap();

        // Second notification for the same, now unknown, watch.
        h.watcher.reconcile(wd, event).unwrap();
        assert_eq!(h.watcher.table().len(), 1);
        assert!(h.drain().is_empty());

        h.watcher
            .notifier_mut()
            .push_read(encode_record(wd, Mask::IGNORED, 0, None));
        assert!(matches!(h.watcher.step(), Err(WatcherError::Read(_))));
        assert!(h.drain().is_empty());
    }

    #[test]
    fn test_vanished_directory_is_skipped() {
        let mut h = Harness::new();
        let root = h.root.clone();

        // Record names a directory that no longer exists.
        h.apply(&root, Mask::CREATE | Mask::ISDIR, Some("ghost"));

        let events = h.drain();
        assert_eq!(events.len(), 1);
        assert!(!events[0].is_synthesized());
        assert!(!h.watcher.table().contains_path(&root.join("ghost")));
    }

    #[test]
    fn test_rejected_child_does_not_stop_siblings() {
        let mut h = Harness::new();
        let root = h.root.clone();
        let top = root.join("new");
        fs::create_dir_all(top.join("denied/below")).unwrap();
        fs::create_dir_all(top.join("fine")).unwrap();
        h.watcher.notifier_mut().reject(top.join("denied"));

        h.apply(&root, Mask::CREATE | Mask::ISDIR, Some("new"));

        assert!(h.watcher.table().contains_path(&top));
        assert!(h.watcher.table().contains_path(&top.join("fine")));
        assert!(!h.watcher.table().contains_path(&top.join("denied")));
        assert!(!h.watcher.table().contains_path(&top.join("denied/below")));
    }

    #[test]
    fn test_closed_channel_is_reported() {
        let mut h = Harness::new();
        let root = h.root.clone();
        let (wd, event) = h.record(&root, Mask::CREATE, Some("x"));
        drop(h.rx);

        let err = h.watcher.reconcile(wd, event).unwrap_err();
        assert!(matches!(err, WatcherError::ChannelClosed));
    }
}
