//! In-memory notifier for exercising the watcher without the kernel.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};

use super::events::{Mask, WatchId};
use super::sys::Notifier;

/// Notifier that hands out sequential ids and replays queued read chunks.
///
/// Like inotify with `IN_ONLYDIR`, adding a watch on anything that is not an
/// existing directory fails, and re-adding a watched path returns its id.
/// Once the queued chunks run out, reads fail.
#[derive(Debug, Default)]
pub struct MockNotifier {
    next_id: i32,
    live: HashMap<WatchId, PathBuf>,
    added: Vec<PathBuf>,
    removed: Vec<WatchId>,
    reads: VecDeque<Vec<u8>>,
    reads_served: usize,
    rejected: HashSet<PathBuf>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Queue one chunk to be returned by a single `read`.
    pub fn push_read(&mut self, chunk: Vec<u8>) {
        self.reads.push_back(chunk);
    }

    /// Make `add_watch` fail with `PermissionDenied` for `path`.
    pub fn reject(&mut self, path: impl Into<PathBuf>) {
        self.rejected.insert(path.into());
    }

    pub fn live(&self) -> &HashMap<WatchId, PathBuf> {
        &self.live
    }

    pub fn id_of(&self, path: &Path) -> Option<WatchId> {
        self.live
            .iter()
            .find(|(_, p)| p.as_path() == path)
            .map(|(&id, _)| id)
    }

    pub fn added(&self) -> &[PathBuf] {
        &self.added
    }

    pub fn removed(&self) -> &[WatchId] {
        &self.removed
    }

    pub const fn reads_served(&self) -> usize {
        self.reads_served
    }
}

impl Notifier for MockNotifier {
    fn add_watch(&mut self, path: &Path, _mask: Mask) -> io::Result<WatchId> {
        if self.rejected.contains(path) {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        if !std::fs::symlink_metadata(path)?.is_dir() {
            return Err(io::Error::new(io::ErrorKind::Other, "not a directory"));
        }
        self.added.push(path.to_path_buf());

        if let Some(id) = self.id_of(path) {
            return Ok(id);
        }
        let id = WatchId::new(self.next_id);
        self.next_id += 1;
        self.live.insert(id, path.to_path_buf());
        Ok(id)
    }

    fn remove_watch(&mut self, id: WatchId) -> io::Result<()> {
        if self.live.remove(&id).is_none() {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }
        self.removed.push(id);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(chunk) = self.reads.pop_front() else {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "no more records"));
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        self.reads_served += 1;
        Ok(n)
    }
}
