//! Watch identifiers, change masks and the events delivered to consumers.

#![allow(clippy::missing_const_for_fn)]

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use bitflags::bitflags;
use serde::{Serialize, Serializer};

/// Kernel watch descriptor.
///
/// Only meaningful while the watch it names is live; the kernel may hand the
/// same number out again after the watch is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WatchId(i32);

impl WatchId {
    /// Wrap a raw descriptor.
    #[must_use]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// The raw descriptor value.
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags! {
    /// Bitmask of inotify change kinds, as found in the kernel record.
    ///
    /// Build masks from kernel bits with [`Mask::from_bits_retain`] so bits
    /// this type has no name for survive and can be handed on unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Mask: u32 {
        const ACCESS = 0x0000_0001;
        const MODIFY = 0x0000_0002;
        const ATTRIB = 0x0000_0004;
        const CLOSE_WRITE = 0x0000_0008;
        const CLOSE_NOWRITE = 0x0000_0010;
        const OPEN = 0x0000_0020;
        const MOVED_FROM = 0x0000_0040;
        const MOVED_TO = 0x0000_0080;
        const CREATE = 0x0000_0100;
        const DELETE = 0x0000_0200;
        const DELETE_SELF = 0x0000_0400;
        const MOVE_SELF = 0x0000_0800;
        const UNMOUNT = 0x0000_2000;
        const Q_OVERFLOW = 0x0000_4000;
        const IGNORED = 0x0000_8000;
        const ONLYDIR = 0x0100_0000;
        const DONT_FOLLOW = 0x0200_0000;
        const EXCL_UNLINK = 0x0400_0000;
        const MASK_ADD = 0x2000_0000;
        const ISDIR = 0x4000_0000;
        const ONESHOT = 0x8000_0000;
    }
}

impl Mask {
    /// The empty mask carried by synthesized events.
    pub const SYNTHESIZED: Self = Self::empty();
}

impl Serialize for Mask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

/// Renders as `IN_*` names joined by `|`, unknown bits as `(1<<n)`.
impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("0");
        }

        let mut parts: Vec<String> = self.iter_names().map(|(name, _)| format!("IN_{name}")).collect();
        let unknown = self.bits() & !Self::all().bits();
        parts.extend(
            (0..u32::BITS)
                .filter(|bit| unknown & (1 << bit) != 0)
                .map(|bit| format!("(1<<{bit})")),
        );
        f.write_str(&parts.join("|"))
    }
}

/// One parsed kernel notification record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Watch the record was reported on.
    pub wd: WatchId,
    /// Change kinds.
    pub mask: Mask,
    /// Correlates the two halves of a rename.
    pub cookie: u32,
    /// Entry inside the watched directory, absent for changes to the
    /// directory itself.
    pub name: Option<OsString>,
}

/// A change to the contents of one watched directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// Absolute path of the directory whose listing changed.
    #[serde(serialize_with = "lossy_path")]
    pub dir: PathBuf,
    /// Change kinds copied from the kernel record, or empty when synthesized.
    pub mask: Mask,
    /// Rename cookie copied from the kernel record.
    pub cookie: u32,
    /// Name of the entry that changed, if the kernel supplied one.
    #[serde(serialize_with = "lossy_name")]
    pub name: Option<OsString>,
}

impl Event {
    /// Event for `dir` built from a kernel record reported on its watch.
    #[must_use]
    pub fn from_record(dir: PathBuf, record: RawRecord) -> Self {
        Self {
            dir,
            mask: record.mask,
            cookie: record.cookie,
            name: record.name,
        }
    }

    /// Event signalling that `dir` is now watched and should be processed.
    #[must_use]
    pub fn synthesized(dir: PathBuf) -> Self {
        Self {
            dir,
            mask: Mask::SYNTHESIZED,
            cookie: 0,
            name: None,
        }
    }

    /// True if this event was manufactured rather than read from the kernel.
    #[must_use]
    pub fn is_synthesized(&self) -> bool {
        self.mask.is_empty()
    }

    /// Full path of the entry that changed, when the record named one.
    #[must_use]
    pub fn entry_path(&self) -> Option<PathBuf> {
        self.name.as_ref().map(|name| self.dir.join(name))
    }

    /// True if the named entry is `name`.
    #[must_use]
    pub fn names(&self, name: &str) -> bool {
        self.name.as_deref().is_some_and(|n| n == name)
    }

    /// Render as a single JSON line.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

fn lossy_path<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&path.to_string_lossy())
}

#[allow(clippy::ref_option)]
fn lossy_name<S: Serializer>(name: &Option<OsString>, serializer: S) -> Result<S::Ok, S::Error> {
    match name {
        Some(name) => serializer.serialize_some(&name.to_string_lossy()),
        None => serializer.serialize_none(),
    }
}
