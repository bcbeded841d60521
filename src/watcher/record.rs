//! Parsing of raw inotify records out of the read buffer.
//!
//! A record is a fixed 16-byte header (`wd: i32`, `mask: u32`,
//! `cookie: u32`, `len: u32`, native endian) followed by `len` bytes of
//! NUL-padded entry name.

use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;

use super::events::{Event, Mask, RawRecord, WatchId};
use super::stats::WatcherStats;
use super::sys::Notifier;
use super::table::WatchTable;
use crate::error::WatcherError;

/// Size of the fixed record header.
pub const HEADER_LEN: usize = 16;

/// Longest entry name the kernel reports, excluding the terminator.
pub const NAME_MAX: usize = 255;

/// Read buffer size. One page, comfortably above the single-record minimum.
pub const BUFFER_LEN: usize = 4096;

const _: () = assert!(BUFFER_LEN >= HEADER_LEN + NAME_MAX + 1);

/// Parse the record at the start of `buf`.
///
/// Returns the record and the number of bytes it occupied.
///
/// # Errors
///
/// Returns `WatcherError::Protocol` if `buf` is shorter than the header or
/// than the name length the header declares.
pub fn parse_record(buf: &[u8]) -> Result<(RawRecord, usize), WatcherError> {
    if buf.len() < HEADER_LEN {
        return Err(WatcherError::Protocol {
            needed: HEADER_LEN,
            available: buf.len(),
        });
    }

    let word = |at: usize| [buf[at], buf[at + 1], buf[at + 2], buf[at + 3]];
    let wd = i32::from_ne_bytes(word(0));
    let mask = u32::from_ne_bytes(word(4));
    let cookie = u32::from_ne_bytes(word(8));
    let name_len = u32::from_ne_bytes(word(12)) as usize;

    let total = HEADER_LEN.saturating_add(name_len);
    if buf.len() < total {
        return Err(WatcherError::Protocol {
            needed: total,
            available: buf.len(),
        });
    }

    let raw_name = &buf[HEADER_LEN..total];
    let trimmed = raw_name
        .iter()
        .position(|&b| b == 0)
        .map_or(raw_name, |end| &raw_name[..end]);
    let name = (!trimmed.is_empty()).then(|| OsString::from_vec(trimmed.to_vec()));

    let record = RawRecord {
        wd: WatchId::new(wd),
        mask: Mask::from_bits_retain(mask),
        cookie,
        name,
    };
    Ok((record, total))
}

/// Serialise a record in the kernel's layout, padding the name to a
/// multiple of four bytes.
///
/// Used to feed synthetic buffers to a [`RecordReader`].
#[must_use]
pub fn encode_record(wd: WatchId, mask: Mask, cookie: u32, name: Option<&str>) -> Vec<u8> {
    let name = name.unwrap_or_default().as_bytes();
    let padded = if name.is_empty() {
        0
    } else {
        (name.len() + 1).next_multiple_of(4)
    };

    let mut out = Vec::with_capacity(HEADER_LEN + padded);
    out.extend_from_slice(&wd.get().to_ne_bytes());
    out.extend_from_slice(&mask.bits().to_ne_bytes());
    out.extend_from_slice(&cookie.to_ne_bytes());
    out.extend_from_slice(&u32::try_from(padded).unwrap_or(u32::MAX).to_ne_bytes());
    out.extend_from_slice(name);
    out.resize(HEADER_LEN + padded, 0);
    out
}

/// Buffered reader turning the notifier's byte stream into events.
#[derive(Debug)]
pub struct RecordReader {
    buf: Box<[u8]>,
    start: usize,
    end: usize,
}

impl Default for RecordReader {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordReader {
    /// Create a reader with an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: vec![0; BUFFER_LEN].into_boxed_slice(),
            start: 0,
            end: 0,
        }
    }

    /// Number of unparsed bytes left from the last read.
    #[must_use]
    pub const fn pending(&self) -> usize {
        self.end - self.start
    }

    /// Read the next record whose watch is still in `table`.
    ///
    /// Blocks in the notifier when the buffer is empty. Records for watches
    /// that are no longer in the table (duplicate removals, queue overflow)
    /// are dropped and the next record is read instead.
    ///
    /// # Errors
    ///
    /// Returns `WatcherError::Read` if the notifier fails and
    /// `WatcherError::Protocol` if the buffer holds a truncated record.
    pub fn read_one<N: Notifier>(
        &mut self,
        notifier: &mut N,
        table: &WatchTable,
        stats: &WatcherStats,
    ) -> Result<(WatchId, Event), WatcherError> {
        loop {
            if self.pending() == 0 {
                self.fill(notifier)?;
            }

            let (record, used) = parse_record(&self.buf[self.start..self.end])?;
            self.start += used;
            stats.record_read();

            let Some(dir) = table.get(record.wd) else {
                stats.record_skipped();
                if record.mask.contains(Mask::Q_OVERFLOW) {
                    tracing::warn!("Notification queue overflowed, changes may have been missed");
                } else {
                    tracing::trace!(wd = %record.wd, mask = %record.mask, "Skipping record for unknown watch");
                }
                continue;
            };

            let wd = record.wd;
            return Ok((wd, Event::from_record(dir.to_path_buf(), record)));
        }
    }

    fn fill<N: Notifier>(&mut self, notifier: &mut N) -> Result<(), WatcherError> {
        let n = notifier.read(&mut self.buf).map_err(WatcherError::Read)?;
        if n < HEADER_LEN {
            return Err(WatcherError::Protocol {
                needed: HEADER_LEN,
                available: n,
            });
        }
        self.start = 0;
        self.end = n.min(self.buf.len());
        Ok(())
    }
}
