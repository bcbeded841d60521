//! Linux inotify handle.
//!
//! The only module that talks to the kernel directly. Everything above it
//! goes through the [`Notifier`] trait so the reconciler can be driven by an
//! in-memory notifier in tests. Unsafe code is allowed only on the four
//! functions that make the system calls.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use super::events::{Mask, WatchId};

/// Source of change notifications.
pub trait Notifier {
    /// Register `path` for the change kinds in `mask`.
    ///
    /// Registering an already-watched directory returns its existing id.
    fn add_watch(&mut self, path: &Path, mask: Mask) -> io::Result<WatchId>;

    /// Release a watch. Fails if the watch is already gone.
    fn remove_watch(&mut self, id: WatchId) -> io::Result<()>;

    /// Block until records are available and copy as many as fit into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// An open inotify instance. Closing it releases every watch it holds.
#[derive(Debug)]
pub struct Inotify {
    fd: OwnedFd,
}

impl Inotify {
    /// Open a blocking inotify instance.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the instance cannot be created, e.g. when the
    /// per-user instance limit is reached.
    #[allow(unsafe_code)]
    pub fn init() -> io::Result<Self> {
        // SAFETY: no pointer arguments; the result is checked below.
        let raw = unsafe { libc::inotify_init1(libc::IN_CLOEXEC) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `raw` is a freshly created descriptor that nothing else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        Ok(Self { fd })
    }
}

impl Notifier for Inotify {
    #[allow(unsafe_code)]
    fn add_watch(&mut self, path: &Path, mask: Mask) -> io::Result<WatchId> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        // SAFETY: `c_path` is a valid NUL-terminated string for the duration of the call.
        let wd =
            unsafe { libc::inotify_add_watch(self.fd.as_raw_fd(), c_path.as_ptr(), mask.bits()) };
        if wd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(WatchId::new(wd))
    }

    #[allow(unsafe_code)]
    fn remove_watch(&mut self, id: WatchId) -> io::Result<()> {
        // SAFETY: no pointer arguments; an unknown descriptor yields EINVAL.
        let rc = unsafe { libc::inotify_rm_watch(self.fd.as_raw_fd(), id.get()) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[allow(unsafe_code)]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
            let n = unsafe { libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
            match usize::try_from(n) {
                Ok(n) => return Ok(n),
                Err(_) => {
                    let err = io::Error::last_os_error();
                    if err.kind() != io::ErrorKind::Interrupted {
                        return Err(err);
                    }
                }
            }
        }
    }
}
