//! The blocking-style stream capability exposed to the descriptor layer.

use std::sync::Arc;

use crate::error::{BridgeError, Result};

/// Minimal stat snapshot for the POSIX-emulation layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    pub size: i64,
    pub is_directory: bool,
}

/// Capability set of a bridged stream.
///
/// Worker-thread code calls these as ordinary blocking operations; whether a
/// call actually suspends depends on the stream's `O_NONBLOCK` flag. The
/// readiness queries are polling hooks for the surrounding select/poll
/// emulation and never block.
pub trait Stream: Send + Sync {
    /// Read up to `buf.len()` bytes. `Ok(0)` is end-of-stream (or, on a
    /// non-blocking descriptor, an empty input queue).
    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Write `buf`; on success all bytes are accepted.
    fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Move the cursor. `whence` is `libc::SEEK_SET`/`SEEK_CUR`/`SEEK_END`.
    fn seek(&self, _offset: i64, _whence: i32) -> Result<i64> {
        Err(BridgeError::Unsupported)
    }

    /// Metadata snapshot.
    fn fstat(&self) -> Result<Stat> {
        Err(BridgeError::Unsupported)
    }

    /// `libc::F_GETFL` / `libc::F_SETFL` with an oflag argument.
    fn fcntl(&self, cmd: i32, arg: i32) -> Result<i32>;

    /// Release the host handle. Expected to be called once per descriptor.
    fn close(&self);

    /// Duplicate the stream for a second descriptor.
    fn dup(&self) -> Result<Arc<dyn Stream>> {
        Err(BridgeError::Unsupported)
    }

    fn is_read_ready(&self) -> bool;
    fn is_write_ready(&self) -> bool;
    fn is_exception(&self) -> bool;
}

/// True when `oflag` describes a blocking descriptor.
pub fn is_block(oflag: i32) -> bool {
    oflag & libc::O_NONBLOCK == 0
}
