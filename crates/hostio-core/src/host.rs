//! Host I/O abstractions.
//!
//! The host environment exposes file, fetch and datagram primitives that are
//! single-threaded and callback-driven. Every method here must be invoked on
//! the event-loop thread, and every completion callback must be *posted back*
//! to the event-loop thread through the [`crate::dispatch::Dispatch`] handle
//! — never invoked inline from the initiating call. The bridge relies on
//! that: it releases its lock before initiating a host call and re-acquires
//! it inside the completion.
//!
//! Handles are reference-counted (`Arc<dyn ...>`); dropping the last clone
//! releases the underlying host resource. This is also how a resolver's
//! cleanup runs: whatever the resolver allocated to produce the handle (a
//! fetch loader, a temporary file) lives inside the handle it returns.

use std::net::SocketAddr;

use crate::error::HostResult;

/// Completion callback carrying the result of one host call.
pub type Done<T> = Box<dyn FnOnce(HostResult<T>) + Send + 'static>;

/// Metadata snapshot for an open host file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileInfo {
    /// File size in bytes.
    pub size: i64,
}

/// Open flags understood by the host file API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostOpenFlags {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub truncate: bool,
}

/// A host file handle with byte-range read/write and async completion.
///
/// The handle starts unopened; `open` must succeed before `query`, `read`
/// or `write` are issued. The bridge guarantees at most one read and one
/// write in flight per handle.
pub trait HostFileIo: Send + Sync {
    /// Open the underlying file with the translated flags.
    fn open(&self, flags: HostOpenFlags, done: Done<()>);

    /// Query metadata (size) of the opened file.
    fn query(&self, done: Done<FileInfo>);

    /// Read up to `len` bytes at `offset`. An empty result means EOF.
    fn read(&self, offset: i64, len: usize, done: Done<Vec<u8>>);

    /// Write `data` at `offset`; the completion carries bytes written.
    fn write(&self, offset: i64, data: Vec<u8>, done: Done<usize>);
}

/// Direct path-to-handle resolution against a host filesystem.
pub trait HostFs: Send + Sync {
    /// Wrap `path` as an unopened host file handle. No extra phase: failure
    /// to actually open surfaces later, from [`HostFileIo::open`].
    fn file_ref(&self, path: &str) -> HostResult<std::sync::Arc<dyn HostFileIo>>;
}

/// Response to a host fetch request.
pub struct FetchResponse {
    /// HTTP-like status code.
    pub status: u16,
    /// Response body streamed to a temporary host file, when the host
    /// produced one. Absent on error statuses.
    pub body: Option<std::sync::Arc<dyn HostFileIo>>,
}

/// Network-fetch API: GET a URL, stream the body to a temporary file.
pub trait HostFetch: Send + Sync {
    fn get(&self, url: &str, done: Done<FetchResponse>);
}

/// A host datagram (UDP-like) socket handle.
pub trait HostDatagram: Send + Sync {
    /// Bind to a local address. Must complete before recv/send are issued.
    fn bind(&self, addr: SocketAddr, done: Done<()>);

    /// Receive one datagram of up to `max` bytes plus its source address.
    /// The bridge keeps at most one receive outstanding per socket.
    fn recv_from(&self, max: usize, done: Done<(Vec<u8>, SocketAddr)>);

    /// Send one datagram to `dest`; the completion carries bytes sent.
    fn send_to(&self, data: Vec<u8>, dest: SocketAddr, done: Done<usize>);
}

/// Factory for host datagram sockets.
pub trait HostNet: Send + Sync {
    /// Create an unbound datagram socket, or report the capability absent.
    fn udp_socket(&self) -> HostResult<std::sync::Arc<dyn HostDatagram>>;
}
