//! # Reference-file bridge
//!
//! Blocking-style open/read/write/seek/stat/close over the host's
//! callback-driven file API. Each public method submits work to the
//! event-loop thread and, on a blocking descriptor, parks the worker on the
//! hub until the chained host completions write the result slot.
//!
//! The open sequence is a four-phase state machine driven entirely from
//! completion callbacks — resolve the path, open the host handle, query its
//! size, then (for non-blocking descriptors) start the read-ahead chain:
//!
//! ```text
//!  Resolving ─→ Opening ─→ Querying ─→ Open
//!      │            │           │
//!      └────────────┴───────────┴──→ Failed (handle released)
//! ```
//!
//! Buffering policy:
//! - input queue of unread bytes, topped up by read-ahead on non-blocking
//!   descriptors until a 0-byte completion marks EOF;
//! - pending-output buffer drained by at most one in-flight host write;
//!   a flush that finds a write in flight reschedules itself after the
//!   configured retry interval instead of double-issuing.

use hostio_core::config::BridgeConfig;
use hostio_core::error::{BridgeError, HostResult, Result};
use hostio_core::host::{FileInfo, HostFileIo, HostOpenFlags};
use hostio_core::resolver::Resolver;
use hostio_core::stream::{is_block, Stat, Stream};

use crate::hub::{Hub, HubCell, OpSlot};

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Slot value for a successfully completed control operation.
const OP_OK: i64 = 0;

/// Open-sequence phase. Failure at any phase releases the host handle and
/// lands in a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Closed,
    Resolving,
    Opening,
    Querying,
    Open,
    Failed,
}

struct FileState {
    oflag: i32,
    phase: Phase,
    io: Option<Arc<dyn HostFileIo>>,
    info: FileInfo,
    /// Byte offset cursor. Advanced by queue drains, successful flushes and
    /// seeks; never by host calls directly.
    offset: i64,
    /// Unread bytes delivered by host reads, drained by `read`.
    in_buf: VecDeque<u8>,
    /// Bytes accepted by `write` but not yet handed to the host.
    out_buf: Vec<u8>,
    /// Length of the host write currently in flight (0 = none).
    write_in_flight: usize,
    /// A flush task is queued and will run; dedupes non-blocking writes.
    write_sent: bool,
    /// A host read is in flight; prevents double-issue.
    read_sent: bool,
    /// Slot of the blocking `read` waiting for the in-flight host read.
    read_slot: Option<Arc<OpSlot>>,
}

impl FileState {
    fn new(oflag: i32) -> Self {
        Self {
            oflag,
            phase: Phase::Closed,
            io: None,
            info: FileInfo::default(),
            offset: 0,
            in_buf: VecDeque::new(),
            out_buf: Vec::new(),
            write_in_flight: 0,
            write_sent: false,
            read_sent: false,
            read_slot: None,
        }
    }

    fn is_open(&self) -> bool {
        self.phase == Phase::Open && self.io.is_some()
    }

    /// Release the host handle and land in the failed terminal state.
    fn fail(&mut self) {
        self.io = None;
        self.phase = Phase::Failed;
        self.read_sent = false;
        self.write_in_flight = 0;
    }
}

/// Translate POSIX-style oflags for the host open call.
fn host_open_flags(oflag: i32) -> HostOpenFlags {
    let (read, write) = match oflag & libc::O_ACCMODE {
        libc::O_WRONLY => (false, true),
        libc::O_RDONLY => (true, false),
        _ => (true, true),
    };
    HostOpenFlags {
        read,
        write,
        create: oflag & libc::O_CREAT != 0,
        truncate: oflag & libc::O_TRUNC != 0,
    }
}

/// A lazily-resolved reference file bridged onto the host file API.
///
/// Shared between the worker thread (method calls) and the event-loop
/// thread (completion callbacks mutating the state under the hub lock).
pub struct RefFile {
    hub: Arc<Hub>,
    state: HubCell<FileState>,
    chunk: usize,
    write_retry: Duration,
    weak: Weak<RefFile>,
}

impl RefFile {
    /// Resolve `path` through `resolver` and run the open sequence.
    /// Blocks the calling worker thread until the stream is open or failed.
    pub fn open(
        hub: Arc<Hub>,
        resolver: Arc<dyn Resolver>,
        path: &str,
        oflag: i32,
        config: &BridgeConfig,
    ) -> Result<Arc<RefFile>> {
        let file = Arc::new_cyclic(|weak| RefFile {
            hub: hub.clone(),
            state: HubCell::new(FileState::new(oflag)),
            chunk: config.read_chunk,
            write_retry: config.write_retry,
            weak: weak.clone(),
        });

        let slot = OpSlot::pending();
        let f = file.clone();
        let s = slot.clone();
        let path = path.to_string();
        hub.dispatch(Box::new(move || {
            {
                let mut guard = f.hub.lock();
                f.state.get_mut(&mut guard).phase = Phase::Resolving;
            }
            let f2 = f.clone();
            resolver.resolve(&path, oflag, Box::new(move |res| f2.ev_resolved(res, s)));
        }));

        let value = hub.wait_while_pending(&slot);
        if value == OP_OK {
            Ok(file)
        } else {
            Err(BridgeError::from_code(value))
        }
    }

    fn arc(&self) -> Arc<RefFile> {
        // The caller holds an Arc, so the upgrade cannot fail.
        self.weak.upgrade().expect("RefFile outlived its Arc")
    }

    // ── Event-loop side: open sequence ───────────────────────────────

    fn ev_resolved(self: Arc<Self>, res: HostResult<Arc<dyn HostFileIo>>, slot: Arc<OpSlot>) {
        let mut guard = self.hub.lock();
        match res {
            Err(e) => {
                self.state.get_mut(&mut guard).fail();
                self.hub.complete(&mut guard, &slot, e.code());
            }
            Ok(io) => {
                let flags = {
                    let st = self.state.get_mut(&mut guard);
                    st.phase = Phase::Opening;
                    st.io = Some(io.clone());
                    host_open_flags(st.oflag)
                };
                drop(guard);
                let f = self.clone();
                io.open(flags, Box::new(move |r| f.ev_opened(r, slot)));
            }
        }
    }

    fn ev_opened(self: Arc<Self>, res: HostResult<()>, slot: Arc<OpSlot>) {
        let mut guard = self.hub.lock();
        match res {
            Err(e) => {
                log::warn!("file: host open failed: {}", e);
                self.state.get_mut(&mut guard).fail();
                self.hub.complete(&mut guard, &slot, e.code());
            }
            Ok(()) => {
                let io = {
                    let st = self.state.get_mut(&mut guard);
                    st.phase = Phase::Querying;
                    st.io.clone()
                };
                match io {
                    Some(io) => {
                        drop(guard);
                        let f = self.clone();
                        io.query(Box::new(move |r| f.ev_queried(r, slot)));
                    }
                    None => {
                        self.hub.complete(&mut guard, &slot, -(libc::EIO as i64));
                    }
                }
            }
        }
    }

    fn ev_queried(self: Arc<Self>, res: HostResult<FileInfo>, slot: Arc<OpSlot>) {
        let mut guard = self.hub.lock();
        match res {
            Err(e) => {
                log::warn!("file: host query failed: {}", e);
                self.state.get_mut(&mut guard).fail();
                self.hub.complete(&mut guard, &slot, e.code());
            }
            Ok(info) => {
                let kick_read_ahead = {
                    let st = self.state.get_mut(&mut guard);
                    st.info = info;
                    st.phase = Phase::Open;
                    if st.oflag & libc::O_APPEND != 0 {
                        st.offset = info.size;
                        false
                    } else {
                        !is_block(st.oflag)
                    }
                };
                self.hub.complete(&mut guard, &slot, OP_OK);
                drop(guard);
                if kick_read_ahead {
                    let chunk = self.chunk;
                    self.ev_start_read(chunk, None);
                }
            }
        }
    }

    // ── Event-loop side: reads ───────────────────────────────────────

    /// Issue one host read of up to `count` bytes, unless one is already in
    /// flight. A blocking `read`'s slot is parked in the state and completed
    /// by `ev_read_done`.
    fn ev_start_read(self: Arc<Self>, count: usize, slot: Option<Arc<OpSlot>>) {
        let mut guard = self.hub.lock();
        if !self.state.get_mut(&mut guard).is_open() {
            if let Some(s) = slot {
                self.hub.complete(&mut guard, &s, -(libc::EIO as i64));
            }
            return;
        }
        let issue = {
            let st = self.state.get_mut(&mut guard);
            if let Some(s) = slot {
                st.read_slot = Some(s);
            }
            if st.read_sent {
                None
            } else {
                match st.io.clone() {
                    Some(io) => {
                        st.read_sent = true;
                        // Continue where the queued bytes end.
                        Some((io, st.offset + st.in_buf.len() as i64))
                    }
                    None => None,
                }
            }
        };
        drop(guard);
        if let Some((io, pos)) = issue {
            let f = self.clone();
            io.read(pos, count, Box::new(move |r| f.ev_read_done(r)));
        }
    }

    fn ev_read_done(self: Arc<Self>, res: HostResult<Vec<u8>>) {
        let mut guard = self.hub.lock();
        if !self.state.get_mut(&mut guard).is_open() {
            // Closed or failed while the read was in flight.
            let waiter = self.state.get_mut(&mut guard).read_slot.take();
            if let Some(s) = waiter {
                self.hub.complete(&mut guard, &s, -(libc::EIO as i64));
            }
            return;
        }
        match res {
            Err(e) => {
                log::warn!("file: host read failed: {}", e);
                let waiter = {
                    let st = self.state.get_mut(&mut guard);
                    st.fail();
                    st.read_slot.take()
                };
                match waiter {
                    Some(s) => self.hub.complete(&mut guard, &s, e.code()),
                    None => self.hub.broadcast(),
                }
            }
            Ok(data) => {
                let n = data.len();
                let (waiter, reissue) = {
                    let st = self.state.get_mut(&mut guard);
                    st.read_sent = false;
                    st.in_buf.extend(data);
                    let waiter = st.read_slot.take();
                    // EOF (0 bytes) ends the read-ahead chain for good.
                    let more = n > 0 && !is_block(st.oflag) && st.in_buf.len() < self.chunk;
                    let reissue = if more {
                        st.read_sent = true;
                        st.io
                            .clone()
                            .map(|io| (io, st.offset + st.in_buf.len() as i64))
                    } else {
                        None
                    };
                    (waiter, reissue)
                };
                match waiter {
                    Some(s) => self.hub.complete(&mut guard, &s, n as i64),
                    None => self.hub.broadcast(),
                }
                drop(guard);
                if let Some((io, pos)) = reissue {
                    let f = self.clone();
                    let chunk = self.chunk;
                    io.read(pos, chunk, Box::new(move |r| f.ev_read_done(r)));
                }
            }
        }
    }

    // ── Event-loop side: writes ──────────────────────────────────────

    /// Drain the pending-output buffer with one host write. If a write is
    /// already in flight the task re-queues itself after the retry interval
    /// rather than issuing a second one.
    fn ev_flush(self: Arc<Self>, slot: Option<Arc<OpSlot>>) {
        let mut guard = self.hub.lock();
        if !self.state.get_mut(&mut guard).is_open() {
            if let Some(s) = slot {
                self.hub.complete(&mut guard, &s, -(libc::EIO as i64));
            }
            return;
        }
        if self.state.get_mut(&mut guard).write_in_flight > 0 {
            drop(guard);
            let f = self.clone();
            let retry = self.write_retry;
            self.hub
                .dispatch_after(retry, Box::new(move || f.ev_flush(slot)));
            return;
        }
        let issue = {
            let st = self.state.get_mut(&mut guard);
            st.write_sent = false;
            if st.out_buf.is_empty() {
                None
            } else {
                let data = std::mem::take(&mut st.out_buf);
                st.write_in_flight = data.len();
                st.io.clone().map(|io| (io, st.offset, data))
            }
        };
        match issue {
            Some((io, pos, data)) => {
                drop(guard);
                let f = self.clone();
                io.write(pos, data, Box::new(move |r| f.ev_write_done(r, slot)));
            }
            None => {
                // An earlier flush already drained everything.
                if let Some(s) = slot {
                    self.hub.complete(&mut guard, &s, 0);
                }
            }
        }
    }

    fn ev_write_done(self: Arc<Self>, res: HostResult<usize>, slot: Option<Arc<OpSlot>>) {
        let mut guard = self.hub.lock();
        let expected = self.state.get_mut(&mut guard).write_in_flight;
        match res {
            Ok(n) if n == expected => {
                let st = self.state.get_mut(&mut guard);
                st.write_in_flight = 0;
                st.offset += n as i64;
                match slot {
                    Some(s) => self.hub.complete(&mut guard, &s, n as i64),
                    None => self.hub.broadcast(),
                }
            }
            Ok(n) => {
                // Short write: never reported as success.
                log::warn!("file: short write ({} of {} bytes)", n, expected);
                self.state.get_mut(&mut guard).fail();
                match slot {
                    Some(s) => self.hub.complete(&mut guard, &s, -(libc::EIO as i64)),
                    None => self.hub.broadcast(),
                }
            }
            Err(e) => {
                log::warn!("file: host write failed: {}", e);
                self.state.get_mut(&mut guard).fail();
                match slot {
                    Some(s) => self.hub.complete(&mut guard, &s, e.code()),
                    None => self.hub.broadcast(),
                }
            }
        }
    }
}

impl Stream for RefFile {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut guard = self.hub.lock();
        let pull = {
            let st = self.state.get_mut(&mut guard);
            if !st.is_open() {
                return Err(BridgeError::Io);
            }
            is_block(st.oflag) && st.in_buf.is_empty()
        };
        if pull {
            drop(guard);
            let slot = OpSlot::pending();
            let count = buf.len().min(self.chunk);
            let f = self.arc();
            let s = slot.clone();
            self.hub
                .dispatch(Box::new(move || f.ev_start_read(count, Some(s))));
            let value = self.hub.wait_while_pending(&slot);
            if value < 0 {
                return Err(BridgeError::from_code(value));
            }
            guard = self.hub.lock();
        }
        let st = self.state.get_mut(&mut guard);
        let n = buf.len().min(st.in_buf.len());
        for dst in buf.iter_mut().take(n) {
            if let Some(b) = st.in_buf.pop_front() {
                *dst = b;
            }
        }
        st.offset += n as i64;
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut guard = self.hub.lock();
        let (block, schedule) = {
            let st = self.state.get_mut(&mut guard);
            if !st.is_open() {
                return Err(BridgeError::Io);
            }
            st.out_buf.extend_from_slice(buf);
            let block = is_block(st.oflag);
            let schedule = if block {
                true
            } else if !st.write_sent {
                st.write_sent = true;
                true
            } else {
                false
            };
            (block, schedule)
        };
        drop(guard);

        if block {
            let slot = OpSlot::pending();
            let f = self.arc();
            let s = slot.clone();
            self.hub.dispatch(Box::new(move || f.ev_flush(Some(s))));
            let value = self.hub.wait_while_pending(&slot);
            if value < 0 {
                return Err(BridgeError::from_code(value));
            }
            Ok(buf.len())
        } else {
            if schedule {
                let f = self.arc();
                self.hub.dispatch(Box::new(move || f.ev_flush(None)));
            }
            Ok(buf.len())
        }
    }

    /// Pure cursor arithmetic against the cached size snapshot; no host call.
    fn seek(&self, offset: i64, whence: i32) -> Result<i64> {
        let mut guard = self.hub.lock();
        let st = self.state.get_mut(&mut guard);
        let base = match whence {
            libc::SEEK_SET => 0,
            libc::SEEK_CUR => st.offset,
            libc::SEEK_END => st.info.size,
            _ => return Err(BridgeError::InvalidArgument),
        };
        st.offset = base + offset;
        Ok(st.offset)
    }

    fn fstat(&self) -> Result<Stat> {
        let mut guard = self.hub.lock();
        let st = self.state.get_mut(&mut guard);
        Ok(Stat { size: st.info.size, is_directory: false })
    }

    fn fcntl(&self, cmd: i32, arg: i32) -> Result<i32> {
        match cmd {
            libc::F_GETFL => {
                let mut guard = self.hub.lock();
                Ok(self.state.get_mut(&mut guard).oflag)
            }
            libc::F_SETFL => {
                let mut guard = self.hub.lock();
                let kick = {
                    let st = self.state.get_mut(&mut guard);
                    let was_block = is_block(st.oflag);
                    st.oflag = arg;
                    // Switching an open blocking descriptor to non-blocking
                    // starts the read-ahead that open would have issued.
                    was_block && !is_block(arg) && st.is_open()
                };
                drop(guard);
                if kick {
                    let f = self.arc();
                    let chunk = self.chunk;
                    self.hub
                        .dispatch(Box::new(move || f.ev_start_read(chunk, None)));
                }
                Ok(0)
            }
            _ => Err(BridgeError::InvalidArgument),
        }
    }

    /// Always dispatched through the event loop; dropping the host handle
    /// there releases it (and whatever the resolver allocated behind it).
    fn close(&self) {
        let slot = OpSlot::pending();
        let f = self.arc();
        let s = slot.clone();
        self.hub.dispatch(Box::new(move || {
            let mut guard = f.hub.lock();
            let st = f.state.get_mut(&mut guard);
            st.io = None;
            st.phase = Phase::Closed;
            st.read_sent = false;
            st.write_in_flight = 0;
            f.hub.complete(&mut guard, &s, OP_OK);
        }));
        let _ = self.hub.wait_while_pending(&slot);
    }

    fn is_read_ready(&self) -> bool {
        let mut guard = self.hub.lock();
        !self.state.get_mut(&mut guard).in_buf.is_empty()
    }

    fn is_write_ready(&self) -> bool {
        let mut guard = self.hub.lock();
        self.state.get_mut(&mut guard).out_buf.len() < self.chunk
    }

    fn is_exception(&self) -> bool {
        let mut guard = self.hub.lock();
        !self.state.get_mut(&mut guard).is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::EventLoop;
    use crate::resolvers::DirectResolver;
    use hostio_mem::MemFs;
    use std::thread;
    use std::time::Instant;

    fn rig() -> (EventLoop, Arc<Hub>, MemFs, Arc<DirectResolver>) {
        let ev = EventLoop::start();
        let hub = Hub::new(ev.handle());
        let fs = MemFs::new(hub.dispatcher());
        let resolver = Arc::new(DirectResolver::new(Arc::new(fs.clone())));
        (ev, hub, fs, resolver)
    }

    fn wait_until(deadline_ms: u64, mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_millis(deadline_ms);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn blocking_read_drains_file_then_reports_eof() {
        let (_ev, hub, fs, resolver) = rig();
        fs.insert("/f", b"0123456789");
        let cfg = BridgeConfig::default();
        let file = RefFile::open(hub, resolver, "/f", libc::O_RDONLY, &cfg).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(file.read(&mut buf).unwrap(), 8);
        assert_eq!(&buf, b"01234567");
        assert_eq!(file.seek(0, libc::SEEK_CUR).unwrap(), 8);

        assert_eq!(file.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"89");

        // EOF: 0 bytes, no failure.
        assert_eq!(file.read(&mut buf).unwrap(), 0);
        file.close();
    }

    #[test]
    fn seek_is_cursor_arithmetic_without_host_calls() {
        let (_ev, hub, fs, resolver) = rig();
        fs.insert("/f", b"0123456789");
        let cfg = BridgeConfig::default();
        let file = RefFile::open(hub, resolver, "/f", libc::O_RDONLY, &cfg).unwrap();

        let reads_before = fs.host_reads();
        assert_eq!(file.seek(4, libc::SEEK_SET).unwrap(), 4);
        assert_eq!(file.seek(0, libc::SEEK_CUR).unwrap(), 4);
        assert_eq!(file.seek(-1, libc::SEEK_END).unwrap(), 9);
        assert_eq!(
            file.seek(0, 99).unwrap_err(),
            BridgeError::InvalidArgument
        );
        assert_eq!(fs.host_reads(), reads_before);
        file.close();
    }

    #[test]
    fn blocking_writes_flush_in_call_order() {
        let (_ev, hub, fs, resolver) = rig();
        let cfg = BridgeConfig::default();
        let file = RefFile::open(
            hub,
            resolver,
            "/out",
            libc::O_WRONLY | libc::O_CREAT,
            &cfg,
        )
        .unwrap();

        assert_eq!(file.write(b"hello").unwrap(), 5);
        assert_eq!(file.write(b" world").unwrap(), 6);
        file.close();
        assert_eq!(fs.contents("/out").unwrap(), b"hello world");
    }

    #[test]
    fn nonblocking_writes_coalesce_into_one_extra_flush() {
        let (_ev, hub, fs, resolver) = rig();
        fs.set_completion_delay(Duration::from_millis(50));
        let cfg = BridgeConfig::default();
        let file = RefFile::open(
            hub,
            resolver,
            "/out",
            libc::O_WRONLY | libc::O_CREAT | libc::O_NONBLOCK,
            &cfg,
        )
        .unwrap();

        assert_eq!(file.write(b"aa").unwrap(), 2);
        // Wait until the first host write is actually in flight, then queue
        // two more while it is.
        wait_until(2000, || fs.host_writes() == 1);
        assert_eq!(file.write(b"bb").unwrap(), 2);
        assert_eq!(file.write(b"cc").unwrap(), 2);

        wait_until(2000, || {
            fs.contents("/out").map(|c| c == b"aabbcc").unwrap_or(false)
        });
        // Both queued payloads travelled in a single second flush.
        assert_eq!(fs.host_writes(), 2);
        file.close();
    }

    #[test]
    fn short_write_closes_the_stream() {
        let (_ev, hub, fs, resolver) = rig();
        fs.set_write_limit("/out", 3);
        let cfg = BridgeConfig::default();
        let file = RefFile::open(
            hub,
            resolver,
            "/out",
            libc::O_WRONLY | libc::O_CREAT,
            &cfg,
        )
        .unwrap();

        assert_eq!(file.write(b"hello").unwrap_err(), BridgeError::Io);
        assert!(file.is_exception());
        assert_eq!(file.write(b"more").unwrap_err(), BridgeError::Io);
    }

    #[test]
    fn nonblocking_read_ahead_stops_at_eof() {
        let (_ev, hub, fs, resolver) = rig();
        fs.insert("/f", b"abcde");
        let cfg = BridgeConfig::default();
        let file = RefFile::open(
            hub,
            resolver,
            "/f",
            libc::O_RDONLY | libc::O_NONBLOCK,
            &cfg,
        )
        .unwrap();

        // First completion delivers 5 bytes, the chained one delivers 0.
        wait_until(2000, || fs.host_reads() == 2);
        assert!(file.is_read_ready());

        let mut buf = [0u8; 8];
        assert_eq!(file.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"abcde");
        assert!(!file.is_read_ready());
        assert_eq!(file.read(&mut buf).unwrap(), 0);

        // EOF ended the chain: draining issued no further host reads.
        assert_eq!(fs.host_reads(), 2);
        file.close();
    }

    #[test]
    fn open_missing_file_reports_not_found() {
        let (_ev, hub, _fs, resolver) = rig();
        let cfg = BridgeConfig::default();
        let res = RefFile::open(hub, resolver, "/absent", libc::O_RDONLY, &cfg);
        assert_eq!(res.err(), Some(BridgeError::NotFound));
    }

    #[test]
    fn append_initializes_cursor_to_file_size() {
        let (_ev, hub, fs, resolver) = rig();
        fs.insert("/f", b"abc");
        let cfg = BridgeConfig::default();
        let file = RefFile::open(
            hub,
            resolver,
            "/f",
            libc::O_WRONLY | libc::O_APPEND,
            &cfg,
        )
        .unwrap();

        assert_eq!(file.seek(0, libc::SEEK_CUR).unwrap(), 3);
        assert_eq!(file.write(b"de").unwrap(), 2);
        file.close();
        assert_eq!(fs.contents("/f").unwrap(), b"abcde");
    }

    #[test]
    fn setfl_to_nonblocking_kicks_read_ahead() {
        let (_ev, hub, fs, resolver) = rig();
        fs.insert("/f", b"abcde");
        let cfg = BridgeConfig::default();
        let file = RefFile::open(hub, resolver, "/f", libc::O_RDONLY, &cfg).unwrap();

        // Blocking open issues no read-ahead.
        assert_eq!(fs.host_reads(), 0);
        assert!(!file.is_read_ready());

        file.fcntl(libc::F_SETFL, libc::O_RDONLY | libc::O_NONBLOCK)
            .unwrap();
        wait_until(2000, || fs.host_reads() == 2);
        assert!(file.is_read_ready());

        let mut buf = [0u8; 16];
        assert_eq!(file.read(&mut buf).unwrap(), 5);
        file.close();
    }

    #[test]
    fn write_readiness_tracks_pending_output() {
        let (_ev, hub, fs, resolver) = rig();
        fs.set_completion_delay(Duration::from_millis(30));
        let cfg = BridgeConfig { read_chunk: 4, ..BridgeConfig::default() };
        let file = RefFile::open(
            hub,
            resolver,
            "/out",
            libc::O_WRONLY | libc::O_CREAT | libc::O_NONBLOCK,
            &cfg,
        )
        .unwrap();

        assert!(file.is_write_ready());
        // Fill past the capacity threshold while the flush is delayed; the
        // first flush takes the buffer quickly, so queue two batches.
        wait_until(2000, || {
            file.write(b"xxxx").unwrap();
            !file.is_write_ready()
        });
        wait_until(2000, || file.is_write_ready());
        file.close();
    }
}
