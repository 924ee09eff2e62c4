//! # hostio — asynchronous-to-blocking I/O bridge
//!
//! A worker thread runs ordinary blocking-style session code — open, read,
//! write, seek, close, UDP send/recv — while the only primitives available
//! are the single-threaded, callback-driven host APIs defined in
//! `hostio-core`. The bridge coordinates the two:
//!
//! 1. The worker calls a blocking-looking operation.
//! 2. The bridge posts a task to the event-loop thread and parks the worker
//!    on the hub's condition variable.
//! 3. The event-loop thread issues the host call; its completion (possibly
//!    after further chained host calls) writes a result slot and broadcasts.
//! 4. The worker wakes, rechecks the slot, and returns.
//!
//! ```ignore
//! let ev = EventLoop::start();
//! let hub = Hub::new(ev.handle());
//! let mut reg = PathRegistry::new(hub.clone(), BridgeConfig::default());
//! reg.register("/", Arc::new(DirectResolver::new(fs)));
//!
//! // On the worker thread — looks blocking, runs on the event loop:
//! let file = reg.open("/etc/motd", libc::O_RDONLY)?;
//! let n = file.read(&mut buf)?;
//! ```
//!
//! Exactly one worker thread blocks here per session; the event-loop thread
//! never blocks. Non-blocking descriptors never suspend the caller — they
//! are served from the read-ahead queue and the pending-output buffer.

pub mod event_loop;
pub mod file;
pub mod hub;
pub mod registry;
pub mod resolvers;
pub mod udp;

pub use event_loop::EventLoop;
pub use file::RefFile;
pub use hub::{Hub, OpSlot};
pub use registry::{DirectoryStub, PathRegistry};
pub use resolvers::{DirectResolver, FetchResolver};
pub use udp::DatagramSocket;

pub use hostio_core::addr::{AddrFamily, SockAddr};
pub use hostio_core::config::BridgeConfig;
pub use hostio_core::error::{BridgeError, Result};
pub use hostio_core::stream::{Stat, Stream};
