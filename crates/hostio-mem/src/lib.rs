//! In-memory implementations of the `hostio-core` host traits.
//!
//! These back the bridge in tests and demos the way a real embedding would:
//! every completion is posted back through the [`Dispatch`] handle, never
//! invoked inline, so the threading contract matches a real host. The
//! backends expose knobs (write caps, completion delays) and counters
//! (host calls issued, datagrams sent) for asserting bridge behavior.
//!
//! [`Dispatch`]: hostio_core::dispatch::Dispatch

mod fetch;
mod fs;
mod net;

pub use fetch::MemFetch;
pub use fs::MemFs;
pub use net::{MemNet, MemUdp};
