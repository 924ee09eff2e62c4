//! # hostio-core — Trait definitions for hostio
//!
//! This crate defines the trait boundaries of the bridge. Each trait models
//! one capability the bridge either consumes from its host environment or
//! exposes to the POSIX-emulation layer above it:
//!
//! - [`dispatch::Dispatch`] — "run this on the event-loop thread".
//! - [`host`] — the host's callback-driven file, fetch and datagram APIs.
//! - [`stream::Stream`] — the blocking-style capability the bridge exposes.
//! - [`resolver::Resolver`] — turn a path into a host file handle.
//!
//! Every component of the bridge depends on traits from this crate, never on
//! concrete types. The `hostio` crate implements the bridge machinery;
//! `hostio-mem` provides in-memory host backends for tests and smoke runs.

pub mod addr;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod resolver;
pub mod stream;
