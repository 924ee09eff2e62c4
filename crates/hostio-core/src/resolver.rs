//! Path resolution strategy.

use std::sync::Arc;

use crate::host::{Done, HostFileIo};

/// Turns a path into a host file handle.
///
/// `resolve` is always invoked on the event-loop thread, and `done` runs
/// there too — either directly (a direct filesystem lookup) or from a
/// chained host completion (a network-fetch resolver issues a GET and
/// streams the body to a temporary file before completing). Unlike host
/// completions, `done` may be called inline: the bridge holds no lock
/// while resolving.
pub trait Resolver: Send + Sync {
    fn resolve(&self, path: &str, oflag: i32, done: Done<Arc<dyn HostFileIo>>);

    /// Paths declared to behave as empty directories for stat-only callers.
    fn is_placeholder_dir(&self, _path: &str) -> bool {
        false
    }
}
