//! Prefix-based routing of paths to resolvers.
//!
//! A session owns one [`PathRegistry`]; the POSIX-emulation layer calls
//! [`PathRegistry::open`] and [`PathRegistry::stat`] from the worker thread.
//! The registry picks the resolver with the longest registered prefix
//! matching the path, then hands the actual work to [`RefFile`].

use hostio_core::config::BridgeConfig;
use hostio_core::error::{BridgeError, Result};
use hostio_core::resolver::Resolver;
use hostio_core::stream::{Stat, Stream};

use crate::file::RefFile;
use crate::hub::Hub;

use std::sync::Arc;

/// Routes paths to resolvers by longest matching prefix.
pub struct PathRegistry {
    hub: Arc<Hub>,
    config: BridgeConfig,
    handlers: Vec<(String, Arc<dyn Resolver>)>,
}

impl PathRegistry {
    pub fn new(hub: Arc<Hub>, config: BridgeConfig) -> Self {
        Self { hub, config, handlers: Vec::new() }
    }

    /// Register `resolver` for every path starting with `prefix`.
    pub fn register(&mut self, prefix: impl Into<String>, resolver: Arc<dyn Resolver>) {
        self.handlers.push((prefix.into(), resolver));
    }

    fn handler(&self, path: &str) -> Option<&Arc<dyn Resolver>> {
        self.handlers
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, resolver)| resolver)
    }

    /// Open `path` as a stream. Placeholder directories open as inert
    /// directory stubs without touching the resolver's backend.
    pub fn open(&self, path: &str, oflag: i32) -> Result<Arc<dyn Stream>> {
        let resolver = self.handler(path).ok_or(BridgeError::NotFound)?;
        if resolver.is_placeholder_dir(path) {
            return Ok(Arc::new(DirectoryStub::new()));
        }
        let file = RefFile::open(
            self.hub.clone(),
            resolver.clone(),
            path,
            oflag,
            &self.config,
        )?;
        Ok(file)
    }

    /// Path-walk support: succeeds for any routable path without opening
    /// it, reporting placeholder directories as such.
    pub fn stat(&self, path: &str) -> Result<Stat> {
        let resolver = self.handler(path).ok_or(BridgeError::NotFound)?;
        Ok(Stat {
            size: 0,
            is_directory: resolver.is_placeholder_dir(path),
        })
    }
}

/// Inert stream standing in for a declared directory. Reads and writes are
/// refused; stat reports a directory.
#[derive(Default)]
pub struct DirectoryStub;

impl DirectoryStub {
    pub fn new() -> Self {
        Self
    }
}

impl Stream for DirectoryStub {
    fn read(&self, _buf: &mut [u8]) -> Result<usize> {
        Err(BridgeError::Unsupported)
    }

    fn write(&self, _buf: &[u8]) -> Result<usize> {
        Err(BridgeError::PermissionDenied)
    }

    fn fstat(&self) -> Result<Stat> {
        Ok(Stat { size: 0, is_directory: true })
    }

    fn fcntl(&self, cmd: i32, _arg: i32) -> Result<i32> {
        match cmd {
            libc::F_GETFL | libc::F_SETFL => Ok(0),
            _ => Err(BridgeError::InvalidArgument),
        }
    }

    fn close(&self) {}

    fn is_read_ready(&self) -> bool {
        false
    }

    fn is_write_ready(&self) -> bool {
        false
    }

    fn is_exception(&self) -> bool {
        false
    }
}
