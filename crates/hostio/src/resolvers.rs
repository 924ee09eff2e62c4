//! Path resolution strategies.
//!
//! A [`Resolver`] turns a path into an unopened host file handle on the
//! event-loop thread. Two strategies ship with the bridge:
//!
//! - [`DirectResolver`] asks the host filesystem for the path as-is;
//! - [`FetchResolver`] maps the path to a URL under a base prefix, issues a
//!   network fetch and resolves to the temporary file holding the body.

use hostio_core::error::HostError;
use hostio_core::host::{Done, HostFetch, HostFileIo, HostFs};
use hostio_core::resolver::Resolver;

use std::collections::HashSet;
use std::sync::Arc;

/// Resolves paths directly against a host filesystem.
pub struct DirectResolver {
    fs: Arc<dyn HostFs>,
}

impl DirectResolver {
    pub fn new(fs: Arc<dyn HostFs>) -> Self {
        Self { fs }
    }
}

impl Resolver for DirectResolver {
    fn resolve(&self, path: &str, _oflag: i32, done: Done<Arc<dyn HostFileIo>>) {
        done(self.fs.file_ref(path));
    }
}

/// Resolves paths by fetching `base_url` + path.
///
/// Only a 200 response with a body counts as success; any other status maps
/// to not-found, so a missing remote file behaves exactly like a missing
/// local one. Writes to the fetched temporary file never reach the server.
pub struct FetchResolver {
    http: Arc<dyn HostFetch>,
    base_url: String,
    /// Paths reported as empty directories to stat-only callers, so path
    /// walks over the virtual tree succeed without a fetch.
    directories: HashSet<String>,
}

impl FetchResolver {
    pub fn new(http: Arc<dyn HostFetch>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            directories: HashSet::new(),
        }
    }

    /// Declare `path` a placeholder directory.
    pub fn add_directory(&mut self, path: impl Into<String>) {
        self.directories.insert(path.into());
    }
}

impl Resolver for FetchResolver {
    fn resolve(&self, path: &str, _oflag: i32, done: Done<Arc<dyn HostFileIo>>) {
        let url = format!("{}{}", self.base_url, path);
        let url2 = url.clone();
        self.http.get(
            &url,
            Box::new(move |res| match res {
                Ok(resp) if resp.status == 200 => match resp.body {
                    Some(body) => done(Ok(body)),
                    None => done(Err(HostError::Failed)),
                },
                Ok(resp) => {
                    log::debug!("fetch: status {} for {}", resp.status, url2);
                    done(Err(HostError::NotFound));
                }
                Err(e) => {
                    log::debug!("fetch: {} for {}", e, url2);
                    done(Err(e));
                }
            }),
        );
    }

    fn is_placeholder_dir(&self, path: &str) -> bool {
        self.directories.contains(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::EventLoop;
    use crate::file::RefFile;
    use crate::hub::Hub;
    use hostio_core::config::BridgeConfig;
    use hostio_core::error::BridgeError;
    use hostio_core::stream::Stream;
    use hostio_mem::MemFetch;

    fn rig() -> (EventLoop, Arc<Hub>, MemFetch) {
        let ev = EventLoop::start();
        let hub = Hub::new(ev.handle());
        let http = MemFetch::new(hub.dispatcher());
        (ev, hub, http)
    }

    #[test]
    fn fetch_resolver_serves_remote_body() {
        let (_ev, hub, http) = rig();
        http.add_route("http://example.test/data/motd", 200, b"remote hello");
        let resolver = Arc::new(FetchResolver::new(
            Arc::new(http.clone()),
            "http://example.test/data",
        ));
        let cfg = BridgeConfig::default();

        let file = RefFile::open(hub, resolver, "/motd", libc::O_RDONLY, &cfg).unwrap();
        let mut buf = [0u8; 32];
        let n = file.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"remote hello");
        file.close();
    }

    #[test]
    fn non_200_status_maps_to_not_found() {
        let (_ev, hub, http) = rig();
        http.add_route("http://example.test/data/gone", 404, b"");
        let resolver = Arc::new(FetchResolver::new(
            Arc::new(http.clone()),
            "http://example.test/data",
        ));
        let cfg = BridgeConfig::default();

        for path in ["/gone", "/never-registered"] {
            let res = RefFile::open(hub.clone(), resolver.clone(), path, libc::O_RDONLY, &cfg);
            assert_eq!(res.err(), Some(BridgeError::NotFound));
        }
    }

    #[test]
    fn placeholder_directories_are_declared_not_fetched() {
        let (_ev, _hub, http) = rig();
        let mut resolver = FetchResolver::new(Arc::new(http), "http://example.test/data");
        resolver.add_directory("/lib");
        assert!(resolver.is_placeholder_dir("/lib"));
        assert!(!resolver.is_placeholder_dir("/lib/module"));
    }
}
