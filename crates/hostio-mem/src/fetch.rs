//! In-memory network fetch.

use hostio_core::dispatch::Dispatch;
use hostio_core::error::HostError;
use hostio_core::host::{Done, FetchResponse, HostFetch, HostFs};

use crate::fs::MemFs;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct FetchShared {
    dispatch: Arc<dyn Dispatch>,
    routes: Mutex<HashMap<String, (u16, Vec<u8>)>>,
    requests: AtomicUsize,
    /// Bodies are parked as files keyed by URL, mirroring a host that
    /// streams each response to a temporary file.
    bodies: MemFs,
}

/// In-memory [`HostFetch`]. Clones share the same route table.
#[derive(Clone)]
pub struct MemFetch {
    shared: Arc<FetchShared>,
}

impl MemFetch {
    pub fn new(dispatch: Arc<dyn Dispatch>) -> Self {
        Self {
            shared: Arc::new(FetchShared {
                dispatch: dispatch.clone(),
                routes: Mutex::new(HashMap::new()),
                requests: AtomicUsize::new(0),
                bodies: MemFs::new(dispatch),
            }),
        }
    }

    /// Serve `status` and `body` for GETs of `url`. Unrouted URLs get 404.
    pub fn add_route(&self, url: &str, status: u16, body: &[u8]) {
        self.shared
            .routes
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.to_vec()));
    }

    /// Number of GETs issued so far.
    pub fn request_count(&self) -> usize {
        self.shared.requests.load(Ordering::SeqCst)
    }
}

impl HostFetch for MemFetch {
    fn get(&self, url: &str, done: Done<FetchResponse>) {
        self.shared.requests.fetch_add(1, Ordering::SeqCst);
        let route = self.shared.routes.lock().unwrap().get(url).cloned();
        let result = match route {
            Some((200, body)) => {
                self.shared.bodies.insert(url, &body);
                match self.shared.bodies.file_ref(url) {
                    Ok(handle) => Ok(FetchResponse { status: 200, body: Some(handle) }),
                    Err(_) => Err(HostError::Failed),
                }
            }
            Some((status, _)) => Ok(FetchResponse { status, body: None }),
            None => Ok(FetchResponse { status: 404, body: None }),
        };
        self.shared.dispatch.post(Box::new(move || done(result)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostio_core::dispatch::Task;
    use std::sync::mpsc;
    use std::time::Duration;

    struct InlineDispatch;
    impl Dispatch for InlineDispatch {
        fn post(&self, task: Task) {
            task();
        }
        fn post_after(&self, _delay: Duration, task: Task) {
            task();
        }
    }

    #[test]
    fn routed_url_returns_body_handle() {
        let http = MemFetch::new(Arc::new(InlineDispatch));
        http.add_route("http://t/x", 200, b"body");

        let (tx, rx) = mpsc::channel();
        http.get("http://t/x", Box::new(move |r| tx.send(r).unwrap()));
        let resp = rx.recv().unwrap().unwrap();
        assert_eq!(resp.status, 200);
        assert!(resp.body.is_some());
        assert_eq!(http.request_count(), 1);
    }

    #[test]
    fn unrouted_url_is_404_without_body() {
        let http = MemFetch::new(Arc::new(InlineDispatch));
        let (tx, rx) = mpsc::channel();
        http.get("http://t/none", Box::new(move |r| tx.send(r).unwrap()));
        let resp = rx.recv().unwrap().unwrap();
        assert_eq!(resp.status, 404);
        assert!(resp.body.is_none());
    }
}
