//! In-memory host filesystem.

use hostio_core::dispatch::Dispatch;
use hostio_core::error::{HostError, HostResult};
use hostio_core::host::{Done, FileInfo, HostFileIo, HostFs, HostOpenFlags};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Entry = Arc<Mutex<Vec<u8>>>;

struct FsShared {
    dispatch: Arc<dyn Dispatch>,
    files: Mutex<HashMap<String, Entry>>,
    /// Per-path cap on bytes accepted by a single host write; produces
    /// short writes on purpose.
    write_limits: Mutex<HashMap<String, usize>>,
    /// Artificial latency before each completion fires.
    delay: Mutex<Duration>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl FsShared {
    fn complete<T: Send + 'static>(&self, done: Done<T>, result: HostResult<T>) {
        let delay = *self.delay.lock().unwrap();
        if delay.is_zero() {
            self.dispatch.post(Box::new(move || done(result)));
        } else {
            self.dispatch.post_after(delay, Box::new(move || done(result)));
        }
    }
}

/// In-memory [`HostFs`]. Clones share the same file map.
#[derive(Clone)]
pub struct MemFs {
    shared: Arc<FsShared>,
}

impl MemFs {
    pub fn new(dispatch: Arc<dyn Dispatch>) -> Self {
        Self {
            shared: Arc::new(FsShared {
                dispatch,
                files: Mutex::new(HashMap::new()),
                write_limits: Mutex::new(HashMap::new()),
                delay: Mutex::new(Duration::ZERO),
                reads: AtomicUsize::new(0),
                writes: AtomicUsize::new(0),
            }),
        }
    }

    /// Create or replace a file.
    pub fn insert(&self, path: &str, data: &[u8]) {
        self.shared
            .files
            .lock()
            .unwrap()
            .insert(path.to_string(), Arc::new(Mutex::new(data.to_vec())));
    }

    /// Current contents of `path`, if it exists.
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        let files = self.shared.files.lock().unwrap();
        files.get(path).map(|e| e.lock().unwrap().clone())
    }

    /// Cap each host write to `path` at `limit` bytes.
    pub fn set_write_limit(&self, path: &str, limit: usize) {
        self.shared
            .write_limits
            .lock()
            .unwrap()
            .insert(path.to_string(), limit);
    }

    /// Delay every completion by `delay`.
    pub fn set_completion_delay(&self, delay: Duration) {
        *self.shared.delay.lock().unwrap() = delay;
    }

    /// Number of host reads issued so far.
    pub fn host_reads(&self) -> usize {
        self.shared.reads.load(Ordering::SeqCst)
    }

    /// Number of host writes issued so far.
    pub fn host_writes(&self) -> usize {
        self.shared.writes.load(Ordering::SeqCst)
    }
}

impl HostFs for MemFs {
    fn file_ref(&self, path: &str) -> HostResult<Arc<dyn HostFileIo>> {
        Ok(Arc::new(MemFile {
            shared: self.shared.clone(),
            path: path.to_string(),
            entry: Mutex::new(None),
        }))
    }
}

/// Unopened-until-`open` handle onto one [`MemFs`] entry.
struct MemFile {
    shared: Arc<FsShared>,
    path: String,
    entry: Mutex<Option<Entry>>,
}

impl MemFile {
    fn opened(&self) -> Option<Entry> {
        self.entry.lock().unwrap().clone()
    }
}

impl HostFileIo for MemFile {
    fn open(&self, flags: HostOpenFlags, done: Done<()>) {
        let result = {
            let mut files = self.shared.files.lock().unwrap();
            let existing = files.get(&self.path).cloned();
            match existing {
                Some(entry) => {
                    if flags.truncate {
                        entry.lock().unwrap().clear();
                    }
                    *self.entry.lock().unwrap() = Some(entry);
                    Ok(())
                }
                None if flags.create => {
                    let entry: Entry = Arc::new(Mutex::new(Vec::new()));
                    files.insert(self.path.clone(), entry.clone());
                    *self.entry.lock().unwrap() = Some(entry);
                    Ok(())
                }
                None => Err(HostError::NotFound),
            }
        };
        self.shared.complete(done, result);
    }

    fn query(&self, done: Done<FileInfo>) {
        let result = match self.opened() {
            Some(entry) => Ok(FileInfo { size: entry.lock().unwrap().len() as i64 }),
            None => Err(HostError::Failed),
        };
        self.shared.complete(done, result);
    }

    fn read(&self, offset: i64, len: usize, done: Done<Vec<u8>>) {
        self.shared.reads.fetch_add(1, Ordering::SeqCst);
        let result = match self.opened() {
            Some(entry) => {
                let data = entry.lock().unwrap();
                let start = (offset.max(0) as usize).min(data.len());
                let end = (start + len).min(data.len());
                Ok(data[start..end].to_vec())
            }
            None => Err(HostError::Failed),
        };
        self.shared.complete(done, result);
    }

    fn write(&self, offset: i64, data: Vec<u8>, done: Done<usize>) {
        self.shared.writes.fetch_add(1, Ordering::SeqCst);
        let result = match self.opened() {
            Some(entry) => {
                let limit = self
                    .shared
                    .write_limits
                    .lock()
                    .unwrap()
                    .get(&self.path)
                    .copied()
                    .unwrap_or(usize::MAX);
                let accepted = data.len().min(limit);
                let mut contents = entry.lock().unwrap();
                let start = offset.max(0) as usize;
                if contents.len() < start + accepted {
                    contents.resize(start + accepted, 0);
                }
                contents[start..start + accepted].copy_from_slice(&data[..accepted]);
                Ok(accepted)
            }
            None => Err(HostError::Failed),
        };
        self.shared.complete(done, result);
    }
}
