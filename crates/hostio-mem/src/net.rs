//! In-memory datagram networking.

use hostio_core::dispatch::Dispatch;
use hostio_core::error::{HostError, HostResult};
use hostio_core::host::{Done, HostDatagram, HostNet};

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct NetShared {
    dispatch: Arc<dyn Dispatch>,
    sockets: Mutex<Vec<Arc<MemUdp>>>,
    unavailable: AtomicBool,
}

/// In-memory [`HostNet`]. Clones share the created-socket list.
#[derive(Clone)]
pub struct MemNet {
    shared: Arc<NetShared>,
}

impl MemNet {
    pub fn new(dispatch: Arc<dyn Dispatch>) -> Self {
        Self {
            shared: Arc::new(NetShared {
                dispatch,
                sockets: Mutex::new(Vec::new()),
                unavailable: AtomicBool::new(false),
            }),
        }
    }

    /// Pretend the host has no datagram capability.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// The `idx`-th socket created through this net, if any.
    pub fn socket(&self, idx: usize) -> Option<Arc<MemUdp>> {
        self.shared.sockets.lock().unwrap().get(idx).cloned()
    }
}

impl HostNet for MemNet {
    fn udp_socket(&self) -> HostResult<Arc<dyn HostDatagram>> {
        if self.shared.unavailable.load(Ordering::SeqCst) {
            return Err(HostError::NotSupported);
        }
        let socket = Arc::new(MemUdp {
            dispatch: self.shared.dispatch.clone(),
            bound: AtomicBool::new(false),
            inbox: Mutex::new(VecDeque::new()),
            pending: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        });
        self.shared.sockets.lock().unwrap().push(socket.clone());
        Ok(socket)
    }
}

type PendingRecv = (usize, Done<(Vec<u8>, SocketAddr)>);

/// In-memory [`HostDatagram`] with an injectable inbox and a send record.
pub struct MemUdp {
    dispatch: Arc<dyn Dispatch>,
    bound: AtomicBool,
    /// Datagrams delivered while no receive was outstanding.
    inbox: Mutex<VecDeque<(Vec<u8>, SocketAddr)>>,
    pending: Mutex<Option<PendingRecv>>,
    sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
}

impl MemUdp {
    /// Deliver a datagram, completing an outstanding receive if there is
    /// one, queueing it otherwise.
    pub fn inject(&self, data: &[u8], from: SocketAddr) {
        let taken = self.pending.lock().unwrap().take();
        match taken {
            Some((max, done)) => {
                let trimmed = data[..data.len().min(max)].to_vec();
                self.dispatch
                    .post(Box::new(move || done(Ok((trimmed, from)))));
            }
            None => {
                self.inbox.lock().unwrap().push_back((data.to_vec(), from));
            }
        }
    }

    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::SeqCst)
    }

    /// True when a receive is outstanding.
    pub fn recv_pending(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }

    /// Datagrams sent through this socket so far.
    pub fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl HostDatagram for MemUdp {
    fn bind(&self, _addr: SocketAddr, done: Done<()>) {
        self.bound.store(true, Ordering::SeqCst);
        self.dispatch.post(Box::new(move || done(Ok(()))));
    }

    fn recv_from(&self, max: usize, done: Done<(Vec<u8>, SocketAddr)>) {
        let queued = self.inbox.lock().unwrap().pop_front();
        match queued {
            Some((data, from)) => {
                let trimmed = data[..data.len().min(max)].to_vec();
                self.dispatch
                    .post(Box::new(move || done(Ok((trimmed, from)))));
            }
            None => {
                let replaced = self.pending.lock().unwrap().replace((max, done));
                if replaced.is_some() {
                    log::warn!("mem-udp: receive armed twice");
                }
            }
        }
    }

    fn send_to(&self, data: Vec<u8>, dest: SocketAddr, done: Done<usize>) {
        let len = data.len();
        self.sent.lock().unwrap().push((data, dest));
        self.dispatch.post(Box::new(move || done(Ok(len))));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostio_core::dispatch::Task;
    use std::net::{IpAddr, Ipv4Addr};
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

    fn peer() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9000)
    }

    #[test]
    fn inject_completes_outstanding_receive() {
        let net = MemNet::new(Arc::new(InlineDispatch));
        let socket = net.udp_socket().unwrap();

        let (tx, rx) = mpsc::channel();
        socket.recv_from(16, Box::new(move |r| tx.send(r).unwrap()));
        let mem = net.socket(0).unwrap();
        assert!(mem.recv_pending());

        mem.inject(b"hello", peer());
        let (data, from) = rx.recv().unwrap().unwrap();
        assert_eq!(data, b"hello");
        assert_eq!(from, peer());
        assert!(!mem.recv_pending());
    }

    #[test]
    fn inject_without_receiver_queues() {
        let net = MemNet::new(Arc::new(InlineDispatch));
        let socket = net.udp_socket().unwrap();
        let mem = net.socket(0).unwrap();

        mem.inject(b"early", peer());
        let (tx, rx) = mpsc::channel();
        socket.recv_from(16, Box::new(move |r| tx.send(r).unwrap()));
        let (data, _) = rx.recv().unwrap().unwrap();
        assert_eq!(data, b"early");
    }

    #[test]
    fn unavailable_net_refuses_sockets() {
        let net = MemNet::new(Arc::new(InlineDispatch));
        net.set_unavailable(true);
        assert_eq!(net.udp_socket().err(), Some(HostError::NotSupported));
    }
}
