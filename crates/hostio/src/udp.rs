//! # Datagram socket bridge
//!
//! Blocking-style `recvfrom`/`sendto` over the host's callback-driven
//! datagram API. The open sequence creates a host socket, binds it to the
//! wildcard address and immediately arms the first receive; from then on
//! exactly one receive is kept outstanding whenever the single-datagram
//! buffer is free.
//!
//! - `recvfrom` waits on the hub until a datagram is buffered (or the socket
//!   closes), copies out up to the caller's length — the rest of the
//!   datagram is dropped — and re-arms the receive.
//! - `sendto` translates the destination, refuses a family mismatch without
//!   touching the host, and waits only for the send to be *issued*; the send
//!   completion is ignored apart from logging.

use hostio_core::addr::{any_addr, AddrFamily, SockAddr};
use hostio_core::config::BridgeConfig;
use hostio_core::error::{BridgeError, HostResult, Result};
use hostio_core::host::{HostDatagram, HostNet};
use hostio_core::stream::{is_block, Stream};

use crate::hub::{Hub, HubCell, OpSlot};

use std::net::SocketAddr;
use std::sync::{Arc, Weak};

const OP_OK: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SockPhase {
    Closed,
    Binding,
    Bound,
}

struct UdpState {
    oflag: i32,
    family: AddrFamily,
    phase: SockPhase,
    socket: Option<Arc<dyn HostDatagram>>,
    /// The one buffered datagram; empty means nothing received yet (the
    /// host holds further arrivals until the receive is re-armed).
    recv_data: Vec<u8>,
    recv_src: Option<SockAddr>,
    /// A host receive is outstanding; prevents double-arming.
    recv_armed: bool,
}

impl UdpState {
    fn is_open(&self) -> bool {
        self.phase == SockPhase::Bound && self.socket.is_some()
    }
}

/// A host-bridged datagram socket.
pub struct DatagramSocket {
    hub: Arc<Hub>,
    state: HubCell<UdpState>,
    recv_capacity: usize,
    weak: Weak<DatagramSocket>,
}

impl DatagramSocket {
    /// Create, bind and arm a datagram socket for `domain` (`AF_INET` or
    /// `AF_INET6`). Blocks the worker until the socket is usable. Any host
    /// failure — including the capability being absent — surfaces as
    /// [`BridgeError::Unavailable`].
    pub fn open(
        hub: Arc<Hub>,
        net: Arc<dyn HostNet>,
        domain: i32,
        oflag: i32,
        config: &BridgeConfig,
    ) -> Result<Arc<DatagramSocket>> {
        let family = AddrFamily::from_domain(domain)?;
        let sock = Arc::new_cyclic(|weak| DatagramSocket {
            hub: hub.clone(),
            state: HubCell::new(UdpState {
                oflag,
                family,
                phase: SockPhase::Closed,
                socket: None,
                recv_data: Vec::new(),
                recv_src: None,
                recv_armed: false,
            }),
            recv_capacity: config.recv_capacity,
            weak: weak.clone(),
        });

        let slot = OpSlot::pending();
        let s = sock.clone();
        let sl = slot.clone();
        hub.dispatch(Box::new(move || s.ev_open(net, sl)));

        let value = hub.wait_while_pending(&slot);
        if value == OP_OK {
            Ok(sock)
        } else {
            Err(BridgeError::Unavailable)
        }
    }

    fn arc(&self) -> Arc<DatagramSocket> {
        self.weak.upgrade().expect("DatagramSocket outlived its Arc")
    }

    // ── Event-loop side ──────────────────────────────────────────────

    fn ev_open(self: Arc<Self>, net: Arc<dyn HostNet>, slot: Arc<OpSlot>) {
        let socket = match net.udp_socket() {
            Ok(s) => s,
            Err(e) => {
                log::warn!("udp: host socket unavailable: {}", e);
                let mut guard = self.hub.lock();
                self.hub.complete(&mut guard, &slot, e.code());
                return;
            }
        };
        let addr = {
            let mut guard = self.hub.lock();
            let st = self.state.get_mut(&mut guard);
            st.phase = SockPhase::Binding;
            st.socket = Some(socket.clone());
            any_addr(st.family)
        };
        let s = self.clone();
        socket.bind(addr, Box::new(move |r| s.ev_bound(r, slot)));
    }

    fn ev_bound(self: Arc<Self>, res: HostResult<()>, slot: Arc<OpSlot>) {
        let mut guard = self.hub.lock();
        match res {
            Err(e) => {
                log::warn!("udp: bind failed: {}", e);
                let st = self.state.get_mut(&mut guard);
                st.socket = None;
                st.phase = SockPhase::Closed;
                self.hub.complete(&mut guard, &slot, e.code());
            }
            Ok(()) => {
                let socket = {
                    let st = self.state.get_mut(&mut guard);
                    st.phase = SockPhase::Bound;
                    st.recv_armed = true;
                    st.socket.clone()
                };
                self.hub.complete(&mut guard, &slot, OP_OK);
                drop(guard);
                if let Some(socket) = socket {
                    let s = self.clone();
                    let cap = self.recv_capacity;
                    socket.recv_from(cap, Box::new(move |r| s.ev_recv_done(r)));
                }
            }
        }
    }

    /// Arm the next host receive, unless one is outstanding or the buffer
    /// still holds an unconsumed datagram.
    fn ev_arm_recv(self: Arc<Self>) {
        let mut guard = self.hub.lock();
        let socket = {
            let st = self.state.get_mut(&mut guard);
            if !st.is_open() || st.recv_armed || !st.recv_data.is_empty() {
                None
            } else {
                st.recv_armed = true;
                st.socket.clone()
            }
        };
        drop(guard);
        if let Some(socket) = socket {
            let s = self.clone();
            let cap = self.recv_capacity;
            socket.recv_from(cap, Box::new(move |r| s.ev_recv_done(r)));
        }
    }

    fn ev_recv_done(self: Arc<Self>, res: HostResult<(Vec<u8>, SocketAddr)>) {
        let mut guard = self.hub.lock();
        if !self.state.get_mut(&mut guard).is_open() {
            return;
        }
        let st = self.state.get_mut(&mut guard);
        st.recv_armed = false;
        match res {
            Ok((data, src)) if !data.is_empty() => {
                st.recv_data = data;
                st.recv_src = Some(SockAddr::from_host(&src));
            }
            other => {
                if let Err(e) = other {
                    log::warn!("udp: host receive failed: {}", e);
                }
                st.socket = None;
                st.phase = SockPhase::Closed;
            }
        }
        self.hub.broadcast();
    }

    fn ev_send(self: Arc<Self>, data: Vec<u8>, dest: SocketAddr, slot: Arc<OpSlot>) {
        let mut guard = self.hub.lock();
        let socket = {
            let st = self.state.get_mut(&mut guard);
            if st.is_open() { st.socket.clone() } else { None }
        };
        match socket {
            None => self.hub.complete(&mut guard, &slot, -(libc::EIO as i64)),
            Some(socket) => {
                // The caller only waits for the send to be issued; the
                // completion result is not reported back.
                let n = data.len() as i64;
                self.hub.complete(&mut guard, &slot, n);
                drop(guard);
                socket.send_to(
                    data,
                    dest,
                    Box::new(|r| {
                        if let Err(e) = r {
                            log::warn!("udp: host send failed: {}", e);
                        }
                    }),
                );
            }
        }
    }

    // ── Worker side ──────────────────────────────────────────────────

    /// Receive one datagram. Returns the copied length and the source
    /// address; bytes beyond `buf.len()` are discarded. On a blocking
    /// socket this waits for an arrival; a close while waiting returns
    /// `Ok((0, None))`, matching end-of-stream. A socket already closed
    /// when the call starts (and with nothing buffered) is an error.
    pub fn recvfrom(&self, buf: &mut [u8]) -> Result<(usize, Option<SockAddr>)> {
        let mut guard = self.hub.lock();
        let block = {
            let st = self.state.get_mut(&mut guard);
            if !st.is_open() && st.recv_data.is_empty() {
                return Err(BridgeError::Io);
            }
            is_block(st.oflag)
        };
        if block {
            loop {
                let ready = {
                    let st = self.state.get_mut(&mut guard);
                    !st.recv_data.is_empty() || !st.is_open()
                };
                if ready {
                    break;
                }
                guard = self.hub.wait(guard);
            }
        }
        let (n, src, rearm) = {
            let st = self.state.get_mut(&mut guard);
            let n = buf.len().min(st.recv_data.len());
            buf[..n].copy_from_slice(&st.recv_data[..n]);
            let consumed = !st.recv_data.is_empty();
            st.recv_data.clear();
            let src = st.recv_src.take();
            (n, src, consumed && st.is_open())
        };
        drop(guard);
        if rearm {
            let s = self.arc();
            self.hub.dispatch(Box::new(move || s.ev_arm_recv()));
        }
        Ok((n, if n > 0 { src } else { None }))
    }

    /// Send one datagram to `dest`. Fails without touching the host when
    /// the destination family does not match the socket's. Waits only for
    /// the send to be issued on the event loop.
    pub fn sendto(&self, buf: &[u8], dest: Option<&SockAddr>) -> Result<usize> {
        let family = {
            let mut guard = self.hub.lock();
            let st = self.state.get_mut(&mut guard);
            if !st.is_open() {
                return Err(BridgeError::Io);
            }
            st.family
        };
        let dest = match dest {
            Some(d) => *d,
            // Connected-mode sends are not supported.
            None => return Err(BridgeError::Io),
        };
        if dest.family() != family {
            return Err(BridgeError::AddrNotSupported);
        }

        let slot = OpSlot::pending();
        let s = self.arc();
        let sl = slot.clone();
        let data = buf.to_vec();
        let host_dest = dest.to_host();
        self.hub
            .dispatch(Box::new(move || s.ev_send(data, host_dest, sl)));

        let value = self.hub.wait_while_pending(&slot);
        if value < 0 {
            return Err(BridgeError::from_code(value));
        }
        Ok(buf.len())
    }
}

impl Stream for DatagramSocket {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.recvfrom(buf).map(|(n, _)| n)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        self.sendto(buf, None)
    }

    fn fcntl(&self, cmd: i32, arg: i32) -> Result<i32> {
        let mut guard = self.hub.lock();
        let st = self.state.get_mut(&mut guard);
        match cmd {
            libc::F_GETFL => Ok(st.oflag),
            libc::F_SETFL => {
                st.oflag = arg;
                Ok(0)
            }
            _ => Err(BridgeError::InvalidArgument),
        }
    }

    /// Drops the host handle on the event loop and wakes any blocked
    /// receiver, which then observes the closed state and returns 0.
    fn close(&self) {
        let slot = OpSlot::pending();
        let s = self.arc();
        let sl = slot.clone();
        self.hub.dispatch(Box::new(move || {
            let mut guard = s.hub.lock();
            let st = s.state.get_mut(&mut guard);
            st.socket = None;
            st.phase = SockPhase::Closed;
            st.recv_armed = false;
            s.hub.complete(&mut guard, &sl, OP_OK);
        }));
        let _ = self.hub.wait_while_pending(&slot);
    }

    fn is_read_ready(&self) -> bool {
        let mut guard = self.hub.lock();
        let st = self.state.get_mut(&mut guard);
        !st.recv_data.is_empty() || !st.is_open()
    }

    fn is_write_ready(&self) -> bool {
        // No send-side flow control: always writable.
        true
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
    use hostio_mem::{MemNet, MemUdp};
    use std::net::{IpAddr, Ipv4Addr};
    use std::thread;
    use std::time::{Duration, Instant};

    fn rig() -> (EventLoop, Arc<Hub>, MemNet) {
        let ev = EventLoop::start();
        let hub = Hub::new(ev.handle());
        let net = MemNet::new(hub.dispatcher());
        (ev, hub, net)
    }

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), port)
    }

    fn wait_until(deadline_ms: u64, mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_millis(deadline_ms);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn host_socket(net: &MemNet) -> Arc<MemUdp> {
        net.socket(0).expect("socket not created")
    }

    #[test]
    fn open_binds_and_arms_first_receive() {
        let (_ev, hub, net) = rig();
        let cfg = BridgeConfig::default();
        let sock = DatagramSocket::open(hub, Arc::new(net.clone()), libc::AF_INET, 0, &cfg)
            .unwrap();

        let host = host_socket(&net);
        assert!(host.is_bound());
        wait_until(2000, || host.recv_pending());
        assert!(!sock.is_read_ready());
        sock.close();
    }

    #[test]
    fn blocking_recvfrom_delivers_and_rearms() {
        let (_ev, hub, net) = rig();
        let cfg = BridgeConfig::default();
        let sock = DatagramSocket::open(hub, Arc::new(net.clone()), libc::AF_INET, 0, &cfg)
            .unwrap();
        let host = host_socket(&net);

        wait_until(2000, || host.recv_pending());
        host.inject(b"ping", peer(7001));

        let mut buf = [0u8; 64];
        let (n, src) = sock.recvfrom(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(src, Some(SockAddr::V4 { ip: [10, 0, 0, 1], port: 7001 }));

        // Consuming the datagram re-arms the receive.
        wait_until(2000, || host.recv_pending());
        host.inject(b"pong", peer(7002));
        let (n, src) = sock.recvfrom(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"pong");
        assert_eq!(src, Some(SockAddr::V4 { ip: [10, 0, 0, 1], port: 7002 }));
        sock.close();
    }

    #[test]
    fn second_datagram_waits_until_first_is_consumed() {
        let (_ev, hub, net) = rig();
        let cfg = BridgeConfig::default();
        let sock = DatagramSocket::open(hub, Arc::new(net.clone()), libc::AF_INET, 0, &cfg)
            .unwrap();
        let host = host_socket(&net);

        wait_until(2000, || host.recv_pending());
        host.inject(b"first", peer(7001));
        host.inject(b"second", peer(7001));

        let mut buf = [0u8; 64];
        let (n, _) = sock.recvfrom(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"first");
        let (n, _) = sock.recvfrom(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"second");
        sock.close();
    }

    #[test]
    fn short_caller_buffer_truncates_datagram() {
        let (_ev, hub, net) = rig();
        let cfg = BridgeConfig::default();
        let sock = DatagramSocket::open(hub, Arc::new(net.clone()), libc::AF_INET, 0, &cfg)
            .unwrap();
        let host = host_socket(&net);

        wait_until(2000, || host.recv_pending());
        host.inject(b"oversized", peer(7001));

        let mut buf = [0u8; 4];
        let (n, _) = sock.recvfrom(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"over");

        // The tail is gone; the next receive is a fresh datagram.
        wait_until(2000, || host.recv_pending());
        host.inject(b"next", peer(7001));
        let mut buf = [0u8; 64];
        let (n, _) = sock.recvfrom(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"next");
        sock.close();
    }

    #[test]
    fn sendto_issues_host_send() {
        let (_ev, hub, net) = rig();
        let cfg = BridgeConfig::default();
        let sock = DatagramSocket::open(hub, Arc::new(net.clone()), libc::AF_INET, 0, &cfg)
            .unwrap();
        let host = host_socket(&net);

        let dest = SockAddr::V4 { ip: [10, 0, 0, 2], port: 53 };
        assert_eq!(sock.sendto(b"query", Some(&dest)).unwrap(), 5);
        wait_until(2000, || host.sent_count() == 1);
        let (data, to) = host.sent()[0].clone();
        assert_eq!(data, b"query");
        assert_eq!(to, dest.to_host());
        sock.close();
    }

    #[test]
    fn family_mismatch_fails_without_host_send() {
        let (_ev, hub, net) = rig();
        let cfg = BridgeConfig::default();
        let sock = DatagramSocket::open(hub, Arc::new(net.clone()), libc::AF_INET, 0, &cfg)
            .unwrap();
        let host = host_socket(&net);

        let dest = SockAddr::V6 { ip: [0; 16], port: 53, scope: 0 };
        assert_eq!(
            sock.sendto(b"x", Some(&dest)).unwrap_err(),
            BridgeError::AddrNotSupported
        );
        assert_eq!(host.sent_count(), 0);
        sock.close();
    }

    #[test]
    fn absent_capability_reports_unavailable() {
        let (_ev, hub, net) = rig();
        net.set_unavailable(true);
        let cfg = BridgeConfig::default();
        let res = DatagramSocket::open(hub, Arc::new(net), libc::AF_INET, 0, &cfg);
        assert_eq!(res.err(), Some(BridgeError::Unavailable));
    }

    #[test]
    fn unsupported_domain_is_refused() {
        let (_ev, hub, net) = rig();
        let cfg = BridgeConfig::default();
        let res = DatagramSocket::open(hub, Arc::new(net), libc::AF_UNIX, 0, &cfg);
        assert_eq!(res.err(), Some(BridgeError::AddrNotSupported));
    }

    #[test]
    fn nonblocking_recvfrom_returns_zero_when_empty() {
        let (_ev, hub, net) = rig();
        let cfg = BridgeConfig::default();
        let sock = DatagramSocket::open(
            hub,
            Arc::new(net.clone()),
            libc::AF_INET,
            libc::O_NONBLOCK,
            &cfg,
        )
        .unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(sock.recvfrom(&mut buf).unwrap(), (0, None));
        sock.close();
    }

    #[test]
    fn close_wakes_blocked_receiver() {
        let (_ev, hub, net) = rig();
        let cfg = BridgeConfig::default();
        let sock = DatagramSocket::open(hub, Arc::new(net.clone()), libc::AF_INET, 0, &cfg)
            .unwrap();

        let sock2 = sock.clone();
        let receiver = thread::spawn(move || {
            let mut buf = [0u8; 16];
            sock2.recvfrom(&mut buf).unwrap()
        });
        thread::sleep(Duration::from_millis(50));
        sock.close();
        assert_eq!(receiver.join().unwrap(), (0, None));
    }

    #[test]
    fn recvfrom_on_already_closed_socket_is_an_error() {
        let (_ev, hub, net) = rig();
        let cfg = BridgeConfig::default();
        let sock = DatagramSocket::open(hub, Arc::new(net.clone()), libc::AF_INET, 0, &cfg)
            .unwrap();
        sock.close();

        let mut buf = [0u8; 16];
        assert_eq!(sock.recvfrom(&mut buf).unwrap_err(), BridgeError::Io);
    }

    #[test]
    fn write_readiness_is_unconditional() {
        let (_ev, hub, net) = rig();
        let cfg = BridgeConfig::default();
        let sock = DatagramSocket::open(hub, Arc::new(net.clone()), libc::AF_INET, 0, &cfg)
            .unwrap();

        assert!(sock.is_write_ready());
        sock.close();
        assert!(sock.is_write_ready());
    }
}
