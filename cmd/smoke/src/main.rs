//! hostio End-to-End Smoke Test
//!
//! Exercises the full bridge stack against the in-memory host backends:
//!   Part A — File bridge: open/read/write/seek/close, blocking and not
//!   Part B — Resolvers + registry: direct, fetch, placeholder directories
//!   Part C — Datagram bridge: bind, recvfrom, sendto, close semantics
//!
//! Run: ./target/release/hostio-smoke

use hostio::{
    BridgeConfig, BridgeError, DatagramSocket, EventLoop, Hub, PathRegistry, RefFile, SockAddr,
    Stream,
};
use hostio::{DirectResolver, FetchResolver};
use hostio_mem::{MemFetch, MemFs, MemNet};

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// ── Test harness ──

struct TestRunner {
    total: usize,
    passed: usize,
    failed: usize,
}

const LINE: &str = "────────────────────────────────────────────────────────────";

impl TestRunner {
    fn new() -> Self {
        Self { total: 0, passed: 0, failed: 0 }
    }

    fn section(&self, name: &str) {
        println!("\n{}", LINE);
        println!("  {}", name);
        println!("{}", LINE);
    }

    fn pass(&mut self, name: &str) {
        self.total += 1;
        self.passed += 1;
        println!("  [{:2}] {:<52} PASS", self.total, name);
    }

    fn fail(&mut self, name: &str, reason: &str) {
        self.total += 1;
        self.failed += 1;
        println!("  [{:2}] {:<52} FAIL: {}", self.total, name, reason);
    }

    fn check(&mut self, name: &str, ok: bool, reason: &str) {
        if ok { self.pass(name); } else { self.fail(name, reason); }
    }

    fn summary(&self) {
        println!("\n{}", LINE);
        println!(
            "  Total: {}  Passed: {}  Failed: {}",
            self.total, self.passed, self.failed
        );
        println!("{}", LINE);
    }
}

/// Poll `cond` until it holds or the timeout expires.
fn eventually(timeout_ms: u64, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

// ════════════════════════════════════════════════════════════
// Part A: File bridge
// ════════════════════════════════════════════════════════════

fn test_file_bridge(t: &mut TestRunner, ev: &EventLoop) {
    t.section("Part A: File Bridge");

    let hub = Hub::new(ev.handle());
    let fs = MemFs::new(hub.dispatcher());
    fs.insert("/motd", b"hello from the host\n");
    let resolver = Arc::new(DirectResolver::new(Arc::new(fs.clone())));
    let cfg = BridgeConfig::default();

    // A1: blocking open + read
    let file = match RefFile::open(hub.clone(), resolver.clone(), "/motd", libc::O_RDONLY, &cfg) {
        Ok(f) => {
            t.pass("open(/motd, O_RDONLY)");
            f
        }
        Err(e) => {
            t.fail("open(/motd, O_RDONLY)", &format!("{}", e));
            return;
        }
    };
    let mut buf = [0u8; 64];
    let n = file.read(&mut buf).unwrap_or(0);
    t.check(
        &format!("blocking read -> {} bytes", n),
        &buf[..n] == b"hello from the host\n",
        "content mismatch",
    );
    t.check("read at EOF -> 0", file.read(&mut buf).unwrap_or(99) == 0, "nonzero");

    // A2: seek arithmetic
    let pos = file.seek(6, libc::SEEK_SET).unwrap_or(-1);
    t.check("seek(6, SEEK_SET) -> 6", pos == 6, &format!("got {}", pos));
    let n = file.read(&mut buf).unwrap_or(0);
    t.check("read after seek", &buf[..n] == b"from the host\n", "content mismatch");
    t.check(
        "seek(bad whence) -> EINVAL",
        file.seek(0, 99) == Err(BridgeError::InvalidArgument),
        "no error",
    );
    file.close();

    // A3: blocking write + readback
    let out = RefFile::open(
        hub.clone(),
        resolver.clone(),
        "/out",
        libc::O_WRONLY | libc::O_CREAT,
        &cfg,
    )
    .expect("open for write");
    let _ = out.write(b"first ");
    let _ = out.write(b"second");
    out.close();
    t.check(
        "blocking writes flushed in order",
        fs.contents("/out").as_deref() == Some(b"first second".as_ref()),
        &format!("{:?}", fs.contents("/out")),
    );

    // A4: non-blocking read-ahead
    let nb = RefFile::open(
        hub.clone(),
        resolver.clone(),
        "/motd",
        libc::O_RDONLY | libc::O_NONBLOCK,
        &cfg,
    )
    .expect("open nonblocking");
    t.check(
        "read-ahead fills the input queue",
        eventually(2000, || nb.is_read_ready()),
        "never became ready",
    );
    let n = nb.read(&mut buf).unwrap_or(0);
    t.check(
        &format!("non-blocking read -> {} bytes", n),
        n == 20,
        "short drain",
    );
    t.check("drained queue -> 0", nb.read(&mut buf).unwrap_or(99) == 0, "nonzero");
    nb.close();

    // A5: missing file
    t.check(
        "open missing -> ENOENT",
        RefFile::open(hub, resolver, "/absent", libc::O_RDONLY, &cfg).err()
            == Some(BridgeError::NotFound),
        "wrong error",
    );
}

// ════════════════════════════════════════════════════════════
// Part B: Resolvers + registry
// ════════════════════════════════════════════════════════════

fn test_registry(t: &mut TestRunner, ev: &EventLoop) {
    t.section("Part B: Resolvers and Registry");

    let hub = Hub::new(ev.handle());
    let fs = MemFs::new(hub.dispatcher());
    fs.insert("/etc/passwd", b"root:x:0:0\n");
    let http = MemFetch::new(hub.dispatcher());
    http.add_route("http://pkg.test/lib/module.so", 200, b"\x7fELFfake");
    http.add_route("http://pkg.test/lib/broken.so", 500, b"");

    let mut fetch = FetchResolver::new(Arc::new(http.clone()), "http://pkg.test");
    fetch.add_directory("/lib");

    let mut reg = PathRegistry::new(hub, BridgeConfig::default());
    reg.register("/", Arc::new(DirectResolver::new(Arc::new(fs))));
    reg.register("/lib", Arc::new(fetch));

    // B1: direct route
    let f = reg.open("/etc/passwd", libc::O_RDONLY);
    t.check("registry routes /etc/passwd to host fs", f.is_ok(), "open failed");
    if let Ok(f) = f {
        let mut buf = [0u8; 32];
        let n = f.read(&mut buf).unwrap_or(0);
        t.check("direct content", &buf[..n] == b"root:x:0:0\n", "mismatch");
        f.close();
    }

    // B2: fetch route (longest prefix)
    let f = reg.open("/lib/module.so", libc::O_RDONLY);
    t.check("registry routes /lib/* to fetch", f.is_ok(), "open failed");
    if let Ok(f) = f {
        let mut buf = [0u8; 32];
        let n = f.read(&mut buf).unwrap_or(0);
        t.check("fetched content", &buf[..n] == b"\x7fELFfake", "mismatch");
        f.close();
    }

    // B3: non-200 status
    t.check(
        "HTTP 500 -> ENOENT",
        reg.open("/lib/broken.so", libc::O_RDONLY).err() == Some(BridgeError::NotFound),
        "wrong error",
    );

    // B4: placeholder directory
    t.check(
        "stat(/lib) is a directory",
        reg.stat("/lib").map(|s| s.is_directory).unwrap_or(false),
        "not a directory",
    );
    let before = http.request_count();
    let dir = reg.open("/lib", libc::O_RDONLY);
    t.check(
        "open(/lib) is a stub, no fetch",
        dir.is_ok() && http.request_count() == before,
        "fetched anyway",
    );

    // B5: unrouted path
    let mut lone = PathRegistry::new(Hub::new(ev.handle()), BridgeConfig::default());
    lone.register("/lib", Arc::new(FetchResolver::new(Arc::new(http), "http://pkg.test")));
    t.check(
        "unrouted path -> ENOENT",
        lone.open("/tmp/x", 0).err() == Some(BridgeError::NotFound),
        "wrong error",
    );
}

// ════════════════════════════════════════════════════════════
// Part C: Datagram bridge
// ════════════════════════════════════════════════════════════

fn test_datagram(t: &mut TestRunner, ev: &EventLoop) {
    t.section("Part C: Datagram Bridge");

    let hub = Hub::new(ev.handle());
    let net = MemNet::new(hub.dispatcher());
    let cfg = BridgeConfig::default();

    // C1: open + bind
    let sock = match DatagramSocket::open(
        hub.clone(),
        Arc::new(net.clone()),
        libc::AF_INET,
        0,
        &cfg,
    ) {
        Ok(s) => {
            t.pass("socket(AF_INET) open + bind");
            s
        }
        Err(e) => {
            t.fail("socket(AF_INET) open + bind", &format!("{}", e));
            return;
        }
    };
    let host = net.socket(0).expect("host socket");
    t.check(
        "first receive armed",
        eventually(2000, || host.recv_pending()),
        "not armed",
    );

    // C2: blocking recvfrom
    let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), 4500);
    host.inject(b"ping", peer);
    let mut buf = [0u8; 32];
    match sock.recvfrom(&mut buf) {
        Ok((n, src)) => {
            t.check("recvfrom -> ping", &buf[..n] == b"ping", "content mismatch");
            t.check(
                "source address translated",
                src == Some(SockAddr::V4 { ip: [192, 0, 2, 1], port: 4500 }),
                &format!("{:?}", src),
            );
        }
        Err(e) => t.fail("recvfrom", &format!("{}", e)),
    }

    // C3: sendto + record
    let dest = SockAddr::V4 { ip: [192, 0, 2, 2], port: 53 };
    let sent = sock.sendto(b"query", Some(&dest)).unwrap_or(0);
    t.check(&format!("sendto -> {} bytes", sent), sent == 5, "wrong length");
    t.check(
        "host saw the datagram",
        eventually(2000, || host.sent_count() == 1),
        "nothing sent",
    );

    // C4: family mismatch refused before the host
    let v6 = SockAddr::V6 { ip: [0; 16], port: 53, scope: 0 };
    t.check(
        "sendto(v6 dest) -> EAFNOSUPPORT",
        sock.sendto(b"x", Some(&v6)) == Err(BridgeError::AddrNotSupported),
        "wrong error",
    );
    t.check("no host send for mismatch", host.sent_count() == 1, "extra send");

    // C5: close wakes a blocked receiver
    let sock2 = sock.clone();
    let receiver = thread::spawn(move || {
        let mut buf = [0u8; 16];
        sock2.recvfrom(&mut buf)
    });
    thread::sleep(Duration::from_millis(50));
    sock.close();
    t.check(
        "close unblocks recvfrom with 0",
        receiver.join().ok() == Some(Ok((0, None))),
        "receiver stuck or errored",
    );

    // C6: capability absent
    let gone = MemNet::new(hub.dispatcher());
    gone.set_unavailable(true);
    t.check(
        "no capability -> EPROTONOSUPPORT",
        DatagramSocket::open(hub, Arc::new(gone), libc::AF_INET, 0, &cfg).err()
            == Some(BridgeError::Unavailable),
        "wrong error",
    );
}

// ════════════════════════════════════════════════════════════

fn main() {
    println!("=== hostio End-to-End Smoke Test ===");

    let ev = EventLoop::start();
    let mut t = TestRunner::new();

    test_file_bridge(&mut t, &ev);
    test_registry(&mut t, &ev);
    test_datagram(&mut t, &ev);

    t.summary();
    std::process::exit(if t.failed > 0 { 1 } else { 0 });
}
