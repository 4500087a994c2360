//! Loopback-socket test harness shared by the scenario tests.
//!
//! Mirrors `technomunk-gnet/tests/single_client_test.rs`'s approach of
//! binding a real socket pair and slinging bytes rather than mocking the
//! transport — except here the fixture is a small TCP server running on
//! a background thread per accepted connection, since a [`Connection`]
//! in this crate is a single in-order byte stream, not a datagram.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream as StdTcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use mio::event::Source;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};

use pendingset::Connection;

/// A `Connection` impl wrapping a real (already-established) TCP stream.
///
/// Established with a blocking `std::net::TcpStream::connect` first and
/// only switched to non-blocking afterwards, since connection
/// establishment is explicitly out of this crate's scope (spec.md §1) —
/// by the time a [`pendingset::Continuation`] is built, its connection
/// is assumed already up.
pub struct TestConnection {
    stream: TcpStream,
}

impl TestConnection {
    pub fn connect(addr: SocketAddr) -> io::Result<Self> {
        let std_stream = StdTcpStream::connect(addr)?;
        std_stream.set_nonblocking(true)?;
        Ok(Self {
            stream: TcpStream::from_std(std_stream),
        })
    }
}

impl Read for TestConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TestConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Source for TestConnection {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.stream.register(registry, token, interests)
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.stream.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.stream.deregister(registry)
    }
}

impl Connection for TestConnection {
    fn close(&mut self, _reason: &str) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

/// A mock server: spawns an acceptor thread; each accepted connection is
/// handed to `script` on its own thread, indexed by accept order (0-based)
/// so a test can vary behavior attempt-by-attempt (first connection
/// drops, second replies, etc).
pub struct LoopbackServer {
    addr: SocketAddr,
    // Kept only so the acceptor thread's lifetime is visibly tied to the
    // server value; tests let it run until process exit.
    _acceptor: thread::JoinHandle<()>,
}

impl LoopbackServer {
    pub fn spawn<F>(script: F) -> Self
    where
        F: Fn(usize, StdTcpStream) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
        let addr = listener.local_addr().expect("local_addr");
        let script = Arc::new(script);
        let counter = Arc::new(AtomicUsize::new(0));
        let acceptor = thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let index = counter.fetch_add(1, Ordering::SeqCst);
                let script = script.clone();
                thread::spawn(move || script(index, stream));
            }
        });
        Self {
            addr,
            _acceptor: acceptor,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Writes `line` followed by `\n`, then returns the stream (caller
/// decides whether to keep it open or drop it).
pub fn write_line(mut stream: StdTcpStream, line: &str) -> StdTcpStream {
    stream
        .write_all(format!("{line}\n").as_bytes())
        .expect("write line");
    stream
}
