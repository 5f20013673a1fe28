//! The Connection Multiplexer (§4.G): accepts TCP connections, frames lines,
//! hands parsed commands to the Event Queue, and writes replies back.
//!
//! One OS thread per accepted connection, one acceptor thread (the caller of
//! [`serve`]). No connection thread ever touches another connection's state;
//! the only shared data is the event queue's producer handle and the
//! live-connection counter used to enforce `MAX_CLIENTS`.

mod connection;
mod framing;

use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use taskd_protocol::{parse_line, ErrorReason, Event, EventSender, QueueFull, Response};

pub use connection::ConnectionHandle;
pub use framing::{LineFramer, LineTooLong};

/// How often the accept loop polls the shutdown flag between `accept()`
/// attempts on a non-blocking listener.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bytes read per `TcpStream::read` call while framing lines.
const READ_CHUNK: usize = 4096;

/// How long [`serve`] waits for in-flight connection readers to exit once
/// the listening socket stops accepting, before giving up on the stragglers
/// and returning anyway.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Maximum bytes a single line may contain before its terminator (§4.G,
    /// `LINE_MAX`, must be `>= 4096`).
    pub line_max: usize,
    /// Maximum concurrent accepted connections (§4.G, `MAX_CLIENTS`, must be
    /// `>= 50`).
    pub max_clients: usize,
    /// Upper bound for a `DEACTIVATE` argument, i.e. `MAX_TASKS`.
    pub max_id: u32,
}

/// Runs the accept loop on an already-bound `listener` until `shutdown` is
/// set, dispatching one reader thread per accepted connection. Blocks the
/// calling thread; callers that want this to run alongside the Supervisor
/// should spawn it on its own thread.
pub fn serve(
    listener: TcpListener,
    sender: EventSender,
    shutdown: Arc<AtomicBool>,
    config: NetConfig,
) -> std::io::Result<()> {
    listener.set_nonblocking(true)?;
    let live = Arc::new(AtomicUsize::new(0));
    let mut readers = Vec::new();

    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                if live.load(Ordering::SeqCst) >= config.max_clients {
                    tracing::warn!(%addr, "MAX_CLIENTS reached, refusing connection");
                    drop(stream);
                    continue;
                }
                live.fetch_add(1, Ordering::SeqCst);
                let sender = sender.clone();
                let live_for_thread = Arc::clone(&live);
                let config = config.clone();
                let handle = thread::Builder::new()
                    .name(format!("taskd-conn-{addr}"))
                    .spawn(move || {
                        run_reader(stream, addr, sender, &config);
                        live_for_thread.fetch_sub(1, Ordering::SeqCst);
                    })
                    .expect("failed to spawn connection reader thread");
                readers.retain(|h: &thread::JoinHandle<()>| !h.is_finished());
                readers.push(handle);
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(err) => return Err(err),
        }
    }

    drop(listener);
    drain_readers(readers);
    Ok(())
}

fn drain_readers(readers: Vec<thread::JoinHandle<()>>) {
    let deadline = Instant::now() + SHUTDOWN_GRACE;
    for handle in readers {
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        if handle.is_finished() {
            let _ = handle.join();
        }
        // Else: the reader outlived the grace period (almost certainly
        // blocked in a read on a peer that never closes). It's left to exit
        // on its own when the process terminates rather than held up.
    }
}

fn run_reader(
    mut stream: TcpStream,
    addr: std::net::SocketAddr,
    sender: EventSender,
    config: &NetConfig,
) {
    let writer = match stream.try_clone() {
        Ok(w) => w,
        Err(err) => {
            tracing::debug!(%addr, error = %err, "failed to clone connection for replies");
            return;
        }
    };
    let conn = Arc::new(ConnectionHandle::new(addr, writer));
    let mut framer = LineFramer::new(config.line_max);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        if conn.is_closed() {
            break;
        }
        let n = match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                tracing::debug!(%addr, error = %err, "connection read failed");
                break;
            }
        };

        match framer.feed(&chunk[..n]) {
            Ok(lines) => {
                for line in lines {
                    dispatch_line(&line, &conn, &sender, config.max_id);
                }
            }
            Err(LineTooLong) => {
                conn.reply(Response::Err(ErrorReason::LineTooLong));
                conn.close();
                break;
            }
        }
    }

    conn.close();
}

fn dispatch_line(line: &[u8], conn: &Arc<ConnectionHandle>, sender: &EventSender, max_id: u32) {
    let cmd = parse_line(line, max_id);
    let event = Event {
        conn: conn.clone(),
        cmd,
    };
    if let Err(QueueFull(_event)) = sender.try_send(event) {
        conn.reply(Response::Err(ErrorReason::QueueFull));
    }
}
