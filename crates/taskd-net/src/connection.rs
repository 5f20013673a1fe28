use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use taskd_protocol::{ReplySink, Response};

/// The Connection Multiplexer's half of a [`ReplySink`]: the only way the
/// Supervisor thread can write a reply is through this handle, and the only
/// thread allowed to close the underlying socket is this module's reader
/// loop (`run_reader`) — never the Supervisor.
pub struct ConnectionHandle {
    addr: SocketAddr,
    writer: Mutex<TcpStream>,
    closed: AtomicBool,
}

impl ConnectionHandle {
    pub fn new(addr: SocketAddr, writer: TcpStream) -> Self {
        ConnectionHandle {
            addr,
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Marks the connection closed and shuts down the socket so the reader
    /// loop's blocking `read` unblocks. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(stream) = self.writer.lock() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

impl ReplySink for ConnectionHandle {
    fn reply(&self, response: Response) {
        if self.is_closed() {
            return;
        }
        let line = format!("{}\n", response.to_line());
        let write_result = {
            let mut stream = self.writer.lock().expect("connection writer mutex poisoned");
            stream.write_all(line.as_bytes())
        };
        if let Err(err) = write_result {
            tracing::debug!(addr = %self.addr, error = %err, "reply write failed, closing connection");
            self.close();
        }
    }
}
