use std::sync::mpsc::{self, TrySendError};
use std::sync::Arc;
use std::time::Duration;

use crate::command::Command;
use crate::response::Response;

/// Back-reference into the Connection Multiplexer identifying where a
/// [`Response`] must be written. Implementations own the socket and the
/// discipline for closing it on write failure; the Supervisor only ever
/// calls `reply`.
pub trait ReplySink: Send + Sync {
    fn reply(&self, response: Response);
}

/// An in-flight request: the command the parser produced plus where to send
/// the eventual reply.
pub struct Event {
    pub conn: Arc<dyn ReplySink>,
    pub cmd: Command,
}

/// Producer handle for the bounded event queue (§4.F). Cloned once per
/// connection reader thread.
#[derive(Clone)]
pub struct EventSender {
    inner: mpsc::SyncSender<Event>,
}

/// Single-consumer handle for the bounded event queue, owned by the
/// Supervisor.
pub struct EventReceiver {
    inner: mpsc::Receiver<Event>,
}

/// Error returned by [`EventSender::try_send`] when the queue is saturated.
/// Carries the event back so the caller can synthesize `ERR QUEUE_FULL`
/// without ever touching the Supervisor.
pub struct QueueFull(pub Event);

/// Builds a bounded MPSC queue with capacity `Q` (`§4.F` requires `Q >= 20`).
pub fn bounded(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (EventSender { inner: tx }, EventReceiver { inner: rx })
}

impl EventSender {
    /// Non-blocking enqueue. Network threads must never block the
    /// Supervisor, so a full queue is reported immediately rather than
    /// waited out.
    pub fn try_send(&self, event: Event) -> Result<(), QueueFull> {
        match self.inner.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(ev)) => Err(QueueFull(ev)),
            Err(TrySendError::Disconnected(ev)) => Err(QueueFull(ev)),
        }
    }
}

impl EventReceiver {
    /// Blocks for up to `timeout` for the next event. The Supervisor calls
    /// this in a loop and checks the process-level shutdown flag between
    /// calls, so an externally-triggered shutdown (e.g. `SIGTERM`, with no
    /// `SHUTDOWN` command in flight) is noticed within one `timeout` window
    /// instead of never.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Event> {
        self.inner.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reason::ErrorReason;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<Response>>);
    impl ReplySink for Recorder {
        fn reply(&self, response: Response) {
            self.0.lock().unwrap().push(response);
        }
    }

    #[test]
    fn full_queue_returns_the_event_back() {
        let (tx, _rx) = bounded(1);
        let sink: Arc<dyn ReplySink> = Arc::new(Recorder(Mutex::new(Vec::new())));
        tx.try_send(Event { conn: sink.clone(), cmd: Command::Shutdown }).unwrap();
        let err = tx
            .try_send(Event { conn: sink, cmd: Command::Shutdown })
            .unwrap_err();
        assert_eq!(err.0.cmd, Command::Shutdown);
    }

    #[test]
    fn recv_timeout_returns_none_when_empty() {
        let (_tx, rx) = bounded(4);
        assert!(rx.recv_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn reply_sink_receives_formatted_responses() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        recorder.reply(Response::Err(ErrorReason::QueueFull));
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }
}
