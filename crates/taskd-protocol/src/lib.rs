//! Line grammar, response formatting, and the bounded event queue that
//! carries parsed commands from the Connection Multiplexer to the
//! Supervisor.

mod command;
mod event;
mod reason;
mod response;

pub use command::{parse_line, Command};
pub use event::{bounded, Event, EventReceiver, EventSender, QueueFull, ReplySink};
pub use reason::ErrorReason;
pub use response::Response;
