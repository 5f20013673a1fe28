use crate::reason::ErrorReason;

/// A reply destined for the client that issued a [`crate::Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Activated(u32),
    Ok,
    Err(ErrorReason),
}

impl Response {
    /// Renders the response as its wire line, without a trailing newline —
    /// the caller appends `\n` when writing to the socket.
    pub fn to_line(self) -> String {
        match self {
            Response::Activated(id) => format!("OK ID={id}"),
            Response::Ok => "OK".to_string(),
            Response::Err(reason) => format!("ERR {reason}"),
        }
    }
}

impl From<ErrorReason> for Response {
    fn from(reason: ErrorReason) -> Self {
        Response::Err(reason)
    }
}
