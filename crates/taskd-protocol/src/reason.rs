/// The closed set of wire-visible failure reasons, shared between the
/// protocol parser (which produces a subset of these from malformed input)
/// and response formatting (which renders any of them as an `ERR` line).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReason {
    UnknownTask,
    UnknownId,
    Unschedulable,
    CapacityFull,
    QueueFull,
    BadCmd,
    BadToken,
    BadId,
    Trailing,
    LineTooLong,
}

impl ErrorReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorReason::UnknownTask => "UNKNOWN_TASK",
            ErrorReason::UnknownId => "UNKNOWN_ID",
            ErrorReason::Unschedulable => "UNSCHEDULABLE",
            ErrorReason::CapacityFull => "CAPACITY_FULL",
            ErrorReason::QueueFull => "QUEUE_FULL",
            ErrorReason::BadCmd => "BAD_CMD",
            ErrorReason::BadToken => "BAD_TOKEN",
            ErrorReason::BadId => "BAD_ID",
            ErrorReason::Trailing => "TRAILING",
            ErrorReason::LineTooLong => "LINE_TOO_LONG",
        }
    }
}

impl std::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
