use std::error::Error;
use std::fmt::{Display, Formatter};

/// Error kind that represents failures reported by the [`crate::Client`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ErrorKind {
    /// No error occurred.
    NoError,
    /// The evaluation failed because the requested flag was not found in the local replica.
    FlagNotFound = 1000,
    /// The evaluation produced a variation whose identifier is not present on the flag.
    VariationNotFound = 1001,
    /// The evaluation failed because of a type mismatch between the evaluated
    /// variation value and the requested default value type.
    VariationTypeMismatch = 1002,
    /// Authentication failed with a non-retryable status; the client serves defaults.
    AuthenticationFailure = 2000,
    /// A synchronization fetch failed after exhausting its retries.
    SyncFailure = 2001,
    /// The push stream disconnected and the client fell back to polling.
    StreamDisconnected = 2002,
    /// A metrics upload failed; the affected events were discarded.
    MetricsUploadFailure = 3000,
    /// The telemetry target buffer reached its capacity; further targets are dropped
    /// until the next flush.
    MetricsCapacityExceeded = 3001,
}

impl ErrorKind {
    pub(crate) fn as_u16(&self) -> u16 {
        *self as u16
    }
}

/// Error struct that holds the [`ErrorKind`] and message of the reported failure.
#[derive(Debug, PartialEq)]
pub struct ClientError {
    /// Error kind that represents failures reported by the [`crate::Client`].
    pub kind: ErrorKind,
    /// The text representation of the failure.
    pub message: String,
}

impl ClientError {
    pub(crate) fn new(kind: ErrorKind, message: String) -> Self {
        Self { message, kind }
    }
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message.as_str())
    }
}

impl Error for ClientError {}
