use std::fmt;
use std::time::Duration;

use dmxmux_frame::{FrameError, QueueError};

/// The kind of registry entity an id referred to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Device,
    Port,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Device => f.write_str("device"),
            EntityKind::Port => f.write_str("port"),
        }
    }
}

/// Errors that can occur in registry, session and routing operations.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Unknown or removed device/port id.
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: u16 },

    /// Malformed name, filter or request.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Non-blocking read with an empty mailbox.
    #[error("operation would block")]
    WouldBlock,

    /// Deadline elapsed on a blocking read.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The session was closed before or during the call.
    #[error("session closed")]
    Closed,

    /// The session's tx filter does not include the target port.
    #[error("port {0} not permitted by tx filter")]
    PermissionDenied(u16),

    /// The port's pending-transmit queue is full.
    #[error("port {port} busy ({capacity} frames pending)")]
    Busy { port: u16, capacity: usize },

    /// A bounded resource (id space, mailbox) is exhausted.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The frame violates wire-record limits.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The port's transmitter reported a failure.
    #[error("port {port} transmit failed: {source}")]
    Transmit {
        port: u16,
        source: std::io::Error,
    },

    /// The topology configuration could not be loaded.
    #[error("invalid topology config: {0}")]
    Config(String),
}

/// Flat classification of [`RouterError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    WouldBlock,
    TimedOut,
    Closed,
    PermissionDenied,
    Busy,
    ResourceExhausted,
    Io,
}

impl RouterError {
    pub(crate) fn device_not_found(id: u16) -> Self {
        Self::NotFound {
            kind: EntityKind::Device,
            id,
        }
    }

    pub(crate) fn port_not_found(id: u16) -> Self {
        Self::NotFound {
            kind: EntityKind::Port,
            id,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RouterError::NotFound { .. } => ErrorKind::NotFound,
            RouterError::InvalidArgument(_) | RouterError::Config(_) => ErrorKind::InvalidArgument,
            RouterError::WouldBlock => ErrorKind::WouldBlock,
            RouterError::TimedOut(_) => ErrorKind::TimedOut,
            RouterError::Closed => ErrorKind::Closed,
            RouterError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            RouterError::Busy { .. } => ErrorKind::Busy,
            RouterError::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            RouterError::Frame(FrameError::Io(_) | FrameError::ConnectionClosed) => ErrorKind::Io,
            RouterError::Frame(_) => ErrorKind::InvalidArgument,
            RouterError::Transmit { .. } => ErrorKind::Io,
        }
    }
}

impl From<QueueError> for RouterError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Empty => RouterError::WouldBlock,
            QueueError::TimedOut(timeout) => RouterError::TimedOut(timeout),
            QueueError::Closed => RouterError::Closed,
            QueueError::Full { capacity } => {
                RouterError::ResourceExhausted(format!("mailbox full ({capacity} frames)"))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_errors_map_onto_taxonomy() {
        assert_eq!(RouterError::from(QueueError::Empty).kind(), ErrorKind::WouldBlock);
        assert_eq!(RouterError::from(QueueError::Closed).kind(), ErrorKind::Closed);
        assert_eq!(
            RouterError::from(QueueError::TimedOut(Duration::from_millis(5))).kind(),
            ErrorKind::TimedOut
        );
        assert_eq!(
            RouterError::from(QueueError::Full { capacity: 4 }).kind(),
            ErrorKind::ResourceExhausted
        );
    }

    #[test]
    fn frame_limit_errors_are_invalid_arguments() {
        let err = RouterError::from(FrameError::PayloadTooLarge { size: 600, max: 512 });
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            RouterError::from(FrameError::ConnectionClosed).kind(),
            ErrorKind::Io
        );
    }

    #[test]
    fn not_found_display_names_entity() {
        assert_eq!(RouterError::port_not_found(7).to_string(), "port 7 not found");
        assert_eq!(
            RouterError::device_not_found(3).to_string(),
            "device 3 not found"
        );
    }
}
