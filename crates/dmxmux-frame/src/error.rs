use std::time::Duration;

/// Errors that can occur during frame validation, encoding or decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the 512-slot limit (or the configured maximum).
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Break size 255 is not representable.
    #[error("invalid break size {0} (max 254)")]
    InvalidBreakSize(u8),

    /// The reserved header bytes were not zero.
    #[error("reserved header bytes must be zero")]
    InvalidReserved,

    /// A timestamp carried an out-of-range nanosecond field.
    #[error("invalid timestamp nanoseconds {0}")]
    InvalidTimestamp(u32),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;

/// Errors returned by [`FrameQueue`](crate::FrameQueue) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// Nothing queued and the caller asked not to wait.
    #[error("queue empty")]
    Empty,

    /// The wait deadline elapsed with nothing queued.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The queue has been closed.
    #[error("queue closed")]
    Closed,

    /// The queue is at capacity and rejects new entries.
    #[error("queue full (capacity {capacity})")]
    Full { capacity: usize },
}
