//! Thread-safe FIFO of frames.
//!
//! Producers never wait: a bounded queue either displaces its oldest entry
//! or rejects the new one, and every loss is counted. Consumers may block in
//! [`FrameQueue::pop_wait`] until a frame is pushed, a deadline passes, or the
//! queue is closed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::Frame;
use crate::error::QueueError;

/// Default queue capacity in frames.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// What a bounded queue does when a push finds it full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the oldest queued frame to make room.
    #[default]
    DropOldest,
    /// Keep the queue as-is and fail the push.
    RejectNewest,
}

/// Queue sizing and overflow behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum queued frames; `None` is unbounded.
    pub capacity: Option<usize>,
    pub overflow: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: Some(DEFAULT_QUEUE_CAPACITY),
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

/// How long a consumer is willing to wait for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Fail with `Empty` if nothing is queued.
    NonBlocking,
    /// Wait at most this long. A zero duration behaves as `NonBlocking`.
    Timeout(Duration),
    /// Wait until a frame arrives or the queue closes.
    Forever,
}

impl From<Option<Duration>> for Wait {
    fn from(timeout: Option<Duration>) -> Self {
        match timeout {
            None => Wait::NonBlocking,
            Some(timeout) => Wait::Timeout(timeout),
        }
    }
}

/// Outcome of a successful push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pushed {
    Queued,
    /// The frame was queued after discarding the oldest entry.
    DisplacedOldest,
}

struct QueueState {
    frames: VecDeque<Frame>,
    closed: bool,
}

/// Multi-producer FIFO of frames with an optional bound.
pub struct FrameQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    dropped: AtomicU64,
    config: QueueConfig,
}

impl FrameQueue {
    /// Create a queue with default configuration.
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    /// Create a queue with explicit configuration.
    pub fn with_config(config: QueueConfig) -> Self {
        let config = QueueConfig {
            capacity: config.capacity.map(|cap| cap.max(1)),
            ..config
        };
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
            dropped: AtomicU64::new(0),
            config,
        }
    }

    /// Append a frame and wake one waiting consumer.
    pub fn push_back(&self, frame: Frame) -> Result<Pushed, QueueError> {
        let mut state = self.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }

        let mut outcome = Pushed::Queued;
        if let Some(capacity) = self.config.capacity {
            if state.frames.len() >= capacity {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(capacity, policy = ?self.config.overflow, "frame queue overflow");
                match self.config.overflow {
                    OverflowPolicy::DropOldest => {
                        state.frames.pop_front();
                        outcome = Pushed::DisplacedOldest;
                    }
                    OverflowPolicy::RejectNewest => {
                        return Err(QueueError::Full { capacity });
                    }
                }
            }
        }

        state.frames.push_back(frame);
        drop(state);
        self.ready.notify_one();
        Ok(outcome)
    }

    /// Remove the oldest frame, if any.
    pub fn pop_front(&self) -> Option<Frame> {
        self.lock().frames.pop_front()
    }

    /// Clone of the oldest frame without removing it.
    pub fn peek_front(&self) -> Option<Frame> {
        self.lock().frames.front().cloned()
    }

    /// Remove the oldest frame, waiting according to `wait`.
    pub fn pop_wait(&self, wait: Wait) -> Result<Frame, QueueError> {
        let deadline = match wait {
            Wait::Timeout(timeout) if !timeout.is_zero() => {
                // A deadline past the representable range is as good as forever.
                Instant::now().checked_add(timeout).map(|at| (at, timeout))
            }
            _ => None,
        };
        let blocking = match wait {
            Wait::NonBlocking => false,
            Wait::Timeout(timeout) => !timeout.is_zero(),
            Wait::Forever => true,
        };

        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(QueueError::Closed);
            }
            if let Some(frame) = state.frames.pop_front() {
                return Ok(frame);
            }
            if !blocking {
                return Err(QueueError::Empty);
            }

            state = match deadline {
                Some((at, timeout)) => {
                    let now = Instant::now();
                    if now >= at {
                        return Err(QueueError::TimedOut(timeout));
                    }
                    self.ready
                        .wait_timeout(state, at - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .ready
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    /// Discard every queued frame, returning how many were removed.
    pub fn drain_and_discard(&self) -> usize {
        let mut state = self.lock();
        let count = state.frames.len();
        state.frames.clear();
        count
    }

    /// Close the queue: discard its contents, refuse further pushes and wake
    /// every waiter with [`QueueError::Closed`].
    pub fn close(&self) -> usize {
        let mut state = self.lock();
        state.closed = true;
        let count = state.frames.len();
        state.frames.clear();
        drop(state);
        self.ready.notify_all();
        count
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Frames lost to overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameQueue")
            .field("len", &self.len())
            .field("dropped", &self.dropped())
            .field("config", &self.config)
            .finish()
    }
}
