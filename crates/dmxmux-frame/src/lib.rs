//! DMX512/RDM frame records for dmxmux.
//!
//! Every frame crossing the multiplexer is a fixed-size, packed record:
//! - A port id and a flags word (break omission, RDM CRC status, timestamps)
//! - Break size, start code and up to 512 payload slots
//! - Arrival and departure timestamps
//!
//! [`FrameQueue`] is the thread-safe FIFO that session mailboxes are built on.

pub mod codec;
pub mod error;
pub mod flags;
pub mod queue;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, Timestamp, MAX_BREAK_SIZE, MAX_PAYLOAD,
    WIRE_SIZE,
};
pub use error::{FrameError, QueueError, Result};
pub use flags::{start_code_name, CrcStatus, FrameFlags, START_CODE_DMX, START_CODE_RDM};
pub use queue::{FrameQueue, OverflowPolicy, Pushed, QueueConfig, Wait, DEFAULT_QUEUE_CAPACITY};
pub use reader::FrameReader;
pub use writer::FrameWriter;
