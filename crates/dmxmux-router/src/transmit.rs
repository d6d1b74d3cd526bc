//! The per-port transmit contract supplied by board drivers.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use dmxmux_frame::{Frame, FrameError, FrameWriter};

use crate::registry::PortId;

/// Outbound half of a board driver, injected when a port is created.
///
/// Both methods are called with the router's per-port transmit lock held, so
/// implementations must not call back into the router.
pub trait PortTransmitter: Send + Sync {
    /// Hand one frame to the line. Must not block waiting for space.
    fn send_frame(&self, port: PortId, frame: &Frame) -> io::Result<()>;

    /// Whether `send_frame` can accept a frame right now.
    fn transmitter_has_space(&self, port: PortId) -> bool;
}

/// Transmitter for input-only ports: accepts and discards every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransmitter;

impl PortTransmitter for NullTransmitter {
    fn send_frame(&self, _port: PortId, _frame: &Frame) -> io::Result<()> {
        Ok(())
    }

    fn transmitter_has_space(&self, _port: PortId) -> bool {
        true
    }
}

/// Virtual port that writes outbound frames as packed records to a stream.
pub struct StreamTransmitter<W> {
    writer: Mutex<FrameWriter<W>>,
}

impl<W: Write + Send> StreamTransmitter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: Mutex::new(FrameWriter::new(inner)),
        }
    }

    /// Consume the transmitter and return the inner stream.
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_inner()
    }
}

impl<W: Write + Send> PortTransmitter for StreamTransmitter<W> {
    fn send_frame(&self, port: PortId, frame: &Frame) -> io::Result<()> {
        let mut outbound = frame.clone();
        outbound.port = port;
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_frame(&outbound)
            .map_err(frame_to_io_error)
    }

    fn transmitter_has_space(&self, _port: PortId) -> bool {
        true
    }
}

fn frame_to_io_error(err: FrameError) -> io::Error {
    match err {
        FrameError::Io(io) => io,
        FrameError::ConnectionClosed => io::Error::from(io::ErrorKind::WriteZero),
        other => io::Error::new(io::ErrorKind::InvalidInput, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;
    use dmxmux_frame::{decode_frame, MAX_PAYLOAD};

    use super::*;

    #[test]
    fn stream_transmitter_writes_records_addressed_to_port() {
        let tx = StreamTransmitter::new(Cursor::new(Vec::<u8>::new()));
        assert!(tx.transmitter_has_space(3));
        tx.send_frame(3, &Frame::dmx(0, vec![1, 2, 3])).unwrap();

        let mut wire = BytesMut::from(tx.into_inner().into_inner().as_slice());
        let frame = decode_frame(&mut wire, MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(frame.port, 3);
        assert_eq!(frame.payload.as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn stream_transmitter_reports_closed_sink() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let tx = StreamTransmitter::new(Closed);
        let err = tx.send_frame(1, &Frame::dmx(1, vec![])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }
}
