use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_frame, Frame, FrameConfig, WIRE_SIZE};
use crate::error::{FrameError, Result};

/// Pushes frame records into any `Write` stream.
///
/// A record is either written whole or the call fails; short writes are
/// continued and `Interrupted`/`WouldBlock` are retried so a record never
/// ends up half on the wire. Every call flushes.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    records: u64,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(WIRE_SIZE),
            records: 0,
            config,
        }
    }

    /// Encode and write one record.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_batch(std::iter::once(frame)).map(|_| ())
    }

    /// Encode every frame first, then write them back to back.
    ///
    /// If any frame is invalid nothing is written. Returns the number of
    /// records written.
    pub fn write_batch<'a, I>(&mut self, frames: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a Frame>,
    {
        self.buf.clear();
        let mut count = 0usize;
        for frame in frames {
            self.check_limit(frame)?;
            encode_frame(frame, &mut self.buf)?;
            count += 1;
        }
        if count == 0 {
            return Ok(0);
        }

        self.write_buffered()?;
        self.records += count as u64;
        self.flush()?;
        Ok(count)
    }

    /// Write a null-start-code frame carrying `slots`.
    pub fn send_dmx(&mut self, port: u16, slots: &[u8]) -> Result<()> {
        self.write_frame(&Frame::dmx(port, slots.to_vec()))
    }

    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if retryable(&err) => std::thread::yield_now(),
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Records written so far.
    pub fn records_written(&self) -> u64 {
        self.records
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn check_limit(&self, frame: &Frame) -> Result<()> {
        if frame.payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload.len(),
                max: self.config.max_payload_size,
            });
        }
        Ok(())
    }

    fn write_buffered(&mut self) -> Result<()> {
        let mut written = 0usize;
        while written < self.buf.len() {
            match self.inner.write(&self.buf[written..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => written += n,
                Err(err) if retryable(&err) => std::thread::yield_now(),
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(())
    }
}

fn retryable(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;

    use super::*;
    use crate::codec::{decode_frame, MAX_PAYLOAD};
    use crate::flags::FrameFlags;

    /// Sink whose write results follow a script; unscripted writes accept
    /// everything.
    #[derive(Default)]
    struct Sink {
        script: VecDeque<io::Result<usize>>,
        flush_failures: VecDeque<ErrorKind>,
        flushes: usize,
        data: Vec<u8>,
    }

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = match self.script.pop_front() {
                None => buf.len(),
                Some(Ok(limit)) => limit.min(buf.len()),
                Some(Err(err)) => return Err(err),
            };
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            if let Some(kind) = self.flush_failures.pop_front() {
                return Err(io::Error::from(kind));
            }
            self.flushes += 1;
            Ok(())
        }
    }

    fn decode_all(data: &[u8]) -> Vec<Frame> {
        let mut wire = BytesMut::from(data);
        let mut out = Vec::new();
        while let Some(frame) = decode_frame(&mut wire, MAX_PAYLOAD).unwrap() {
            out.push(frame);
        }
        assert!(wire.is_empty());
        out
    }

    #[test]
    fn writes_one_record_and_flushes() {
        let mut writer = FrameWriter::new(Sink::default());
        writer.send_dmx(1, &[10, 20, 30]).unwrap();

        assert_eq!(writer.records_written(), 1);
        let sink = writer.into_inner();
        assert_eq!(sink.data.len(), WIRE_SIZE);
        assert_eq!(sink.flushes, 1);
        assert_eq!(decode_all(&sink.data)[0].payload.as_ref(), &[10, 20, 30]);
    }

    #[test]
    fn batch_writes_back_to_back() {
        let frames = [
            Frame::dmx(1, b"one".to_vec()),
            Frame::rdm(2, b"two".to_vec()).with_break_size(44),
            Frame::dmx(3, vec![]).with_flags(FrameFlags::NO_BREAK),
        ];
        let mut writer = FrameWriter::new(Sink::default());
        assert_eq!(writer.write_batch(&frames).unwrap(), 3);

        let sink = writer.into_inner();
        assert_eq!(sink.flushes, 1);
        let decoded = decode_all(&sink.data);
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[1].break_size, 44);
        assert!(decoded[1].is_rdm());
        assert!(decoded[2].flags.contains(FrameFlags::NO_BREAK));
    }

    #[test]
    fn invalid_frame_in_batch_writes_nothing() {
        let frames = [
            Frame::dmx(1, vec![1]),
            Frame::dmx(2, vec![]).with_break_size(255),
        ];
        let mut writer = FrameWriter::new(Sink::default());
        let err = writer.write_batch(&frames).unwrap_err();

        assert!(matches!(err, FrameError::InvalidBreakSize(255)));
        assert_eq!(writer.records_written(), 0);
        assert!(writer.get_ref().data.is_empty());
    }

    #[test]
    fn configured_payload_limit() {
        let mut writer = FrameWriter::with_config(
            Sink::default(),
            FrameConfig {
                max_payload_size: 4,
            },
        );
        let err = writer.send_dmx(1, b"oversized").unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { max: 4, .. }));
        assert!(writer.get_ref().data.is_empty());
    }

    #[test]
    fn short_and_interrupted_writes_complete_the_record() {
        let sink = Sink {
            script: VecDeque::from([
                Err(io::Error::from(ErrorKind::Interrupted)),
                Ok(100),
                Err(io::Error::from(ErrorKind::WouldBlock)),
                Ok(7),
            ]),
            flush_failures: VecDeque::from([ErrorKind::Interrupted]),
            ..Sink::default()
        };
        let mut writer = FrameWriter::new(sink);
        writer.send_dmx(6, &[1, 2, 3]).unwrap();

        let sink = writer.into_inner();
        assert_eq!(sink.data.len(), WIRE_SIZE);
        assert_eq!(sink.flushes, 1);
        assert_eq!(decode_all(&sink.data)[0].port, 6);
    }

    #[test]
    fn hard_errors_surface() {
        let mut closed = FrameWriter::new(Sink {
            script: VecDeque::from([Ok(0)]),
            ..Sink::default()
        });
        assert!(matches!(
            closed.send_dmx(1, b"x"),
            Err(FrameError::ConnectionClosed)
        ));

        let mut broken = FrameWriter::new(Sink {
            script: VecDeque::from([Err(io::Error::from(ErrorKind::BrokenPipe))]),
            ..Sink::default()
        });
        assert!(matches!(
            broken.send_dmx(1, b"x"),
            Err(FrameError::Io(e)) if e.kind() == ErrorKind::BrokenPipe
        ));
    }
}
