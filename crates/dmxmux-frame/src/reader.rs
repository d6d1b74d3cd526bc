use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_frame, Frame, FrameConfig, WIRE_SIZE};
use crate::error::{FrameError, Result};

/// Pulls fixed-size frame records out of any `Read` stream.
///
/// Records are read one at a time into a record-sized buffer. A short read
/// leaves the partial record in place, so a `WouldBlock` from a non-blocking
/// source can be retried without losing alignment. A record that fails to
/// decode is still consumed: the next call starts at the following record.
pub struct FrameReader<T> {
    inner: T,
    record: Box<[u8; WIRE_SIZE]>,
    filled: usize,
    records: u64,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            record: Box::new([0; WIRE_SIZE]),
            filled: 0,
            records: 0,
            config,
        }
    }

    /// Block until one whole record has been read and decode it.
    ///
    /// End of stream, at a record boundary or not, is
    /// [`FrameError::ConnectionClosed`].
    pub fn read_frame(&mut self) -> Result<Frame> {
        while self.filled < WIRE_SIZE {
            match self.inner.read(&mut self.record[self.filled..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => self.filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.filled = 0;
        self.records += 1;
        let mut src = BytesMut::from(&self.record[..]);
        decode_frame(&mut src, self.config.max_payload_size)?
            .ok_or(FrameError::ConnectionClosed)
    }

    /// Like [`FrameReader::read_frame`], but a clean end of stream between
    /// records is `Ok(None)`. A truncated trailing record is still an error.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.read_frame() {
            Ok(frame) => Ok(Some(frame)),
            Err(FrameError::ConnectionClosed) if self.filled == 0 => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Records consumed so far, including ones that failed to decode.
    pub fn records_read(&self) -> u64 {
        self.records
    }

    /// Bytes of a partially read record waiting for the rest.
    pub fn partial_len(&self) -> usize {
        self.filled
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
}

/// Yields frames until a clean end of stream.
impl<T: Read> Iterator for FrameReader<T> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}
