use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};
use crate::flags::{FrameFlags, START_CODE_DMX, START_CODE_RDM};

/// Maximum number of payload slots following the start code.
pub const MAX_PAYLOAD: usize = 512;

/// Largest encodable break size (4 µs units).
pub const MAX_BREAK_SIZE: u8 = 254;

/// Start code plus payload slots.
const SLOT_ARRAY: usize = MAX_PAYLOAD + 1;

/// Seconds (8) + nanoseconds (4).
const TIMESTAMP_SIZE: usize = 12;

/// Header: port (2) + flags (2) + break (1) + reserved (3) + payload size (2).
const HEADER_SIZE: usize = 10;

/// Size of one packed frame record.
pub const WIRE_SIZE: usize = HEADER_SIZE + SLOT_ARRAY + 2 * TIMESTAMP_SIZE;

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Wall-clock instant carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp {
    pub secs: u64,
    pub nanos: u32,
}

impl Timestamp {
    pub fn new(secs: u64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    /// Current system time.
    pub fn now() -> Self {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| Self::new(d.as_secs(), d.subsec_nanos()))
            .unwrap_or_default()
    }

    pub fn is_zero(&self) -> bool {
        self.secs == 0 && self.nanos == 0
    }

    fn validate(&self) -> Result<()> {
        if self.nanos >= NANOS_PER_SEC {
            return Err(FrameError::InvalidTimestamp(self.nanos));
        }
        Ok(())
    }
}

/// One DMX512/RDM frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Source port (inbound) or destination port (outbound).
    pub port: u16,
    pub flags: FrameFlags,
    /// Break duration in 4 µs units, 0 selects the driver default.
    pub break_size: u8,
    pub start_code: u8,
    /// Slots following the start code.
    pub payload: Bytes,
    pub arrival: Option<Timestamp>,
    /// Requested transmit time; `None` means as soon as possible.
    pub departure: Option<Timestamp>,
}

impl Frame {
    /// Create a frame with the given start code and payload.
    pub fn new(port: u16, start_code: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            port,
            flags: FrameFlags::empty(),
            break_size: 0,
            start_code,
            payload: payload.into(),
            arrival: None,
            departure: None,
        }
    }

    /// Create a standard dimmer-data frame (start code 0).
    pub fn dmx(port: u16, payload: impl Into<Bytes>) -> Self {
        Self::new(port, START_CODE_DMX, payload)
    }

    /// Create an RDM frame; sets the RDM flag.
    pub fn rdm(port: u16, payload: impl Into<Bytes>) -> Self {
        let mut frame = Self::new(port, START_CODE_RDM, payload);
        frame.flags.insert(FrameFlags::RDM);
        frame
    }

    pub fn with_flags(mut self, flags: FrameFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_break_size(mut self, break_size: u8) -> Self {
        self.break_size = break_size;
        self
    }

    pub fn with_departure(mut self, departure: Timestamp) -> Self {
        self.departure = Some(departure);
        self.flags.insert(FrameFlags::DEPARTURE_TIMESTAMP);
        self
    }

    /// Record the arrival time and mark it present.
    pub fn stamp_arrival(&mut self, at: Timestamp) {
        self.arrival = Some(at);
        self.flags.insert(FrameFlags::ARRIVAL_TIMESTAMP);
    }

    /// Start code plus payload slot count.
    pub fn slot_count(&self) -> usize {
        self.payload.len() + 1
    }

    pub fn is_rdm(&self) -> bool {
        self.flags.contains(FrameFlags::RDM) || self.start_code == START_CODE_RDM
    }

    /// Check the limits the wire record imposes.
    pub fn validate(&self) -> Result<()> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        if self.break_size > MAX_BREAK_SIZE {
            return Err(FrameError::InvalidBreakSize(self.break_size));
        }
        for ts in [self.arrival, self.departure].into_iter().flatten() {
            ts.validate()?;
        }
        Ok(())
    }
}

/// Encode a frame into its packed record.
///
/// Wire format (little-endian, no padding):
/// ```text
/// ┌──────┬───────┬───────┬──────────┬──────────┬────────────────┬────────────────┐
/// │ Port │ Flags │ Break │ Reserved │ Size     │ Start + slots  │ Arrival,       │
/// │ (2B) │ (2B)  │ (1B)  │ (3B, 0)  │ (2B)     │ (513B)         │ departure (24B)│
/// └──────┴───────┴───────┴──────────┴──────────┴────────────────┴────────────────┘
/// ```
/// Timestamp presence bits follow the `arrival`/`departure` fields; an absent
/// timestamp is written as all zeros.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    frame.validate()?;

    let mut flags = frame.flags;
    flags.set(FrameFlags::ARRIVAL_TIMESTAMP, frame.arrival.is_some());
    flags.set(FrameFlags::DEPARTURE_TIMESTAMP, frame.departure.is_some());

    dst.reserve(WIRE_SIZE);
    dst.put_u16_le(frame.port);
    dst.put_u16_le(flags.bits());
    dst.put_u8(frame.break_size);
    dst.put_bytes(0, 3);
    dst.put_u16_le(frame.payload.len() as u16);
    dst.put_u8(frame.start_code);
    dst.put_slice(&frame.payload);
    dst.put_bytes(0, MAX_PAYLOAD - frame.payload.len());
    for ts in [frame.arrival, frame.departure] {
        let ts = ts.unwrap_or_default();
        dst.put_u64_le(ts.secs);
        dst.put_u32_le(ts.nanos);
    }
    Ok(())
}

/// Decode one frame record from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't hold a complete record yet.
/// On success, consumes the record from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < WIRE_SIZE {
        return Ok(None);
    }

    let mut header = &src[..HEADER_SIZE];
    let port = header.get_u16_le();
    let flags = FrameFlags::from_bits(header.get_u16_le());
    let break_size = header.get_u8();
    let reserved = [header.get_u8(), header.get_u8(), header.get_u8()];
    let payload_size = header.get_u16_le() as usize;

    if reserved != [0; 3] {
        return Err(FrameError::InvalidReserved);
    }
    let max = max_payload.min(MAX_PAYLOAD);
    if payload_size > max {
        return Err(FrameError::PayloadTooLarge {
            size: payload_size,
            max,
        });
    }
    if break_size > MAX_BREAK_SIZE {
        return Err(FrameError::InvalidBreakSize(break_size));
    }

    let mut stamps = &src[HEADER_SIZE + SLOT_ARRAY..WIRE_SIZE];
    let mut timestamps = [None, None];
    for slot in &mut timestamps {
        let ts = Timestamp::new(stamps.get_u64_le(), stamps.get_u32_le());
        ts.validate()?;
        if !ts.is_zero() {
            *slot = Some(ts);
        }
    }

    let mut record = src.split_to(WIRE_SIZE).freeze();
    record.advance(HEADER_SIZE);
    let start_code = record[0];
    let payload = record.slice(1..1 + payload_size);
    let [arrival, departure] = timestamps;

    Ok(Some(Frame {
        port,
        flags,
        break_size,
        start_code,
        payload,
        arrival,
        departure,
    }))
}

/// Configuration for the frame stream reader and writer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload slots accepted. Default and upper bound: 512.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::CrcStatus;

    #[test]
    fn test_wire_size_is_packed() {
        assert_eq!(WIRE_SIZE, 547);

        let mut buf = BytesMut::new();
        encode_frame(&Frame::dmx(1, vec![0u8; 3]), &mut buf).unwrap();
        assert_eq!(buf.len(), WIRE_SIZE);
    }

    #[test]
    fn test_encode_layout() {
        let frame = Frame::dmx(0x0102, vec![0xAA, 0xBB])
            .with_break_size(22)
            .with_flags(FrameFlags::NO_BREAK);
        let mut buf = BytesMut::new();
        encode_frame(&frame, &mut buf).unwrap();

        assert_eq!(&buf[0..2], &[0x02, 0x01]);
        assert_eq!(&buf[2..4], &[0x01, 0x00]);
        assert_eq!(buf[4], 22);
        assert_eq!(&buf[5..8], &[0, 0, 0]);
        assert_eq!(&buf[8..10], &[2, 0]);
        assert_eq!(&buf[10..13], &[0x00, 0xAA, 0xBB]);
        assert!(buf[13..WIRE_SIZE].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut frame = Frame::rdm(7, vec![0x01, 0x02, 0x03])
            .with_flags(FrameFlags::RDM.with_crc_status(CrcStatus::Valid))
            .with_departure(Timestamp::new(10, 500));
        frame.stamp_arrival(Timestamp::new(9, 999_999_999));

        let mut buf = BytesMut::new();
        encode_frame(&frame, &mut buf).unwrap();
        let decoded = decode_frame(&mut buf, MAX_PAYLOAD).unwrap().unwrap();

        assert_eq!(decoded, frame);
        assert_eq!(decoded.flags.crc_status(), CrcStatus::Valid);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_zero_timestamp_decodes_as_absent() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::dmx(3, vec![1]), &mut buf).unwrap();
        let frame = decode_frame(&mut buf, MAX_PAYLOAD).unwrap().unwrap();
        assert!(frame.arrival.is_none());
        assert!(frame.departure.is_none());
        assert!(!frame.flags.contains(FrameFlags::ARRIVAL_TIMESTAMP));
    }

    #[test]
    fn test_decode_incomplete_record() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::dmx(1, vec![1, 2]), &mut buf).unwrap();
        buf.truncate(WIRE_SIZE - 1);
        assert!(decode_frame(&mut buf, MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), WIRE_SIZE - 1);
    }

    #[test]
    fn test_decode_rejects_nonzero_reserved() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::dmx(1, vec![]), &mut buf).unwrap();
        buf[6] = 1;
        let result = decode_frame(&mut buf, MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::InvalidReserved)));
    }

    #[test]
    fn test_decode_rejects_oversized_payload_field() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::dmx(1, vec![]), &mut buf).unwrap();
        buf[8..10].copy_from_slice(&513u16.to_le_bytes());
        let result = decode_frame(&mut buf, MAX_PAYLOAD);
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size: 513, .. })
        ));
    }

    #[test]
    fn test_decode_honours_configured_maximum() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::dmx(1, vec![0; 24]), &mut buf).unwrap();
        let result = decode_frame(&mut buf, 16);
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size: 24, max: 16 })
        ));
    }

    #[test]
    fn test_validate_limits() {
        let frame = Frame::dmx(1, vec![0u8; MAX_PAYLOAD + 1]);
        assert!(matches!(
            frame.validate(),
            Err(FrameError::PayloadTooLarge { .. })
        ));

        let frame = Frame::dmx(1, vec![0u8; MAX_PAYLOAD]).with_break_size(255);
        assert!(matches!(
            frame.validate(),
            Err(FrameError::InvalidBreakSize(255))
        ));

        let frame = Frame::dmx(1, vec![]).with_departure(Timestamp::new(1, NANOS_PER_SEC));
        assert!(matches!(
            frame.validate(),
            Err(FrameError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_full_universe() {
        let payload: Vec<u8> = (0..MAX_PAYLOAD).map(|i| i as u8).collect();
        let mut buf = BytesMut::new();
        encode_frame(&Frame::dmx(2, payload.clone()), &mut buf).unwrap();
        let frame = decode_frame(&mut buf, MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), payload.as_slice());
        assert_eq!(frame.slot_count(), 513);
    }
}
