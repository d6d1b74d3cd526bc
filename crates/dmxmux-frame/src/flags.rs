//! Frame flag bits and well-known start codes.
//!
//! The flags word is a 16-bit little-endian field on the wire. Bits 5 and
//! 8-15 are unassigned and preserved as-is.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Standard DMX512 dimmer data.
pub const START_CODE_DMX: u8 = 0x00;

/// ASCII text packet.
pub const START_CODE_TEXT: u8 = 0x17;

/// Remote Device Management.
pub const START_CODE_RDM: u8 = 0xCC;

/// System Information Packet.
pub const START_CODE_SIP: u8 = 0xCF;

/// Returns a human-readable name for a start code.
pub fn start_code_name(code: u8) -> &'static str {
    match code {
        START_CODE_DMX => "DMX",
        START_CODE_TEXT => "TEXT",
        START_CODE_RDM => "RDM",
        START_CODE_SIP => "SIP",
        _ => "ALTERNATE",
    }
}

/// RDM checksum status reported by the receiving driver (flag bits 1-2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrcStatus {
    Unknown,
    Valid,
    Invalid,
    Reserved,
}

/// Bitmask stored in a frame's `flags` field.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameFlags(u16);

impl FrameFlags {
    /// Transmit without a preceding break.
    pub const NO_BREAK: Self = Self(1 << 0);
    /// Arrival timestamp is valid.
    pub const ARRIVAL_TIMESTAMP: Self = Self(1 << 3);
    /// Departure timestamp is valid.
    pub const DEPARTURE_TIMESTAMP: Self = Self(1 << 4);
    /// Payload is an RDM message.
    pub const RDM: Self = Self(1 << 6);
    /// Payload is an RDM discovery response.
    pub const RDM_DISCOVERY: Self = Self(1 << 7);

    const CRC_SHIFT: u16 = 1;
    const CRC_MASK: u16 = 0b11 << Self::CRC_SHIFT;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn set(&mut self, other: Self, value: bool) {
        if value {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }

    pub fn crc_status(self) -> CrcStatus {
        match (self.0 & Self::CRC_MASK) >> Self::CRC_SHIFT {
            0 => CrcStatus::Unknown,
            1 => CrcStatus::Valid,
            2 => CrcStatus::Invalid,
            _ => CrcStatus::Reserved,
        }
    }

    pub fn with_crc_status(self, status: CrcStatus) -> Self {
        let code = match status {
            CrcStatus::Unknown => 0,
            CrcStatus::Valid => 1,
            CrcStatus::Invalid => 2,
            CrcStatus::Reserved => 3,
        };
        Self((self.0 & !Self::CRC_MASK) | (code << Self::CRC_SHIFT))
    }
}

impl std::ops::BitOr for FrameFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for FrameFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameFlags")
            .field("bits", &format_args!("{:#06x}", self.0))
            .field("crc", &self.crc_status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_status_occupies_bits_one_and_two() {
        let flags = FrameFlags::NO_BREAK.with_crc_status(CrcStatus::Invalid);
        assert_eq!(flags.bits(), 0b101);
        assert_eq!(flags.crc_status(), CrcStatus::Invalid);

        let flags = flags.with_crc_status(CrcStatus::Valid);
        assert_eq!(flags.bits(), 0b011);
        assert!(flags.contains(FrameFlags::NO_BREAK));
    }

    #[test]
    fn set_and_remove_individual_bits() {
        let mut flags = FrameFlags::empty();
        flags.set(FrameFlags::RDM, true);
        flags.insert(FrameFlags::RDM_DISCOVERY);
        assert!(flags.contains(FrameFlags::RDM | FrameFlags::RDM_DISCOVERY));

        flags.set(FrameFlags::RDM, false);
        assert!(!flags.contains(FrameFlags::RDM));
        assert_eq!(flags.bits(), 1 << 7);
    }

    #[test]
    fn start_code_names() {
        assert_eq!(start_code_name(0x00), "DMX");
        assert_eq!(start_code_name(0xCC), "RDM");
        assert_eq!(start_code_name(0x91), "ALTERNATE");
    }
}
