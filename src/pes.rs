//! Just enough of the Packetised Elementary Stream syntax to recover the _Presentation Time
//! Stamp_ from the PES header at the start of a transport stream packet payload.
//!
//! SCTE-35 cues do not carry a wall-clock time of their own, so the most recent PTS seen on any
//! elementary stream of the same program is attached to each cue instead.

use log::{trace, warn};

/// Detail about the formatting problem which prevented a [`Timestamp`](struct.Timestamp.html)
/// value being parsed.
#[derive(PartialEq, Eq, Debug, thiserror::Error)]
pub enum TimestampError {
    /// Parsing the timestamp failed because the 'prefix-bit' values within the timestamp did not
    /// have the expected values
    #[error("incorrect timestamp prefix bits {actual:#06b} (expected {expected:#06b})")]
    IncorrectPrefixBits {
        /// expected prefix-bits for this timestamp
        expected: u8,
        /// the actual, incorrect bits that were present
        actual: u8,
    },
    /// Parsing the timestamp failed because a 'marker-bit' value within the timestamp did not
    /// have the expected value
    #[error("timestamp marker bit {bit_number} not set")]
    MarkerBitNotSet {
        /// the bit-index of the bit which should have been 1, but was found to be 0
        bit_number: u8,
    },
}

/// A 33-bit Elementary Stream timestamp, used to represent PTS values which may appear in an
/// Elementary Stream header.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct Timestamp {
    val: u64,
}
impl Timestamp {
    /// The largest representable timestamp value before the timestamp wraps back around to zero.
    pub const MAX: Timestamp = Timestamp { val: (1 << 33) - 1 };

    /// 90kHz timebase in which PTS and DTS values are measured.
    pub const TIMEBASE: u64 = 90_000;

    /// Parse a Presentation Time Stamp value from the 5 bytes at the start of the given slice.
    /// The 4-bit prefix may be either `0b0010` (PTS only) or `0b0011` (PTS followed by DTS).
    ///
    /// Panics if fewer than 5 bytes given
    pub fn from_pts_bytes(buf: &[u8]) -> Result<Timestamp, TimestampError> {
        let actual = buf[0] >> 4;
        if actual & 0b1110 != 0b0010 {
            return Err(TimestampError::IncorrectPrefixBits {
                expected: 0b0010,
                actual,
            });
        }
        Timestamp::from_bytes(buf)
    }
    fn check_marker_bit(buf: &[u8], bit_number: u8) -> Result<(), TimestampError> {
        let byte_index = bit_number / 8;
        let bit_index = bit_number % 8;
        let bit_mask = 1 << (7 - bit_index);
        if buf[byte_index as usize] & bit_mask != 0 {
            Ok(())
        } else {
            Err(TimestampError::MarkerBitNotSet { bit_number })
        }
    }
    /// Parse a Time Stamp value from the 5 bytes at the start of the given slice, without checking
    /// the 4-bit prefix for any particular value.
    ///
    /// Panics if fewer than 5 bytes given
    pub fn from_bytes(buf: &[u8]) -> Result<Timestamp, TimestampError> {
        Timestamp::check_marker_bit(buf, 7)?;
        Timestamp::check_marker_bit(buf, 23)?;
        Timestamp::check_marker_bit(buf, 39)?;
        Ok(Timestamp {
            val: (u64::from(buf[0] & 0b0000_1110) << 29)
                | u64::from(buf[1]) << 22
                | (u64::from(buf[2] & 0b1111_1110) << 14)
                | u64::from(buf[3]) << 7
                | u64::from(buf[4]) >> 1,
        })
    }
    /// Panics if the given val is greater than 2^33-1
    pub fn from_u64(val: u64) -> Timestamp {
        assert!(val <= Self::MAX.val);
        Timestamp { val }
    }
    /// produces the timestamp's value in 90kHz ticks
    pub fn value(self) -> u64 {
        self.val
    }
    /// The timestamp converted to (fractional) seconds.
    pub fn as_seconds(self) -> f64 {
        self.val as f64 / Self::TIMEBASE as f64
    }
}

/// Header at the start of a PES packet, as found at the beginning of the payload of a transport
/// stream packet with _payload_unit_start_indicator_ set.
pub struct PesHeader<'buf> {
    buf: &'buf [u8],
}
impl<'buf> PesHeader<'buf> {
    const FIXED_HEADER_SIZE: usize = 6;
    // fixed header, two flag bytes, PES_header_data_length
    const PTS_OFFSET: usize = Self::FIXED_HEADER_SIZE + 3;
    const TIMESTAMP_SIZE: usize = 5;

    /// Wraps the given slice in a PesHeader.
    ///
    /// Returns `None` if the buffer is too small to hold the PES header, or if the PES
    /// 'start code prefix' is missing.
    pub fn from_bytes(buf: &'buf [u8]) -> Option<PesHeader<'buf>> {
        if buf.len() < Self::FIXED_HEADER_SIZE {
            trace!("Buffer size {} too small to hold PES header", buf.len());
            return None;
        }
        let packet_start_code_prefix =
            u32::from(buf[0]) << 16 | u32::from(buf[1]) << 8 | u32::from(buf[2]);
        if packet_start_code_prefix != 1 {
            trace!(
                "invalid packet_start_code_prefix 0x{:06x}, expected 0x000001",
                packet_start_code_prefix
            );
            return None;
        }
        Some(PesHeader { buf })
    }

    /// Indicator of the type of stream per _ISO/IEC 13818-1_, _Table 2-18_.
    pub fn stream_id(&self) -> u8 {
        self.buf[3]
    }

    /// Streams such as padding or private_stream_2 carry their payload directly after the
    /// `PES_packet_length` field, without the optional PES header holding timestamps.
    fn has_optional_header(&self) -> bool {
        !matches!(
            self.stream_id(),
            0xbc | 0xbe | 0xbf | 0xf0 | 0xf1 | 0xf2 | 0xf8 | 0xff
        )
    }

    /// Returns the _Presentation Time Stamp_ from the optional PES header, if this header has
    /// one, the PTS flag is set and the timestamp syntax is valid.
    pub fn pts(&self) -> Option<Timestamp> {
        if !self.has_optional_header() {
            return None;
        }
        if self.buf.len() < Self::PTS_OFFSET + Self::TIMESTAMP_SIZE {
            return None;
        }
        // '10' marker bits at the top of the first flags byte
        if self.buf[6] & 0b1100_0000 != 0b1000_0000 {
            trace!("PES header marker bits missing: {:#04x}", self.buf[6]);
            return None;
        }
        let pts_dts_flags = self.buf[7] >> 6;
        if pts_dts_flags & 0b10 == 0 {
            return None;
        }
        let ts = &self.buf[Self::PTS_OFFSET..Self::PTS_OFFSET + Self::TIMESTAMP_SIZE];
        match Timestamp::from_pts_bytes(ts) {
            Ok(pts) => Some(pts),
            Err(e) => {
                warn!("PES header has invalid PTS: {}", e);
                None
            }
        }
    }
}
