//! Types for processing tables of *Program Specific Information* in a transport stream.
//!
//! # Concepts
//!
//! * The *Program Association Table* lists the programs in the multiplex, and the PID on which
//!   each program's *Program Map Table* will be found.
//! * The *Program Map Table* lists the elementary streams of a single program.
//! * A Section can be split across a small number of individual transport stream *Packets*; the
//!   [`SectionBuffer`](struct.SectionBuffer.html) type collects those pieces back together.
//!
//! SCTE-35 `splice_info_section`s share the common 3-byte section header, but are assembled by
//! the demultiplexer itself since they are located by searching the packet payload.

pub mod pat;
pub mod pmt;

use crc::{Crc, CRC_32_MPEG_2};
use log::warn;

const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// True if the trailing `CRC_32` field of the given complete section matches the content.
pub fn crc_ok(section: &[u8]) -> bool {
    section.len() >= 4 && CRC.checksum(section) == 0
}

/// Header fields common to every section, whatever the table type.
#[derive(Debug, PartialEq, Eq)]
pub struct SectionCommonHeader {
    pub table_id: u8,
    pub section_syntax_indicator: bool,
    pub private_indicator: bool,
    /// number of bytes in the section following this field
    pub section_length: usize,
}

impl SectionCommonHeader {
    pub const SIZE: usize = 3;

    /// Panics if fewer than `SectionCommonHeader::SIZE` bytes are given.
    pub fn new(buf: &[u8]) -> SectionCommonHeader {
        SectionCommonHeader {
            table_id: buf[0],
            section_syntax_indicator: buf[1] & 0b1000_0000 != 0,
            private_indicator: buf[1] & 0b0100_0000 != 0,
            section_length: ((u16::from(buf[1] & 0b0000_1111) << 8) | u16::from(buf[2])) as usize,
        }
    }
}

/// Represents the fields that appear within table sections that use the common 'section syntax'
/// (which the PAT and PMT both do).
#[derive(Debug)]
pub struct TableSyntaxHeader<'buf> {
    buf: &'buf [u8],
}

impl<'buf> TableSyntaxHeader<'buf> {
    pub const SIZE: usize = 5;

    /// Panics if fewer than `TableSyntaxHeader::SIZE` bytes are given.
    pub fn new(buf: &'buf [u8]) -> TableSyntaxHeader<'buf> {
        assert!(buf.len() >= Self::SIZE);
        TableSyntaxHeader { buf }
    }
    /// The initial 16-bit field within a 'section syntax' PSI table (which immediately follows the
    /// `section_length` field).
    /// _13818-1_ refers to this field as,
    ///  - `transport_stream_id` when it appears within a Program Association Section
    ///  - `program_number` when it appears within a Program Map Section
    pub fn id(&self) -> u16 {
        u16::from(self.buf[0]) << 8 | u16::from(self.buf[1])
    }
    /// A 5-bit value that can be used to quickly check if this table has changed since the last
    /// time it was periodically inserted within the transport stream being read.
    pub fn version(&self) -> u8 {
        (self.buf[2] >> 1) & 0b0001_1111
    }
}

/// Accumulates the bytes of one section which may be split over several transport stream
/// packets, until the amount of data declared by its `section_length` field is present.
#[derive(Debug)]
pub struct SectionBuffer {
    buf: Vec<u8>,
    expected: usize,
}

impl SectionBuffer {
    /// Begin a new section from the payload of a packet with _payload_unit_start_indicator_ set,
    /// honouring the `pointer_field` at the start of that payload.
    ///
    /// Returns `None` if the payload is too short to hold the section header.
    pub fn begin(payload: &[u8]) -> Option<SectionBuffer> {
        let pointer = *payload.first()? as usize;
        let start = 1 + pointer;
        if payload.len() < start + SectionCommonHeader::SIZE {
            warn!(
                "PSI pointer_field {} leaves no room for a section header in {} byte payload",
                pointer,
                payload.len()
            );
            return None;
        }
        let section = &payload[start..];
        let header = SectionCommonHeader::new(section);
        let expected = SectionCommonHeader::SIZE + header.section_length;
        let mut buf = Vec::with_capacity(expected);
        buf.extend_from_slice(&section[..section.len().min(expected)]);
        Some(SectionBuffer { buf, expected })
    }

    /// Append data from the payload of a continuation packet.  Any bytes beyond the declared
    /// section length (stuffing) are dropped.
    pub fn append(&mut self, data: &[u8]) {
        let wanted = self.expected.saturating_sub(self.buf.len());
        self.buf.extend_from_slice(&data[..data.len().min(wanted)]);
    }

    /// The section header of the data being collected.
    pub fn header(&self) -> SectionCommonHeader {
        SectionCommonHeader::new(&self.buf[..SectionCommonHeader::SIZE])
    }

    /// The total size of the section, header included, once complete.
    pub fn expected_len(&self) -> usize {
        self.expected
    }

    pub fn is_complete(&self) -> bool {
        self.buf.len() >= self.expected
    }

    /// Returns the whole section, if all its bytes have arrived.
    pub fn section(&self) -> Option<&[u8]> {
        if self.is_complete() {
            Some(&self.buf[..self.expected])
        } else {
            None
        }
    }
}

/// Splits a complete section into its table-syntax header and the body between that header and
/// the trailing CRC.
pub(crate) fn split_syntax_section(section: &[u8]) -> Option<(TableSyntaxHeader<'_>, &[u8])> {
    const CRC_SIZE: usize = 4;
    let body_start = SectionCommonHeader::SIZE + TableSyntaxHeader::SIZE;
    if section.len() < body_start + CRC_SIZE {
        warn!("section of {} bytes too short for section syntax", section.len());
        return None;
    }
    if !crc_ok(section) {
        warn!(
            "section crc check failed for table_id {:#04x}, using it anyway",
            section[0]
        );
    }
    let header = TableSyntaxHeader::new(&section[SectionCommonHeader::SIZE..body_start]);
    Some((header, &section[body_start..section.len() - CRC_SIZE]))
}
