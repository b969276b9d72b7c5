//! Decoding of _ANSI/SCTE 35_ `splice_info_section` data into [`Cue`](struct.Cue.html) values.
//!
//! The demultiplexer assembles the raw bytes of a section (which may have been spread over
//! several transport stream packets) and hands them to [`Cue::decode()`](struct.Cue.html#method.decode)
//! along with a little context about where in the transport stream the section was found.

pub mod command;
pub mod descriptor;

use crate::pes;
use crate::psi;
use log::warn;
use serde::Serialize;
use std::fmt::Write as _;
use std::io;

pub use self::command::SpliceCommand;
pub use self::descriptor::SpliceDescriptor;

/// The `table_id` value of every `splice_info_section`.
pub const TABLE_ID: u8 = 0xfc;

/// A problem that prevented a splice_info_section being decoded.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CueError {
    #[error("{field} needs {expected} bytes, but only {actual} available")]
    NotEnoughData {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("table_id {0:#04x} is not a splice_info_section (expected 0xfc)")]
    BadTableId(u8),
    #[error("{field} runs past the end of the data containing it")]
    Truncated { field: &'static str },
    #[error("splice_command_type {0:#04x} can't be used with an unspecified splice_command_length")]
    UnknownCommandLength(u8),
}

/// Builds a `map_err()` adapter turning the end-of-data error from a bit reader into
/// `CueError::Truncated`.
pub(crate) fn truncated(field: &'static str) -> impl Fn(io::Error) -> CueError {
    move |_| CueError::Truncated { field }
}

pub(crate) fn hex_bytes<S: serde::Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    s.serialize_str(&out)
}

/// The fixed fields at the start of every `splice_info_section`, up to and including
/// `splice_command_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfoSection {
    pub table_id: u8,
    pub section_syntax_indicator: bool,
    pub private_indicator: bool,
    pub sap_type: u8,
    /// number of bytes in the section following this field
    pub section_length: u16,
    pub protocol_version: u8,
    pub encrypted_packet: bool,
    pub encryption_algorithm: u8,
    /// 33-bit offset, in 90kHz ticks, to be added to every time in the command
    pub pts_adjustment: u64,
    pub cw_index: u8,
    pub tier: u16,
    /// `0xfff` indicates that the length was not given by the encoder
    pub splice_command_length: u16,
    pub splice_command_type: u8,
}

impl InfoSection {
    pub const SIZE: usize = 14;

    /// Decode the fixed header from the start of the given buffer.
    pub fn from_bytes(buf: &[u8]) -> Result<InfoSection, CueError> {
        if buf.len() < Self::SIZE {
            return Err(CueError::NotEnoughData {
                field: "splice_info_section header",
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }
        if buf[0] != TABLE_ID {
            return Err(CueError::BadTableId(buf[0]));
        }
        let header = psi::SectionCommonHeader::new(&buf[..psi::SectionCommonHeader::SIZE]);
        Ok(InfoSection {
            table_id: header.table_id,
            section_syntax_indicator: header.section_syntax_indicator,
            private_indicator: header.private_indicator,
            sap_type: (buf[1] >> 4) & 0b11,
            section_length: header.section_length as u16,
            protocol_version: buf[3],
            encrypted_packet: buf[4] & 0b1000_0000 != 0,
            encryption_algorithm: (buf[4] & 0b0111_1110) >> 1,
            pts_adjustment: u64::from(buf[4] & 1) << 32
                | u64::from(buf[5]) << 24
                | u64::from(buf[6]) << 16
                | u64::from(buf[7]) << 8
                | u64::from(buf[8]),
            cw_index: buf[9],
            tier: u16::from(buf[10]) << 4 | u16::from(buf[11]) >> 4,
            splice_command_length: u16::from(buf[11] & 0b0000_1111) << 8 | u16::from(buf[12]),
            splice_command_type: buf[13],
        })
    }

    /// The total size of the section, including the three bytes preceding `section_length`.
    pub fn cue_len(&self) -> usize {
        psi::SectionCommonHeader::SIZE + usize::from(self.section_length)
    }
}

/// Where in the transport stream a cue was found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketData {
    pub pid: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<u16>,
    /// most recent PTS seen in the cue's program, in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pts: Option<f64>,
}

impl PacketData {
    pub fn new(pid: u16, program: Option<u16>, pts: Option<pes::Timestamp>) -> PacketData {
        PacketData {
            pid,
            program,
            pts: pts.map(|ts| (ts.as_seconds() * 1_000_000.0).round() / 1_000_000.0),
        }
    }
}

/// A decoded `splice_info_section`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cue {
    pub info_section: InfoSection,
    pub command: SpliceCommand,
    pub descriptors: Vec<SpliceDescriptor>,
    pub crc_32: u32,
    pub packet_data: PacketData,
    #[serde(skip)]
    bytes: Vec<u8>,
}

impl Cue {
    const DESCRIPTOR_LOOP_LENGTH_SIZE: usize = 2;
    const CRC_SIZE: usize = 4;

    /// Decode a complete `splice_info_section`.  Any bytes beyond the length declared by the
    /// section header are discarded.
    ///
    /// A CRC mismatch is only logged; the cue is still returned.
    pub fn decode(mut bytes: Vec<u8>, packet_data: PacketData) -> Result<Cue, CueError> {
        let info_section = InfoSection::from_bytes(&bytes)?;
        let len = info_section.cue_len();
        let min = InfoSection::SIZE + Self::DESCRIPTOR_LOOP_LENGTH_SIZE + Self::CRC_SIZE;
        if len < min {
            return Err(CueError::NotEnoughData {
                field: "section_length",
                expected: min,
                actual: len,
            });
        }
        if bytes.len() < len {
            return Err(CueError::NotEnoughData {
                field: "splice_info_section",
                expected: len,
                actual: bytes.len(),
            });
        }
        bytes.truncate(len);
        let crc_pos = len - Self::CRC_SIZE;
        let crc_32 = u32::from_be_bytes([
            bytes[crc_pos],
            bytes[crc_pos + 1],
            bytes[crc_pos + 2],
            bytes[crc_pos + 3],
        ]);
        if !psi::crc_ok(&bytes) {
            warn!(
                "pid {}: splice_info_section CRC_32 {:#010x} does not match content",
                packet_data.pid, crc_32
            );
        }

        let body = &bytes[InfoSection::SIZE..crc_pos];
        let (command, descriptors) = if info_section.encrypted_packet {
            // without the key, everything after the header is opaque
            let command = SpliceCommand::Reserved {
                command_type: info_section.splice_command_type,
                bytes: body.to_vec(),
            };
            (command, vec![])
        } else {
            Self::decode_body(&info_section, body)?
        };

        Ok(Cue {
            info_section,
            command,
            descriptors,
            crc_32,
            packet_data,
            bytes,
        })
    }

    fn decode_body(
        info_section: &InfoSection,
        body: &[u8],
    ) -> Result<(SpliceCommand, Vec<SpliceDescriptor>), CueError> {
        let command_type = info_section.splice_command_type;
        let (command, command_len) = if info_section.splice_command_length == 0xfff {
            SpliceCommand::parse(command_type, body, false)?
        } else {
            let len = usize::from(info_section.splice_command_length);
            if body.len() < len {
                return Err(CueError::NotEnoughData {
                    field: "splice_command",
                    expected: len,
                    actual: body.len(),
                });
            }
            let (command, _) = SpliceCommand::parse(command_type, &body[..len], true)?;
            (command, len)
        };

        let rest = &body[command_len..];
        if rest.len() < Self::DESCRIPTOR_LOOP_LENGTH_SIZE {
            return Err(CueError::NotEnoughData {
                field: "descriptor_loop_length",
                expected: Self::DESCRIPTOR_LOOP_LENGTH_SIZE,
                actual: rest.len(),
            });
        }
        let loop_len = usize::from(u16::from(rest[0]) << 8 | u16::from(rest[1]));
        let rest = &rest[Self::DESCRIPTOR_LOOP_LENGTH_SIZE..];
        if rest.len() < loop_len {
            return Err(CueError::NotEnoughData {
                field: "splice_descriptor loop",
                expected: loop_len,
                actual: rest.len(),
            });
        }
        let descriptors = descriptor::SpliceDescriptorIter::new(&rest[..loop_len])
            .collect::<Result<Vec<_>, _>>()?;
        Ok((command, descriptors))
    }

    /// The `splice_command_type` from the section header.
    pub fn command_type(&self) -> u8 {
        self.info_section.splice_command_type
    }

    /// The raw bytes of the whole section, from `table_id` to `CRC_32`.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

fn write_cue<W: io::Write>(mut out: W, cue: &Cue) {
    let result = serde_json::to_writer_pretty(&mut out, cue)
        .map_err(io::Error::from)
        .and_then(|_| writeln!(out));
    if let Err(e) = result {
        warn!("failed to write cue: {}", e);
    }
}

/// A cue handler which prints each cue as JSON on standard output.
pub fn show_cue(cue: Cue) {
    write_cue(io::stdout().lock(), &cue);
}

/// A cue handler which prints each cue as JSON on standard error, for use when standard
/// output is carrying proxied transport stream data.
pub fn show_cue_stderr(cue: Cue) {
    write_cue(io::stderr().lock(), &cue);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testdata;
    use assert_matches::assert_matches;
    use hex_literal::*;

    fn packet_data() -> PacketData {
        PacketData::new(0x20, Some(1), None)
    }

    #[test]
    fn splice_insert() {
        let data = hex!("fc302500000000000000fff01405000000017feffe2d142b00fe0123d3080001010100007f157a49");
        let cue = Cue::decode(data.to_vec(), packet_data()).unwrap();
        assert_eq!(cue.info_section.section_length, 0x25);
        assert_eq!(cue.info_section.tier, 0xfff);
        assert_eq!(cue.info_section.splice_command_length, 0x14);
        assert_eq!(cue.command_type(), command::SPLICE_INSERT);
        assert_eq!(cue.crc_32, 0x7f15_7a49);
        assert_eq!(cue.bytes(), &data[..]);
        assert_matches!(cue.command, SpliceCommand::SpliceInsert(ref insert) => {
            assert_eq!(insert.splice_event_id, 1);
            assert!(insert.out_of_network_indicator);
            assert!(insert.program_splice_flag);
            assert_eq!(insert.splice_time, Some(0x0_2d14_2b00));
            let duration = insert.break_duration.as_ref().unwrap();
            assert!(duration.auto_return);
            assert_eq!(duration.duration, 0x0123_d308);
            assert_eq!(insert.unique_program_id, 1);
            assert_eq!(insert.avail_num, 1);
            assert_eq!(insert.avails_expected, 1);
        });
        assert!(cue.descriptors.is_empty());
    }

    #[test]
    fn time_signal_with_descriptor() {
        let section = testdata::cue_section(
            command::TIME_SIGNAL,
            &hex!("fe00015f90"),
            &hex!("0008 43554549 00000457"),
        );
        let cue = Cue::decode(section.clone(), packet_data()).unwrap();
        assert!(crate::psi::crc_ok(cue.bytes()));
        assert_eq!(
            cue.command,
            SpliceCommand::TimeSignal {
                splice_time: Some(90_000)
            }
        );
        assert_eq!(
            cue.descriptors,
            vec![SpliceDescriptor::Avail {
                provider_avail_id: 0x457
            }]
        );
        assert_eq!(cue.bytes(), &section[..]);
    }

    #[test]
    fn unspecified_command_length() {
        let mut section = testdata::cue_section(command::TIME_SIGNAL, &hex!("7f"), &[]);
        section[11] |= 0x0f;
        section[12] = 0xff;
        let cue = Cue::decode(section, packet_data()).unwrap();
        assert_eq!(cue.info_section.splice_command_length, 0xfff);
        assert_eq!(cue.command, SpliceCommand::TimeSignal { splice_time: None });
    }

    #[test]
    fn trailing_stuffing_removed() {
        let section = testdata::cue_section(command::SPLICE_NULL, &[], &[]);
        let mut data = section.clone();
        data.extend_from_slice(&[0xff; 20]);
        let cue = Cue::decode(data, packet_data()).unwrap();
        assert_eq!(cue.bytes(), &section[..]);
        assert_eq!(cue.command, SpliceCommand::SpliceNull);
    }

    #[test]
    fn bad_crc_still_decoded() {
        let mut section = testdata::cue_section(command::SPLICE_NULL, &[], &[]);
        let last = section.len() - 1;
        section[last] ^= 0x55;
        let cue = Cue::decode(section, packet_data()).unwrap();
        assert_eq!(cue.command, SpliceCommand::SpliceNull);
    }

    #[test]
    fn encrypted_command_left_opaque() {
        let mut section = testdata::cue_section(command::TIME_SIGNAL, &hex!("fe00015f90"), &[]);
        section[4] |= 0b1000_0010;
        let cue = Cue::decode(section, packet_data()).unwrap();
        assert!(cue.info_section.encrypted_packet);
        assert_eq!(cue.info_section.encryption_algorithm, 1);
        assert_matches!(cue.command, SpliceCommand::Reserved { command_type: 0x06, .. });
    }

    #[test]
    fn short_section() {
        let section = testdata::cue_section(command::SPLICE_NULL, &[], &[]);
        assert_matches!(
            Cue::decode(section[..15].to_vec(), packet_data()),
            Err(CueError::NotEnoughData { field: "splice_info_section", .. })
        );
        assert_matches!(
            Cue::decode(section[..10].to_vec(), packet_data()),
            Err(CueError::NotEnoughData { .. })
        );
    }

    #[test]
    fn wrong_table_id() {
        let mut section = testdata::cue_section(command::SPLICE_NULL, &[], &[]);
        section[0] = 0x02;
        assert_eq!(
            Cue::decode(section, packet_data()),
            Err(CueError::BadTableId(0x02))
        );
    }

    #[test]
    fn command_longer_than_section() {
        let mut section = testdata::cue_section(command::SPLICE_INSERT, &hex!("00000001"), &[]);
        section[12] = 0x40;
        assert_matches!(
            Cue::decode(section, packet_data()),
            Err(CueError::NotEnoughData { field: "splice_command", .. })
        );
    }

    #[test]
    fn pts_rounded_to_microseconds() {
        let data = PacketData::new(0x20, Some(1), Some(pes::Timestamp::from_u64(1)));
        assert_eq!(data.pts, Some(0.000011));
        let data = PacketData::new(0x20, Some(1), Some(pes::Timestamp::from_u64(8_100_000)));
        assert_eq!(data.pts, Some(90.0));
    }

    #[test]
    fn json() {
        let section = testdata::cue_section(command::SPLICE_NULL, &[], &[]);
        let cue = Cue::decode(section, PacketData::new(0x20, Some(1), None)).unwrap();
        let json = serde_json::to_value(&cue).unwrap();
        assert_eq!(json["packet_data"]["pid"], 0x20);
        assert_eq!(json["packet_data"]["program"], 1);
        assert!(json["packet_data"].get("pts").is_none());
        assert_eq!(json["command"]["name"], "splice_null");
        assert_eq!(json["info_section"]["table_id"], 0xfc);
        assert!(json.get("bytes").is_none());

        let mut out = vec![];
        write_cue(&mut out, &cue);
        assert!(out.ends_with(b"}\n"));
    }
}
