//! Builders for synthetic transport stream data used by the unit tests.

use crate::packet::Packet;
use crc::{Crc, CRC_32_MPEG_2};

const CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

fn push_crc(section: &mut Vec<u8>) {
    let crc = CRC.checksum(section);
    section.extend_from_slice(&crc.to_be_bytes());
}

/// A complete section using the common 'section syntax', with a correct `CRC_32`.
pub fn syntax_section(table_id: u8, id: u16, body: &[u8]) -> Vec<u8> {
    let section_length = 5 + body.len() + 4;
    let mut data = vec![
        table_id,
        0b1011_0000 | (section_length >> 8) as u8,
        section_length as u8,
        (id >> 8) as u8,
        id as u8,
        0b1100_0001, // version 0, current_next_indicator
        0,           // section_number
        0,           // last_section_number
    ];
    data.extend_from_slice(body);
    push_crc(&mut data);
    data
}

/// A complete `splice_info_section` with the given command and descriptor loop, and a correct
/// `CRC_32`.
pub fn cue_section(command_type: u8, command: &[u8], descriptors: &[u8]) -> Vec<u8> {
    let section_length = 11 + command.len() + 2 + descriptors.len() + 4;
    let mut data = vec![
        0xfc,
        0b0011_0000 | (section_length >> 8) as u8,
        section_length as u8,
        0, // protocol_version
        0, // not encrypted, pts_adjustment high bit
        0,
        0,
        0,
        0,
        0,    // cw_index
        0xff, // tier
        0xf0 | (command.len() >> 8) as u8,
        command.len() as u8,
        command_type,
    ];
    data.extend_from_slice(command);
    data.push((descriptors.len() >> 8) as u8);
    data.push(descriptors.len() as u8);
    data.extend_from_slice(descriptors);
    push_crc(&mut data);
    data
}

/// A payload-only transport stream packet, with the remainder of the payload stuffed with
/// `0xff`.
pub fn ts_packet(pid: u16, pusi: bool, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= Packet::SIZE - 4);
    let mut pk = vec![
        Packet::SYNC_BYTE,
        (if pusi { 0b0100_0000 } else { 0 }) | (pid >> 8) as u8,
        pid as u8,
        0b0001_0000,
    ];
    pk.extend_from_slice(payload);
    pk.resize(Packet::SIZE, 0xff);
    pk
}

/// A packet carrying a whole section, preceded by a zero `pointer_field`.
pub fn section_packet(pid: u16, section: &[u8]) -> Vec<u8> {
    let mut payload = vec![0u8];
    payload.extend_from_slice(section);
    ts_packet(pid, true, &payload)
}

/// A PAT packet mapping each `(program_number, pmt_pid)` pair.
pub fn pat_packet(programs: &[(u16, u16)]) -> Vec<u8> {
    let mut body = vec![];
    for &(program, pid) in programs {
        body.extend_from_slice(&program.to_be_bytes());
        body.extend_from_slice(&(0xe000 | pid).to_be_bytes());
    }
    section_packet(0, &syntax_section(0x00, 1, &body))
}

/// The body of a program map section listing each `(stream_type, elementary_pid)` pair.
pub fn pmt_body(streams: &[(u8, u16)]) -> Vec<u8> {
    let pcr_pid = streams.first().map(|&(_, pid)| pid).unwrap_or(0x1fff);
    let mut body = vec![];
    body.extend_from_slice(&(0xe000 | pcr_pid).to_be_bytes());
    body.extend_from_slice(&[0xf0, 0x00]);
    for &(stream_type, pid) in streams {
        body.push(stream_type);
        body.extend_from_slice(&(0xe000 | pid).to_be_bytes());
        body.extend_from_slice(&[0xf0, 0x00]);
    }
    body
}

pub fn pmt_packet(pmt_pid: u16, program: u16, streams: &[(u8, u16)]) -> Vec<u8> {
    section_packet(pmt_pid, &syntax_section(0x02, program, &pmt_body(streams)))
}

/// Splits a section over as many packets as needed; only the first has
/// _payload_unit_start_indicator_ set.
pub fn section_packets(pid: u16, section: &[u8]) -> Vec<Vec<u8>> {
    let first = section.len().min(Packet::SIZE - 5);
    let mut packets = vec![section_packet(pid, &section[..first])];
    for chunk in section[first..].chunks(Packet::SIZE - 4) {
        packets.push(ts_packet(pid, false, chunk));
    }
    packets
}

/// A packet starting a video PES packet whose header carries the given 33-bit PTS.
pub fn pes_packet(pid: u16, pts: u64) -> Vec<u8> {
    let mut payload = vec![0, 0, 1, 0xe0, 0, 0, 0b1000_0000, 0b1000_0000, 5];
    payload.extend_from_slice(&[
        0b0010_0001 | ((pts >> 29) & 0b1110) as u8,
        (pts >> 22) as u8,
        0b0000_0001 | ((pts >> 14) & 0b1111_1110) as u8,
        (pts >> 7) as u8,
        0b0000_0001 | ((pts << 1) & 0b1111_1110) as u8,
    ]);
    ts_packet(pid, true, &payload)
}
