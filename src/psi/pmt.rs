//! Types related to the _Program Map Table_

use crate::packet;
use crate::StreamType;
use log::warn;
use std::fmt;

/// The `table_id` of a Program Map Section.
pub const TABLE_ID: u8 = 0x02;

/// Sections of the _Program Map Table_ give details of the streams within a particular program
pub struct PmtSection<'buf> {
    data: &'buf [u8],
}
impl<'buf> fmt::Debug for PmtSection<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("PmtSection")
            .field("pcr_pid", &self.pcr_pid())
            .field("streams", &StreamsDebug(self))
            .finish()
    }
}
struct StreamsDebug<'buf>(&'buf PmtSection<'buf>);
impl<'buf> fmt::Debug for StreamsDebug<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_list().entries(self.0.streams()).finish()
    }
}

impl<'buf> PmtSection<'buf> {
    const HEADER_SIZE: usize = 4;

    /// Create a `PmtSection`, wrapping the given section body (following the table syntax header,
    /// and excluding the CRC), or `None` if there are too few bytes for the fixed PMT fields.
    pub fn from_bytes(data: &'buf [u8]) -> Option<PmtSection<'buf>> {
        if data.len() < Self::HEADER_SIZE {
            warn!(
                "program_map_section body too short: {} bytes (expected at least {})",
                data.len(),
                Self::HEADER_SIZE
            );
            None
        } else {
            Some(PmtSection { data })
        }
    }

    /// Returns the Pid of packets that will contain the Program Clock Reference for this program
    pub fn pcr_pid(&self) -> packet::Pid {
        packet::Pid::new(u16::from(self.data[0] & 0b0001_1111) << 8 | u16::from(self.data[1]))
    }
    fn program_info_length(&self) -> u16 {
        u16::from(self.data[2] & 0b0000_1111) << 8 | u16::from(self.data[3])
    }
    /// Returns an iterator over the streams of which this program is composed.  Program-level
    /// descriptors are skipped.
    pub fn streams(&self) -> impl Iterator<Item = StreamInfo> + 'buf {
        let descriptor_end = Self::HEADER_SIZE + self.program_info_length() as usize;
        if descriptor_end > self.data.len() {
            warn!(
                "program_info_length={} extends beyond end of PMT section (section_length={})",
                self.program_info_length(),
                self.data.len()
            );
            // return an iterator that will produce no items,
            StreamInfoIter::new(&self.data[0..0])
        } else {
            StreamInfoIter::new(&self.data[descriptor_end..])
        }
    }
}

/// Iterator over the `StreamInfo` entries in a `PmtSection`.
struct StreamInfoIter<'buf> {
    buf: &'buf [u8],
}
impl<'buf> StreamInfoIter<'buf> {
    fn new(buf: &'buf [u8]) -> StreamInfoIter<'buf> {
        StreamInfoIter { buf }
    }
}
impl<'buf> Iterator for StreamInfoIter<'buf> {
    type Item = StreamInfo;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        if let Some((stream_info, info_len)) = StreamInfo::from_bytes(self.buf) {
            self.buf = &self.buf[info_len..];
            Some(stream_info)
        } else {
            self.buf = &self.buf[0..0];
            None
        }
    }
}

/// Details of a particular elementary stream within a program.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    /// The type of this stream
    pub stream_type: StreamType,
    /// The Pid that will be used for TS packets containing the data of this stream
    pub elementary_pid: packet::Pid,
}

impl StreamInfo {
    const HEADER_SIZE: usize = 5;

    /// Returns the stream entry, and the number of bytes it occupies including its
    /// `ES_info` descriptors.
    fn from_bytes(data: &[u8]) -> Option<(StreamInfo, usize)> {
        if data.len() < Self::HEADER_SIZE {
            warn!(
                "only {} bytes remaining for stream info, at least {} required {:?}",
                data.len(),
                Self::HEADER_SIZE,
                data
            );
            return None;
        }
        let es_info_length = u16::from(data[3] & 0b0000_1111) << 8 | u16::from(data[4]);
        let descriptor_end = Self::HEADER_SIZE + es_info_length as usize;
        if descriptor_end > data.len() {
            warn!(
                "PMT section of size {} is not large enough to contain es_info_length of {}",
                data.len(),
                es_info_length
            );
            return None;
        }
        let info = StreamInfo {
            stream_type: data[0].into(),
            elementary_pid: packet::Pid::new(
                u16::from(data[1] & 0b0001_1111) << 8 | u16::from(data[2]),
            ),
        };
        Some((info, descriptor_end))
    }
}
impl fmt::Debug for StreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("StreamInfo")
            .field("stream_type", &self.stream_type)
            .field("elementary_pid", &self.elementary_pid)
            .finish()
    }
}
