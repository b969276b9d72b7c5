//! Types related to the _Program Association Table_

use crate::packet;
use log::warn;

/// The PID on which the _Program Association Table_ is always carried.
pub const PAT_PID: packet::Pid = packet::Pid::PAT;

/// The `table_id` of a Program Association Section.
pub const TABLE_ID: u8 = 0x00;

/// One entry of the PAT.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgramDescriptor {
    /// Program number 0 gives the PID of the _Network Information Table_
    Network { pid: packet::Pid },
    /// Any other program number gives the PID on which that program's PMT is carried
    Program {
        program_number: u16,
        pid: packet::Pid,
    },
}

impl ProgramDescriptor {
    /// panics if fewer than 4 bytes are provided
    pub fn from_bytes(data: &[u8]) -> ProgramDescriptor {
        let program_number = (u16::from(data[0]) << 8) | u16::from(data[1]);
        let pid = packet::Pid::new((u16::from(data[2]) & 0b0001_1111) << 8 | u16::from(data[3]));
        if program_number == 0 {
            ProgramDescriptor::Network { pid }
        } else {
            ProgramDescriptor::Program {
                program_number,
                pid,
            }
        }
    }

    pub fn pid(&self) -> packet::Pid {
        match *self {
            ProgramDescriptor::Network { pid } => pid,
            ProgramDescriptor::Program { pid, .. } => pid,
        }
    }
}

/// Sections of the _Program Association Table_ give details of the programs within a transport
/// stream.  There may be only one program, or in the case of a broadcast multiplex, there may
/// be many.
#[derive(Clone, Debug)]
pub struct PatSection<'buf> {
    data: &'buf [u8],
}
impl<'buf> PatSection<'buf> {
    /// `data` is the section body following the table syntax header, excluding the CRC.
    pub fn new(data: &'buf [u8]) -> PatSection<'buf> {
        if data.len() % 4 != 0 {
            warn!(
                "PAT section body of {} bytes is not a whole number of program entries",
                data.len()
            );
        }
        PatSection { data }
    }

    /// Iterate over the program entries, ignoring any trailing partial entry.
    pub fn programs(&self) -> impl Iterator<Item = ProgramDescriptor> + 'buf {
        self.data.chunks_exact(4).map(ProgramDescriptor::from_bytes)
    }
}
