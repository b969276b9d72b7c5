//! The `splice_command()` structures which may appear within a `splice_info_section`.

use super::{hex_bytes, truncated, CueError};
use bitstream_io::{BigEndian, BitRead, BitReader};
use serde::Serialize;
use std::io;

pub const SPLICE_NULL: u8 = 0x00;
pub const SPLICE_SCHEDULE: u8 = 0x04;
pub const SPLICE_INSERT: u8 = 0x05;
pub const TIME_SIGNAL: u8 = 0x06;
pub const BANDWIDTH_RESERVATION: u8 = 0x07;
pub const PRIVATE_COMMAND: u8 = 0xff;

type Reader<'buf> = BitReader<&'buf [u8], BigEndian>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum SpliceCommand {
    SpliceNull,
    SpliceSchedule {
        events: Vec<ScheduleEvent>,
    },
    SpliceInsert(SpliceInsert),
    TimeSignal {
        /// 33-bit PTS value, or `None` if no time was specified
        splice_time: Option<u64>,
    },
    BandwidthReservation,
    PrivateCommand {
        identifier: u32,
        #[serde(serialize_with = "hex_bytes")]
        private_bytes: Vec<u8>,
    },
    /// A command of a type not defined by _SCTE 35_, or one that could not be read because the
    /// section is encrypted.
    Reserved {
        command_type: u8,
        #[serde(serialize_with = "hex_bytes")]
        bytes: Vec<u8>,
    },
}

impl SpliceCommand {
    /// Parses the command of the given type from the start of `data`, returning it along with
    /// the number of bytes it occupied.
    ///
    /// If `length_known` is false, `data` extends past the end of the command and its length is
    /// determined by reading it.  That is impossible for private and reserved command types.
    pub fn parse(
        command_type: u8,
        data: &[u8],
        length_known: bool,
    ) -> Result<(SpliceCommand, usize), CueError> {
        let mut r = BitReader::endian(data, BigEndian);
        let command = match command_type {
            SPLICE_NULL => SpliceCommand::SpliceNull,
            SPLICE_SCHEDULE => SpliceCommand::SpliceSchedule {
                events: read_schedule(&mut r).map_err(truncated("splice_schedule"))?,
            },
            SPLICE_INSERT => SpliceCommand::SpliceInsert(
                SpliceInsert::read(&mut r).map_err(truncated("splice_insert"))?,
            ),
            TIME_SIGNAL => SpliceCommand::TimeSignal {
                splice_time: read_splice_time(&mut r).map_err(truncated("time_signal"))?,
            },
            BANDWIDTH_RESERVATION => SpliceCommand::BandwidthReservation,
            _ => {
                if !length_known {
                    return Err(CueError::UnknownCommandLength(command_type));
                }
                return Ok((Self::opaque(command_type, data)?, data.len()));
            }
        };
        let remaining = r.into_reader().len();
        Ok((command, data.len() - remaining))
    }

    fn opaque(command_type: u8, data: &[u8]) -> Result<SpliceCommand, CueError> {
        if command_type != PRIVATE_COMMAND {
            return Ok(SpliceCommand::Reserved {
                command_type,
                bytes: data.to_vec(),
            });
        }
        if data.len() < 4 {
            return Err(CueError::NotEnoughData {
                field: "private_command identifier",
                expected: 4,
                actual: data.len(),
            });
        }
        Ok(SpliceCommand::PrivateCommand {
            identifier: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            private_bytes: data[4..].to_vec(),
        })
    }
}

/// The `break_duration()` of a splice insert or scheduled splice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakDuration {
    pub auto_return: bool,
    /// 33-bit duration in 90kHz ticks
    pub duration: u64,
}

/// Timing for one elementary stream of a component-mode splice insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentSplice {
    pub component_tag: u8,
    pub splice_time: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpliceInsert {
    pub splice_event_id: u32,
    pub splice_event_cancel_indicator: bool,
    pub out_of_network_indicator: bool,
    pub program_splice_flag: bool,
    pub splice_immediate_flag: bool,
    /// for a program splice which is not immediate, the 33-bit PTS of the splice point
    #[serde(skip_serializing_if = "Option::is_none")]
    pub splice_time: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentSplice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_duration: Option<BreakDuration>,
    pub unique_program_id: u16,
    pub avail_num: u8,
    pub avails_expected: u8,
}

impl SpliceInsert {
    fn read(r: &mut Reader<'_>) -> io::Result<SpliceInsert> {
        let mut insert = SpliceInsert {
            splice_event_id: r.read::<u32>(32)?,
            splice_event_cancel_indicator: r.read_bit()?,
            ..SpliceInsert::default()
        };
        r.skip(7)?; // reserved
        if insert.splice_event_cancel_indicator {
            return Ok(insert);
        }
        insert.out_of_network_indicator = r.read_bit()?;
        insert.program_splice_flag = r.read_bit()?;
        let duration_flag = r.read_bit()?;
        insert.splice_immediate_flag = r.read_bit()?;
        r.skip(4)?; // reserved
        if insert.program_splice_flag {
            if !insert.splice_immediate_flag {
                insert.splice_time = read_splice_time(r)?;
            }
        } else {
            let component_count = r.read::<u8>(8)?;
            for _ in 0..component_count {
                let component_tag = r.read::<u8>(8)?;
                let splice_time = if insert.splice_immediate_flag {
                    None
                } else {
                    read_splice_time(r)?
                };
                insert.components.push(ComponentSplice {
                    component_tag,
                    splice_time,
                });
            }
        }
        if duration_flag {
            insert.break_duration = Some(read_break_duration(r)?);
        }
        insert.unique_program_id = r.read::<u16>(16)?;
        insert.avail_num = r.read::<u8>(8)?;
        insert.avails_expected = r.read::<u8>(8)?;
        Ok(insert)
    }
}

/// A component of a scheduled splice, with its UTC splice time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleComponent {
    pub component_tag: u8,
    pub utc_splice_time: u32,
}

/// One entry of a `splice_schedule()` command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleEvent {
    pub splice_event_id: u32,
    pub splice_event_cancel_indicator: bool,
    pub out_of_network_indicator: bool,
    pub program_splice_flag: bool,
    /// seconds since 1980-01-06 00:00 UTC, for a program splice
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utc_splice_time: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ScheduleComponent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_duration: Option<BreakDuration>,
    pub unique_program_id: u16,
    pub avail_num: u8,
    pub avails_expected: u8,
}

fn read_schedule(r: &mut Reader<'_>) -> io::Result<Vec<ScheduleEvent>> {
    let splice_count = r.read::<u8>(8)?;
    let mut events = Vec::with_capacity(usize::from(splice_count));
    for _ in 0..splice_count {
        let mut event = ScheduleEvent {
            splice_event_id: r.read::<u32>(32)?,
            splice_event_cancel_indicator: r.read_bit()?,
            ..ScheduleEvent::default()
        };
        r.skip(7)?;
        if !event.splice_event_cancel_indicator {
            event.out_of_network_indicator = r.read_bit()?;
            event.program_splice_flag = r.read_bit()?;
            let duration_flag = r.read_bit()?;
            r.skip(5)?;
            if event.program_splice_flag {
                event.utc_splice_time = Some(r.read::<u32>(32)?);
            } else {
                let component_count = r.read::<u8>(8)?;
                for _ in 0..component_count {
                    event.components.push(ScheduleComponent {
                        component_tag: r.read::<u8>(8)?,
                        utc_splice_time: r.read::<u32>(32)?,
                    });
                }
            }
            if duration_flag {
                event.break_duration = Some(read_break_duration(r)?);
            }
            event.unique_program_id = r.read::<u16>(16)?;
            event.avail_num = r.read::<u8>(8)?;
            event.avails_expected = r.read::<u8>(8)?;
        }
        events.push(event);
    }
    Ok(events)
}

/// Reads a `splice_time()` structure, returning the PTS if `time_specified_flag` is set.
fn read_splice_time(r: &mut Reader<'_>) -> io::Result<Option<u64>> {
    if r.read_bit()? {
        r.skip(6)?;
        Ok(Some(r.read::<u64>(33)?))
    } else {
        r.skip(7)?;
        Ok(None)
    }
}

fn read_break_duration(r: &mut Reader<'_>) -> io::Result<BreakDuration> {
    let auto_return = r.read_bit()?;
    r.skip(6)?;
    Ok(BreakDuration {
        auto_return,
        duration: r.read::<u64>(33)?,
    })
}
