//! Routing of transport stream packets by PID, tracking the _Program Association Table_ and
//! _Program Map Table_ to discover which PIDs carry SCTE-35 splice information, and which
//! program each elementary stream belongs to.
//!
//! [`Demultiplex`](struct.Demultiplex.html) does no I/O of its own; it is given one packet at a
//! time by [`Stream`](../stream/struct.Stream.html), and reports anything of interest as an
//! [`Event`](enum.Event.html).

use crate::packet;
use crate::pes;
use crate::psi;
use crate::psi::pat;
use crate::psi::pmt;
use crate::scte35;
use crate::scte35::command;
use crate::StreamType;
use fixedbitset::FixedBitSet;
use log::{debug, info, trace, warn};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// Selects what the demultiplexer does with the programs it discovers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Extract SCTE-35 cues, and track PTS values to attach to them
    Decode,
    /// Only report the streams within each program; no cues are extracted
    Introspect,
}

/// The bytes of a `splice_info_section` collected so far, while it spans several packets.
#[derive(Debug)]
pub struct CueAssembly {
    buf: Vec<u8>,
    /// length of the whole section, known once its fixed header has arrived
    expected: Option<usize>,
    /// false for a section with a command type that is not reported, which is only collected
    /// to find where it ends
    wanted: bool,
    packet_data: scte35::PacketData,
    continuity_counter: u8,
}

impl CueAssembly {
    fn target_len(&self) -> usize {
        self.expected.unwrap_or(scte35::InfoSection::SIZE)
    }
}

/// What the demultiplexer knows about the content of a particular PID.
#[derive(Debug)]
pub enum PidState {
    /// Not announced as carrying splice information
    Unknown,
    /// Announced in a PMT with the SCTE-35 stream type, possibly with a cue part way through
    /// being collected
    Scte35(Option<CueAssembly>),
    /// Announced as carrying splice information, but produced data that wasn't.  Once evicted, a
    /// PID is never inspected for cues again.
    Evicted,
}

/// The elementary streams making up one program, as announced by its PMT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramStreams {
    pub program_number: u16,
    pub streams: Vec<pmt::StreamInfo>,
}

impl fmt::Display for ProgramStreams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Program: {}", self.program_number)?;
        for stream in &self.streams {
            writeln!(
                f,
                "    {}: [{:#04x}] {}",
                stream.elementary_pid,
                u8::from(stream.stream_type),
                stream.stream_type.description()
            )?;
        }
        Ok(())
    }
}

/// Something produced by processing a packet.
#[derive(Debug)]
pub enum Event {
    /// A complete splice cue was decoded
    Cue(scte35::Cue),
    /// A program's stream map was parsed for the first time, in `Mode::Introspect`
    Program(ProgramStreams),
    /// In `Mode::Introspect`, a PMT for an already reported program was seen, so every program
    /// in the stream has been reported
    Done,
}

/// The per-packet state machine.
pub struct Demultiplex {
    mode: Mode,
    target_program: Option<u16>,
    command_types: FixedBitSet,
    pmt_pids: FixedBitSet,
    pid_states: Vec<PidState>,
    pid_programs: HashMap<packet::Pid, u16>,
    programs: HashSet<u16>,
    program_pts: HashMap<u16, pes::Timestamp>,
    sections: HashMap<packet::Pid, psi::SectionBuffer>,
    events: VecDeque<Event>,
}

impl Demultiplex {
    /// If `show_null` is true, `splice_null()` cues are reported along with the other command
    /// types.  If `target_program` is given, the streams of all other programs are ignored.
    pub fn new(show_null: bool, mode: Mode, target_program: Option<u16>) -> Demultiplex {
        let mut command_types = FixedBitSet::with_capacity(0x100);
        for &t in &[
            command::SPLICE_SCHEDULE,
            command::SPLICE_INSERT,
            command::TIME_SIGNAL,
            command::BANDWIDTH_RESERVATION,
            command::PRIVATE_COMMAND,
        ] {
            command_types.insert(usize::from(t));
        }
        if show_null {
            command_types.insert(usize::from(command::SPLICE_NULL));
        }
        Demultiplex {
            mode,
            target_program,
            command_types,
            pmt_pids: FixedBitSet::with_capacity(packet::Pid::PID_COUNT),
            pid_states: (0..packet::Pid::PID_COUNT)
                .map(|_| PidState::Unknown)
                .collect(),
            pid_programs: HashMap::new(),
            programs: HashSet::new(),
            program_pts: HashMap::new(),
            sections: HashMap::new(),
            events: VecDeque::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn pid_state(&self, pid: packet::Pid) -> &PidState {
        &self.pid_states[usize::from(pid)]
    }

    /// The program to which the given elementary stream belongs, if it has been announced.
    pub fn program_for_pid(&self, pid: packet::Pid) -> Option<u16> {
        self.pid_programs.get(&pid).copied()
    }

    /// The most recent PTS seen in any stream of the given program.
    pub fn last_pts(&self, program_number: u16) -> Option<pes::Timestamp> {
        self.program_pts.get(&program_number).copied()
    }

    /// Process one 188-byte transport stream packet, returning the first event it produced.
    ///
    /// A single packet may produce several events (the end of one cue and the start of the
    /// next can share a packet); the remainder are returned by `next_event()`, which should be
    /// called until it gives `None` before the next packet is pushed.
    pub fn push(&mut self, buf: &[u8]) -> Option<Event> {
        self.process(buf);
        self.events.pop_front()
    }

    /// Takes the next event still queued from the packets pushed so far.
    pub fn next_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    fn process(&mut self, buf: &[u8]) {
        let pk = match packet::Packet::try_new(buf) {
            Some(pk) => pk,
            None => {
                warn!("ignoring {} byte packet without sync byte", buf.len());
                return;
            }
        };
        let pid = pk.pid();
        if pid == packet::Pid::STUFFING {
            return;
        }
        if pid == pat::PAT_PID {
            self.pat_packet(&pk);
            return;
        }
        if self.pmt_pids.contains(usize::from(pid)) {
            if let Some(event) = self.pmt_packet(&pk) {
                self.events.push_back(event);
            }
            return;
        }
        if self.mode == Mode::Introspect {
            return;
        }
        if let PidState::Scte35(_) = self.pid_states[usize::from(pid)] {
            self.scte35_packet(&pk);
            return;
        }
        if pk.payload_unit_start_indicator() {
            if let Some(program) = self.program_for_pid(pid) {
                self.pes_packet(program, &pk);
            }
        }
    }

    /// Adds the packet's payload to the PSI section being collected for its PID, returning the
    /// section once all of it is present.
    fn collect_section(&mut self, pk: &packet::Packet<'_>) -> Option<psi::SectionBuffer> {
        let pid = pk.pid();
        let payload = pk.payload()?;
        if pk.payload_unit_start_indicator() {
            if self.sections.contains_key(&pid) {
                debug!("{:?}: new section started before the last one completed", pid);
            }
            match psi::SectionBuffer::begin(payload) {
                Some(buf) => self.sections.insert(pid, buf),
                None => self.sections.remove(&pid),
            };
        } else if let Some(buf) = self.sections.get_mut(&pid) {
            buf.append(payload);
        } else {
            trace!("{:?}: ignoring section continuation with no start", pid);
            return None;
        }
        if self.sections.get(&pid)?.is_complete() {
            self.sections.remove(&pid)
        } else {
            None
        }
    }

    fn pat_packet(&mut self, pk: &packet::Packet<'_>) {
        let buf = match self.collect_section(pk) {
            Some(buf) => buf,
            None => return,
        };
        let section = match buf.section() {
            Some(section) => section,
            None => return,
        };
        if buf.header().table_id != pat::TABLE_ID {
            warn!(
                "expected PAT table_id {:#04x}, got {:#04x}",
                pat::TABLE_ID,
                buf.header().table_id
            );
            return;
        }
        let (_, body) = match psi::split_syntax_section(section) {
            Some(split) => split,
            None => return,
        };
        for desc in pat::PatSection::new(body).programs() {
            if let pat::ProgramDescriptor::Program {
                program_number,
                pid,
            } = desc
            {
                if !self.pmt_pids.contains(usize::from(pid)) {
                    debug!("program {} has PMT on {:?}", program_number, pid);
                    self.pmt_pids.insert(usize::from(pid));
                }
            }
        }
    }

    fn pmt_packet(&mut self, pk: &packet::Packet<'_>) -> Option<Event> {
        let buf = self.collect_section(pk)?;
        let section = buf.section()?;
        if buf.header().table_id != pmt::TABLE_ID {
            warn!(
                "{:?}: expected PMT table_id {:#04x}, got {:#04x}",
                pk.pid(),
                pmt::TABLE_ID,
                buf.header().table_id
            );
            return None;
        }
        let (header, body) = psi::split_syntax_section(section)?;
        let program_number = header.id();
        if let Some(target) = self.target_program {
            if target != program_number {
                trace!("ignoring PMT of program {}", program_number);
                return None;
            }
        }
        if self.programs.contains(&program_number) {
            return match self.mode {
                Mode::Decode => None,
                Mode::Introspect => Some(Event::Done),
            };
        }
        let pmt = pmt::PmtSection::from_bytes(body)?;
        debug!(
            "program {}: PMT version {} on {:?}",
            program_number,
            header.version(),
            pk.pid()
        );
        self.programs.insert(program_number);

        let streams: Vec<pmt::StreamInfo> = pmt.streams().collect();
        for stream in &streams {
            let pid = stream.elementary_pid;
            self.pid_programs.insert(pid, program_number);
            if stream.stream_type == StreamType::Scte35 {
                let state = &mut self.pid_states[usize::from(pid)];
                if let PidState::Unknown = state {
                    *state = PidState::Scte35(None);
                }
            }
        }
        let program = ProgramStreams {
            program_number,
            streams,
        };
        match self.mode {
            Mode::Decode => {
                for stream in &program.streams {
                    info!(
                        "program {}: pid {} [{:#04x}] {}",
                        program_number,
                        stream.elementary_pid,
                        u8::from(stream.stream_type),
                        stream.stream_type.description()
                    );
                }
                None
            }
            Mode::Introspect => Some(Event::Program(program)),
        }
    }

    fn scte35_packet(&mut self, pk: &packet::Packet<'_>) {
        let pid = pk.pid();
        let payload = match pk.payload() {
            Some(payload) => payload,
            None => return,
        };
        let mut assembly = match &mut self.pid_states[usize::from(pid)] {
            PidState::Scte35(assembly) => assembly.take(),
            _ => return,
        };
        let mut data = payload;
        if pk.payload_unit_start_indicator() {
            // pointer_field counts the bytes which still belong to the previous section
            let section_start = 1 + usize::from(payload[0]);
            if let Some(partial) = assembly.take() {
                let tail = payload.get(1..section_start).unwrap_or(&[]);
                if self.fill_cue(pid, partial, tail).0.is_some() {
                    debug!("{:?}: abandoning incomplete cue for new one", pid);
                }
            }
            if section_start <= payload.len() {
                data = &payload[section_start..];
            }
        } else if let Some(partial) = &assembly {
            let expected_cc = (partial.continuity_counter + 1) & 0b1111;
            if pk.continuity_counter() != expected_cc {
                debug!(
                    "{:?}: continuity_counter {} where {} expected during cue",
                    pid,
                    pk.continuity_counter(),
                    expected_cc
                );
            }
        }

        let mut searching = assembly.is_none();
        loop {
            let mut current = match assembly.take() {
                Some(current) => current,
                None if searching => {
                    match self.find_cue_start(pid, data) {
                        Some(start) => data = &data[start..],
                        None => return,
                    }
                    self.new_cue(pid)
                }
                None => {
                    // anything other than another section following the last is stuffing
                    if !data.get(..2).map_or(false, is_splice_marker) {
                        return;
                    }
                    self.new_cue(pid)
                }
            };
            searching = false;
            current.continuity_counter = pk.continuity_counter();
            let (incomplete, rest) = self.fill_cue(pid, current, data);
            if incomplete.is_some() {
                self.pid_states[usize::from(pid)] = PidState::Scte35(incomplete);
                return;
            }
            data = rest;
        }
    }

    /// Locates the first `splice_info_section` in the data, evicting the PID if there is none.
    fn find_cue_start(&mut self, pid: packet::Pid, data: &[u8]) -> Option<usize> {
        let start = find_splice_marker(data);
        if start.is_none() {
            warn!(
                "{:?}: no splice_info_section where one was expected; ignoring this PID from now on",
                pid
            );
            self.pid_states[usize::from(pid)] = PidState::Evicted;
        }
        start
    }

    fn new_cue(&self, pid: packet::Pid) -> CueAssembly {
        let program = self.program_for_pid(pid);
        let pts = program.and_then(|p| self.last_pts(p));
        CueAssembly {
            buf: Vec::new(),
            expected: None,
            wanted: true,
            packet_data: scte35::PacketData::new(pid.into(), program, pts),
            continuity_counter: 0,
        }
    }

    /// Adds bytes from `data` to the cue until the whole section is held, at which point the
    /// cue is finished.  Returns the assembly if it still needs more data, along with the part
    /// of `data` following the end of the section.
    fn fill_cue<'a>(
        &mut self,
        pid: packet::Pid,
        mut assembly: CueAssembly,
        mut data: &'a [u8],
    ) -> (Option<CueAssembly>, &'a [u8]) {
        loop {
            let target = assembly.target_len();
            let take = target.saturating_sub(assembly.buf.len()).min(data.len());
            assembly.buf.extend_from_slice(&data[..take]);
            data = &data[take..];
            if assembly.buf.len() < target {
                return (Some(assembly), data);
            }
            if assembly.expected.is_some() {
                self.finish_cue(pid, assembly);
                return (None, data);
            }
            let info_section = match scte35::InfoSection::from_bytes(&assembly.buf) {
                Ok(info_section) => info_section,
                Err(e) => {
                    debug!("{:?}: ignoring section: {}", pid, e);
                    return (None, data);
                }
            };
            let command_type = info_section.splice_command_type;
            if !self.command_types.contains(usize::from(command_type)) {
                trace!("{:?}: skipping splice_command_type {:#04x}", pid, command_type);
                assembly.wanted = false;
            }
            assembly.expected = Some(info_section.cue_len());
        }
    }

    fn finish_cue(&mut self, pid: packet::Pid, mut assembly: CueAssembly) {
        if !assembly.wanted {
            return;
        }
        assembly.buf.truncate(assembly.target_len());
        match scte35::Cue::decode(assembly.buf, assembly.packet_data) {
            Ok(cue) => self.events.push_back(Event::Cue(cue)),
            Err(e) => warn!("{:?}: dropping cue which could not be decoded: {}", pid, e),
        }
    }

    fn pes_packet(&mut self, program: u16, pk: &packet::Packet<'_>) {
        let pts = pk
            .payload()
            .and_then(pes::PesHeader::from_bytes)
            .and_then(|header| header.pts());
        if let Some(pts) = pts {
            self.program_pts.insert(program, pts);
        }
    }
}

/// Finds the start of a `splice_info_section`: a `table_id` of `0xfc`, followed by
/// `section_syntax_indicator` and `private_indicator` both zero, and the `sap_type` bits set.
fn find_splice_marker(payload: &[u8]) -> Option<usize> {
    payload.windows(2).position(is_splice_marker)
}

fn is_splice_marker(w: &[u8]) -> bool {
    w[0] == scte35::TABLE_ID && w[1] & 0b1111_0000 == 0b0011_0000
}
