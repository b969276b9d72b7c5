//! The read loop, pulling 188-byte packets from a byte source and feeding them to a
//! [`Demultiplex`](../demultiplex/struct.Demultiplex.html).

use crate::demultiplex::{Demultiplex, Event, Mode};
use crate::packet::Packet;
use crate::scte35::Cue;
use crate::Error;
use log::debug;
use std::io;
use std::ops::ControlFlow;

/// Extracts SCTE-35 cues from transport stream data read from `R`.
///
/// Each of the `decode*()` and `show*()` methods starts with fresh demultiplexer state, and runs
/// until the reader is exhausted (or, for `show()`, until all programs have been listed).
pub struct Stream<R: io::Read> {
    reader: R,
    show_null: bool,
}

impl<R: io::Read> Stream<R> {
    /// If `show_null` is true, `splice_null()` commands are passed to the handler along with
    /// all other cues.
    pub fn new(reader: R, show_null: bool) -> Stream<R> {
        Stream { reader, show_null }
    }

    /// Returns the underlying reader, positioned just after the last byte consumed.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Calls `handler` for each cue found in any program.
    pub fn decode<H: FnMut(Cue)>(&mut self, handler: H) -> Result<(), Error> {
        let demux = Demultiplex::new(self.show_null, Mode::Decode, None);
        self.run(demux, None, cue_handler(handler))
    }

    /// Calls `handler` for each cue in the given program, ignoring the content of all other
    /// programs.
    pub fn decode_program<H: FnMut(Cue)>(
        &mut self,
        program_number: u16,
        handler: H,
    ) -> Result<(), Error> {
        let demux = Demultiplex::new(self.show_null, Mode::Decode, Some(program_number));
        self.run(demux, None, cue_handler(handler))
    }

    /// Like `decode()`, but every byte read is also copied to standard output, so that the
    /// transport stream can continue down a pipeline.  The handler should avoid writing to
    /// standard output; see [`show_cue_stderr()`](../scte35/fn.show_cue_stderr.html).
    pub fn decode_proxy<H: FnMut(Cue)>(&mut self, handler: H) -> Result<(), Error> {
        let stdout = io::stdout();
        let mut out = io::BufWriter::new(stdout.lock());
        self.decode_proxy_to(&mut out, handler)
    }

    /// Like `decode_proxy()`, copying the input to the given sink instead of standard output.
    pub fn decode_proxy_to<W: io::Write, H: FnMut(Cue)>(
        &mut self,
        mut sink: W,
        handler: H,
    ) -> Result<(), Error> {
        let demux = Demultiplex::new(self.show_null, Mode::Decode, None);
        self.run(demux, Some(&mut sink), cue_handler(handler))?;
        sink.flush().map_err(Error::Write)
    }

    /// Lists the elementary streams of every program on standard error, stopping once a
    /// program is announced a second time.
    pub fn show(&mut self) -> Result<(), Error> {
        self.show_to(io::stderr().lock())
    }

    /// Like `show()`, writing the listing to the given output.
    pub fn show_to<W: io::Write>(&mut self, mut out: W) -> Result<(), Error> {
        let demux = Demultiplex::new(self.show_null, Mode::Introspect, None);
        self.run(demux, None, |event| match event {
            Event::Program(program) => {
                write!(out, "{}", program).map_err(Error::Write)?;
                Ok(ControlFlow::Continue(()))
            }
            Event::Done => Ok(ControlFlow::Break(())),
            Event::Cue(_) => Ok(ControlFlow::Continue(())),
        })?;
        out.flush().map_err(Error::Write)
    }

    fn run<F>(
        &mut self,
        mut demux: Demultiplex,
        mut proxy: Option<&mut dyn io::Write>,
        mut on_event: F,
    ) -> Result<(), Error>
    where
        F: FnMut(Event) -> Result<ControlFlow<()>, Error>,
    {
        let mut buf = [0u8; Packet::SIZE];

        // find the first sync byte
        let mut skipped = 0;
        loop {
            if self.read_full(&mut buf[..1])? == 0 {
                return Ok(());
            }
            forward(&mut proxy, &buf[..1])?;
            if Packet::is_sync_byte(buf[0]) {
                break;
            }
            skipped += 1;
        }
        if skipped > 0 {
            debug!("skipped {} bytes before first sync byte", skipped);
        }
        let mut have = 1;

        loop {
            let n = self.read_full(&mut buf[have..])?;
            forward(&mut proxy, &buf[have..have + n])?;
            have += n;
            if have < Packet::SIZE {
                if have > 0 {
                    debug!("discarding {} byte partial packet at end of input", have);
                }
                return Ok(());
            }
            let mut next = demux.push(&buf[..]);
            while let Some(event) = next {
                if on_event(event)?.is_break() {
                    return Ok(());
                }
                next = demux.next_event();
            }
            have = 0;
        }
    }

    /// Fills as much of `buf` as possible, returning less than `buf.len()` only at the end of
    /// the input.
    fn read_full(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.reader.read(&mut buf[n..]) {
                Ok(0) => break,
                Ok(len) => n += len,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(n)
    }
}

fn forward(proxy: &mut Option<&mut dyn io::Write>, data: &[u8]) -> Result<(), Error> {
    match proxy {
        Some(out) => out.write_all(data).map_err(Error::Write),
        None => Ok(()),
    }
}

fn cue_handler<H: FnMut(Cue)>(
    mut handler: H,
) -> impl FnMut(Event) -> Result<ControlFlow<()>, Error> {
    move |event| {
        if let Event::Cue(cue) = event {
            handler(cue);
        }
        Ok(ControlFlow::Continue(()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scte35::command;
    use crate::testdata;
    use assert_matches::assert_matches;
    use std::io::Cursor;

    const PMT_PID: u16 = 0x10;
    const SCTE35_PID: u16 = 0x20;

    fn splice_null_stream() -> Vec<u8> {
        [
            testdata::pat_packet(&[(1, PMT_PID)]),
            testdata::pmt_packet(PMT_PID, 1, &[(0x86, SCTE35_PID)]),
            testdata::section_packet(
                SCTE35_PID,
                &testdata::cue_section(command::SPLICE_NULL, &[], &[]),
            ),
        ]
        .concat()
    }

    fn insert_packet(pid: u16) -> Vec<u8> {
        testdata::section_packet(
            pid,
            &testdata::cue_section(
                command::SPLICE_INSERT,
                &[0, 0, 0, 9, 0x7f, 0xdf, 0, 1, 1, 1],
                &[],
            ),
        )
    }

    fn collect<F>(f: F) -> Vec<Cue>
    where
        F: FnOnce(&mut dyn FnMut(Cue)) -> Result<(), Error>,
    {
        let mut cues = vec![];
        f(&mut |cue| cues.push(cue)).unwrap();
        cues
    }

    #[test]
    fn splice_null_with_show_null() {
        let data = splice_null_stream();
        let mut stream = Stream::new(&data[..], true);
        let cues = collect(|h| stream.decode(h));
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].packet_data.program, Some(1));
        assert_eq!(cues[0].packet_data.pid, SCTE35_PID);
        assert_eq!(cues[0].command_type(), command::SPLICE_NULL);
    }

    #[test]
    fn splice_null_hidden_by_default() {
        let data = splice_null_stream();
        let mut stream = Stream::new(&data[..], false);
        assert!(collect(|h| stream.decode(h)).is_empty());
    }

    #[test]
    fn single_splice_insert() {
        let data = [
            testdata::pat_packet(&[(1, PMT_PID)]),
            testdata::pmt_packet(PMT_PID, 1, &[(0x1b, 0x100), (0x86, SCTE35_PID)]),
            testdata::pes_packet(0x100, 90_000),
            insert_packet(SCTE35_PID),
        ]
        .concat();
        let mut stream = Stream::new(&data[..], false);
        let cues = collect(|h| stream.decode(h));
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].packet_data.pid, SCTE35_PID);
        assert_eq!(cues[0].packet_data.pts, Some(1.0));
    }

    #[test]
    fn leading_garbage_skipped() {
        let mut data = vec![0x00, 0x12, 0xff];
        data.extend_from_slice(&splice_null_stream());
        let mut stream = Stream::new(&data[..], true);
        assert_eq!(collect(|h| stream.decode(h)).len(), 1);
    }

    #[test]
    fn only_target_program() {
        let data = [
            testdata::pat_packet(&[(1, PMT_PID), (2, 0x11)]),
            testdata::pmt_packet(PMT_PID, 1, &[(0x86, SCTE35_PID)]),
            testdata::pmt_packet(0x11, 2, &[(0x86, 0x21)]),
            insert_packet(SCTE35_PID),
            insert_packet(0x21),
            insert_packet(SCTE35_PID),
        ]
        .concat();
        let mut stream = Stream::new(&data[..], false);
        let cues = collect(|h| stream.decode_program(2, h));
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].packet_data.program, Some(2));

        let mut stream = Stream::new(&data[..], false);
        assert_eq!(collect(|h| stream.decode(h)).len(), 3);
    }

    #[test]
    fn proxy_copies_input_exactly() {
        let mut data = vec![0xaa, 0xbb];
        data.extend_from_slice(&splice_null_stream());
        data.extend_from_slice(&insert_packet(SCTE35_PID));
        data.extend_from_slice(&[0x47; 100]);
        let mut out = vec![];
        let mut stream = Stream::new(&data[..], false);
        let cues = collect(|h| stream.decode_proxy_to(&mut out, h));
        assert_eq!(cues.len(), 1);
        assert_eq!(out, data);
    }

    #[test]
    fn proxy_without_cues() {
        let data: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();
        let mut out = vec![];
        let mut stream = Stream::new(&data[..], false);
        assert!(collect(|h| stream.decode_proxy_to(&mut out, h)).is_empty());
        assert_eq!(out, data);
    }

    #[test]
    fn show_stops_at_repeated_program() {
        let pmt = testdata::pmt_packet(PMT_PID, 1, &[(0x1b, 0x100), (0x86, SCTE35_PID)]);
        let mut data = [testdata::pat_packet(&[(1, PMT_PID)]), pmt.clone(), pmt].concat();
        let consumed = data.len();
        data.extend_from_slice(&insert_packet(SCTE35_PID));
        let mut out = vec![];
        let mut stream = Stream::new(Cursor::new(data), false);
        stream.show_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Program: 1\n    256: [0x1b] AVC Video\n    32: [0x86] SCTE-35 Splice Information\n"
        );
        assert_eq!(stream.into_inner().position(), consumed as u64);
    }

    #[test]
    fn empty_input() {
        let mut stream = Stream::new(io::empty(), true);
        assert!(collect(|h| stream.decode(h)).is_empty());
    }

    struct FailingReader;
    impl io::Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "broken"))
        }
    }

    struct FailingWriter;
    impl io::Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn read_failure_reported() {
        let mut stream = Stream::new(FailingReader, false);
        assert_matches!(stream.decode(|_| ()), Err(Error::Read(_)));
    }

    #[test]
    fn proxy_failure_reported() {
        let data = splice_null_stream();
        let mut stream = Stream::new(&data[..], false);
        assert_matches!(
            stream.decode_proxy_to(FailingWriter, |_| ()),
            Err(Error::Write(_))
        );
    }
}
