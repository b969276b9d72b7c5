//! Extracts SCTE-35 splice cues from MPEG Transport Stream data (_ISO/IEC 13818-1_,
//! _ANSI/SCTE 35_).
//!
//! # Design principals
//!
//!  * *Pull based*.  A [`Stream`](stream/struct.Stream.html) owns a blocking `std::io::Read`
//!    source (a file, stdin, a pipe) and drives the read loop itself, invoking a caller supplied
//!    handler for each cue as it is found.
//!  * *Robust*.  Malformed data never aborts the read loop; at worst a packet is ignored, or a
//!    PID that produces garbage stops being inspected for cues.
//!  * *Separable*.  All parsing state lives in [`Demultiplex`](demultiplex/struct.Demultiplex.html),
//!    which does no I/O and accepts one 188-byte packet at a time, so it can be embedded where
//!    the caller already has packets in hand.
//!
//! # Example
//!
//! ```no_run
//! use mpeg2ts_scte35::{scte35, Stream};
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! let file = File::open("recording.ts").expect("open input");
//! let mut stream = Stream::new(BufReader::new(file), false);
//! stream.decode(scte35::show_cue).expect("read failed");
//! ```

pub mod demultiplex;
mod error;
pub mod packet;
pub mod pes;
pub mod psi;
pub mod scte35;
pub mod stream;

#[cfg(test)]
mod testdata;

pub use crate::error::Error;
pub use crate::scte35::Cue;
pub use crate::stream::Stream;

/// The identifier of the kind of data carried by an elementary stream, as given in the
/// _Program Map Table_.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum StreamType {
    // 0x00 reserved
    Iso11172Video,
    H262,
    Iso11172Audio,
    Iso138183Audio,
    H2220PrivateSections,
    H2220PesPrivateData,
    Mheg,
    H2220DsmCc,
    H2221,
    Iso138186MultiprotocolEncapsulation,
    DsmccUnMessages,
    DsmccStreamDescriptors,
    DsmccSections,
    H2220Auxiliary,
    Adts,
    Iso144962Visual,
    Latm,
    FlexMuxPes,
    FlexMuxIso14496Sections,
    SynchronizedDownloadProtocol,
    MetadataInPes,
    MetadataInMetadataSections,
    DsmccDataCarouselMetadata,
    DsmccObjectCarouselMetadata,
    SynchronizedDownloadProtocolMetadata,
    Ipmp,
    H264,
    // 0x1c-0x23 reserved
    H265,
    // 0x26-0x41 reserved
    ChineseVideoStandard,
    // 0x43-0x7f reserved
    // 0x80 privately defined
    AtscDolbyDigitalAudio,
    // 0x82-0x85 privately defined
    /// _ANSI/SCTE 35_ splice information, the streams this crate extracts cues from
    Scte35,
    AtscEnhancedAc3Audio,
    // 0x88-0x94 privately defined
    AtscDsmccNetworkResourcesTable,
    // 0x95-0xc1 privately defined
    AtscDsmccSynchronousData,
    // 0xc3-0xff privately defined,
    Private(u8),
    Reserved(u8),
}
impl From<u8> for StreamType {
    fn from(val: u8) -> Self {
        match val {
            0x01 => StreamType::Iso11172Video,
            0x02 => StreamType::H262,
            0x03 => StreamType::Iso11172Audio,
            0x04 => StreamType::Iso138183Audio,
            0x05 => StreamType::H2220PrivateSections,
            0x06 => StreamType::H2220PesPrivateData,
            0x07 => StreamType::Mheg,
            0x08 => StreamType::H2220DsmCc,
            0x09 => StreamType::H2221,
            0x0A => StreamType::Iso138186MultiprotocolEncapsulation,
            0x0B => StreamType::DsmccUnMessages,
            0x0C => StreamType::DsmccStreamDescriptors,
            0x0D => StreamType::DsmccSections,
            0x0E => StreamType::H2220Auxiliary,
            0x0F => StreamType::Adts,
            0x10 => StreamType::Iso144962Visual,
            0x11 => StreamType::Latm,
            0x12 => StreamType::FlexMuxPes,
            0x13 => StreamType::FlexMuxIso14496Sections,
            0x14 => StreamType::SynchronizedDownloadProtocol,
            0x15 => StreamType::MetadataInPes,
            0x16 => StreamType::MetadataInMetadataSections,
            0x17 => StreamType::DsmccDataCarouselMetadata,
            0x18 => StreamType::DsmccObjectCarouselMetadata,
            0x19 => StreamType::SynchronizedDownloadProtocolMetadata,
            0x1a => StreamType::Ipmp,
            0x1b => StreamType::H264,
            0x24 => StreamType::H265,
            0x42 => StreamType::ChineseVideoStandard,
            0x81 => StreamType::AtscDolbyDigitalAudio,
            0x86 => StreamType::Scte35,
            0x87 => StreamType::AtscEnhancedAc3Audio,
            0x95 => StreamType::AtscDsmccNetworkResourcesTable,
            0xc2 => StreamType::AtscDsmccSynchronousData,
            _ => {
                if val >= 0x80 {
                    StreamType::Private(val)
                } else {
                    StreamType::Reserved(val)
                }
            }
        }
    }
}

impl From<StreamType> for u8 {
    fn from(val: StreamType) -> Self {
        match val {
            StreamType::Iso11172Video => 0x01,
            StreamType::H262 => 0x02,
            StreamType::Iso11172Audio => 0x03,
            StreamType::Iso138183Audio => 0x04,
            StreamType::H2220PrivateSections => 0x05,
            StreamType::H2220PesPrivateData => 0x06,
            StreamType::Mheg => 0x07,
            StreamType::H2220DsmCc => 0x08,
            StreamType::H2221 => 0x09,
            StreamType::Iso138186MultiprotocolEncapsulation => 0x0A,
            StreamType::DsmccUnMessages => 0x0B,
            StreamType::DsmccStreamDescriptors => 0x0C,
            StreamType::DsmccSections => 0x0D,
            StreamType::H2220Auxiliary => 0x0E,
            StreamType::Adts => 0x0F,
            StreamType::Iso144962Visual => 0x10,
            StreamType::Latm => 0x11,
            StreamType::FlexMuxPes => 0x12,
            StreamType::FlexMuxIso14496Sections => 0x13,
            StreamType::SynchronizedDownloadProtocol => 0x14,
            StreamType::MetadataInPes => 0x15,
            StreamType::MetadataInMetadataSections => 0x16,
            StreamType::DsmccDataCarouselMetadata => 0x17,
            StreamType::DsmccObjectCarouselMetadata => 0x18,
            StreamType::SynchronizedDownloadProtocolMetadata => 0x19,
            StreamType::Ipmp => 0x1a,
            StreamType::H264 => 0x1b,
            StreamType::H265 => 0x24,
            StreamType::ChineseVideoStandard => 0x42,
            StreamType::AtscDolbyDigitalAudio => 0x81,
            StreamType::Scte35 => 0x86,
            StreamType::AtscEnhancedAc3Audio => 0x87,
            StreamType::AtscDsmccNetworkResourcesTable => 0x95,
            StreamType::AtscDsmccSynchronousData => 0xc2,
            StreamType::Reserved(val) => val,
            StreamType::Private(val) => val,
        }
    }
}

impl StreamType {
    /// A short human readable description, as printed by
    /// [`Stream::show()`](stream/struct.Stream.html#method.show).
    pub fn description(self) -> &'static str {
        match self {
            StreamType::Iso11172Video => "MPEG-1 Video",
            StreamType::H262 => "MPEG-2 Video",
            StreamType::Iso11172Audio => "MPEG-1 Audio",
            StreamType::Iso138183Audio => "MPEG-2 Audio",
            StreamType::H2220PrivateSections => "MPEG-2 Private Sections",
            StreamType::H2220PesPrivateData => "MPEG-2 PES Private Data",
            StreamType::Mheg => "MHEG",
            StreamType::H2220DsmCc => "DSM-CC",
            StreamType::H2221 => "H.222.1",
            StreamType::Iso138186MultiprotocolEncapsulation => "DSM-CC Multiprotocol Encapsulation",
            StreamType::DsmccUnMessages => "DSM-CC U-N Messages",
            StreamType::DsmccStreamDescriptors => "DSM-CC Stream Descriptors",
            StreamType::DsmccSections => "DSM-CC Sections",
            StreamType::H2220Auxiliary => "MPEG-2 Auxiliary",
            StreamType::Adts => "AAC ADTS Audio",
            StreamType::Iso144962Visual => "MPEG-4 Visual",
            StreamType::Latm => "AAC LATM Audio",
            StreamType::FlexMuxPes => "MPEG-4 FlexMux PES",
            StreamType::FlexMuxIso14496Sections => "MPEG-4 FlexMux Sections",
            StreamType::SynchronizedDownloadProtocol => "Synchronized Download Protocol",
            StreamType::MetadataInPes => "Metadata in PES",
            StreamType::MetadataInMetadataSections => "Metadata in Metadata Sections",
            StreamType::DsmccDataCarouselMetadata => "DSM-CC Data Carousel Metadata",
            StreamType::DsmccObjectCarouselMetadata => "DSM-CC Object Carousel Metadata",
            StreamType::SynchronizedDownloadProtocolMetadata => {
                "Synchronized Download Protocol Metadata"
            }
            StreamType::Ipmp => "MPEG-2 IPMP",
            StreamType::H264 => "AVC Video",
            StreamType::H265 => "HEVC Video",
            StreamType::ChineseVideoStandard => "AVS Video",
            StreamType::AtscDolbyDigitalAudio => "AC-3 Audio",
            StreamType::Scte35 => "SCTE-35 Splice Information",
            StreamType::AtscEnhancedAc3Audio => "E-AC-3 Audio",
            StreamType::AtscDsmccNetworkResourcesTable => "ATSC DSM-CC Network Resources",
            StreamType::AtscDsmccSynchronousData => "ATSC DSM-CC Synchronous Data",
            StreamType::Private(_) => "Privately Defined",
            StreamType::Reserved(_) => "Reserved",
        }
    }
}
