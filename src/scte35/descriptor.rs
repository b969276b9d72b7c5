//! Descriptors carried in the `splice_descriptor()` loop following the splice command.
//!
//! Descriptors with an identifier other than `CUEI` are private, and kept undecoded.

use super::{hex_bytes, truncated, CueError};
use bitstream_io::{BigEndian, BitRead, BitReader};
use serde::Serialize;
use std::io;

/// The identifier value used by all descriptors defined in _SCTE 35_.
pub const CUEI: u32 = 0x4355_4549;

const AVAIL_DESCRIPTOR: u8 = 0x00;
const DTMF_DESCRIPTOR: u8 = 0x01;
const SEGMENTATION_DESCRIPTOR: u8 = 0x02;
const TIME_DESCRIPTOR: u8 = 0x03;
const AUDIO_DESCRIPTOR: u8 = 0x04;

type Reader<'buf> = BitReader<&'buf [u8], BigEndian>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum SpliceDescriptor {
    Avail {
        provider_avail_id: u32,
    },
    Dtmf {
        /// tenths of a second
        preroll: u8,
        dtmf_chars: String,
    },
    Segmentation(SegmentationDescriptor),
    Time {
        tai_seconds: u64,
        tai_ns: u32,
        utc_offset: u16,
    },
    Audio {
        components: Vec<AudioComponent>,
    },
    Private {
        tag: u8,
        identifier: u32,
        #[serde(serialize_with = "hex_bytes")]
        private_bytes: Vec<u8>,
    },
}

impl SpliceDescriptor {
    const HEADER_SIZE: usize = 6;

    /// `buf` holds the whole descriptor, including tag and length.
    fn parse(buf: &[u8]) -> Result<SpliceDescriptor, CueError> {
        let tag = buf[0];
        let identifier = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]);
        let body = &buf[Self::HEADER_SIZE..];
        if identifier != CUEI {
            return Ok(Self::private(tag, identifier, body));
        }
        let mut r = BitReader::endian(body, BigEndian);
        let desc = match tag {
            AVAIL_DESCRIPTOR => SpliceDescriptor::Avail {
                provider_avail_id: r.read::<u32>(32).map_err(truncated("avail_descriptor"))?,
            },
            DTMF_DESCRIPTOR => read_dtmf(&mut r).map_err(truncated("DTMF_descriptor"))?,
            SEGMENTATION_DESCRIPTOR => SpliceDescriptor::Segmentation(
                SegmentationDescriptor::read(&mut r).map_err(truncated("segmentation_descriptor"))?,
            ),
            TIME_DESCRIPTOR => read_time(&mut r).map_err(truncated("time_descriptor"))?,
            AUDIO_DESCRIPTOR => read_audio(&mut r).map_err(truncated("audio_descriptor"))?,
            _ => Self::private(tag, identifier, body),
        };
        Ok(desc)
    }

    fn private(tag: u8, identifier: u32, body: &[u8]) -> SpliceDescriptor {
        SpliceDescriptor::Private {
            tag,
            identifier,
            private_bytes: body.to_vec(),
        }
    }
}

fn read_dtmf(r: &mut Reader<'_>) -> io::Result<SpliceDescriptor> {
    let preroll = r.read::<u8>(8)?;
    let dtmf_count = r.read::<u8>(3)?;
    r.skip(5)?;
    let mut chars = vec![0u8; usize::from(dtmf_count)];
    r.read_bytes(&mut chars)?;
    Ok(SpliceDescriptor::Dtmf {
        preroll,
        dtmf_chars: String::from_utf8_lossy(&chars).into_owned(),
    })
}

fn read_time(r: &mut Reader<'_>) -> io::Result<SpliceDescriptor> {
    Ok(SpliceDescriptor::Time {
        tai_seconds: r.read::<u64>(48)?,
        tai_ns: r.read::<u32>(32)?,
        utc_offset: r.read::<u16>(16)?,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioComponent {
    pub component_tag: u8,
    pub iso_code: String,
    pub bit_stream_mode: u8,
    pub num_channels: u8,
    pub full_srvc_audio: bool,
}

fn read_audio(r: &mut Reader<'_>) -> io::Result<SpliceDescriptor> {
    let audio_count = r.read::<u8>(4)?;
    r.skip(4)?;
    let mut components = Vec::with_capacity(usize::from(audio_count));
    for _ in 0..audio_count {
        let component_tag = r.read::<u8>(8)?;
        let mut iso_code = [0u8; 3];
        r.read_bytes(&mut iso_code)?;
        components.push(AudioComponent {
            component_tag,
            iso_code: String::from_utf8_lossy(&iso_code).into_owned(),
            bit_stream_mode: r.read::<u8>(3)?,
            num_channels: r.read::<u8>(4)?,
            full_srvc_audio: r.read_bit()?,
        });
    }
    Ok(SpliceDescriptor::Audio { components })
}

/// Restrictions on delivery of a segment, present unless `delivery_not_restricted_flag` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryRestrictions {
    pub web_delivery_allowed: bool,
    pub no_regional_blackout: bool,
    pub archive_allowed: bool,
    pub device_restrictions: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentationComponent {
    pub component_tag: u8,
    pub pts_offset: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SegmentationDescriptor {
    pub segmentation_event_id: u32,
    pub segmentation_event_cancel_indicator: bool,
    pub program_segmentation_flag: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_restrictions: Option<DeliveryRestrictions>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<SegmentationComponent>,
    /// 40-bit duration in 90kHz ticks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segmentation_duration: Option<u64>,
    pub segmentation_upid_type: u8,
    #[serde(serialize_with = "hex_bytes")]
    pub segmentation_upid: Vec<u8>,
    pub segmentation_type_id: u8,
    pub segment_num: u8,
    pub segments_expected: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_segment_num: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_segments_expected: Option<u8>,
}

impl SegmentationDescriptor {
    fn read(r: &mut Reader<'_>) -> io::Result<SegmentationDescriptor> {
        let mut desc = SegmentationDescriptor {
            segmentation_event_id: r.read::<u32>(32)?,
            segmentation_event_cancel_indicator: r.read_bit()?,
            ..SegmentationDescriptor::default()
        };
        r.skip(7)?;
        if desc.segmentation_event_cancel_indicator {
            return Ok(desc);
        }
        desc.program_segmentation_flag = r.read_bit()?;
        let duration_flag = r.read_bit()?;
        let delivery_not_restricted = r.read_bit()?;
        if delivery_not_restricted {
            r.skip(5)?;
        } else {
            desc.delivery_restrictions = Some(DeliveryRestrictions {
                web_delivery_allowed: r.read_bit()?,
                no_regional_blackout: r.read_bit()?,
                archive_allowed: r.read_bit()?,
                device_restrictions: r.read::<u8>(2)?,
            });
        }
        if !desc.program_segmentation_flag {
            let component_count = r.read::<u8>(8)?;
            for _ in 0..component_count {
                let component_tag = r.read::<u8>(8)?;
                r.skip(7)?;
                desc.components.push(SegmentationComponent {
                    component_tag,
                    pts_offset: r.read::<u64>(33)?,
                });
            }
        }
        if duration_flag {
            desc.segmentation_duration = Some(r.read::<u64>(40)?);
        }
        desc.segmentation_upid_type = r.read::<u8>(8)?;
        let upid_len = r.read::<u8>(8)?;
        desc.segmentation_upid = vec![0; usize::from(upid_len)];
        r.read_bytes(&mut desc.segmentation_upid)?;
        desc.segmentation_type_id = r.read::<u8>(8)?;
        desc.segment_num = r.read::<u8>(8)?;
        desc.segments_expected = r.read::<u8>(8)?;
        // only some segmentation types carry sub-segment fields, and older encoders omit them
        if matches!(desc.segmentation_type_id, 0x34 | 0x36 | 0x38 | 0x3a | 0x44 | 0x46) {
            desc.sub_segment_num = r.read::<u8>(8).ok();
            desc.sub_segments_expected = r.read::<u8>(8).ok();
        }
        Ok(desc)
    }
}

/// Iterator over the descriptors in a `splice_descriptor()` loop.  After the first error,
/// no further items are produced.
pub struct SpliceDescriptorIter<'buf> {
    buf: &'buf [u8],
}
impl<'buf> SpliceDescriptorIter<'buf> {
    pub fn new(buf: &'buf [u8]) -> SpliceDescriptorIter<'buf> {
        SpliceDescriptorIter { buf }
    }
}
impl<'buf> Iterator for SpliceDescriptorIter<'buf> {
    type Item = Result<SpliceDescriptor, CueError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        if self.buf.len() < SpliceDescriptor::HEADER_SIZE {
            let actual = self.buf.len();
            self.buf = &self.buf[0..0];
            return Some(Err(CueError::NotEnoughData {
                field: "splice_descriptor header",
                expected: SpliceDescriptor::HEADER_SIZE,
                actual,
            }));
        }
        let len = 2 + usize::from(self.buf[1]);
        if len < SpliceDescriptor::HEADER_SIZE || self.buf.len() < len {
            let actual = self.buf.len();
            self.buf = &self.buf[0..0];
            return Some(Err(CueError::NotEnoughData {
                field: "splice_descriptor",
                expected: len.max(SpliceDescriptor::HEADER_SIZE),
                actual,
            }));
        }
        let (desc, rest) = self.buf.split_at(len);
        self.buf = rest;
        Some(SpliceDescriptor::parse(desc))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;
    use hex_literal::*;

    fn parse_all(buf: &[u8]) -> Result<Vec<SpliceDescriptor>, CueError> {
        SpliceDescriptorIter::new(buf).collect()
    }

    #[test]
    fn avail_and_private() {
        let data = hex!(
            "0008 43554549 00000135
             7706 41424344 0102"
        );
        assert_eq!(
            parse_all(&data).unwrap(),
            vec![
                SpliceDescriptor::Avail {
                    provider_avail_id: 0x135
                },
                SpliceDescriptor::Private {
                    tag: 0x77,
                    identifier: 0x4142_4344,
                    private_bytes: vec![1, 2]
                },
            ]
        );
    }

    #[test]
    fn dtmf() {
        let data = hex!("0109 43554549 32 60 313233");
        assert_eq!(
            parse_all(&data).unwrap(),
            vec![SpliceDescriptor::Dtmf {
                preroll: 0x32,
                dtmf_chars: "123".to_string()
            }]
        );
    }

    #[test]
    fn segmentation() {
        let data = hex!(
            "0220 43554549
             4800008f 7f
             ff
             0000a4cb80
             0c 0a 31323334353637383930
             34 02 03
             00 00"
        );
        let descs = parse_all(&data).unwrap();
        assert_matches!(&descs[..], [SpliceDescriptor::Segmentation(seg)] => {
            assert_eq!(seg.segmentation_event_id, 0x4800_008f);
            assert!(seg.program_segmentation_flag);
            assert_eq!(seg.delivery_restrictions, None);
            assert_eq!(seg.segmentation_duration, Some(0xa4cb80));
            assert_eq!(seg.segmentation_upid_type, 0x0c);
            assert_eq!(seg.segmentation_upid, b"1234567890".to_vec());
            assert_eq!(seg.segmentation_type_id, 0x34);
            assert_eq!(seg.segment_num, 2);
            assert_eq!(seg.segments_expected, 3);
            assert_eq!(seg.sub_segment_num, Some(0));
            assert_eq!(seg.sub_segments_expected, Some(0));
        });
    }

    #[test]
    fn segmentation_with_restrictions() {
        let data = hex!(
            "020f 43554549
             00000001 7f
             9a
             00 00
             11 01 00"
        );
        let descs = parse_all(&data).unwrap();
        assert_matches!(&descs[..], [SpliceDescriptor::Segmentation(seg)] => {
            assert_eq!(
                seg.delivery_restrictions,
                Some(DeliveryRestrictions {
                    web_delivery_allowed: true,
                    no_regional_blackout: true,
                    archive_allowed: false,
                    device_restrictions: 2,
                })
            );
            assert_eq!(seg.segmentation_duration, None);
            assert!(seg.segmentation_upid.is_empty());
            assert_eq!(seg.segmentation_type_id, 0x11);
            assert_eq!(seg.sub_segment_num, None);
        });
    }

    #[test]
    fn provider_ad_sub_segments() {
        let data = hex!(
            "0211 43554549
             00000002 7f
             bf
             0c 00
             44 01 01
             02 04"
        );
        let descs = parse_all(&data).unwrap();
        assert_matches!(&descs[..], [SpliceDescriptor::Segmentation(seg)] => {
            assert_eq!(seg.segmentation_type_id, 0x44);
            assert_eq!(seg.delivery_restrictions, None);
            assert_eq!(seg.sub_segment_num, Some(2));
            assert_eq!(seg.sub_segments_expected, Some(4));
        });
    }

    #[test]
    fn time_and_audio() {
        let data = hex!(
            "0310 43554549 000012345678 00000064 0025
             040a 43554549 10 01 656e67 8f"
        );
        let descs = parse_all(&data).unwrap();
        assert_eq!(
            descs[0],
            SpliceDescriptor::Time {
                tai_seconds: 0x1234_5678,
                tai_ns: 100,
                utc_offset: 37
            }
        );
        assert_eq!(
            descs[1],
            SpliceDescriptor::Audio {
                components: vec![AudioComponent {
                    component_tag: 1,
                    iso_code: "eng".to_string(),
                    bit_stream_mode: 4,
                    num_channels: 7,
                    full_srvc_audio: true,
                }]
            }
        );
    }

    #[test]
    fn length_past_end() {
        let data = hex!("0010 43554549 0000");
        assert_matches!(
            parse_all(&data),
            Err(CueError::NotEnoughData {
                field: "splice_descriptor",
                ..
            })
        );
        assert_matches!(parse_all(&data[..3]), Err(CueError::NotEnoughData { .. }));
    }

    #[test]
    fn body_too_short_for_fields() {
        let data = hex!("0004 43554549");
        assert_eq!(
            parse_all(&data),
            Err(CueError::Truncated {
                field: "avail_descriptor"
            })
        );
    }
}
