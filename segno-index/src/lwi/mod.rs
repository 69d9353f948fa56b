// Segno
// Copyright (c) 2026 The Project Segno Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `lwi` module implements the textual, line-oriented, versioned index file format and its
//! bit-compatible reader.
//!
//! The writer streams records while the scan runs and back-patches the fixed-width active-stream
//! markers in place. The reader rebuilds all in-memory state from the file alone, then re-runs the
//! seek-method deciders purely from the reconstructed data, so that behaviour is identical to a
//! fresh scan.

mod reader;
mod writer;

pub use reader::{read_index, ParsedIndex};
pub use writer::{patch_active_streams, IndexWriter};

/// The index file layout version. Incremented on any layout-breaking change.
pub const INDEX_FILE_VERSION: u32 = 8;

/// The extension appended to the media path to name its index file.
pub const INDEX_FILE_EXTENSION: &str = "lwi";

/// The serialised form of an unset timestamp.
pub(crate) const NO_TIMESTAMP: i64 = i64::MIN;

/// Map an in-memory timestamp to its serialised form.
pub(crate) fn ts_to_file(ts: Option<i64>) -> i64 {
    ts.unwrap_or(NO_TIMESTAMP)
}

/// Map a serialised timestamp back to its in-memory form.
pub(crate) fn ts_from_file(value: i64) -> Option<i64> {
    (value != NO_TIMESTAMP).then_some(value)
}

/// Pull the value out of a `Key=value` field, verifying the key.
pub(crate) fn kv<'a>(part: Option<&'a str>, key: &str) -> Option<&'a str> {
    part?.strip_prefix(key)?.strip_prefix('=')
}

/// Parse a decimal integer field.
pub(crate) fn kv_int<T: std::str::FromStr>(part: Option<&str>, key: &str) -> Option<T> {
    kv(part, key)?.parse().ok()
}

/// Parse a `0x`-prefixed hexadecimal field.
pub(crate) fn kv_hex(part: Option<&str>, key: &str) -> Option<u64> {
    let value = kv(part, key)?;
    u64::from_str_radix(value.strip_prefix("0x").unwrap_or(value), 16).ok()
}

/// The first line of a per-packet record, common to video and audio.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct PacketLine {
    pub stream_index: i32,
    pub codec_type: u32,
    pub codec_id: u32,
    pub time_base_num: u32,
    pub time_base_den: u32,
    pub pos: i64,
    pub pts: i64,
    pub dts: i64,
    pub extra_data_index: i64,
}

impl PacketLine {
    pub fn parse(line: &str) -> Option<PacketLine> {
        let mut parts = line.split(',');

        let stream_index = kv_int(parts.next(), "Index")?;
        let codec_type = kv_int(parts.next(), "Type")?;
        let codec_id = kv_int(parts.next(), "Codec")?;

        let time_base = kv(parts.next(), "TimeBase")?;
        let (num, den) = time_base.split_once('/')?;
        let time_base_num = num.parse().ok()?;
        let time_base_den = den.parse().ok()?;

        let pos = kv_int(parts.next(), "POS")?;
        let pts = kv_int(parts.next(), "PTS")?;
        let dts = kv_int(parts.next(), "DTS")?;
        let extra_data_index = kv_int(parts.next(), "EDI")?;

        Some(PacketLine {
            stream_index,
            codec_type,
            codec_id,
            time_base_num,
            time_base_den,
            pos,
            pts,
            dts,
            extra_data_index,
        })
    }
}

/// The second line of a video packet record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct VideoPacketLine {
    pub pict_type: i32,
    pub key: u32,
    pub width: u32,
    pub height: u32,
    pub pixel_format: String,
    pub color_space: u32,
}

impl VideoPacketLine {
    pub fn parse(line: &str) -> Option<VideoPacketLine> {
        let mut parts = line.split(',');

        Some(VideoPacketLine {
            pict_type: kv_int(parts.next(), "Pic")?,
            key: kv_int(parts.next(), "Key")?,
            width: kv_int(parts.next(), "Width")?,
            height: kv_int(parts.next(), "Height")?,
            pixel_format: kv(parts.next(), "Format")?.to_string(),
            color_space: kv_int(parts.next(), "ColorSpace")?,
        })
    }
}

/// The second line of an audio packet record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct AudioPacketLine {
    pub channels: u32,
    pub channel_layout: u64,
    pub sample_rate: u32,
    pub sample_format: String,
    pub bits_per_sample: u32,
    pub frame_length: i32,
}

impl AudioPacketLine {
    pub fn parse(line: &str) -> Option<AudioPacketLine> {
        let mut parts = line.split(',');

        let channels_field = kv(parts.next(), "Channels")?;
        let (channels, layout) = channels_field.split_once(':')?;
        let channels = channels.parse().ok()?;
        let channel_layout =
            u64::from_str_radix(layout.strip_prefix("0x").unwrap_or(layout), 16).ok()?;

        Some(AudioPacketLine {
            channels,
            channel_layout,
            sample_rate: kv_int(parts.next(), "Rate")?,
            sample_format: kv(parts.next(), "Format")?.to_string(),
            bits_per_sample: kv_int(parts.next(), "BPS")?,
            frame_length: kv_int(parts.next(), "Length")?,
        })
    }
}

/// An entry line of a `StreamIndexEntries` section.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct IndexEntryLine {
    pub pos: i64,
    pub timestamp: i64,
    pub flags: u32,
    pub size: u32,
    pub min_distance: u32,
}

impl IndexEntryLine {
    pub fn parse(line: &str) -> Option<IndexEntryLine> {
        let mut parts = line.split(',');

        Some(IndexEntryLine {
            pos: kv_int(parts.next(), "POS")?,
            timestamp: kv_int(parts.next(), "TS")?,
            flags: u32::from_str_radix(kv(parts.next(), "Flags")?, 16).ok()?,
            size: kv_int(parts.next(), "Size")?,
            min_distance: kv_int(parts.next(), "Distance")?,
        })
    }
}

/// The header line of a video extra data entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct VideoExtraHeader {
    pub size: usize,
    pub codec_id: u32,
    pub codec_tag: u32,
    pub width: u32,
    pub height: u32,
    pub pixel_format: String,
    pub bits_per_sample: u32,
}

impl VideoExtraHeader {
    pub fn parse(line: &str) -> Option<VideoExtraHeader> {
        let mut parts = line.split(',');

        Some(VideoExtraHeader {
            size: kv_int(parts.next(), "Size")?,
            codec_id: kv_int(parts.next(), "Codec")?,
            codec_tag: kv_hex(parts.next(), "4CC")? as u32,
            width: kv_int(parts.next(), "Width")?,
            height: kv_int(parts.next(), "Height")?,
            pixel_format: kv(parts.next(), "Format")?.to_string(),
            bits_per_sample: kv_int(parts.next(), "BPS")?,
        })
    }
}

/// The header line of an audio extra data entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct AudioExtraHeader {
    pub size: usize,
    pub codec_id: u32,
    pub codec_tag: u32,
    pub channel_layout: u64,
    pub sample_rate: u32,
    pub sample_format: String,
    pub bits_per_sample: u32,
    pub block_align: u32,
}

impl AudioExtraHeader {
    pub fn parse(line: &str) -> Option<AudioExtraHeader> {
        let mut parts = line.split(',');

        Some(AudioExtraHeader {
            size: kv_int(parts.next(), "Size")?,
            codec_id: kv_int(parts.next(), "Codec")?,
            codec_tag: kv_hex(parts.next(), "4CC")? as u32,
            channel_layout: kv_hex(parts.next(), "Layout")?,
            sample_rate: kv_int(parts.next(), "Rate")?,
            sample_format: kv(parts.next(), "Format")?.to_string(),
            bits_per_sample: kv_int(parts.next(), "BPS")?,
            block_align: kv_int(parts.next(), "Align")?,
        })
    }
}

/// Parse a `<Tag=a,b,c>` section opener, returning the three values.
pub(crate) fn parse_section_header(line: &str, tag: &str) -> Option<(i32, u32, usize)> {
    let inner = line.strip_prefix('<')?.strip_suffix('>')?;
    let values = inner.strip_prefix(tag)?.strip_prefix('=')?;

    let mut parts = values.split(',');
    let stream_index = parts.next()?.parse().ok()?;
    let codec_type = parts.next()?.parse().ok()?;
    let count = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }

    Some((stream_index, codec_type, count))
}

/// Parse an `<Tag>value</Tag>` element, returning the value.
pub(crate) fn parse_element<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    line.strip_prefix('<')?
        .strip_prefix(tag)?
        .strip_prefix('>')?
        .strip_suffix('>')?
        .strip_suffix(tag)?
        .strip_suffix("</")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_packet_line_round_trip() {
        let line = "Index=0,Type=0,Codec=259,TimeBase=1001/24000,POS=1024,PTS=2002,DTS=0,EDI=0";
        let parsed = PacketLine::parse(line).unwrap();
        assert_eq!(parsed.stream_index, 0);
        assert_eq!(parsed.codec_type, 0);
        assert_eq!(parsed.codec_id, 259);
        assert_eq!(parsed.time_base_num, 1001);
        assert_eq!(parsed.time_base_den, 24000);
        assert_eq!(parsed.pos, 1024);
        assert_eq!(parsed.pts, 2002);
        assert_eq!(parsed.dts, 0);
        assert_eq!(parsed.extra_data_index, 0);

        // The unset-timestamp sentinel must round-trip.
        let line = format!("Index=1,Type=1,Codec=512,TimeBase=1/48000,POS=-1,PTS={},DTS={},EDI=-1", i64::MIN, i64::MIN);
        let parsed = PacketLine::parse(&line).unwrap();
        assert_eq!(ts_from_file(parsed.pts), None);
        assert_eq!(ts_from_file(parsed.dts), None);
        assert_eq!(parsed.extra_data_index, -1);
    }

    #[test]
    fn verify_malformed_packet_line_rejected() {
        assert!(PacketLine::parse("Index=0,Type=0").is_none());
        assert!(PacketLine::parse("Pic=1,Key=1,Width=0,Height=0,Format=none,ColorSpace=2").is_none());
        assert!(PacketLine::parse("Index=x,Type=0,Codec=1,TimeBase=1/1,POS=0,PTS=0,DTS=0,EDI=0").is_none());
    }

    #[test]
    fn verify_second_lines() {
        let video = VideoPacketLine::parse("Pic=1,Key=1,Width=1920,Height=1080,Format=yuv420p,ColorSpace=5").unwrap();
        assert_eq!(video.pict_type, 1);
        assert_eq!(video.key, 1);
        assert_eq!(video.width, 1920);
        assert_eq!(video.pixel_format, "yuv420p");
        assert_eq!(video.color_space, 5);

        let audio = AudioPacketLine::parse("Channels=2:0x3,Rate=48000,Format=fltp,BPS=32,Length=1024").unwrap();
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.channel_layout, 0x3);
        assert_eq!(audio.sample_rate, 48000);
        assert_eq!(audio.sample_format, "fltp");
        assert_eq!(audio.frame_length, 1024);

        let audio = AudioPacketLine::parse("Channels=0:0x0,Rate=0,Format=none,BPS=0,Length=-1").unwrap();
        assert_eq!(audio.frame_length, -1);
    }

    #[test]
    fn verify_section_and_element_parsing() {
        assert_eq!(parse_section_header("<StreamIndexEntries=2,1,17>", "StreamIndexEntries"), Some((2, 1, 17)));
        assert_eq!(parse_section_header("<ExtraDataList=0,0,1>", "ExtraDataList"), Some((0, 0, 1)));
        assert_eq!(parse_section_header("<ExtraDataList=0,0>", "ExtraDataList"), None);
        assert_eq!(parse_section_header("<Other=0,0,1>", "ExtraDataList"), None);

        assert_eq!(parse_element("<InputFilePath>a/b.mkv</InputFilePath>", "InputFilePath"), Some("a/b.mkv"));
        assert_eq!(
            parse_element("<ActiveVideoStreamIndex>-0000000001</ActiveVideoStreamIndex>", "ActiveVideoStreamIndex"),
            Some("-0000000001")
        );
        assert_eq!(parse_element("<A>x</B>", "A"), None);
    }
}
