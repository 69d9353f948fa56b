// Segno
// Copyright (c) 2026 The Project Segno Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The index file writer.
//!
//! The writer streams one record per packet while the scan runs. The two active-stream marker
//! lines are written with a fixed field width and their byte offsets remembered, so a later
//! election change can overwrite them in place without shifting the rest of the file.

use std::io::{Seek, SeekFrom, Write};

use segno_core::codecs::{CodecId, CodecState, CodecType, PictureType};
use segno_core::demux::{FormatFlags, IndexEntry};
use segno_core::errors::{Error, Result};
use segno_core::packet::Packet;
use segno_core::units::TimeBase;

use crate::extradata::ExtraData;
use crate::lwi::{ts_to_file, INDEX_FILE_VERSION, NO_TIMESTAMP};

/// A streaming writer of the index file format.
pub struct IndexWriter<W: Write + Seek> {
    out: W,
    video_marker_pos: u64,
    audio_marker_pos: u64,
}

impl<W: Write + Seek> IndexWriter<W> {
    /// Write the index file header and the placeholder active-stream markers.
    pub fn new(
        mut out: W,
        file_path: &str,
        format_flags: FormatFlags,
        format_name: &str,
    ) -> Result<IndexWriter<W>> {
        let mut header = || -> std::io::Result<(u64, u64)> {
            writeln!(out, "<LibavReaderIndexFile={}>", INDEX_FILE_VERSION)?;
            writeln!(out, "<InputFilePath>{}</InputFilePath>", file_path)?;
            writeln!(out, "<LibavReaderIndex=0x{:08x},{}>", format_flags.bits(), format_name)?;
            let video_marker_pos = out.stream_position()?;
            writeln!(out, "<ActiveVideoStreamIndex>{:+011}</ActiveVideoStreamIndex>", -1)?;
            let audio_marker_pos = out.stream_position()?;
            writeln!(out, "<ActiveAudioStreamIndex>{:+011}</ActiveAudioStreamIndex>", -1)?;
            Ok((video_marker_pos, audio_marker_pos))
        };

        match header() {
            Ok((video_marker_pos, audio_marker_pos)) => {
                Ok(IndexWriter { out, video_marker_pos, audio_marker_pos })
            }
            Err(err) => Err(Error::IndexFileIo(err)),
        }
    }

    /// Rewrite the active video stream marker in place.
    pub fn set_active_video_stream(&mut self, stream_index: i32) -> Result<()> {
        self.patch_marker(self.video_marker_pos, "ActiveVideoStreamIndex", stream_index)
    }

    /// Rewrite the active audio stream marker in place.
    pub fn set_active_audio_stream(&mut self, stream_index: i32) -> Result<()> {
        self.patch_marker(self.audio_marker_pos, "ActiveAudioStreamIndex", stream_index)
    }

    fn patch_marker(&mut self, pos: u64, tag: &str, stream_index: i32) -> Result<()> {
        let mut patch = || -> std::io::Result<()> {
            let current = self.out.stream_position()?;
            self.out.seek(SeekFrom::Start(pos))?;
            writeln!(self.out, "<{}>{:+011}</{}>", tag, stream_index, tag)?;
            self.out.seek(SeekFrom::Start(current))?;
            Ok(())
        };
        patch().map_err(Error::IndexFileIo)
    }

    /// Write the two record lines of a video packet.
    #[allow(clippy::too_many_arguments)]
    pub fn write_video_packet(
        &mut self,
        pkt: &Packet,
        state: &CodecState,
        time_base: TimeBase,
        extra_data_index: i64,
        pict_type: PictureType,
    ) -> Result<()> {
        let mut write = || -> std::io::Result<()> {
            writeln!(
                self.out,
                "Index={},Type={},Codec={},TimeBase={}/{},POS={},PTS={},DTS={},EDI={}",
                pkt.stream_index,
                CodecType::Video.as_u32(),
                state.codec_id.get(),
                time_base.num,
                time_base.den,
                pkt.pos,
                ts_to_file(pkt.pts),
                ts_to_file(pkt.dts),
                extra_data_index,
            )?;
            writeln!(
                self.out,
                "Pic={},Key={},Width={},Height={},Format={},ColorSpace={}",
                pict_type.as_i32(),
                u32::from(pkt.is_key()),
                state.width,
                state.height,
                state.pixel_format,
                state.color_space,
            )?;
            Ok(())
        };
        write().map_err(Error::IndexFileIo)
    }

    /// Write the two record lines of an audio packet.
    #[allow(clippy::too_many_arguments)]
    pub fn write_audio_packet(
        &mut self,
        pkt: &Packet,
        state: &CodecState,
        time_base: TimeBase,
        extra_data_index: i64,
        bits_per_sample: u32,
        frame_length: i32,
    ) -> Result<()> {
        let mut write = || -> std::io::Result<()> {
            writeln!(
                self.out,
                "Index={},Type={},Codec={},TimeBase={}/{},POS={},PTS={},DTS={},EDI={}",
                pkt.stream_index,
                CodecType::Audio.as_u32(),
                state.codec_id.get(),
                time_base.num,
                time_base.den,
                pkt.pos,
                ts_to_file(pkt.pts),
                ts_to_file(pkt.dts),
                extra_data_index,
            )?;
            writeln!(
                self.out,
                "Channels={}:0x{:x},Rate={},Format={},BPS={},Length={}",
                state.channels,
                state.channel_layout,
                state.sample_rate,
                state.sample_format,
                bits_per_sample,
                frame_length,
            )?;
            Ok(())
        };
        write().map_err(Error::IndexFileIo)
    }

    /// Write the two record lines of a synthetic audio packet drained from a delayed decoder
    /// after the end of the container. Timestamps are unset, the position unknown, and no
    /// parameter set applies.
    pub fn write_synthetic_audio_packet(
        &mut self,
        stream_index: usize,
        codec_id: CodecId,
        time_base: TimeBase,
        frame_length: i32,
    ) -> Result<()> {
        let mut write = || -> std::io::Result<()> {
            writeln!(
                self.out,
                "Index={},Type={},Codec={},TimeBase={}/{},POS=-1,PTS={},DTS={},EDI=-1",
                stream_index,
                CodecType::Audio.as_u32(),
                codec_id.get(),
                time_base.num,
                time_base.den,
                NO_TIMESTAMP,
                NO_TIMESTAMP,
            )?;
            writeln!(self.out, "Channels=0:0x0,Rate=0,Format=none,BPS=0,Length={}", frame_length)?;
            Ok(())
        };
        write().map_err(Error::IndexFileIo)
    }

    /// Close the per-packet record section.
    pub fn finish_packets(&mut self) -> Result<()> {
        writeln!(self.out, "</LibavReaderIndex>").map_err(Error::IndexFileIo)
    }

    /// Write one stream's native seek table section.
    pub fn write_index_entries(
        &mut self,
        stream_index: usize,
        codec_type: CodecType,
        entries: &[IndexEntry],
    ) -> Result<()> {
        let mut write = || -> std::io::Result<()> {
            writeln!(
                self.out,
                "<StreamIndexEntries={},{},{}>",
                stream_index,
                codec_type.as_u32(),
                entries.len()
            )?;
            for entry in entries {
                writeln!(
                    self.out,
                    "POS={},TS={},Flags={:x},Size={},Distance={}",
                    entry.pos, entry.timestamp, entry.flags, entry.size, entry.min_distance
                )?;
            }
            writeln!(self.out, "</StreamIndexEntries>")?;
            Ok(())
        };
        write().map_err(Error::IndexFileIo)
    }

    /// Write one stream's extra data section, blobs included.
    pub fn write_extra_data_list(
        &mut self,
        stream_index: usize,
        codec_type: CodecType,
        entries: &[ExtraData],
    ) -> Result<()> {
        let mut write = || -> std::io::Result<()> {
            writeln!(
                self.out,
                "<ExtraDataList={},{},{}>",
                stream_index,
                codec_type.as_u32(),
                entries.len()
            )?;
            for entry in entries {
                match codec_type {
                    CodecType::Video => writeln!(
                        self.out,
                        "Size={},Codec={},4CC=0x{:x},Width={},Height={},Format={},BPS={}",
                        entry.data.len(),
                        entry.codec_id.get(),
                        entry.codec_tag,
                        entry.width,
                        entry.height,
                        entry.pixel_format,
                        entry.bits_per_sample,
                    )?,
                    _ => writeln!(
                        self.out,
                        "Size={},Codec={},4CC=0x{:x},Layout=0x{:x},Rate={},Format={},BPS={},Align={}",
                        entry.data.len(),
                        entry.codec_id.get(),
                        entry.codec_tag,
                        entry.channel_layout,
                        entry.sample_rate,
                        entry.sample_format,
                        entry.bits_per_sample,
                        entry.block_align,
                    )?,
                }
                self.out.write_all(&entry.data)?;
                writeln!(self.out)?;
            }
            writeln!(self.out, "</ExtraDataList>")?;
            Ok(())
        };
        write().map_err(Error::IndexFileIo)
    }

    /// Write the closing tag and flush.
    pub fn finish(&mut self) -> Result<()> {
        let mut write = || -> std::io::Result<()> {
            writeln!(self.out, "</LibavReaderIndexFile>")?;
            self.out.flush()?;
            Ok(())
        };
        write().map_err(Error::IndexFileIo)
    }
}

/// Rewrite both active-stream markers of an existing index file in place.
///
/// Used when a reopened index is valid but forced stream options elected different streams than
/// the ones recorded. The markers are adjacent fixed-width lines starting at `marker_pos`.
pub fn patch_active_streams<W: Write + Seek>(
    mut out: W,
    marker_pos: u64,
    video_stream: i32,
    audio_stream: i32,
) -> Result<()> {
    let mut patch = || -> std::io::Result<()> {
        out.seek(SeekFrom::Start(marker_pos))?;
        writeln!(out, "<ActiveVideoStreamIndex>{:+011}</ActiveVideoStreamIndex>", video_stream)?;
        writeln!(out, "<ActiveAudioStreamIndex>{:+011}</ActiveAudioStreamIndex>", audio_stream)?;
        out.flush()?;
        Ok(())
    };
    patch().map_err(Error::IndexFileIo)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use segno_core::demux::FormatFlags;

    use super::IndexWriter;

    #[test]
    fn verify_header_and_marker_patching() {
        let mut buffer = Cursor::new(Vec::new());
        let mut writer =
            IndexWriter::new(&mut buffer, "movie.mkv", FormatFlags::GENERIC_INDEX, "matroska")
                .unwrap();

        writer.set_active_video_stream(0).unwrap();
        writer.set_active_audio_stream(1).unwrap();
        writer.finish_packets().unwrap();
        writer.finish().unwrap();

        let text = String::from_utf8(buffer.into_inner()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("<LibavReaderIndexFile=8>"));
        assert_eq!(lines.next(), Some("<InputFilePath>movie.mkv</InputFilePath>"));
        assert_eq!(lines.next(), Some("<LibavReaderIndex=0x00000040,matroska>"));
        // Markers were patched in place without disturbing line boundaries.
        assert_eq!(lines.next(), Some("<ActiveVideoStreamIndex>+0000000000</ActiveVideoStreamIndex>"));
        assert_eq!(lines.next(), Some("<ActiveAudioStreamIndex>+0000000001</ActiveAudioStreamIndex>"));
        assert_eq!(lines.next(), Some("</LibavReaderIndex>"));
        assert_eq!(lines.next(), Some("</LibavReaderIndexFile>"));
    }

    #[test]
    fn verify_marker_width_is_stable() {
        // The fixed field width must make every possible value the same length, so in-place
        // rewriting can never overrun the reserved line.
        let wide = format!("{:+011}", i32::MIN);
        let narrow = format!("{:+011}", 0);
        assert_eq!(wide.len(), narrow.len());
    }
}
