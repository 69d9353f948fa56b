// Segno
// Copyright (c) 2026 The Project Segno Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The index file reader.
//!
//! Parsing rebuilds every piece of in-memory state from the file alone: the frame lists, the
//! extra data lists, the native seek tables, and — by re-running the seek-method deciders on the
//! reconstructed records — the seek flags, order converter, keyframe list, and A/V gap. The live
//! container is never consulted. Any malformed line fails the parse; the caller falls back to
//! re-creating the index.

use std::io::{BufRead, Seek};

use segno_core::codecs::well_known::CODEC_ID_DVVIDEO;
use segno_core::codecs::{
    default_channel_layout, CodecId, CodecType, PictureType, PixelFormat, SampleFormat,
    CODEC_ID_NULL,
};
use segno_core::demux::{FormatFlags, IndexEntry};
use segno_core::errors::{malformed_error, Error, Result};
use segno_core::units::TimeBase;

use crate::extradata::{ExtraData, ExtraDataList};
use crate::frame::{AudioFrameInfo, AudioFrameList, VideoFrameInfo, VideoFrameList};
use crate::indexer::DvLatch;
use crate::lwi::{
    parse_element, parse_section_header, ts_from_file, AudioExtraHeader, AudioPacketLine,
    IndexEntryLine, PacketLine, VideoExtraHeader, VideoPacketLine, INDEX_FILE_VERSION,
};
use crate::output::AudioOutputParams;
use crate::seek::{decide_audio_seek_method, decide_video_seek_method};
use crate::stream::{AudioStreamIndex, MediaIndex, VideoStreamIndex};
use crate::sync::calculate_av_gap;
use crate::IndexerOptions;

/// The result of a successful index file parse.
pub struct ParsedIndex {
    /// The reconstructed media index, with forced stream options already applied.
    pub media: MediaIndex,
    /// The media path recorded in the index file.
    pub file_path: String,
    /// The active video stream recorded in the marker line.
    pub recorded_video_index: i32,
    /// The active audio stream recorded in the marker line.
    pub recorded_audio_index: i32,
    /// The byte offset of the active-stream marker lines, for in-place re-patching.
    pub marker_pos: u64,
}

fn read_line<R: BufRead>(input: &mut R, line: &mut String) -> Result<bool> {
    line.clear();
    let read = input.read_line(line).map_err(Error::IndexFileIo)?;
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(read > 0)
}

fn require_line<R: BufRead>(input: &mut R, line: &mut String) -> Result<()> {
    if !read_line(input, line)? {
        return malformed_error("unexpected end of index file");
    }
    Ok(())
}

fn read_blob<R: BufRead>(input: &mut R, size: usize) -> Result<Box<[u8]>> {
    let mut blob = vec![0u8; size];
    input.read_exact(&mut blob).map_err(Error::IndexFileIo)?;

    let mut newline = [0u8; 1];
    input.read_exact(&mut newline).map_err(Error::IndexFileIo)?;
    if newline[0] != b'\n' {
        return malformed_error("extra data blob is not followed by a line break");
    }

    Ok(blob.into())
}

/// Parse an index file and rebuild the media index it describes.
///
/// Forced stream options are applied during the parse: a forced stream replaces the recorded
/// active stream, and a forced stream whose recorded state is incomplete fails the parse so the
/// caller re-creates the index from the container.
pub fn read_index<R: BufRead + Seek>(mut input: R, opts: &IndexerOptions) -> Result<ParsedIndex> {
    let mut line = String::new();

    // Version header. A mismatch fails fast before anything else is interpreted.
    require_line(&mut input, &mut line)?;
    let Some(version) = parse_element(&line, "LibavReaderIndexFile").and_then(|v| v.parse().ok())
    else {
        return malformed_error("missing version header");
    };
    if version != INDEX_FILE_VERSION {
        return Err(Error::VersionMismatch { found: version, expected: INDEX_FILE_VERSION });
    }

    require_line(&mut input, &mut line)?;
    let Some(file_path) = parse_element(&line, "InputFilePath").map(str::to_string) else {
        return malformed_error("missing input file path");
    };

    require_line(&mut input, &mut line)?;
    let Some((format_flags, format_name)) = parse_format_header(&line) else {
        return malformed_error("missing format header");
    };

    let marker_pos = input.stream_position().map_err(Error::IndexFileIo)?;

    require_line(&mut input, &mut line)?;
    let Some(recorded_video_index) =
        parse_element(&line, "ActiveVideoStreamIndex").and_then(|v| v.parse().ok())
    else {
        return malformed_error("missing active video stream marker");
    };
    require_line(&mut input, &mut line)?;
    let Some(recorded_audio_index) =
        parse_element(&line, "ActiveAudioStreamIndex").and_then(|v| v.parse().ok())
    else {
        return malformed_error("missing active audio stream marker");
    };

    let mut dv_in_avi = if format_name == "avi" { DvLatch::Pending } else { DvLatch::Disabled };

    let mut video_stream: i32 =
        if opts.force_video { opts.force_video_index } else { recorded_video_index };
    let audio_stream: i32 =
        if opts.force_audio { opts.force_audio_index } else { recorded_audio_index };

    // Video accumulation state.
    let mut video_frames = VideoFrameList::new();
    let mut video_codec = CODEC_ID_NULL;
    let mut video_time_base: Option<TimeBase> = None;
    let mut initial_width = 0u32;
    let mut initial_height = 0u32;
    let mut max_width = 0u32;
    let mut max_height = 0u32;
    let mut initial_pixel_format = PixelFormat::None;
    let mut initial_color_space: Option<u32> = None;
    let mut last_keyframe_pts: Option<i64> = None;

    // Audio accumulation state.
    let mut audio_frames = AudioFrameList::new();
    let mut audio_codec = CODEC_ID_NULL;
    let mut audio_time_base: Option<TimeBase> = None;
    let mut audio_sample_rate = 0u32;
    let mut audio_duration = 0u64;
    let mut constant_frame_length = true;
    let mut delay_count = 0u32;
    let mut flush_count = 0u32;
    let mut output = AudioOutputParams::default();

    // Per-packet record lines. The first line that is not a packet record ends the section.
    loop {
        require_line(&mut input, &mut line)?;
        let Some(packet) = PacketLine::parse(&line) else { break };

        match CodecType::from_u32(packet.codec_type) {
            Some(CodecType::Video) => {
                require_line(&mut input, &mut line)?;

                if dv_in_avi == DvLatch::Pending
                    && CodecId::new(packet.codec_id) == CODEC_ID_DVVIDEO
                    && !opts.force_audio
                {
                    dv_in_avi = DvLatch::Active;
                    if video_stream == -1 {
                        video_stream = packet.stream_index;
                    }
                }

                if packet.stream_index == video_stream {
                    let Some(picture) = VideoPacketLine::parse(&line) else {
                        return malformed_error("bad video record line");
                    };

                    if video_codec == CODEC_ID_NULL {
                        video_codec = CodecId::new(packet.codec_id);
                    }
                    if initial_width == 0 || initial_height == 0 {
                        initial_width = picture.width;
                        initial_height = picture.height;
                        max_width = picture.width;
                        max_height = picture.height;
                    }
                    else {
                        if max_width < picture.width {
                            max_width = picture.width;
                        }
                        if max_height < picture.height {
                            max_height = picture.height;
                        }
                    }
                    if initial_pixel_format == PixelFormat::None {
                        initial_pixel_format = PixelFormat::parse(&picture.pixel_format);
                    }
                    if initial_color_space.is_none() {
                        initial_color_space = Some(picture.color_space);
                    }
                    if video_time_base.is_none() && packet.time_base_num != 0 && packet.time_base_den != 0 {
                        video_time_base = Some(TimeBase::new(packet.time_base_num, packet.time_base_den));
                    }

                    let pts = ts_from_file(packet.pts);
                    let keyframe = picture.key != 0;
                    let sample_number = video_frames.len() + 1;
                    let is_leading = matches!(
                        (pts, last_keyframe_pts),
                        (Some(pts), Some(key_pts)) if pts < key_pts
                    );
                    if keyframe {
                        last_keyframe_pts = pts;
                    }

                    video_frames.push(VideoFrameInfo {
                        pts,
                        dts: ts_from_file(packet.dts),
                        file_offset: packet.pos,
                        sample_number,
                        extra_data_index: packet.extra_data_index.max(0) as usize,
                        pict_type: PictureType::from_i32(picture.pict_type),
                        keyframe,
                        is_leading,
                    });
                }
            }
            Some(CodecType::Audio) => {
                require_line(&mut input, &mut line)?;

                if packet.stream_index == audio_stream {
                    let Some(sound) = AudioPacketLine::parse(&line) else {
                        return malformed_error("bad audio record line");
                    };

                    if audio_codec == CODEC_ID_NULL {
                        audio_codec = CodecId::new(packet.codec_id);
                    }

                    let real = (sound.channels | sound.sample_rate | sound.bits_per_sample) != 0
                        || sound.channel_layout != 0;

                    if real && audio_duration <= i32::MAX as u64 {
                        if audio_sample_rate == 0 {
                            audio_sample_rate = sound.sample_rate;
                        }
                        if audio_time_base.is_none()
                            && packet.time_base_num != 0
                            && packet.time_base_den != 0
                        {
                            audio_time_base =
                                Some(TimeBase::new(packet.time_base_num, packet.time_base_den));
                        }

                        let layout = if sound.channel_layout == 0 {
                            default_channel_layout(sound.channels)
                        }
                        else {
                            sound.channel_layout
                        };
                        output.update(
                            layout,
                            SampleFormat::parse(&sound.sample_format),
                            audio_sample_rate,
                            sound.bits_per_sample,
                        );

                        let sample_number = audio_frames.len() + 1;
                        audio_frames.push(AudioFrameInfo {
                            pts: ts_from_file(packet.pts),
                            dts: ts_from_file(packet.dts),
                            file_offset: packet.pos,
                            sample_number,
                            extra_data_index: packet.extra_data_index.max(0) as usize,
                            sample_rate: sound.sample_rate,
                            frame_length: 0,
                            keyframe: false,
                        });

                        // Length assignment lags behind the packet by the decoder delay.
                        let count = audio_frames.len();
                        if sound.frame_length == -1 {
                            delay_count += 1;
                        }
                        else if count > delay_count {
                            let number = count - delay_count;
                            audio_frames[number].frame_length = sound.frame_length;
                            if number > 1
                                && audio_frames[number].frame_length
                                    != audio_frames[number - 1].frame_length
                            {
                                constant_frame_length = false;
                            }
                            audio_duration += sound.frame_length.max(0) as u64;
                        }
                    }
                    else if !real {
                        // A synthetic record drained from a delayed decoder after the end of the
                        // container. It carries the length of one outstanding delay slot.
                        flush_count += 1;
                        let count = audio_frames.len();
                        let number = count.wrapping_sub(delay_count).wrapping_add(flush_count);
                        if number < 1 || number > count {
                            return malformed_error("delay flush record without a matching frame");
                        }
                        audio_frames[number].frame_length = sound.frame_length;
                        if number > 1
                            && audio_frames[number].frame_length
                                != audio_frames[number - 1].frame_length
                        {
                            constant_frame_length = false;
                        }
                        audio_duration += sound.frame_length.max(0) as u64;
                    }
                    // Records past the sample-count clamp are preserved in the file but produce
                    // no in-memory state.
                }
            }
            _ => return malformed_error("unexpected codec type in packet record"),
        }
    }

    // A forced stream whose recorded state is incomplete means the index is stale.
    let video_present = recorded_video_index >= 0;
    let audio_present = recorded_audio_index >= 0;
    if video_present
        && opts.force_video
        && opts.force_video_index != -1
        && (video_frames.is_empty()
            || initial_pixel_format == PixelFormat::None
            || initial_width == 0
            || initial_height == 0)
    {
        return malformed_error("recorded video stream state is incomplete");
    }
    if audio_present
        && opts.force_audio
        && opts.force_audio_index != -1
        && (audio_frames.is_empty() || audio_duration == 0)
    {
        return malformed_error("recorded audio stream state is incomplete");
    }

    if line != "</LibavReaderIndex>" {
        return malformed_error("unterminated packet record section");
    }

    // Native seek tables.
    let mut video_index_entries: Vec<IndexEntry> = Vec::new();
    let mut audio_index_entries: Vec<IndexEntry> = Vec::new();

    require_line(&mut input, &mut line)?;
    while let Some((stream_index, codec_type, count)) =
        parse_section_header(&line, "StreamIndexEntries")
    {
        require_line(&mut input, &mut line)?;
        if count > 0 {
            let for_video = codec_type == CodecType::Video.as_u32() && stream_index == video_stream;
            let for_audio = codec_type == CodecType::Audio.as_u32() && stream_index == audio_stream;

            for _ in 0..count {
                if for_video || for_audio {
                    let Some(entry) = IndexEntryLine::parse(&line) else {
                        return malformed_error("bad stream index entry");
                    };
                    let entry = IndexEntry {
                        pos: entry.pos,
                        timestamp: entry.timestamp,
                        flags: entry.flags,
                        size: entry.size,
                        min_distance: entry.min_distance,
                    };
                    if for_video {
                        video_index_entries.push(entry);
                    }
                    else {
                        audio_index_entries.push(entry);
                    }
                }
                require_line(&mut input, &mut line)?;
            }
        }
        if line != "</StreamIndexEntries>" {
            return malformed_error("unterminated stream index entry section");
        }
        require_line(&mut input, &mut line)?;
    }

    // Extra data lists.
    let mut video_extra_data = ExtraDataList::new();
    let mut audio_extra_data = ExtraDataList::new();

    while let Some((stream_index, codec_type, count)) = parse_section_header(&line, "ExtraDataList")
    {
        require_line(&mut input, &mut line)?;
        if count > 0 {
            let for_video = codec_type == CodecType::Video.as_u32() && stream_index == video_stream;
            let for_audio = codec_type == CodecType::Audio.as_u32() && stream_index == audio_stream;

            for _ in 0..count {
                if for_video {
                    let Some(header) = VideoExtraHeader::parse(&line) else {
                        return malformed_error("bad video extra data header");
                    };
                    let data = read_blob(&mut input, header.size)?;
                    video_extra_data.push(ExtraData {
                        data,
                        codec_id: CodecId::new(header.codec_id),
                        codec_tag: header.codec_tag,
                        width: header.width,
                        height: header.height,
                        pixel_format: PixelFormat::parse(&header.pixel_format),
                        bits_per_sample: header.bits_per_sample,
                        ..Default::default()
                    });
                }
                else if for_audio {
                    let Some(header) = AudioExtraHeader::parse(&line) else {
                        return malformed_error("bad audio extra data header");
                    };
                    let data = read_blob(&mut input, header.size)?;
                    audio_extra_data.push(ExtraData {
                        data,
                        codec_id: CodecId::new(header.codec_id),
                        codec_tag: header.codec_tag,
                        channel_layout: header.channel_layout,
                        sample_rate: header.sample_rate,
                        sample_format: SampleFormat::parse(&header.sample_format),
                        bits_per_sample: header.bits_per_sample,
                        block_align: header.block_align,
                        ..Default::default()
                    });
                }
                else {
                    // Another stream's entry; the blob still has to be skipped by its size.
                    let Some(size) = crate::lwi::kv_int::<usize>(line.split(',').next(), "Size")
                    else {
                        return malformed_error("bad extra data header");
                    };
                    read_blob(&mut input, size)?;
                }
                require_line(&mut input, &mut line)?;
            }
        }
        if line != "</ExtraDataList>" {
            return malformed_error("unterminated extra data section");
        }
        require_line(&mut input, &mut line)?;
    }

    if line != "</LibavReaderIndexFile>" {
        return malformed_error("missing closing tag");
    }

    // Everything is reconstructed; re-run the deciders exactly as a fresh scan would.
    let mut media = MediaIndex {
        format_name,
        format_flags,
        video: None,
        audio: None,
        av_gap: 0,
        threads: opts.threads,
    };

    if video_stream >= 0 {
        if !video_frames.is_empty() {
            video_extra_data.set_current_index(video_frames[1].extra_data_index);
        }

        let (seek_flags, order_converter, keyframes) = decide_video_seek_method(
            &media.format_name,
            media.format_flags,
            video_codec,
            &mut video_frames,
        );

        media.video = Some(VideoStreamIndex {
            stream_index: video_stream as usize,
            codec_id: video_codec,
            time_base: video_time_base.unwrap_or_default(),
            seek_flags,
            frames: video_frames,
            keyframes,
            order_converter,
            extra_data: video_extra_data,
            index_entries: video_index_entries,
            initial_width,
            initial_height,
            max_width,
            max_height,
            initial_pixel_format,
            initial_color_space: initial_color_space.unwrap_or_default(),
        });
    }

    if audio_stream >= 0 {
        let mut dv_synthesised = false;

        if dv_in_avi == DvLatch::Active && audio_index_entries.is_empty() {
            // DV in AVI Type-1: the audio lives inside the video stream, so its records are the
            // video records.
            if let Some(video) = media.video.as_ref() {
                let count = video.frames.len().min(audio_frames.len());
                audio_frames.truncate(count);
                for i in 1..=count {
                    let source = &video.frames[i];
                    let target = &mut audio_frames[i];
                    target.keyframe = source.keyframe;
                    target.sample_number = source.sample_number;
                    target.pts = source.pts;
                    target.dts = source.dts;
                    target.file_offset = source.file_offset;
                    target.extra_data_index = source.extra_data_index;
                }
                dv_synthesised = true;
            }
            else {
                audio_frames.truncate(0);
            }
            if (opts.force_video && opts.force_video_index == -1)
                || (!opts.force_video && recorded_video_index == -1)
            {
                // The caller asked for no video; the DV stream only served audio synthesis.
                media.video = None;
            }
        }
        else if dv_in_avi == DvLatch::Active
            && ((!opts.force_video && recorded_video_index == -1)
                || (opts.force_video && opts.force_video_index == -1))
        {
            media.video = None;
        }

        if !audio_frames.is_empty() {
            audio_extra_data.set_current_index(audio_frames[1].extra_data_index);
        }

        let frame_length = if constant_frame_length && !audio_frames.is_empty() {
            audio_frames[1].frame_length
        }
        else {
            0
        };

        let seek_flags =
            decide_audio_seek_method(&media.format_name, media.format_flags, &mut audio_frames);

        if opts.av_sync {
            if let Some(video) = media.video.as_ref() {
                media.av_gap = calculate_av_gap(
                    &video.frames,
                    video.seek_flags,
                    &audio_frames,
                    seek_flags,
                    video.time_base,
                    audio_time_base.unwrap_or_default(),
                    audio_sample_rate,
                );
            }
        }

        media.audio = Some(AudioStreamIndex {
            stream_index: audio_stream as usize,
            codec_id: audio_codec,
            time_base: audio_time_base.unwrap_or_default(),
            seek_flags,
            frames: audio_frames,
            extra_data: audio_extra_data,
            index_entries: audio_index_entries,
            frame_length,
            dv_in_avi: dv_synthesised,
            output,
        });
    }

    Ok(ParsedIndex { media, file_path, recorded_video_index, recorded_audio_index, marker_pos })
}

fn parse_format_header(line: &str) -> Option<(FormatFlags, String)> {
    let inner = line.strip_prefix("<LibavReaderIndex=")?.strip_suffix('>')?;
    let (flags, name) = inner.split_once(',')?;
    let flags = u32::from_str_radix(flags.strip_prefix("0x").unwrap_or(flags), 16).ok()?;
    Some((FormatFlags::from_bits_retain(flags), name.to_string()))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use segno_core::codecs::well_known::CODEC_ID_H264;
    use segno_core::errors::Error;

    use super::read_index;
    use crate::seek::SeekFlags;
    use crate::IndexerOptions;

    // A small, hand-written index: one video stream, two frames, one parameter set.
    const SMALL_INDEX: &str = "<LibavReaderIndexFile=8>\n\
        <InputFilePath>movie.mkv</InputFilePath>\n\
        <LibavReaderIndex=0x00000000,matroska>\n\
        <ActiveVideoStreamIndex>+0000000000</ActiveVideoStreamIndex>\n\
        <ActiveAudioStreamIndex>-0000000001</ActiveAudioStreamIndex>\n\
        Index=0,Type=0,Codec=259,TimeBase=1/1000,POS=0,PTS=0,DTS=0,EDI=0\n\
        Pic=1,Key=1,Width=640,Height=360,Format=yuv420p,ColorSpace=2\n\
        Index=0,Type=0,Codec=259,TimeBase=1/1000,POS=100,PTS=40,DTS=40,EDI=0\n\
        Pic=2,Key=0,Width=640,Height=360,Format=yuv420p,ColorSpace=2\n\
        </LibavReaderIndex>\n\
        <StreamIndexEntries=0,0,0>\n\
        </StreamIndexEntries>\n\
        <ExtraDataList=0,0,1>\n\
        Size=3,Codec=259,4CC=0x0,Width=640,Height=360,Format=yuv420p,BPS=0\n\
        \x01\x02\x03\n\
        </ExtraDataList>\n\
        </LibavReaderIndexFile>\n";

    #[test]
    fn verify_reader_reconstructs_state() {
        let opts = IndexerOptions::default();
        let parsed = read_index(Cursor::new(SMALL_INDEX.as_bytes()), &opts).unwrap();

        assert_eq!(parsed.file_path, "movie.mkv");
        assert_eq!(parsed.recorded_video_index, 0);
        assert_eq!(parsed.recorded_audio_index, -1);

        let video = parsed.media.video.expect("video stream recorded");
        assert_eq!(video.codec_id, CODEC_ID_H264);
        assert_eq!(video.frames.len(), 2);
        assert_eq!(video.frames[1].pts, Some(0));
        assert_eq!(video.frames[2].pts, Some(40));
        assert_eq!(
            video.seek_flags,
            SeekFlags::PTS_BASED | SeekFlags::DTS_BASED | SeekFlags::POS_CORRECTION
        );
        assert!(video.keyframes.get(1));
        assert!(!video.keyframes.get(2));
        assert_eq!(video.initial_width, 640);
        assert_eq!(video.initial_height, 360);
        assert_eq!(video.extra_data.len(), 1);
        assert_eq!(video.extra_data.entries()[0].data.as_ref(), &[1, 2, 3]);
        assert!(parsed.media.audio.is_none());
    }

    #[test]
    fn verify_version_mismatch_fails_fast() {
        let index = SMALL_INDEX.replace("<LibavReaderIndexFile=8>", "<LibavReaderIndexFile=7>");
        let result = read_index(Cursor::new(index.as_bytes()), &IndexerOptions::default());
        assert!(matches!(result, Err(Error::VersionMismatch { found: 7, expected: 8 })));
    }

    #[test]
    fn verify_malformed_record_fails() {
        let index = SMALL_INDEX.replace(
            "Pic=2,Key=0,Width=640,Height=360,Format=yuv420p,ColorSpace=2",
            "Pic=2,Key=0,Width=broken",
        );
        let result = read_index(Cursor::new(index.as_bytes()), &IndexerOptions::default());
        assert!(matches!(result, Err(Error::Malformed(_))));
    }

    #[test]
    fn verify_truncated_file_fails() {
        let cut = SMALL_INDEX.find("</LibavReaderIndex>").unwrap();
        let result = read_index(Cursor::new(&SMALL_INDEX.as_bytes()[..cut]), &IndexerOptions::default());
        assert!(matches!(result, Err(Error::Malformed(_))));
    }

    #[test]
    fn verify_forced_stream_with_no_records_fails() {
        // Stream 2 is forced but the file records no packets for it.
        let opts = IndexerOptions {
            force_video: true,
            force_video_index: 2,
            ..Default::default()
        };
        let result = read_index(Cursor::new(SMALL_INDEX.as_bytes()), &opts);
        assert!(matches!(result, Err(Error::Malformed(_))));
    }

    #[test]
    fn verify_forcing_absent_audio_is_harmless() {
        // Audio was never recorded; forcing index -1 keeps it absent without failing.
        let opts =
            IndexerOptions { force_audio: true, force_audio_index: -1, ..Default::default() };
        let parsed = read_index(Cursor::new(SMALL_INDEX.as_bytes()), &opts).unwrap();
        assert!(parsed.media.audio.is_none());
        assert!(parsed.media.video.is_some());
    }
}
