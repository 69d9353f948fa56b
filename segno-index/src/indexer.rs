// Segno
// Copyright (c) 2026 The Project Segno Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `indexer` module scans a container once, packet by packet, and accumulates the frame
//! records, parameter sets, and stream elections that make up a media index, streaming the index
//! file along the way.

use std::collections::{HashMap, HashSet};
use std::io::{Seek, Write};

use log::{debug, warn};

use segno_core::codecs::well_known::CODEC_ID_DVVIDEO;
use segno_core::codecs::{default_channel_layout, CodecId, CodecState, CodecType, PixelFormat, CODEC_ID_NULL};
use segno_core::demux::{CodecSupport, Demuxer};
use segno_core::errors::{Error, Result};
use segno_core::units::TimeBase;

use crate::extradata::ExtraDataList;
use crate::frame::{AudioFrameInfo, AudioFrameList, VideoFrameInfo, VideoFrameList};
use crate::lwi::IndexWriter;
use crate::output::AudioOutputParams;
use crate::probe::ParserProbe;
use crate::seek::{decide_audio_seek_method, decide_video_seek_method};
use crate::stream::{AudioStreamIndex, MediaIndex, VideoStreamIndex};
use crate::sync::calculate_av_gap;
use crate::{IndexerOptions, Progress};

/// The DV-in-AVI detection latch.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum DvLatch {
    /// The container cannot be DV-in-AVI Type-1.
    Disabled,
    /// An AVI container; detection pending on the first DV video packet.
    Pending,
    /// DV-in-AVI Type-1 detected.
    Active,
}

/// Accumulated state of the elected video stream during a scan.
struct VideoScan {
    stream_index: Option<usize>,
    codec_id: CodecId,
    time_base: TimeBase,
    resolution: u64,
    frames: VideoFrameList,
    last_keyframe_pts: Option<i64>,
    initial_width: u32,
    initial_height: u32,
    max_width: u32,
    max_height: u32,
    initial_pixel_format: PixelFormat,
    initial_color_space: u32,
}

impl VideoScan {
    fn new() -> Self {
        VideoScan {
            stream_index: None,
            codec_id: CODEC_ID_NULL,
            time_base: TimeBase::default(),
            resolution: 0,
            frames: VideoFrameList::new(),
            last_keyframe_pts: None,
            initial_width: 0,
            initial_height: 0,
            max_width: 0,
            max_height: 0,
            initial_pixel_format: PixelFormat::None,
            initial_color_space: 0,
        }
    }

    /// Elect `stream_index`, wiping everything accumulated for the previous election.
    fn reset(&mut self, stream_index: usize, state: &CodecState, time_base: TimeBase) {
        self.stream_index = Some(stream_index);
        self.codec_id = state.codec_id;
        self.time_base = time_base;
        self.resolution = u64::from(state.width) * u64::from(state.height);
        self.frames.clear();
        self.last_keyframe_pts = None;
        self.initial_width = state.width;
        self.initial_height = state.height;
        self.max_width = state.width;
        self.max_height = state.height;
        self.initial_pixel_format = state.pixel_format;
        self.initial_color_space = state.color_space;
    }
}

/// Accumulated state of the elected audio stream during a scan.
struct AudioScan {
    stream_index: Option<usize>,
    codec_id: CodecId,
    time_base: TimeBase,
    frames: AudioFrameList,
    sample_rate: u32,
    duration: u64,
    constant_frame_length: bool,
    output: AudioOutputParams,
}

impl AudioScan {
    fn new() -> Self {
        AudioScan {
            stream_index: None,
            codec_id: CODEC_ID_NULL,
            time_base: TimeBase::default(),
            frames: AudioFrameList::new(),
            sample_rate: 0,
            duration: 0,
            constant_frame_length: true,
            output: AudioOutputParams::default(),
        }
    }
}

/// Scan the container and build a media index, streaming the index file through `writer` when
/// one is given.
///
/// The writer must already hold the file header; this function appends the per-packet records,
/// rewrites the active-stream markers on every election change, and emits the trailing sections.
pub fn create_index<W: Write + Seek>(
    demuxer: &mut dyn Demuxer,
    codecs: &dyn CodecSupport,
    opts: &IndexerOptions,
    progress: &mut dyn Progress,
    mut writer: Option<IndexWriter<W>>,
) -> Result<MediaIndex> {
    let format_name = demuxer.format_name().to_string();
    let format_flags = demuxer.format_flags();
    let duration_seconds = demuxer.duration();

    let mut probes: HashMap<usize, ParserProbe> = HashMap::new();
    let mut skipped_streams: HashSet<usize> = HashSet::new();

    let mut video = VideoScan::new();
    let mut audio = AudioScan::new();

    let mut dv_in_avi = if format_name == "avi" { DvLatch::Pending } else { DvLatch::Disabled };
    let mut first_dts: Option<i64> = None;

    while let Some(mut pkt) = demuxer.next_packet()? {
        let stream_index = pkt.stream_index;
        if stream_index >= demuxer.stream_count() {
            continue;
        }

        let mut state = demuxer.codec_state(stream_index);
        if state.codec_type != CodecType::Video && state.codec_type != CodecType::Audio {
            continue;
        }
        if state.codec_id == CODEC_ID_NULL {
            continue;
        }
        if skipped_streams.contains(&stream_index) {
            continue;
        }

        if !probes.contains_key(&stream_index) {
            match ParserProbe::new(&*demuxer, codecs, stream_index, opts.threads)? {
                Some(probe) => {
                    probes.insert(stream_index, probe);
                }
                None => {
                    skipped_streams.insert(stream_index);
                    continue;
                }
            }
        }
        let Some(probe) = probes.get_mut(&stream_index) else { continue };

        let extra_data_index = probe.append_extra_data(&*demuxer, &state, &mut pkt) as i64;

        if state.codec_type == CodecType::Video {
            probe.investigate_pixel_format(&mut state, &pkt);

            // DV in AVI Type-1 hides the audio inside the DV video stream; the first DV packet
            // elects its stream unconditionally.
            let mut dv_init = false;
            if dv_in_avi == DvLatch::Pending
                && video.stream_index.is_none()
                && state.codec_id == CODEC_ID_DVVIDEO
                && !opts.force_audio
            {
                dv_init = true;
                dv_in_avi = DvLatch::Active;
            }

            // A later stream with a higher pixel count replaces the elected one.
            let higher_resolution =
                u64::from(state.width) * u64::from(state.height) > video.resolution;
            let elect = dv_init
                || (!opts.force_video
                    && (video.stream_index.is_none()
                        || (video.stream_index != Some(stream_index) && higher_resolution)))
                || (opts.force_video
                    && video.stream_index.is_none()
                    && stream_index as i32 == opts.force_video_index);

            if elect {
                if let Some(writer) = writer.as_mut() {
                    writer.set_active_video_stream(stream_index as i32)?;
                }
                debug!(
                    "electing video stream {} ({}x{})",
                    stream_index, state.width, state.height
                );
                video.reset(stream_index, &state, demuxer.time_base(stream_index));
            }

            let pict_type = probe.picture_type(&*demuxer, &state, &mut pkt)?;

            if video.stream_index == Some(stream_index) {
                let sample_number = video.frames.len() + 1;
                let keyframe = pkt.is_key();
                let is_leading = matches!(
                    (pkt.pts, video.last_keyframe_pts),
                    (Some(pts), Some(key_pts)) if pts < key_pts
                );
                if keyframe {
                    // For the present, treat this frame as a keyframe.
                    video.last_keyframe_pts = pkt.pts;
                }

                video.frames.push(VideoFrameInfo {
                    pts: pkt.pts,
                    dts: pkt.dts,
                    file_offset: pkt.pos,
                    sample_number,
                    extra_data_index: extra_data_index.max(0) as usize,
                    pict_type,
                    keyframe,
                    is_leading,
                });

                if video.max_width < state.width {
                    video.max_width = state.width;
                }
                if video.max_height < state.height {
                    video.max_height = state.height;
                }
                if video.initial_pixel_format == PixelFormat::None {
                    video.initial_pixel_format = state.pixel_format;
                }
            }

            probe.extra_data.fill_video_attributes(&state);

            if let Some(writer) = writer.as_mut() {
                writer.write_video_packet(
                    &pkt,
                    &state,
                    demuxer.time_base(stream_index),
                    extra_data_index,
                    pict_type,
                )?;
            }
        }
        else {
            if audio.stream_index.is_none()
                && (!opts.force_audio || stream_index as i32 == opts.force_audio_index)
            {
                if let Some(writer) = writer.as_mut() {
                    writer.set_active_audio_stream(stream_index as i32)?;
                }
                debug!("electing audio stream {}", stream_index);
                audio.stream_index = Some(stream_index);
                audio.codec_id = state.codec_id;
                audio.time_base = demuxer.time_base(stream_index);
            }

            let bits_per_sample = if state.bits_per_raw_sample > 0 {
                state.bits_per_raw_sample
            }
            else if state.bits_per_coded_sample > 0 {
                state.bits_per_coded_sample
            }
            else {
                state.sample_format.bytes_per_sample() * 8
            };

            let frame_length = probe.audio_frame_length(&*demuxer, &state, &pkt)?;

            if audio.stream_index == Some(stream_index) {
                if frame_length != -1 {
                    audio.duration += frame_length as u64;
                }
                if audio.duration <= i32::MAX as u64 {
                    let sample_number = audio.frames.len() + 1;
                    audio.frames.push(AudioFrameInfo {
                        pts: pkt.pts,
                        dts: pkt.dts,
                        file_offset: pkt.pos,
                        sample_number,
                        extra_data_index: extra_data_index.max(0) as usize,
                        sample_rate: state.sample_rate,
                        frame_length: 0,
                        keyframe: false,
                    });

                    // Length assignment lags behind the packet by the decoder delay.
                    let count = audio.frames.len();
                    if frame_length != -1 && count > probe.delay_count() {
                        let number = count - probe.delay_count();
                        audio.frames[number].frame_length = frame_length;
                        if number > 1
                            && audio.frames[number].frame_length
                                != audio.frames[number - 1].frame_length
                        {
                            audio.constant_frame_length = false;
                        }
                    }

                    if audio.sample_rate == 0 {
                        audio.sample_rate = state.sample_rate;
                    }
                    let layout = if state.channel_layout == 0 {
                        default_channel_layout(state.channels)
                    }
                    else {
                        state.channel_layout
                    };
                    audio.output.update(
                        layout,
                        state.sample_format,
                        audio.sample_rate,
                        bits_per_sample,
                    );
                }
            }

            probe.extra_data.fill_audio_attributes(&state, bits_per_sample);

            if let Some(writer) = writer.as_mut() {
                writer.write_audio_packet(
                    &pkt,
                    &state,
                    demuxer.time_base(stream_index),
                    extra_data_index,
                    bits_per_sample,
                    frame_length,
                )?;
            }
        }

        // Progress is reported between packets; this is also the cancellation point.
        if first_dts.is_none() {
            first_dts = pkt.dts;
        }
        let percent = match (first_dts, pkt.dts, duration_seconds) {
            (Some(first), Some(dts), Some(total)) if total > 0.0 => {
                let time_base = demuxer.time_base(stream_index);
                let elapsed =
                    (dts - first) as f64 * f64::from(time_base.num) / f64::from(time_base.den);
                (100.0 * elapsed / total + 0.5) as i32
            }
            _ => 0,
        };
        let message =
            if writer.is_some() { "Creating index file" } else { "Parsing input file" };
        if progress.update(message, percent) {
            warn!("indexing cancelled");
            return Err(Error::Cancelled);
        }
    }

    // The container is exhausted, but delayed audio decoders may still hold frames. Drain them
    // so the recorded lengths reconcile with the total decoded sample count.
    for stream_index in 0..demuxer.stream_count() {
        let Some(probe) = probes.get_mut(&stream_index) else { continue };
        if !probe.is_audio() || !probe.has_decoder() {
            continue;
        }

        let delay_count = probe.delay_count();
        let codec_id = demuxer.codec_state(stream_index).codec_id;
        let time_base = demuxer.time_base(stream_index);

        for flush in 1..=delay_count {
            let Some(samples) = probe.drain_delayed_frame() else { continue };
            let frame_length = samples as i32;

            if audio.stream_index == Some(stream_index) {
                audio.duration += u64::from(samples);
                if audio.duration > i32::MAX as u64 {
                    break;
                }
                let count = audio.frames.len();
                let number = count + flush;
                let number = number.checked_sub(delay_count).unwrap_or(0);
                if number >= 1 && number <= count {
                    audio.frames[number].frame_length = frame_length;
                    if number > 1
                        && audio.frames[number].frame_length
                            != audio.frames[number - 1].frame_length
                    {
                        audio.constant_frame_length = false;
                    }
                }
            }

            if let Some(writer) = writer.as_mut() {
                writer.write_synthetic_audio_packet(stream_index, codec_id, time_base, frame_length)?;
            }
        }
    }

    let mut media = MediaIndex {
        format_name,
        format_flags,
        video: None,
        audio: None,
        av_gap: 0,
        threads: opts.threads,
    };

    if let Some(stream_index) = video.stream_index {
        let mut frames = std::mem::take(&mut video.frames);
        let (seek_flags, order_converter, keyframes) = decide_video_seek_method(
            &media.format_name,
            media.format_flags,
            video.codec_id,
            &mut frames,
        );

        media.video = Some(VideoStreamIndex {
            stream_index,
            codec_id: video.codec_id,
            time_base: video.time_base,
            seek_flags,
            frames,
            keyframes,
            order_converter,
            extra_data: ExtraDataList::new(),
            index_entries: Vec::new(),
            initial_width: video.initial_width,
            initial_height: video.initial_height,
            max_width: video.max_width,
            max_height: video.max_height,
            initial_pixel_format: video.initial_pixel_format,
            initial_color_space: video.initial_color_space,
        });
    }

    if let Some(stream_index) = audio.stream_index {
        let mut frames = std::mem::take(&mut audio.frames);
        let mut dv_synthesised = false;

        if dv_in_avi == DvLatch::Active && demuxer.index_entries(stream_index).is_empty() {
            // DV in AVI Type-1: the audio records are the video records.
            if let Some(video_index) = media.video.as_ref() {
                let count = video_index.frames.len().min(frames.len());
                frames.truncate(count);
                for i in 1..=count {
                    let source = &video_index.frames[i];
                    let target = &mut frames[i];
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
                frames.truncate(0);
            }
            if opts.force_video && opts.force_video_index == -1 {
                // The caller asked for no video; the DV stream only served audio synthesis.
                media.video = None;
            }
        }
        else if dv_in_avi == DvLatch::Active
            && opts.force_video
            && opts.force_video_index == -1
        {
            media.video = None;
        }

        let frame_length = if audio.constant_frame_length && !frames.is_empty() {
            frames[1].frame_length
        }
        else {
            0
        };

        let seek_flags =
            decide_audio_seek_method(&media.format_name, media.format_flags, &mut frames);

        if opts.av_sync {
            if let Some(video_index) = media.video.as_ref() {
                media.av_gap = calculate_av_gap(
                    &video_index.frames,
                    video_index.seek_flags,
                    &frames,
                    seek_flags,
                    video_index.time_base,
                    audio.time_base,
                    audio.sample_rate,
                );
            }
        }

        media.audio = Some(AudioStreamIndex {
            stream_index,
            codec_id: audio.codec_id,
            time_base: audio.time_base,
            seek_flags,
            frames,
            extra_data: ExtraDataList::new(),
            index_entries: Vec::new(),
            frame_length,
            dv_in_avi: dv_synthesised,
            output: audio.output,
        });
    }

    if let Some(writer) = writer.as_mut() {
        writer.finish_packets()?;
    }

    // Native seek tables for every audio/video stream; the elected streams keep a copy so an
    // index-based reopen does not have to re-read the container to rebuild them.
    for stream_index in 0..demuxer.stream_count() {
        let codec_type = demuxer.codec_state(stream_index).codec_type;
        if codec_type != CodecType::Video && codec_type != CodecType::Audio {
            continue;
        }
        let entries = demuxer.index_entries(stream_index);
        if let Some(writer) = writer.as_mut() {
            writer.write_index_entries(stream_index, codec_type, entries)?;
        }
        match codec_type {
            CodecType::Video => {
                if let Some(video_index) = media.video.as_mut() {
                    if video_index.stream_index == stream_index {
                        video_index.index_entries = entries.to_vec();
                    }
                }
            }
            _ => {
                if let Some(audio_index) = media.audio.as_mut() {
                    if audio_index.stream_index == stream_index {
                        audio_index.index_entries = entries.to_vec();
                    }
                }
            }
        }
    }

    // Extra data lists for every stream that produced packets; the elected streams take
    // ownership of theirs.
    for stream_index in 0..demuxer.stream_count() {
        let Some(probe) = probes.get_mut(&stream_index) else { continue };
        let codec_type = if probe.is_audio() { CodecType::Audio } else { CodecType::Video };

        if let Some(writer) = writer.as_mut() {
            writer.write_extra_data_list(stream_index, codec_type, probe.extra_data.entries())?;
        }

        match codec_type {
            CodecType::Video => {
                if let Some(video_index) = media.video.as_mut() {
                    if video_index.stream_index == stream_index {
                        let mut list = std::mem::take(&mut probe.extra_data);
                        if !video_index.frames.is_empty() {
                            list.set_current_index(video_index.frames[1].extra_data_index);
                        }
                        video_index.extra_data = list;
                    }
                }
            }
            _ => {
                if let Some(audio_index) = media.audio.as_mut() {
                    if audio_index.stream_index == stream_index {
                        let mut list = std::mem::take(&mut probe.extra_data);
                        if !audio_index.frames.is_empty() {
                            list.set_current_index(audio_index.frames[1].extra_data_index);
                        }
                        audio_index.extra_data = list;
                    }
                }
            }
        }
    }

    if let Some(writer) = writer.as_mut() {
        writer.finish()?;
    }

    Ok(media)
}
