// Segno
// Copyright (c) 2026 The Project Segno Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `stream` module defines the per-stream results of indexing and the container-wide bag
//! that bundles them.

use segno_core::codecs::{CodecId, PixelFormat};
use segno_core::demux::{FormatFlags, IndexEntry};
use segno_core::units::TimeBase;

use crate::extradata::ExtraDataList;
use crate::frame::{AudioFrameList, KeyframeList, OrderConverter, VideoFrameList};
use crate::output::AudioOutputParams;
use crate::seek::SeekFlags;

/// The indexed state of the elected video stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VideoStreamIndex {
    /// The container stream index of the elected stream.
    pub stream_index: usize,
    /// The codec of the elected stream.
    pub codec_id: CodecId,
    /// The stream time base.
    pub time_base: TimeBase,
    /// The seek regime the stream was classified into.
    pub seek_flags: SeekFlags,
    /// Per-frame records. In presentation order when an order converter is present, otherwise in
    /// decode order.
    pub frames: VideoFrameList,
    /// Keyframe membership in decode order.
    pub keyframes: KeyframeList,
    /// Decode-order to presentation-order mapping, present iff reordering was observed and
    /// timestamps are trustworthy.
    pub order_converter: Option<OrderConverter>,
    /// The distinct codec parameter sets seen on the stream.
    pub extra_data: ExtraDataList,
    /// The container's native seek table for the stream, preserved for reopening.
    pub index_entries: Vec<IndexEntry>,
    /// Frame width when the stream was elected.
    pub initial_width: u32,
    /// Frame height when the stream was elected.
    pub initial_height: u32,
    /// The largest frame width seen on the stream.
    pub max_width: u32,
    /// The largest frame height seen on the stream.
    pub max_height: u32,
    /// The pixel format of the stream.
    pub initial_pixel_format: PixelFormat,
    /// The colour space code of the stream.
    pub initial_color_space: u32,
}

/// The indexed state of the elected audio stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AudioStreamIndex {
    /// The container stream index of the elected stream.
    pub stream_index: usize,
    /// The codec of the elected stream.
    pub codec_id: CodecId,
    /// The stream time base.
    pub time_base: TimeBase,
    /// The seek regime the stream was classified into.
    pub seek_flags: SeekFlags,
    /// Per-frame records in decode order.
    pub frames: AudioFrameList,
    /// The distinct codec parameter sets seen on the stream.
    pub extra_data: ExtraDataList,
    /// The container's native seek table for the stream, preserved for reopening.
    pub index_entries: Vec<IndexEntry>,
    /// The constant per-packet sample count, or 0 when packets vary in length.
    pub frame_length: i32,
    /// Whether the audio records were synthesised from a DV video stream (DV-in-AVI Type-1).
    pub dv_in_avi: bool,
    /// Aggregated output parameters for the stream.
    pub output: AudioOutputParams,
}

/// The result of indexing one media container.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MediaIndex {
    /// The short name of the container format.
    pub format_name: String,
    /// The capability flags of the container format.
    pub format_flags: FormatFlags,
    /// The elected video stream, if any.
    pub video: Option<VideoStreamIndex>,
    /// The elected audio stream, if any.
    pub audio: Option<AudioStreamIndex>,
    /// The offset between the first video timestamp and the first audio sample, in output audio
    /// samples.
    pub av_gap: i64,
    /// The decoder thread count recorded for reopening.
    pub threads: u32,
}

impl MediaIndex {
    /// The stream index of the elected video stream, or -1.
    pub fn active_video_stream(&self) -> i32 {
        self.video.as_ref().map_or(-1, |v| v.stream_index as i32)
    }

    /// The stream index of the elected audio stream, or -1.
    pub fn active_audio_stream(&self) -> i32 {
        self.audio.as_ref().map_or(-1, |a| a.stream_index as i32)
    }
}
