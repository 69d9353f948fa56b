// Segno
// Copyright (c) 2026 The Project Segno Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `demux` module provides the traits through which the indexer reaches its external
//! collaborators: the container demuxer, codec parsers, and probe decoders.
//!
//! Segno never demuxes or decodes anything itself. A `Demuxer` supplies packets and live codec
//! state, a `FrameParser` supplies picture types and frame durations, and a `ProbeDecoder` is
//! invoked only to disambiguate a picture type or to probe an audio frame length or pixel format
//! when the parser refuses. Implementations typically wrap a multimedia library; tests drive the
//! indexer with scripted implementations instead.

use std::path::Path;

use bitflags::bitflags;

use crate::codecs::{CodecId, CodecState, PictureType, PixelFormat};
use crate::errors::Result;
use crate::packet::Packet;
use crate::units::TimeBase;

bitflags! {
    /// Capability flags reported by a container format.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct FormatFlags: u32 {
        /// The format is not backed by a file.
        const NO_FILE       = 1 << 0;
        /// The format requires a numbered sequence of files.
        const NEED_NUMBER   = 1 << 1;
        /// The format builds a generic index on the fly.
        const GENERIC_INDEX = 1 << 6;
        /// Timestamps may be discontinuous.
        const TS_DISCONT    = 1 << 7;
        /// Seeking by byte offset is not meaningful for this format.
        const NO_BYTE_SEEK  = 1 << 15;
    }
}

bitflags! {
    /// Flags controlling how an owned codec parser behaves.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct ParserFlags: u32 {
        /// Every input buffer given to the parser holds exactly one complete frame.
        const COMPLETE_FRAMES = 1 << 0;
    }
}

/// An entry of a container's native seek table.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexEntry {
    /// The byte offset of the entry.
    pub pos: i64,
    /// The timestamp of the entry in stream time base units.
    pub timestamp: i64,
    /// Container-specific entry flags.
    pub flags: u32,
    /// The size of the referenced data in bytes.
    pub size: u32,
    /// The minimum distance in bytes until the next keyframe.
    pub min_distance: u32,
}

/// The result of pushing one payload through a `FrameParser`.
#[derive(Copy, Clone, Debug, Default)]
pub struct ParseInfo {
    /// The picture type of the parsed frame, for video streams.
    pub pict_type: PictureType,
    /// The number of samples in the parsed frame, for audio streams. 0 if unknown.
    pub duration: u32,
}

/// A `FrameParser` wraps a codec parser for a single stream.
///
/// Parsers are stateful: priming payloads (for example a VC-1 sequence header) may be fed before
/// the first packet, and each subsequent payload is interpreted against everything fed so far.
pub trait FrameParser {
    /// Push one payload through the parser and report what it contained.
    fn parse(
        &mut self,
        state: &CodecState,
        data: &[u8],
        pts: Option<i64>,
        dts: Option<i64>,
        pos: i64,
    ) -> ParseInfo;

    /// Attempt to locate a leading codec parameter block within `data`.
    ///
    /// Returns `None` if the parser has no split operation for this codec, `Some(0)` if it has one
    /// but found no parameter block, and `Some(n)` when the first `n` bytes of `data` form the
    /// parameter block.
    fn split(&self, state: &CodecState, data: &[u8]) -> Option<usize> {
        let _ = (state, data);
        None
    }
}

/// A frame produced by a `ProbeDecoder`.
#[derive(Copy, Clone, Debug, Default)]
pub struct ProbedFrame {
    /// The picture type of a decoded video frame.
    pub pict_type: PictureType,
    /// The pixel format of a decoded video frame.
    pub pixel_format: PixelFormat,
    /// The number of samples in a decoded audio frame.
    pub sample_count: u32,
    /// The sample rate of a decoded audio frame, in Hz.
    pub sample_rate: u32,
    /// The channel layout of a decoded audio frame.
    pub channel_layout: u64,
}

/// The result of one `ProbeDecoder::decode` call.
#[derive(Copy, Clone, Debug, Default)]
pub struct DecodeOutput {
    /// The number of input bytes consumed by this call.
    pub consumed: usize,
    /// The produced frame, if decoding completed.
    pub frame: Option<ProbedFrame>,
}

/// A `ProbeDecoder` decodes single frames for inspection.
///
/// Probe decoders exist to answer questions the parser cannot: the true picture type of a packet a
/// container flagged as a keyframe, the sample count of an audio packet with no declared duration,
/// or the pixel format of a stream whose parameters omit it. They are never used to produce
/// presentable output.
pub trait ProbeDecoder {
    /// Decode from `data`, or flush buffered frames when `data` is `None`.
    fn decode(&mut self, data: Option<&[u8]>) -> Result<DecodeOutput>;
}

/// A `CodecSupport` creates codec parsers and probe decoders on demand.
///
/// Returning `Ok(None)` means the codec is simply not supported, which the indexer treats as a
/// reason to skip the affected stream; returning an error aborts indexing.
pub trait CodecSupport {
    /// Create an owned parser for the given codec.
    fn new_parser(&self, codec: CodecId, flags: ParserFlags)
        -> Result<Option<Box<dyn FrameParser>>>;

    /// Create a probe decoder for a stream in the given state.
    fn new_probe_decoder(
        &self,
        state: &CodecState,
        threads: u32,
    ) -> Result<Option<Box<dyn ProbeDecoder>>>;
}

/// A `Demuxer` is an opened media container.
///
/// Packets are read one-by-one in container order and may belong to any stream. The demuxer also
/// exposes everything the indexer needs to interpret a packet: the live codec state of its stream,
/// the stream time base, and — when the container runs its own parser over a stream — the parse
/// result for the most recently returned packet.
pub trait Demuxer {
    /// Get the short name of the container format (for example `"mpegts"` or `"avi"`).
    fn format_name(&self) -> &str;

    /// Get the capability flags of the container format.
    fn format_flags(&self) -> FormatFlags;

    /// Get the number of streams in the container.
    fn stream_count(&self) -> usize;

    /// Get a snapshot of the live codec state of a stream.
    fn codec_state(&self, stream: usize) -> CodecState;

    /// Get the time base of a stream.
    fn time_base(&self, stream: usize) -> TimeBase;

    /// Read the next packet from the container.
    ///
    /// If `Ok(None)` is returned, the media has ended and no more packets will be produced.
    fn next_packet(&mut self) -> Result<Option<Packet>>;

    /// Get the container's native seek table for a stream. May be empty.
    fn index_entries(&self, stream: usize) -> &[IndexEntry];

    /// Get the total duration of the container in seconds, if known.
    fn duration(&self) -> Option<f64> {
        None
    }

    /// Returns true when the demuxer runs its own parser over this stream's packets.
    fn parses_stream(&self, stream: usize) -> bool {
        let _ = stream;
        false
    }

    /// Get the parse result for the most recent packet of a stream that the demuxer parses
    /// itself.
    fn last_parse(&self, stream: usize) -> Option<ParseInfo> {
        let _ = stream;
        None
    }

    /// Split service of the demuxer-owned parser. Same contract as [`FrameParser::split`].
    fn split_extra_data(&self, stream: usize, data: &[u8]) -> Option<usize> {
        let _ = (stream, data);
        None
    }
}

/// A `ContainerProvider` opens media files into demuxers.
pub trait ContainerProvider {
    /// Open the media file at `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn Demuxer>>;
}
