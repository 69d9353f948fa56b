// Segno
// Copyright (c) 2026 The Project Segno Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `probe` module owns the per-stream machinery for interrogating packets: a codec parser,
//! a probe decoder, and the extra data tracker.
//!
//! Containers lie. They flag non-intra pictures as keyframes, hide frame durations, and wrap
//! VC-1 payloads in framings the parser does not accept. The probe papers over all of that so the
//! scan loop only sees answers.

use log::{debug, warn};

use segno_core::codecs::well_known::{
    CODEC_ID_MPEG1VIDEO, CODEC_ID_MPEG2VIDEO, CODEC_ID_VC1, CODEC_ID_VC1IMAGE, CODEC_ID_WMV3,
    CODEC_ID_WMV3IMAGE,
};
use segno_core::codecs::{CodecId, CodecState, CodecType, PictureType, PixelFormat};
use segno_core::demux::{CodecSupport, Demuxer, FrameParser, ParserFlags, ProbeDecoder};
use segno_core::errors::Result;
use segno_core::packet::Packet;

use crate::ebdu::{make_ebdu, BDU_TYPE_FRAME, BDU_TYPE_SEQUENCE_HEADER};
use crate::extradata::ExtraDataList;

/// Codec families requiring special treatment during indexing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum CodecClass {
    /// MPEG-1 Video or MPEG-2 Video.
    Mpeg12Video,
    /// VC-1 or WMV3 in a native framing.
    Vc1Wmv3,
    /// VC-1 or WMV3 encapsulated in ASF.
    Vc1Wmv3Asf,
    /// Everything else.
    Other,
}

fn classify(codec_id: CodecId, format_name: &str) -> CodecClass {
    if codec_id == CODEC_ID_MPEG1VIDEO || codec_id == CODEC_ID_MPEG2VIDEO {
        CodecClass::Mpeg12Video
    }
    else if codec_id == CODEC_ID_VC1
        || codec_id == CODEC_ID_VC1IMAGE
        || codec_id == CODEC_ID_WMV3
        || codec_id == CODEC_ID_WMV3IMAGE
    {
        if format_name == "asf" {
            CodecClass::Vc1Wmv3Asf
        }
        else {
            CodecClass::Vc1Wmv3
        }
    }
    else {
        CodecClass::Other
    }
}

/// Whether the codec carries raw bitstream data units that need emulation escaping when wrapped.
fn is_raw_bdu_codec(codec_id: CodecId) -> bool {
    codec_id == CODEC_ID_WMV3 || codec_id == CODEC_ID_WMV3IMAGE
}

enum ParserSource {
    /// A parser instantiated and fed by the probe.
    Owned(Box<dyn FrameParser>),
    /// The demuxer parses this stream itself; consult it for results.
    Shared,
    /// No parser is available for this codec.
    None,
}

/// Per-stream facility wrapping a codec parser plus, when needed, a one-packet decode to obtain
/// picture type and audio frame length.
pub struct ParserProbe {
    stream_index: usize,
    codec_id: CodecId,
    is_audio: bool,
    class: CodecClass,
    parser: ParserSource,
    decoder: Option<Box<dyn ProbeDecoder>>,
    /// The distinct codec parameter sets seen on this stream.
    pub extra_data: ExtraDataList,
    delay_count: u32,
    parser_disabled: bool,
    probed_pixel_format: Option<PixelFormat>,
}

impl ParserProbe {
    /// Set up the probe for a stream.
    ///
    /// Returns `Ok(None)` when a collaborator the codec requires is unavailable, in which case
    /// the stream cannot be indexed and should be skipped.
    pub fn new(
        demuxer: &dyn Demuxer,
        codecs: &dyn CodecSupport,
        stream_index: usize,
        threads: u32,
    ) -> Result<Option<ParserProbe>> {
        let state = demuxer.codec_state(stream_index);
        let is_audio = state.codec_type == CodecType::Audio;
        let class = classify(state.codec_id, demuxer.format_name());

        // Borrow the demuxer's parser where the container parses the stream itself. MPEG-1/2
        // Video and VC-1/WMV3 always get an owned parser so priming and reframing are possible.
        let parser = if demuxer.parses_stream(stream_index) && class == CodecClass::Other {
            ParserSource::Shared
        }
        else {
            let parser_codec = match class {
                CodecClass::Vc1Wmv3 | CodecClass::Vc1Wmv3Asf => CODEC_ID_VC1,
                _ => state.codec_id,
            };
            match codecs.new_parser(parser_codec, ParserFlags::COMPLETE_FRAMES)? {
                Some(parser) => ParserSource::Owned(parser),
                None => ParserSource::None,
            }
        };

        // Audio needs a decoder to measure frame lengths; MPEG-1/2 and VC-1/WMV3 need one to
        // disambiguate picture types. For other video codecs a decoder only serves pixel format
        // probing and is welcome but not required.
        let decoder = codecs.new_probe_decoder(&state, threads)?;
        if decoder.is_none() && (is_audio || class != CodecClass::Other) {
            warn!(
                "no probe decoder for codec {} on stream {}, stream will not be indexed",
                state.codec_id, stream_index
            );
            return Ok(None);
        }

        let mut probe = ParserProbe {
            stream_index,
            codec_id: state.codec_id,
            is_audio,
            class,
            parser,
            decoder,
            extra_data: ExtraDataList::new(),
            delay_count: 0,
            parser_disabled: false,
            probed_pixel_format: None,
        };

        if probe.class == CodecClass::Vc1Wmv3Asf {
            probe.prime_sequence_header(&state);
        }

        Ok(Some(probe))
    }

    /// Initialize a VC-1/WMV3 parser by feeding the extra data as a sequence-header EBDU.
    fn prime_sequence_header(&mut self, state: &CodecState) {
        let ParserSource::Owned(parser) = &mut self.parser else { return };

        if is_raw_bdu_codec(self.codec_id) {
            // The extra data is a raw sequence header; wrap and escape it.
            let unit = make_ebdu(&state.extra_data, BDU_TYPE_SEQUENCE_HEADER, true);
            parser.parse(state, &unit, None, None, -1);
        }
        else if let Some(data) = state.extra_data.get(1..) {
            // For WVC1 the first byte of the extra data is its size.
            parser.parse(state, data, None, None, -1);
        }
    }

    /// The stream this probe belongs to.
    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// Whether this probe serves an audio stream.
    pub fn is_audio(&self) -> bool {
        self.is_audio
    }

    /// The number of frames the decoder is holding back.
    pub fn delay_count(&self) -> u32 {
        self.delay_count
    }

    /// Whether a probe decoder is attached.
    pub fn has_decoder(&self) -> bool {
        self.decoder.is_some()
    }

    /// Determine the parameter set in force for `pkt` and return its index.
    pub fn append_extra_data(
        &mut self,
        demuxer: &dyn Demuxer,
        state: &CodecState,
        pkt: &mut Packet,
    ) -> usize {
        let parser = &self.parser;
        let stream_index = self.stream_index;
        self.extra_data.append_if_new(pkt, state, |data| match parser {
            ParserSource::Owned(parser) => parser.split(state, data),
            ParserSource::Shared => demuxer.split_extra_data(stream_index, data),
            ParserSource::None => None,
        })
    }

    /// Derive the picture type of a video packet.
    ///
    /// When a container flags a keyframe but the parser reports a non-I picture for MPEG-1/2 or
    /// VC-1/WMV3, the packet is decoded to settle the question; a frame that still is not an
    /// I-picture loses its keyframe flag. The VC-1 decoder also rejects a BI-picture as the first
    /// frame, so only true I-pictures keep the flag.
    pub fn picture_type(
        &mut self,
        demuxer: &dyn Demuxer,
        state: &CodecState,
        pkt: &mut Packet,
    ) -> Result<PictureType> {
        let info = match &mut self.parser {
            ParserSource::Owned(parser) => {
                if self.class == CodecClass::Vc1Wmv3Asf {
                    // Reframe the payload as a frame EBDU so the parser accepts it.
                    let unit = make_ebdu(pkt.buf(), BDU_TYPE_FRAME, is_raw_bdu_codec(self.codec_id));
                    Some(parser.parse(state, &unit, pkt.pts, pkt.dts, pkt.pos))
                }
                else {
                    Some(parser.parse(state, pkt.buf(), pkt.pts, pkt.dts, pkt.pos))
                }
            }
            ParserSource::Shared => demuxer.last_parse(self.stream_index),
            ParserSource::None => None,
        };

        let Some(info) = info else { return Ok(PictureType::Unknown) };

        if self.class != CodecClass::Other && pkt.is_key() && info.pict_type != PictureType::I {
            let Some(decoder) = self.decoder.as_mut() else { return Ok(info.pict_type) };

            let mut output = decoder.decode(Some(pkt.buf()))?;
            if output.frame.is_none() {
                // The decoder is holding the frame back; flush it out.
                output = decoder.decode(None)?;
            }

            let pict_type = output.frame.map_or(PictureType::Unknown, |f| f.pict_type);
            if pict_type != PictureType::I {
                debug!(
                    "stream {}: keyframe flag cleared, decoded picture type is {:?}",
                    self.stream_index, pict_type
                );
                pkt.set_key(false);
            }
            return Ok(pict_type);
        }

        Ok(info.pict_type)
    }

    /// Derive the number of samples an audio packet decodes into, or -1 when indeterminate.
    pub fn audio_frame_length(
        &mut self,
        demuxer: &dyn Demuxer,
        state: &CodecState,
        pkt: &Packet,
    ) -> Result<i32> {
        let parser_usable = !self.parser_disabled && !matches!(self.parser, ParserSource::None);

        let mut frame_length: i64 = if parser_usable {
            match &mut self.parser {
                ParserSource::Owned(parser) => {
                    i64::from(parser.parse(state, pkt.buf(), pkt.pts, pkt.dts, pkt.pos).duration)
                }
                ParserSource::Shared => demuxer
                    .last_parse(self.stream_index)
                    .map_or(0, |info| i64::from(info.duration)),
                ParserSource::None => 0,
            }
        }
        else if self.delay_count == 0 {
            i64::from(state.frame_size)
        }
        else {
            0
        };

        if frame_length == 0 {
            let mut produced = false;

            if let Some(decoder) = self.decoder.as_mut() {
                let mut remaining = pkt.buf();
                while !remaining.is_empty() {
                    match decoder.decode(Some(remaining)) {
                        // The decoder lost its place mid-packet; keep whatever was produced.
                        Err(_) => break,
                        Ok(output) => {
                            if let Some(frame) = output.frame {
                                frame_length += i64::from(frame.sample_count);
                                produced = true;
                            }
                            if output.consumed == 0 {
                                break;
                            }
                            remaining = &remaining[output.consumed.min(remaining.len())..];
                        }
                    }
                }
            }

            if !produced {
                frame_length = -1;
                if !self.parser_disabled && parser_usable {
                    warn!(
                        "stream {}: parser desynchronised from decoder, disabling it",
                        self.stream_index
                    );
                }
                self.parser_disabled = true;
                self.delay_count += 1;
            }
        }

        Ok(frame_length as i32)
    }

    /// Flush one delayed audio frame out of the decoder after the last packet.
    ///
    /// Returns the sample count of the flushed frame (0 when the decoder produced nothing for
    /// this flush), or `None` when the decoder refuses to flush.
    pub fn drain_delayed_frame(&mut self) -> Option<u32> {
        let decoder = self.decoder.as_mut()?;
        match decoder.decode(None) {
            Ok(output) => Some(output.frame.map_or(0, |f| f.sample_count)),
            Err(_) => None,
        }
    }

    /// Probe the pixel format of a video stream by decoding one packet, when the parser has not
    /// determined it.
    pub fn investigate_pixel_format(&mut self, state: &mut CodecState, pkt: &Packet) {
        if state.pixel_format != PixelFormat::None {
            return;
        }
        if let Some(format) = self.probed_pixel_format {
            state.pixel_format = format;
            return;
        }

        let Some(decoder) = self.decoder.as_mut() else { return };
        if let Ok(output) = decoder.decode(Some(pkt.buf())) {
            if let Some(frame) = output.frame {
                if frame.pixel_format != PixelFormat::None {
                    self.probed_pixel_format = Some(frame.pixel_format);
                    state.pixel_format = frame.pixel_format;
                }
            }
        }
    }
}
