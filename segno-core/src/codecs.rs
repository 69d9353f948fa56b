// Segno
// Copyright (c) 2026 The Project Segno Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `codecs` module defines codec identifiers and the live per-stream codec state that a
//! demuxer exposes to the indexer.

use std::fmt;

/// The type of media a codec encodes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CodecType {
    /// A video codec.
    Video,
    /// An audio codec.
    Audio,
    /// A data codec.
    Data,
    /// A subtitle codec.
    Subtitle,
}

impl CodecType {
    /// Get the numeric code used by the index file grammar.
    pub const fn as_u32(&self) -> u32 {
        match *self {
            CodecType::Video => 0,
            CodecType::Audio => 1,
            CodecType::Data => 2,
            CodecType::Subtitle => 3,
        }
    }

    /// Map a numeric code from the index file grammar back to a codec type.
    pub const fn from_u32(value: u32) -> Option<CodecType> {
        match value {
            0 => Some(CodecType::Video),
            1 => Some(CodecType::Audio),
            2 => Some(CodecType::Data),
            3 => Some(CodecType::Subtitle),
            _ => None,
        }
    }
}

impl Default for CodecType {
    fn default() -> Self {
        CodecType::Data
    }
}

/// A `CodecId` is a unique identifier used to identify a specific codec across all codec types.
///
/// Using a [well-known](well_known) codec ID is *highly* recommended to maximize compatibility
/// between components. The numeric value round-trips through the index file, so it must be stable
/// across builds.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CodecId(u32);

/// Null codec ID.
pub const CODEC_ID_NULL: CodecId = CodecId(0x0);

impl CodecId {
    /// Create a new codec ID from a numeric code.
    pub const fn new(code: u32) -> CodecId {
        Self(code)
    }

    /// Get the numeric code.
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl Default for CodecId {
    fn default() -> Self {
        CODEC_ID_NULL
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// IDs for well-known codecs.
pub mod well_known {
    use super::CodecId;

    // ISO, IEC, MPEG video codecs

    /// MPEG-1 Video (MPEG-1 Part 2)
    pub const CODEC_ID_MPEG1VIDEO: CodecId = CodecId(0x100);
    /// MPEG-2 Video (MPEG-2 Part 2)
    pub const CODEC_ID_MPEG2VIDEO: CodecId = CodecId(0x101);
    /// MPEG-4 Video (MPEG-4 Part 2)
    pub const CODEC_ID_MPEG4: CodecId = CodecId(0x102);
    /// Advanced Video Codec (AVC, MPEG-4 Part 10, H.264)
    pub const CODEC_ID_H264: CodecId = CodecId(0x103);
    /// High Efficiency Video Coding (HEVC, H.265)
    pub const CODEC_ID_HEVC: CodecId = CodecId(0x104);

    // SMPTE and Microsoft video codecs

    /// SMPTE VC-1
    pub const CODEC_ID_VC1: CodecId = CodecId(0x110);
    /// SMPTE VC-1 Image (WMV9 Image v2)
    pub const CODEC_ID_VC1IMAGE: CodecId = CodecId(0x111);
    /// Windows Media Video 9 (WMV3)
    pub const CODEC_ID_WMV3: CodecId = CodecId(0x112);
    /// Windows Media Video 9 Image (WMV3 Image)
    pub const CODEC_ID_WMV3IMAGE: CodecId = CodecId(0x113);

    // Other video codecs

    /// DV (Digital Video)
    pub const CODEC_ID_DVVIDEO: CodecId = CodecId(0x120);
    /// Motion JPEG
    pub const CODEC_ID_MJPEG: CodecId = CodecId(0x121);
    /// On2 TrueMotion VP9
    pub const CODEC_ID_VP9: CodecId = CodecId(0x122);
    /// AOMedia Video 1 (AV1)
    pub const CODEC_ID_AV1: CodecId = CodecId(0x123);

    // Audio codecs

    /// Advanced Audio Coding (AAC)
    pub const CODEC_ID_AAC: CodecId = CodecId(0x200);
    /// MPEG Audio Layer 3 (MP3)
    pub const CODEC_ID_MP3: CodecId = CodecId(0x201);
    /// Dolby Digital (AC-3)
    pub const CODEC_ID_AC3: CodecId = CodecId(0x202);
    /// DTS Coherent Acoustics
    pub const CODEC_ID_DTS: CodecId = CodecId(0x203);
    /// Free Lossless Audio Codec (FLAC)
    pub const CODEC_ID_FLAC: CodecId = CodecId(0x204);
    /// Vorbis
    pub const CODEC_ID_VORBIS: CodecId = CodecId(0x205);
    /// PCM signed 16-bit little-endian
    pub const CODEC_ID_PCM_S16LE: CodecId = CodecId(0x206);
}

/// The coded type of a picture carried by a video packet.
///
/// The numeric codes round-trip through the index file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PictureType {
    /// The picture type could not be determined.
    Unknown,
    /// Intra picture.
    I,
    /// Predicted picture.
    P,
    /// Bi-directionally predicted picture.
    B,
    /// S(GMC)-VOP (MPEG-4).
    S,
    /// Switching intra picture.
    Si,
    /// Switching predicted picture.
    Sp,
    /// Intra picture coded in a bi-directionally predicted frame slot (VC-1).
    Bi,
}

impl PictureType {
    /// Get the numeric code used by the index file grammar.
    pub const fn as_i32(&self) -> i32 {
        match *self {
            PictureType::Unknown => 0,
            PictureType::I => 1,
            PictureType::P => 2,
            PictureType::B => 3,
            PictureType::S => 4,
            PictureType::Si => 5,
            PictureType::Sp => 6,
            PictureType::Bi => 7,
        }
    }

    /// Map a numeric code back to a picture type. Unrecognized codes map to `Unknown`.
    pub const fn from_i32(value: i32) -> PictureType {
        match value {
            1 => PictureType::I,
            2 => PictureType::P,
            3 => PictureType::B,
            4 => PictureType::S,
            5 => PictureType::Si,
            6 => PictureType::Sp,
            7 => PictureType::Bi,
            _ => PictureType::Unknown,
        }
    }
}

impl Default for PictureType {
    fn default() -> Self {
        PictureType::Unknown
    }
}

/// The pixel format of decoded video frames.
///
/// The names returned by [`PixelFormat::as_str`] are the ones the index file grammar records.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// The pixel format is unknown or not yet determined.
    None,
    /// Planar YUV 4:2:0.
    Yuv420p,
    /// Planar YUV 4:2:2.
    Yuv422p,
    /// Planar YUV 4:4:4.
    Yuv444p,
    /// Planar YUV 4:1:0.
    Yuv410p,
    /// Planar YUV 4:1:1.
    Yuv411p,
    /// Planar YUV 4:2:0, full range (JPEG).
    Yuvj420p,
    /// Planar YUV 4:2:2, full range (JPEG).
    Yuvj422p,
    /// Planar YUV 4:2:0, 10 bits per component, little-endian.
    Yuv420p10le,
    /// Semi-planar YUV 4:2:0.
    Nv12,
    /// Packed YUV 4:2:2, Y-U-Y-V order.
    Yuyv422,
    /// Packed YUV 4:2:2, U-Y-V-Y order.
    Uyvy422,
    /// Packed RGB 8:8:8.
    Rgb24,
    /// Packed BGR 8:8:8.
    Bgr24,
    /// 8-bit grayscale.
    Gray8,
    /// 8-bit palettized.
    Pal8,
}

impl PixelFormat {
    /// Get the format name used by the index file grammar.
    pub const fn as_str(&self) -> &'static str {
        match *self {
            PixelFormat::None => "none",
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Yuv422p => "yuv422p",
            PixelFormat::Yuv444p => "yuv444p",
            PixelFormat::Yuv410p => "yuv410p",
            PixelFormat::Yuv411p => "yuv411p",
            PixelFormat::Yuvj420p => "yuvj420p",
            PixelFormat::Yuvj422p => "yuvj422p",
            PixelFormat::Yuv420p10le => "yuv420p10le",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Yuyv422 => "yuyv422",
            PixelFormat::Uyvy422 => "uyvy422",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Bgr24 => "bgr24",
            PixelFormat::Gray8 => "gray8",
            PixelFormat::Pal8 => "pal8",
        }
    }

    /// Map a format name back to a pixel format. Unrecognized names map to `None`.
    pub fn parse(name: &str) -> PixelFormat {
        match name {
            "yuv420p" => PixelFormat::Yuv420p,
            "yuv422p" => PixelFormat::Yuv422p,
            "yuv444p" => PixelFormat::Yuv444p,
            "yuv410p" => PixelFormat::Yuv410p,
            "yuv411p" => PixelFormat::Yuv411p,
            "yuvj420p" => PixelFormat::Yuvj420p,
            "yuvj422p" => PixelFormat::Yuvj422p,
            "yuv420p10le" => PixelFormat::Yuv420p10le,
            "nv12" => PixelFormat::Nv12,
            "yuyv422" => PixelFormat::Yuyv422,
            "uyvy422" => PixelFormat::Uyvy422,
            "rgb24" => PixelFormat::Rgb24,
            "bgr24" => PixelFormat::Bgr24,
            "gray8" => PixelFormat::Gray8,
            "pal8" => PixelFormat::Pal8,
            _ => PixelFormat::None,
        }
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        PixelFormat::None
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The in-memory format of decoded audio samples.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// The sample format is unknown or not yet determined.
    None,
    /// Unsigned 8-bit, packed.
    U8,
    /// Signed 16-bit, packed.
    S16,
    /// Signed 32-bit, packed.
    S32,
    /// 32-bit floating point, packed.
    Flt,
    /// 64-bit floating point, packed.
    Dbl,
    /// Unsigned 8-bit, planar.
    U8p,
    /// Signed 16-bit, planar.
    S16p,
    /// Signed 32-bit, planar.
    S32p,
    /// 32-bit floating point, planar.
    Fltp,
    /// 64-bit floating point, planar.
    Dblp,
}

impl SampleFormat {
    /// Get the format name used by the index file grammar.
    pub const fn as_str(&self) -> &'static str {
        match *self {
            SampleFormat::None => "none",
            SampleFormat::U8 => "u8",
            SampleFormat::S16 => "s16",
            SampleFormat::S32 => "s32",
            SampleFormat::Flt => "flt",
            SampleFormat::Dbl => "dbl",
            SampleFormat::U8p => "u8p",
            SampleFormat::S16p => "s16p",
            SampleFormat::S32p => "s32p",
            SampleFormat::Fltp => "fltp",
            SampleFormat::Dblp => "dblp",
        }
    }

    /// Map a format name back to a sample format. Unrecognized names map to `None`.
    pub fn parse(name: &str) -> SampleFormat {
        match name {
            "u8" => SampleFormat::U8,
            "s16" => SampleFormat::S16,
            "s32" => SampleFormat::S32,
            "flt" => SampleFormat::Flt,
            "dbl" => SampleFormat::Dbl,
            "u8p" => SampleFormat::U8p,
            "s16p" => SampleFormat::S16p,
            "s32p" => SampleFormat::S32p,
            "fltp" => SampleFormat::Fltp,
            "dblp" => SampleFormat::Dblp,
            _ => SampleFormat::None,
        }
    }

    /// Get the number of bytes occupied by a single sample, or 0 if unknown.
    pub const fn bytes_per_sample(&self) -> u32 {
        match *self {
            SampleFormat::None => 0,
            SampleFormat::U8 | SampleFormat::U8p => 1,
            SampleFormat::S16 | SampleFormat::S16p => 2,
            SampleFormat::S32 | SampleFormat::S32p => 4,
            SampleFormat::Flt | SampleFormat::Fltp => 4,
            SampleFormat::Dbl | SampleFormat::Dblp => 8,
        }
    }
}

impl Default for SampleFormat {
    fn default() -> Self {
        SampleFormat::None
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Get the number of channels described by a channel layout bitmask.
pub const fn channel_count(layout: u64) -> u32 {
    layout.count_ones()
}

/// Get a default channel layout for the given number of channels.
pub const fn default_channel_layout(channels: u32) -> u64 {
    match channels {
        0 => 0,
        // Front centre.
        1 => 0x4,
        // Front left and front right.
        2 => 0x3,
        // A contiguous mask with the requested number of channels.
        n if n < 64 => (1u64 << n) - 1,
        _ => u64::MAX,
    }
}

/// A snapshot of a stream's live codec parameters.
///
/// The demuxer (together with its parser and any opened decoder) accumulates knowledge about a
/// stream as payloads flow through it: dimensions and pixel format may only become known after the
/// first payload has been parsed, channel layouts after the first frame has been decoded. A
/// `CodecState` is the value of that knowledge at a specific packet, which is why the indexer
/// requests a fresh snapshot for every packet.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CodecState {
    /// The type of the codec.
    pub codec_type: CodecType,
    /// The codec ID.
    pub codec_id: CodecId,
    /// The container-specific codec tag (FourCC or TwoCC), or 0.
    pub codec_tag: u32,
    /// The codec parameter set (extra data) currently attached to the stream. Empty when the
    /// container carries parameter sets in-band only.
    pub extra_data: Box<[u8]>,
    /// Video frame width in pixels, or 0 if not yet known.
    pub width: u32,
    /// Video frame height in pixels, or 0 if not yet known.
    pub height: u32,
    /// The pixel format of decoded frames.
    pub pixel_format: PixelFormat,
    /// The colour space code of decoded frames.
    pub color_space: u32,
    /// Bits per coded sample, or 0 if not applicable.
    pub bits_per_coded_sample: u32,
    /// Bits per raw sample, or 0 if not applicable.
    pub bits_per_raw_sample: u32,
    /// The number of audio channels, or 0 if not yet known.
    pub channels: u32,
    /// The audio channel layout bitmask, or 0 if not yet known.
    pub channel_layout: u64,
    /// The audio sample rate in Hz, or 0 if not yet known.
    pub sample_rate: u32,
    /// The format of decoded audio samples.
    pub sample_format: SampleFormat,
    /// The number of bytes per audio frame for constant-size codecs, or 0.
    pub block_align: u32,
    /// The nominal number of samples per audio frame, or 0 if variable or unknown.
    pub frame_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_picture_type_codes() {
        for ty in [
            PictureType::Unknown,
            PictureType::I,
            PictureType::P,
            PictureType::B,
            PictureType::S,
            PictureType::Si,
            PictureType::Sp,
            PictureType::Bi,
        ] {
            assert_eq!(PictureType::from_i32(ty.as_i32()), ty);
        }
        assert_eq!(PictureType::from_i32(-1), PictureType::Unknown);
        assert_eq!(PictureType::from_i32(99), PictureType::Unknown);
    }

    #[test]
    fn verify_format_names() {
        assert_eq!(PixelFormat::parse("yuv420p"), PixelFormat::Yuv420p);
        assert_eq!(PixelFormat::parse("bogus"), PixelFormat::None);
        assert_eq!(PixelFormat::Yuv420p.as_str(), "yuv420p");
        assert_eq!(PixelFormat::None.as_str(), "none");

        assert_eq!(SampleFormat::parse("fltp"), SampleFormat::Fltp);
        assert_eq!(SampleFormat::parse("bogus"), SampleFormat::None);
        assert_eq!(SampleFormat::S16.bytes_per_sample(), 2);
        assert_eq!(SampleFormat::Dblp.bytes_per_sample(), 8);
    }

    #[test]
    fn verify_channel_layouts() {
        assert_eq!(default_channel_layout(0), 0);
        assert_eq!(default_channel_layout(1), 0x4);
        assert_eq!(default_channel_layout(2), 0x3);
        assert_eq!(default_channel_layout(6), 0x3f);

        assert_eq!(channel_count(default_channel_layout(1)), 1);
        assert_eq!(channel_count(default_channel_layout(2)), 2);
        assert_eq!(channel_count(default_channel_layout(6)), 6);
    }
}
