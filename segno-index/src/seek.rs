// Segno
// Copyright (c) 2026 The Project Segno Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `seek` module classifies an elected stream into a seek regime after the scan.
//!
//! A downstream frame-server needs one trustworthy axis — presentation timestamps, decode
//! timestamps, or byte offsets — along which every frame can be located. The deciders inspect the
//! invariants the scanned records actually satisfy, drop the axes that are broken, fabricate
//! presentation timestamps where the codec permits it, and finally enforce that keyframes are
//! unique along the surviving axis.

use bitflags::bitflags;

use segno_core::codecs::well_known::{
    CODEC_ID_MPEG1VIDEO, CODEC_ID_MPEG2VIDEO, CODEC_ID_VC1, CODEC_ID_WMV3,
};
use segno_core::codecs::CodecId;
use segno_core::demux::FormatFlags;

use crate::frame::{AudioFrameList, KeyframeList, OrderConverter, VideoFrameList};
use crate::pts::generate_pts_from_dts;

bitflags! {
    /// How an elected stream may be seeked.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct SeekFlags: u32 {
        /// Decode timestamps are present and strictly increasing.
        const DTS_BASED      = 1 << 0;
        /// Presentation timestamps are present on every frame.
        const PTS_BASED      = 1 << 1;
        /// The container supports seeking by byte offset.
        const POS_BASED      = 1 << 2;
        /// Byte offsets are present and strictly increasing, allowing position fixups.
        const POS_CORRECTION = 1 << 3;
        /// Presentation timestamps were fabricated from decode timestamps.
        const PTS_GENERATED  = 1 << 4;
    }
}

/// Line up the candidate seek bases for a container format.
///
/// Byte-offset seeking is only a candidate for MPEG program and transport streams; every other
/// format starts from timestamps with offsets used for correction only.
pub fn seek_base_candidates(format_name: &str) -> SeekFlags {
    if format_name == "mpeg" || format_name == "mpegts" {
        SeekFlags::DTS_BASED | SeekFlags::PTS_BASED | SeekFlags::POS_BASED | SeekFlags::POS_CORRECTION
    }
    else {
        SeekFlags::DTS_BASED | SeekFlags::PTS_BASED | SeekFlags::POS_CORRECTION
    }
}

/// Whether the codec reorders pictures in a way that permits fabricating PTS from DTS.
fn is_pts_generation_codec(codec_id: CodecId) -> bool {
    codec_id == CODEC_ID_MPEG1VIDEO
        || codec_id == CODEC_ID_MPEG2VIDEO
        || codec_id == CODEC_ID_VC1
        || codec_id == CODEC_ID_WMV3
}

/// Whether any record presents earlier than its predecessor.
fn check_frame_reordering(frames: &VideoFrameList) -> bool {
    for i in 2..=frames.len() {
        if frames[i].pts < frames[i - 1].pts {
            return true;
        }
    }
    false
}

/// Classify the elected video stream into a seek regime.
///
/// On return the frame list is sorted into presentation order when reordering was observed, every
/// record carries a usable PTS whenever any timestamp axis survived, and the returned keyframe
/// list answers keyframe membership in decode order.
pub fn decide_video_seek_method(
    format_name: &str,
    format_flags: FormatFlags,
    codec_id: CodecId,
    frames: &mut VideoFrameList,
) -> (SeekFlags, Option<OrderConverter>, KeyframeList) {
    let count = frames.len();
    if count == 0 {
        return (SeekFlags::empty(), None, KeyframeList::new(0));
    }

    let mut flags = seek_base_candidates(format_name);

    // PTS survives only when every frame carries one.
    for i in 1..=count {
        if frames[i].pts.is_none() {
            flags.remove(SeekFlags::PTS_BASED);
            break;
        }
    }

    // DTS survives only when present everywhere and strictly increasing.
    if frames[1].dts.is_none() {
        flags.remove(SeekFlags::DTS_BASED);
    }
    else {
        for i in 2..=count {
            if frames[i].dts.is_none() || frames[i].dts <= frames[i - 1].dts {
                flags.remove(SeekFlags::DTS_BASED);
                break;
            }
        }
    }

    // Position correction requires offsets everywhere, strictly increasing.
    if frames[1].file_offset == -1 {
        flags.remove(SeekFlags::POS_CORRECTION);
    }
    else {
        for i in 2..=count {
            if frames[i].file_offset == -1 || frames[i].file_offset <= frames[i - 1].file_offset {
                flags.remove(SeekFlags::POS_CORRECTION);
                break;
            }
        }
    }

    if flags.contains(SeekFlags::POS_BASED) {
        if format_flags.contains(FormatFlags::NO_BYTE_SEEK) {
            flags.remove(SeekFlags::POS_BASED);
        }
        else {
            let missing = (1..=count).filter(|&i| frames[i].file_offset == -1).count();
            if missing as u32 == count {
                flags.remove(SeekFlags::POS_BASED);
            }
        }
    }

    // When only DTS survived and the codec follows the classic B-picture delay rule, fabricate
    // presentation timestamps so presentation order can still be recovered.
    let mut no_pts_loss = flags.contains(SeekFlags::PTS_BASED);
    if flags.contains(SeekFlags::DTS_BASED)
        && !flags.contains(SeekFlags::PTS_BASED)
        && is_pts_generation_codec(codec_id)
    {
        generate_pts_from_dts(frames);
        flags.insert(SeekFlags::PTS_BASED | SeekFlags::PTS_GENERATED);
        no_pts_loss = true;
    }

    let mut order_converter = None;

    if no_pts_loss && check_frame_reordering(frames) {
        // Keyframe detection must consider presentation order. Sort the records by PTS,
        // breaking ties by the original decode position, and keep the inverse mapping.
        frames.records_mut().sort_by_key(|f| (f.pts, f.sample_number));

        let mut converter = OrderConverter::new(count);
        for presentation in 1..=count {
            converter.set(frames[presentation].sample_number, presentation);
        }
        order_converter = Some(converter);
    }
    else if flags.contains(SeekFlags::DTS_BASED) {
        for i in 1..=count {
            frames[i].pts = frames[i].dts;
        }
    }

    // Treat only video frames with a unique value along the trusted axis as keyframes.
    if flags.contains(SeekFlags::POS_BASED) {
        keep_unique_video_keyframes(frames, |f| (f.file_offset != -1).then_some(f.file_offset));
    }
    else if flags.contains(SeekFlags::PTS_BASED) {
        keep_unique_video_keyframes(frames, |f| f.pts);
    }
    else if flags.contains(SeekFlags::DTS_BASED) {
        keep_unique_video_keyframes(frames, |f| f.dts);
    }

    // The frame list may now be in presentation order; the keyframe list answers in decode order.
    let mut keyframes = KeyframeList::new(count);
    for i in 1..=count {
        keyframes.set(frames[i].sample_number, frames[i].keyframe);
    }

    (flags, order_converter, keyframes)
}

fn keep_unique_video_keyframes(
    frames: &mut VideoFrameList,
    axis: impl Fn(&crate::frame::VideoFrameInfo) -> Option<i64>,
) {
    let count = frames.len();

    if axis(&frames[1]).is_none() {
        frames[1].keyframe = false;
    }
    for i in 2..=count {
        match axis(&frames[i]) {
            None => frames[i].keyframe = false,
            Some(value) => {
                if axis(&frames[i - 1]) == Some(value) {
                    frames[i].keyframe = false;
                    frames[i - 1].keyframe = false;
                }
            }
        }
    }
}

/// Classify the elected audio stream into a seek regime.
///
/// Audio records are never reordered. When no axis survives at all, every packet is treated as a
/// keyframe on the presumption that the codec is self-syncing.
pub fn decide_audio_seek_method(
    format_name: &str,
    format_flags: FormatFlags,
    frames: &mut AudioFrameList,
) -> SeekFlags {
    let count = frames.len();
    if count == 0 {
        return SeekFlags::empty();
    }

    let mut flags = seek_base_candidates(format_name);

    for i in 1..=count {
        if frames[i].pts.is_none() {
            flags.remove(SeekFlags::PTS_BASED);
            break;
        }
    }
    for i in 1..=count {
        if frames[i].dts.is_none() {
            flags.remove(SeekFlags::DTS_BASED);
            break;
        }
    }
    if flags.contains(SeekFlags::POS_BASED) {
        if format_flags.contains(FormatFlags::NO_BYTE_SEEK) {
            flags.remove(SeekFlags::POS_BASED);
        }
        else {
            let missing = (1..=count).filter(|&i| frames[i].file_offset == -1).count();
            if missing as u32 == count {
                flags.remove(SeekFlags::POS_BASED);
            }
        }
    }

    if !flags.contains(SeekFlags::PTS_BASED) && flags.contains(SeekFlags::DTS_BASED) {
        for i in 1..=count {
            frames[i].pts = frames[i].dts;
        }
    }

    // Treat audio frames with a unique value along the trusted axis as keyframes.
    if flags.contains(SeekFlags::POS_BASED) {
        keep_unique_audio_keyframes(frames, |f| (f.file_offset != -1).then_some(f.file_offset));
    }
    else if flags.contains(SeekFlags::PTS_BASED) {
        keep_unique_audio_keyframes(frames, |f| f.pts);
    }
    else if flags.contains(SeekFlags::DTS_BASED) {
        keep_unique_audio_keyframes(frames, |f| f.dts);
    }
    else {
        for i in 1..=count {
            frames[i].keyframe = true;
        }
    }

    flags
}

fn keep_unique_audio_keyframes(
    frames: &mut AudioFrameList,
    axis: impl Fn(&crate::frame::AudioFrameInfo) -> Option<i64>,
) {
    let count = frames.len();

    frames[1].keyframe = axis(&frames[1]).is_some();
    for i in 2..=count {
        match axis(&frames[i]) {
            None => frames[i].keyframe = false,
            Some(value) => {
                if axis(&frames[i - 1]) == Some(value) {
                    frames[i].keyframe = false;
                    frames[i - 1].keyframe = false;
                }
                else {
                    frames[i].keyframe = true;
                }
            }
        }
    }
}
