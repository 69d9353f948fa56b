// Segno
// Copyright (c) 2026 The Project Segno Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `pts` module fabricates presentation timestamps for containers that carry only decode
//! timestamps of MPEG-1/2 Video, VC-1, or WMV3 streams.

use segno_core::codecs::PictureType;

use crate::frame::VideoFrameList;

/// Generate presentation timestamps from decode timestamps, in decode order.
///
/// If any B-picture exists, the encoder is assumed to delay the display of each I- or P-picture
/// by the number of consecutive B-pictures that follow it:
///
/// ```text
/// Decode order:        I[1] P[2] P[3] B[4] B[5] P[6] ...
/// DTS:                   0    1    2    3    4    5  ...
/// Presentation order:  I[1] P[2] B[4] B[5] P[3] P[6] ...
/// PTS:                   1    2    3    4    5    6  ...
/// ```
///
/// B-pictures are displayed in the order they are decoded, so each takes its own DTS as PTS,
/// while an anchor picture takes the DTS of the next anchor. Leading pictures, whose PTS falls
/// before the PTS of the preceding keyframe, are marked along the way.
///
/// Must only be called when every record carries a decode timestamp and the decode timestamps
/// strictly increase.
pub fn generate_pts_from_dts(frames: &mut VideoFrameList) {
    let count = frames.len();
    if count == 0 {
        return;
    }

    let mut reordered = false;
    let mut consecutive_b: u32 = 0;

    for i in 1..=count {
        if frames[i].pict_type == PictureType::B {
            // B-pictures are output in the same order as they are encoded.
            frames[i].pts = frames[i].dts;
            consecutive_b += 1;
            reordered = true;
        }
        else {
            // The DTS of this picture becomes the PTS of the previous anchor picture.
            if i > consecutive_b + 1 {
                let dts = frames[i].dts;
                frames[i - consecutive_b - 1].pts = dts;
            }
            consecutive_b = 0;
        }
    }

    if reordered && consecutive_b != count {
        // The final anchor picture never had its PTS pulled forward. If its current value
        // duplicates the PTS of another record it cannot stand; scan backwards through records
        // whose DTS does not exceed it.
        let flush_number = count - consecutive_b;

        if let Some(last_pts) = frames[flush_number].pts {
            let mut i = count;
            while i >= 1 && frames[i].dts.map_or(true, |dts| last_pts >= dts) {
                if frames[i].pts == Some(last_pts) && i != flush_number {
                    frames[flush_number].pts = None;
                    break;
                }
                i -= 1;
            }
        }

        if frames[flush_number].pts.is_none() {
            // Estimate the PTS of the last displayed picture from the final DTS step.
            if let (Some(last), Some(prev)) = (frames[count].dts, frames[count - 1].dts) {
                frames[flush_number].pts = Some(last + (last - prev));
            }
        }

        // Mark leading pictures: they follow a keyframe in decode order but precede it in
        // display order, and may be discarded on seek.
        let mut last_keyframe_pts: Option<i64> = None;
        for i in 1..=count {
            if let (Some(pts), Some(key_pts)) = (frames[i].pts, last_keyframe_pts) {
                if pts < key_pts {
                    frames[i].is_leading = true;
                }
            }
            if frames[i].keyframe {
                last_keyframe_pts = frames[i].pts;
            }
        }
    }
    else {
        // No reordering observed. Display order equals decode order.
        for i in 1..=count {
            frames[i].pts = frames[i].dts;
        }
    }
}
