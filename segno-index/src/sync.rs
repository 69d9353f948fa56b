// Segno
// Copyright (c) 2026 The Project Segno Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `sync` module computes the offset between the first video and audio timestamps, in output
//! audio samples.

use segno_core::units::{rescale, TimeBase};

use crate::frame::{AudioFrameList, VideoFrameList};
use crate::seek::SeekFlags;

/// Calculate the A/V gap: the offset between the first video timestamp and the timestamp of the
/// first audio sample, expressed in ticks of `1 / sample_rate`.
///
/// The first audio record carrying a trusted timestamp may not be the first audio record; the
/// durations of every earlier record are subtracted so the result refers to the very first audio
/// sample. Records with an indeterminate length are skipped, but each one widens the subtraction
/// window by one record, mirroring decoder delay.
pub fn calculate_av_gap(
    video_frames: &VideoFrameList,
    video_flags: SeekFlags,
    audio_frames: &AudioFrameList,
    audio_flags: SeekFlags,
    video_time_base: TimeBase,
    audio_time_base: TimeBase,
    sample_rate: u32,
) -> i64 {
    if video_frames.is_empty() || audio_frames.is_empty() || sample_rate == 0 {
        return 0;
    }
    if video_time_base.is_degenerate() || audio_time_base.is_degenerate() {
        return 0;
    }

    // Pick the first video timestamp. If invalid, skip the gap calculation.
    let video_ts = if video_flags.contains(SeekFlags::PTS_BASED) {
        video_frames[1].pts
    }
    else {
        video_frames[1].dts
    };
    let Some(video_ts) = video_ts else { return 0 };

    // Pick the first valid audio timestamp. If not found, skip the gap calculation.
    let audio_count = audio_frames.len();
    let mut audio_ts = 0;
    let mut audio_ts_number = 0;
    for i in 1..=audio_count {
        let ts = if audio_flags.contains(SeekFlags::PTS_BASED) {
            audio_frames[i].pts
        }
        else {
            audio_frames[i].dts
        };
        if let Some(ts) = ts {
            audio_ts = ts;
            audio_ts_number = i;
            break;
        }
    }
    if audio_ts_number == 0 {
        return 0;
    }

    // Walk the earlier records back so that the timestamp refers to the first audio sample.
    let sample_base = TimeBase::new(1, sample_rate);
    let mut delay_count = 0;
    let mut i = 1;
    while i < (audio_ts_number + delay_count).min(audio_count) {
        let length = audio_frames[i].frame_length;
        if length != -1 {
            audio_ts -= rescale(i64::from(length), sample_base, audio_time_base);
        }
        else {
            delay_count += 1;
        }
        i += 1;
    }

    if video_ts != 0 || audio_ts != 0 {
        rescale(audio_ts, audio_time_base, sample_base)
            - rescale(video_ts, video_time_base, sample_base)
    }
    else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::calculate_av_gap;

    use segno_core::units::TimeBase;

    use crate::frame::{AudioFrameInfo, AudioFrameList, VideoFrameInfo, VideoFrameList};
    use crate::seek::SeekFlags;

    fn video_with_first_pts(pts: i64) -> VideoFrameList {
        let mut list = VideoFrameList::new();
        list.push(VideoFrameInfo { pts: Some(pts), sample_number: 1, ..Default::default() });
        list
    }

    fn audio_list(spec: &[(Option<i64>, i32)]) -> AudioFrameList {
        let mut list = AudioFrameList::new();
        for &(pts, frame_length) in spec {
            let sample_number = list.len() + 1;
            list.push(AudioFrameInfo { pts, sample_number, frame_length, ..Default::default() });
        }
        list
    }

    #[test]
    fn verify_plain_gap() {
        // Video at 1/1000, first PTS 100 ms. Audio at 1/48000, first PTS 48000 ticks = 1 s.
        let video = video_with_first_pts(100);
        let audio = audio_list(&[(Some(48_000), 1024)]);

        let gap = calculate_av_gap(
            &video,
            SeekFlags::PTS_BASED,
            &audio,
            SeekFlags::PTS_BASED,
            TimeBase::new(1, 1_000),
            TimeBase::new(1, 48_000),
            48_000,
        );

        // 1 s of audio minus 0.1 s of video, in samples.
        assert_eq!(gap, 48_000 - 4_800);
    }

    #[test]
    fn verify_untimed_leading_records_subtracted() {
        // The first two audio records carry no timestamp; their durations are subtracted from
        // the first trusted timestamp.
        let video = video_with_first_pts(0);
        let audio = audio_list(&[(None, 1_000), (None, 1_000), (Some(10_000), 1_000)]);

        let gap = calculate_av_gap(
            &video,
            SeekFlags::PTS_BASED,
            &audio,
            SeekFlags::PTS_BASED,
            TimeBase::new(1, 48_000),
            TimeBase::new(1, 48_000),
            48_000,
        );

        assert_eq!(gap, 10_000 - 2_000);
    }

    #[test]
    fn verify_indeterminate_length_extends_window() {
        // Record 1 has indeterminate length, extending the subtraction window past the trusted
        // record so record 2's duration is also subtracted.
        let video = video_with_first_pts(0);
        let audio = audio_list(&[(None, -1), (Some(5_000), 1_000), (None, 1_000)]);

        let gap = calculate_av_gap(
            &video,
            SeekFlags::PTS_BASED,
            &audio,
            SeekFlags::PTS_BASED,
            TimeBase::new(1, 48_000),
            TimeBase::new(1, 48_000),
            48_000,
        );

        assert_eq!(gap, 5_000 - 1_000);
    }

    #[test]
    fn verify_missing_timestamps_give_zero_gap() {
        let mut video = VideoFrameList::new();
        video.push(VideoFrameInfo { sample_number: 1, ..Default::default() });
        let audio = audio_list(&[(Some(100), 1_000)]);

        let gap = calculate_av_gap(
            &video,
            SeekFlags::PTS_BASED,
            &audio,
            SeekFlags::PTS_BASED,
            TimeBase::new(1, 1_000),
            TimeBase::new(1, 48_000),
            48_000,
        );
        assert_eq!(gap, 0);

        let audio = audio_list(&[(None, 1_000)]);
        let gap = calculate_av_gap(
            &video_with_first_pts(1),
            SeekFlags::PTS_BASED,
            &audio,
            SeekFlags::PTS_BASED,
            TimeBase::new(1, 1_000),
            TimeBase::new(1, 48_000),
            48_000,
        );
        assert_eq!(gap, 0);
    }
}
