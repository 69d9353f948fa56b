// Segno
// Copyright (c) 2026 The Project Segno Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `output` module aggregates the audio output parameters a frame-server would configure
//! itself with: the widest channel layout, the best sample format, and the highest sample rate
//! and bit depth observed across the elected stream.

use segno_core::codecs::{channel_count, SampleFormat};

/// Aggregated audio output parameters for the elected audio stream.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AudioOutputParams {
    /// The widest channel layout observed.
    pub channel_layout: u64,
    /// The best sample format observed.
    pub sample_format: SampleFormat,
    /// The highest sample rate observed, in Hz.
    pub sample_rate: u32,
    /// The highest bit depth observed.
    pub bits_per_sample: u32,
}

impl AudioOutputParams {
    /// Fold one packet's parameters into the aggregate.
    pub fn update(
        &mut self,
        channel_layout: u64,
        sample_format: SampleFormat,
        sample_rate: u32,
        bits_per_sample: u32,
    ) {
        if channel_count(channel_layout) > channel_count(self.channel_layout) {
            self.channel_layout = channel_layout;
        }
        self.sample_format = select_better_sample_format(self.sample_format, sample_format);
        self.sample_rate = self.sample_rate.max(sample_rate);
        self.bits_per_sample = self.bits_per_sample.max(bits_per_sample);
    }
}

/// Pick the better of two sample formats.
///
/// Formats are ranked by the information they can carry; planar and packed variants rank alike.
/// The incumbent wins ties, so the format never churns between equivalent variants.
pub fn select_better_sample_format(a: SampleFormat, b: SampleFormat) -> SampleFormat {
    if promotion_rank(b) > promotion_rank(a) {
        b
    }
    else {
        a
    }
}

fn promotion_rank(format: SampleFormat) -> u32 {
    match format {
        SampleFormat::None => 0,
        SampleFormat::U8 | SampleFormat::U8p => 1,
        SampleFormat::S16 | SampleFormat::S16p => 2,
        SampleFormat::S32 | SampleFormat::S32p => 3,
        SampleFormat::Flt | SampleFormat::Fltp => 4,
        SampleFormat::Dbl | SampleFormat::Dblp => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::{select_better_sample_format, AudioOutputParams};

    use segno_core::codecs::SampleFormat;

    #[test]
    fn verify_format_promotion() {
        use SampleFormat::*;

        assert_eq!(select_better_sample_format(None, S16), S16);
        assert_eq!(select_better_sample_format(U8, S16p), S16p);
        assert_eq!(select_better_sample_format(S16, U8), S16);
        assert_eq!(select_better_sample_format(S16, S16p), S16);
        assert_eq!(select_better_sample_format(S32, Flt), Flt);
        assert_eq!(select_better_sample_format(Flt, S32), Flt);
        assert_eq!(select_better_sample_format(Flt, Dblp), Dblp);
        assert_eq!(select_better_sample_format(Dbl, Fltp), Dbl);
    }

    #[test]
    fn verify_aggregation() {
        let mut params = AudioOutputParams::default();

        params.update(0x3, SampleFormat::S16, 44_100, 16);
        params.update(0x3f, SampleFormat::Fltp, 48_000, 24);
        params.update(0x4, SampleFormat::U8, 22_050, 8);

        assert_eq!(params.channel_layout, 0x3f);
        assert_eq!(params.sample_format, SampleFormat::Fltp);
        assert_eq!(params.sample_rate, 48_000);
        assert_eq!(params.bits_per_sample, 24);
    }
}
