// Segno
// Copyright (c) 2026 The Project Segno Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `units` module provides definitions for common units.

use std::fmt;

/// A `TimeBase` is the conversion factor between time, expressed in seconds, and a timestamp or
/// duration tick.
///
/// In other words, a `TimeBase` is the length in seconds of one tick of a timestamp or duration.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TimeBase {
    /// The numerator.
    pub num: u32,
    /// The denominator.
    pub den: u32,
}

impl TimeBase {
    /// Creates a new `TimeBase`. Panics if either the numerator or denominator is 0.
    pub fn new(num: u32, den: u32) -> Self {
        if num == 0 || den == 0 {
            panic!("TimeBase cannot have 0 numerator or denominator");
        }

        TimeBase { num, den }
    }

    /// Returns true if either the numerator or denominator is 0. A degenerate time base cannot be
    /// used for rescaling.
    pub fn is_degenerate(&self) -> bool {
        self.num == 0 || self.den == 0
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Accurately rescales a tick count from one `TimeBase` into another.
///
/// The intermediate product of a 64-bit tick count and two 32-bit time base components requires
/// up-to 128 bits, so the calculation is performed with 128-bit integer arithmetic. The result is
/// rounded to the nearest representable tick, with halfway cases rounded away from zero.
pub fn rescale(ticks: i64, from: TimeBase, to: TimeBase) -> i64 {
    assert!(!from.is_degenerate() && !to.is_degenerate(), "rescale with degenerate TimeBase");

    let num = i128::from(ticks) * i128::from(from.num) * i128::from(to.den);
    let den = i128::from(from.den) * i128::from(to.num);

    let half = den / 2;

    if num >= 0 {
        ((num + half) / den) as i64
    }
    else {
        ((num - half) / den) as i64
    }
}
