// Segno
// Copyright (c) 2026 The Project Segno Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Project Segno's shared structs, traits, and contracts.
//!
//! Segno builds and reuses a persistent frame index for media containers. This crate defines the
//! pieces every Segno crate agrees on: the packet model, codec identifiers and live codec state,
//! time base arithmetic, the common error type, and the traits through which the external
//! collaborators — demuxers, codec parsers, and probe decoders — are reached. Indexing itself
//! lives in the `segno-index` crate.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all Segno crates. Please see the root manifest for their
// justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::manual_range_contains)]

pub mod codecs;
pub mod demux;
pub mod errors;
pub mod packet;
pub mod units;
