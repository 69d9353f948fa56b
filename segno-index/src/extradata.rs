// Segno
// Copyright (c) 2026 The Project Segno Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `extradata` module tracks the distinct codec parameter sets seen on a stream.
//!
//! Containers may change codec parameters mid-stream. Every indexed packet is associated with the
//! parameter set required to decode it, so that a seek can install the right extra data before
//! handing packets to a decoder.

use log::debug;

use segno_core::codecs::{CodecId, CodecState, PixelFormat, SampleFormat, CODEC_ID_NULL};
use segno_core::packet::{Packet, SideDataType};

/// One distinct codec parameter set, together with the decoded attributes it implies.
///
/// Attributes are filled lazily: scalars still at their zero/none value are taken from the live
/// codec state at packet time, capturing information that may only become available after the
/// parser has seen the first payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtraData {
    /// The raw parameter blob. Entries are deduplicated by byte equality of this field.
    pub data: Box<[u8]>,
    /// The codec ID.
    pub codec_id: CodecId,
    /// The container-specific codec tag, or 0.
    pub codec_tag: u32,
    /// Video width in pixels.
    pub width: u32,
    /// Video height in pixels.
    pub height: u32,
    /// The pixel format of decoded frames.
    pub pixel_format: PixelFormat,
    /// Bits per sample.
    pub bits_per_sample: u32,
    /// The audio channel layout bitmask.
    pub channel_layout: u64,
    /// The audio sample rate in Hz.
    pub sample_rate: u32,
    /// The format of decoded audio samples.
    pub sample_format: SampleFormat,
    /// The number of bytes per audio frame for constant-size codecs, or 0.
    pub block_align: u32,
}

impl ExtraData {
    /// Create an entry holding a copy of the given blob, with all attributes unset.
    pub fn with_data(data: &[u8]) -> Self {
        ExtraData { data: data.into(), ..Default::default() }
    }
}

/// The ordered list of distinct parameter sets seen on one stream, with a cursor naming the set
/// currently in force.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtraDataList {
    entries: Vec<ExtraData>,
    current: usize,
}

impl ExtraDataList {
    /// Create an empty list.
    pub fn new() -> Self {
        ExtraDataList { entries: Vec::new(), current: 0 }
    }

    /// Get the entries.
    pub fn entries(&self) -> &[ExtraData] {
        &self.entries
    }

    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the list holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the index of the entry currently in force.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Set the index of the entry currently in force.
    pub fn set_current_index(&mut self, index: usize) {
        self.current = index;
    }

    /// Append a fully-formed entry, returning its index. Used when rebuilding a list from an
    /// index file.
    pub fn push(&mut self, entry: ExtraData) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Determine the parameter set in force for `pkt` and return its index, appending a new entry
    /// if the packet introduces one.
    ///
    /// The candidate blob is assembled in priority order: a `NewExtraData` side-datum attached to
    /// the packet, then a parameter block split off the front of the payload by `split`, then the
    /// stream's current extra data. A keyframe whose parameter block cannot be located by a
    /// splitting parser is not actually decodable from scratch, so its keyframe flag is cleared.
    pub fn append_if_new(
        &mut self,
        pkt: &mut Packet,
        state: &CodecState,
        split: impl FnOnce(&[u8]) -> Option<usize>,
    ) -> usize {
        // Decoders might not update the stream's extra data even when a new parameter set occurs.
        // Non-keyframes are assumed to reference the set currently in force.
        if !pkt.is_key() && !self.entries.is_empty() {
            return self.current;
        }

        let blob: &[u8] = if let Some(side) = pkt.side_data(SideDataType::NewExtraData) {
            side
        }
        else {
            match split(pkt.buf()) {
                Some(size) if size > 0 => &pkt.buf()[..size],
                Some(_) if !self.entries.is_empty() => {
                    // The parser can split this codec but found no parameter block in front of
                    // the frame. An IDR whose parameter sets do not precede it is not decodable
                    // from scratch.
                    pkt.set_key(false);
                    return self.current;
                }
                _ => &state.extra_data,
            }
        };

        if self.entries.is_empty() {
            self.entries.push(ExtraData::with_data(blob));
            self.current = 0;
            return 0;
        }

        if self.entries[self.current].data.as_ref() == blob {
            return self.current;
        }

        // Check if this parameter set was seen before. The current entry was already compared.
        for (i, entry) in self.entries.iter().enumerate() {
            if i != self.current && entry.data.as_ref() == blob {
                self.current = i;
                return i;
            }
        }

        debug!("new extra data of {} bytes on stream {}", blob.len(), pkt.stream_index);
        self.entries.push(ExtraData::with_data(blob));
        self.current = self.entries.len() - 1;
        self.current
    }

    /// Fill unset video attributes of the in-force entry from the live codec state.
    pub fn fill_video_attributes(&mut self, state: &CodecState) {
        let Some(entry) = self.entries.get_mut(self.current) else { return };

        if entry.width == 0 {
            entry.width = state.width;
        }
        if entry.height == 0 {
            entry.height = state.height;
        }
        if entry.pixel_format == PixelFormat::None {
            entry.pixel_format = state.pixel_format;
        }
        if entry.bits_per_sample == 0 {
            entry.bits_per_sample = state.bits_per_coded_sample;
        }
        if entry.codec_id == CODEC_ID_NULL {
            entry.codec_id = state.codec_id;
        }
        if entry.codec_tag == 0 {
            entry.codec_tag = state.codec_tag;
        }
    }

    /// Fill unset audio attributes of the in-force entry from the live codec state.
    pub fn fill_audio_attributes(&mut self, state: &CodecState, bits_per_sample: u32) {
        let Some(entry) = self.entries.get_mut(self.current) else { return };

        if entry.channel_layout == 0 {
            entry.channel_layout = state.channel_layout;
        }
        if entry.sample_rate == 0 {
            entry.sample_rate = state.sample_rate;
        }
        if entry.sample_format == SampleFormat::None {
            entry.sample_format = state.sample_format;
        }
        if entry.bits_per_sample == 0 {
            entry.bits_per_sample = bits_per_sample;
        }
        if entry.block_align == 0 {
            entry.block_align = state.block_align;
        }
        if entry.codec_id == CODEC_ID_NULL {
            entry.codec_id = state.codec_id;
        }
        if entry.codec_tag == 0 {
            entry.codec_tag = state.codec_tag;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ExtraDataList;

    use segno_core::codecs::CodecState;
    use segno_core::packet::{Packet, PacketFlags, SideDataType};

    fn key_packet(data: &[u8]) -> Packet {
        Packet::new(0, data).with_flags(PacketFlags::KEY)
    }

    fn state_with_extra_data(data: &[u8]) -> CodecState {
        CodecState { extra_data: data.into(), ..Default::default() }
    }

    #[test]
    fn verify_first_entry() {
        let mut list = ExtraDataList::new();
        let state = state_with_extra_data(&[1, 2, 3]);
        let mut pkt = key_packet(&[0xff]);

        assert_eq!(list.append_if_new(&mut pkt, &state, |_| None), 0);
        assert_eq!(list.len(), 1);
        assert_eq!(list.entries()[0].data.as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn verify_dedup_and_smallest_index() {
        let mut list = ExtraDataList::new();
        let a = state_with_extra_data(&[1]);
        let b = state_with_extra_data(&[2]);

        assert_eq!(list.append_if_new(&mut key_packet(&[0]), &a, |_| None), 0);
        assert_eq!(list.append_if_new(&mut key_packet(&[0]), &b, |_| None), 1);
        // Returning to a previously seen set must find the existing entry, not append.
        assert_eq!(list.append_if_new(&mut key_packet(&[0]), &a, |_| None), 0);
        assert_eq!(list.len(), 2);
        assert_eq!(list.current_index(), 0);
    }

    #[test]
    fn verify_non_keyframes_keep_current() {
        let mut list = ExtraDataList::new();
        let a = state_with_extra_data(&[1]);
        let b = state_with_extra_data(&[2]);

        assert_eq!(list.append_if_new(&mut key_packet(&[0]), &a, |_| None), 0);

        // A non-keyframe never changes the list, even if the live state moved on.
        let mut inter = Packet::new(0, vec![0u8]);
        assert_eq!(list.append_if_new(&mut inter, &b, |_| None), 0);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn verify_side_data_wins() {
        let mut list = ExtraDataList::new();
        let state = state_with_extra_data(&[1]);

        let mut pkt = key_packet(&[0]).with_side_data(SideDataType::NewExtraData, vec![9, 9]);
        assert_eq!(list.append_if_new(&mut pkt, &state, |_| Some(1)), 0);
        assert_eq!(list.entries()[0].data.as_ref(), &[9, 9]);
    }

    #[test]
    fn verify_split_prefix_used() {
        let mut list = ExtraDataList::new();
        let state = state_with_extra_data(&[1]);

        let mut pkt = key_packet(&[7, 8, 9, 10]);
        assert_eq!(list.append_if_new(&mut pkt, &state, |data| Some(data.len() - 2)), 0);
        assert_eq!(list.entries()[0].data.as_ref(), &[7, 8]);
    }

    #[test]
    fn verify_split_miss_clears_keyframe() {
        let mut list = ExtraDataList::new();
        let state = state_with_extra_data(&[1]);

        assert_eq!(list.append_if_new(&mut key_packet(&[0]), &state, |_| Some(2)), 0);

        // A flagged keyframe with no leading parameter block keeps the in-force set and loses
        // its keyframe status.
        let mut pkt = key_packet(&[0]);
        assert_eq!(list.append_if_new(&mut pkt, &state, |_| Some(0)), 0);
        assert!(!pkt.is_key());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn verify_lazy_attribute_fill() {
        let mut list = ExtraDataList::new();
        let mut state = state_with_extra_data(&[1]);
        list.append_if_new(&mut key_packet(&[0]), &state, |_| None);

        // Nothing known yet.
        list.fill_video_attributes(&state);
        assert_eq!(list.entries()[0].width, 0);

        // The parser has since discovered the dimensions.
        state.width = 640;
        state.height = 360;
        list.fill_video_attributes(&state);
        assert_eq!(list.entries()[0].width, 640);
        assert_eq!(list.entries()[0].height, 360);

        // Established attributes are not overwritten.
        state.width = 1920;
        list.fill_video_attributes(&state);
        assert_eq!(list.entries()[0].width, 640);
    }
}
