// Segno
// Copyright (c) 2026 The Project Segno Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `packet` module defines the packet structure.

use bitflags::bitflags;

bitflags! {
    /// Flags indicating attributes of a packet.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct PacketFlags: u32 {
        /// The packet contains a keyframe: a frame decodable without reference to any earlier
        /// packet on the same stream, given the parameter set in force.
        ///
        /// Containers are known to over-flag keyframes. The indexer may clear this flag after
        /// inspecting the payload.
        const KEY     = 1 << 0;
        /// The packet payload is known to be damaged.
        const CORRUPT = 1 << 1;
    }
}

/// Well-known kinds of side data that may accompany a packet.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SideDataType {
    /// A replacement codec parameter set (extra data) taking effect at this packet.
    NewExtraData,
    /// A codec parameter change description.
    ParamChange,
}

/// A single side-datum attached to a packet.
#[derive(Clone, Debug)]
pub struct SideData {
    /// The kind of side data.
    pub kind: SideDataType,
    /// The raw side data payload.
    pub data: Box<[u8]>,
}

/// A `Packet` contains a discrete amount of encoded data for a single codec bitstream. The exact
/// amount of data is bounded, but not defined, and is dependant on the container and/or the
/// encapsulated codec.
///
/// # Timing
///
/// Timestamps are expressed in ticks of the owning stream's `TimeBase` and are taken from the
/// container verbatim. Containers frequently omit one or both timestamps, so the PTS and DTS are
/// each optional. Likewise, the byte position of the packet within the container is recorded when
/// the demuxer knows it, and is `-1` otherwise.
#[derive(Clone, Debug)]
pub struct Packet {
    /// The index of the stream this packet belongs to.
    pub stream_index: usize,
    /// The presentation timestamp of the packet, if the container carries one.
    pub pts: Option<i64>,
    /// The decode timestamp of the packet, if the container carries one.
    pub dts: Option<i64>,
    /// The byte offset of the packet within the container, or `-1` if unknown.
    pub pos: i64,
    /// Flags indicating attributes of the packet.
    pub flags: PacketFlags,
    /// The packet data buffer.
    pub data: Box<[u8]>,
    /// Side data attached to the packet.
    pub side_data: Vec<SideData>,
}

impl Packet {
    /// Create a new packet for a stream with the given payload. All timing fields start unset.
    pub fn new(stream_index: usize, data: impl Into<Box<[u8]>>) -> Self {
        Packet {
            stream_index,
            pts: None,
            dts: None,
            pos: -1,
            flags: PacketFlags::empty(),
            data: data.into(),
            side_data: Vec::new(),
        }
    }

    /// Provide the presentation timestamp.
    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Provide the decode timestamp.
    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    /// Provide the byte offset of the packet within the container.
    pub fn with_pos(mut self, pos: i64) -> Self {
        self.pos = pos;
        self
    }

    /// Append packet flags.
    pub fn with_flags(mut self, flags: PacketFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Attach a side-datum to the packet.
    pub fn with_side_data(mut self, kind: SideDataType, data: impl Into<Box<[u8]>>) -> Self {
        self.side_data.push(SideData { kind, data: data.into() });
        self
    }

    /// Returns true if the packet is flagged as a keyframe.
    #[inline]
    pub fn is_key(&self) -> bool {
        self.flags.contains(PacketFlags::KEY)
    }

    /// Set or clear the keyframe flag.
    pub fn set_key(&mut self, key: bool) {
        self.flags.set(PacketFlags::KEY, key);
    }

    /// Get an immutable slice to the packet data buffer.
    #[inline]
    pub fn buf(&self) -> &[u8] {
        &self.data
    }

    /// Look up the first side-datum of the given kind.
    pub fn side_data(&self, kind: SideDataType) -> Option<&[u8]> {
        self.side_data.iter().find(|sd| sd.kind == kind).map(|sd| sd.data.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::{Packet, PacketFlags, SideDataType};

    #[test]
    fn verify_packet_defaults() {
        let pkt = Packet::new(3, vec![1, 2, 3]);
        assert_eq!(pkt.stream_index, 3);
        assert_eq!(pkt.pts, None);
        assert_eq!(pkt.dts, None);
        assert_eq!(pkt.pos, -1);
        assert!(!pkt.is_key());
        assert_eq!(pkt.buf(), &[1, 2, 3]);
    }

    #[test]
    fn verify_side_data_lookup() {
        let pkt = Packet::new(0, vec![0u8; 4])
            .with_side_data(SideDataType::ParamChange, vec![9])
            .with_side_data(SideDataType::NewExtraData, vec![1, 2])
            .with_side_data(SideDataType::NewExtraData, vec![3, 4]);

        // The first datum of the requested kind wins.
        assert_eq!(pkt.side_data(SideDataType::NewExtraData), Some(&[1, 2][..]));
        assert_eq!(pkt.side_data(SideDataType::ParamChange), Some(&[9][..]));
    }

    #[test]
    fn verify_key_flag() {
        let mut pkt = Packet::new(0, vec![]).with_flags(PacketFlags::KEY);
        assert!(pkt.is_key());
        pkt.set_key(false);
        assert!(!pkt.is_key());
    }
}
