// Segno
// Copyright (c) 2026 The Project Segno Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `ebdu` module reframes raw VC-1/WMV3 bitstream units into encapsulated form.
//!
//! ASF wraps VC-1 and WMV3 payloads without the start codes the codec parser expects. Prefixing a
//! start code turns a payload into an EBDU the parser accepts; raw WMV3 payloads additionally need
//! emulation-prevention bytes inserted.

/// BDU type code of a sequence header.
pub const BDU_TYPE_SEQUENCE_HEADER: u8 = 0x0f;

/// BDU type code of a frame.
pub const BDU_TYPE_FRAME: u8 = 0x0d;

/// Number of zero bytes appended after an assembled unit. Decoders overread their input buffers,
/// so the assembled unit must be padded out.
pub const INPUT_BUFFER_PADDING: usize = 64;

/// Wrap `payload` into an encapsulated bitstream data unit with the given BDU type.
///
/// When `escape` is false the payload is assumed to already be in encapsulated form and is copied
/// verbatim after the start code (the VC-1 case). When `escape` is true the payload is a raw byte
/// sequence (the WMV3 case) and an emulation-prevention `0x03` is inserted after any two
/// consecutive zero bytes that precede a byte less than or equal to `0x03`.
pub fn make_ebdu(payload: &[u8], bdu_type: u8, escape: bool) -> Vec<u8> {
    let mut unit = Vec::with_capacity(2 * payload.len() + 4 + INPUT_BUFFER_PADDING);

    // Start code.
    unit.extend_from_slice(&[0x00, 0x00, 0x01, bdu_type]);

    if !escape {
        unit.extend_from_slice(payload);
    }
    else {
        // The first two bytes cannot complete a start-code prefix, so they are copied unchecked.
        let head = payload.len().min(2);
        unit.extend_from_slice(&payload[..head]);

        for i in 2..payload.len() {
            if payload[i - 2] == 0x00 && payload[i - 1] == 0x00 && payload[i] <= 0x03 {
                unit.push(0x03);
            }
            unit.push(payload[i]);
        }
    }

    unit.resize(unit.len() + INPUT_BUFFER_PADDING, 0);
    unit
}
