// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

//! Nibble packing with a trailing 7-bit checksum (Oberheim Matrix).
//!
//! Each raw byte is sent as two data bytes, the low nibble first.
//! A single checksum byte follows, the sum of all raw bytes masked
//! to 7 bits.

use super::{Error, Result};

#[must_use]
pub const fn nibble_packed_len(raw_len: usize) -> usize {
    raw_len * 2 + 1
}

/// 7-bit sum of all raw bytes
#[must_use]
pub fn nibble_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte)) & 0x7f
}

#[must_use]
pub fn nibble_pack(data: &[u8]) -> Vec<u8> {
    let mut packed = Vec::with_capacity(nibble_packed_len(data.len()));
    for &byte in data {
        packed.push(byte & 0x0f);
        packed.push(byte >> 4);
    }
    packed.push(nibble_checksum(data));
    packed
}

/// Unpack nibbles and validate the trailing checksum.
///
/// Fails with [`Error::ChecksumMismatch`] if the data is corrupted.
pub fn nibble_unpack(packed: &[u8]) -> Result<Vec<u8>> {
    let Some((&expected, nibbles)) = packed.split_last() else {
        return Err(Error::UnexpectedLength {
            expected: nibble_packed_len(0),
            actual: 0,
        });
    };
    if nibbles.len() % 2 != 0 {
        return Err(Error::UnexpectedLength {
            expected: nibble_packed_len(nibbles.len() / 2),
            actual: packed.len(),
        });
    }
    if let Some((offset, &value)) = nibbles
        .iter()
        .enumerate()
        .find(|(_, &nibble)| nibble > 0x0f)
    {
        return Err(Error::InvalidEncodedByte { offset, value });
    }
    let mut computed = 0u8;
    let data = nibbles
        .chunks_exact(2)
        .map(|pair| {
            let byte = pair[0] | (pair[1] << 4);
            computed = computed.wrapping_add(byte);
            byte
        })
        .collect();
    let computed = computed & 0x7f;
    if computed != expected {
        return Err(Error::ChecksumMismatch { expected, computed });
    }
    Ok(data)
}
