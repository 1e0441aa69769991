// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

//! 7-to-8 MSB escaping (Sequential/DSI "packed MS bit" format).
//!
//! Raw bytes are grouped by 7. Each group is preceded by a byte that
//! carries the most significant bits of the group, bit `i` for byte `i`.

use super::{Error, Result};

const GROUP_LEN: usize = 7;

#[must_use]
pub const fn escaped_len(raw_len: usize) -> usize {
    raw_len + raw_len.div_ceil(GROUP_LEN)
}

#[must_use]
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(escaped_len(data.len()));
    for group in data.chunks(GROUP_LEN) {
        let msbs = group
            .iter()
            .enumerate()
            .fold(0u8, |msbs, (i, &byte)| msbs | ((byte >> 7) << i));
        escaped.push(msbs);
        escaped.extend(group.iter().map(|&byte| byte & 0x7f));
    }
    escaped
}

/// Reverse [`escape()`].
///
/// A trailing partial group is tolerated and the result is zero-padded
/// up to `expected_len`. Excess trailing bytes that are all zero are
/// discarded, any other excess is rejected.
pub fn unescape(escaped: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(expected_len.max(escaped.len()));
    for (group_index, group) in escaped.chunks(GROUP_LEN + 1).enumerate() {
        let offset = group_index * (GROUP_LEN + 1);
        let Some((&msbs, bytes)) = group.split_first() else {
            continue;
        };
        if msbs > 0x7f {
            return Err(Error::InvalidEncodedByte { offset, value: msbs });
        }
        for (i, &byte) in bytes.iter().enumerate() {
            if byte > 0x7f {
                return Err(Error::InvalidEncodedByte {
                    offset: offset + 1 + i,
                    value: byte,
                });
            }
            data.push(byte | (((msbs >> i) & 0x01) << 7));
        }
    }
    if data.len() > expected_len {
        if data[expected_len..].iter().any(|&byte| byte != 0) {
            return Err(Error::UnexpectedLength {
                expected: expected_len,
                actual: data.len(),
            });
        }
        log::debug!(
            "Discarding {excess} trailing zero bytes",
            excess = data.len() - expected_len
        );
        data.truncate(expected_len);
    }
    data.resize(expected_len, 0);
    Ok(data)
}
