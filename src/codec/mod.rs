// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

//! Stateless codec primitives for 7-bit clean sysex payloads.

use thiserror::Error;

use crate::{SysexError, SysexMessage};

mod framing;
pub use self::framing::{
    decode_line, encode_line, join_text_lines, split_into_frames, split_text_lines, LineNumber,
    LINE_NUMBER_MODULUS, MAX_LINE_LEN,
};

mod msb;
pub use self::msb::{escape, escaped_len, unescape};

mod nibble;
pub use self::nibble::{nibble_checksum, nibble_pack, nibble_packed_len, nibble_unpack};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A value that is supposed to become a data byte does not
    /// fit into 8 bits.
    ///
    /// Rejected before sending, never clamped.
    #[error("value {value} at offset {offset} is out of range")]
    ValueOutOfRange { offset: usize, value: i64 },

    /// The decoded block failed validation.
    #[error("checksum mismatch: expected {expected:#04x}, computed {computed:#04x}")]
    ChecksumMismatch { expected: u8, computed: u8 },

    #[error("unexpected length: expected {expected}, actual {actual}")]
    UnexpectedLength { expected: usize, actual: usize },

    /// An encoded byte has bits set that the encoding never produces.
    #[error("invalid encoded byte {value:#04x} at offset {offset}")]
    InvalidEncodedByte { offset: usize, value: u8 },

    #[error("line {index} with {len} bytes exceeds {max_len} bytes")]
    LineTooLong {
        index: usize,
        len: usize,
        max_len: usize,
    },

    #[error(transparent)]
    Sysex(#[from] SysexError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Convert wider integer values into bytes.
///
/// Values outside of `0..=255` are rejected with [`Error::ValueOutOfRange`].
pub fn bytes_from_values<T>(values: &[T]) -> Result<Vec<u8>>
where
    T: Copy + Into<i64>,
{
    values
        .iter()
        .enumerate()
        .map(|(offset, &value)| {
            let value = value.into();
            u8::try_from(value).map_err(|_| Error::ValueOutOfRange { offset, value })
        })
        .collect()
}

/// Ensure that all bytes are 7-bit clean.
///
/// Values above `0x7f` are rejected with [`Error::ValueOutOfRange`].
pub fn ensure_seven_bit(bytes: &[u8]) -> Result<()> {
    if let Some((offset, &value)) = bytes.iter().enumerate().find(|(_, &byte)| byte > 0x7f) {
        return Err(Error::ValueOutOfRange {
            offset,
            value: value.into(),
        });
    }
    Ok(())
}

/// Wrap an encoded payload into a sysex message.
pub fn sysex_from_payload(payload: &[u8]) -> Result<SysexMessage> {
    SysexMessage::from_payload(payload).map_err(Into::into)
}

#[cfg(test)]
mod tests;
