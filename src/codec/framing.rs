// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

//! Chunking of raw bytes and text into bounded, line-numbered frames.

use crate::SysexMessage;

use super::{ensure_seven_bit, sysex_from_payload, Error, Result};

/// Maximum number of text bytes per line
pub const MAX_LINE_LEN: usize = 500;

/// Line numbers are transmitted as two 7-bit bytes and wrap around.
pub const LINE_NUMBER_MODULUS: usize = 1 << 14;

/// 14-bit line number as transmitted on the wire
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display,
)]
pub struct LineNumber(u16);

impl LineNumber {
    /// Wire number of a logical, unbounded line index.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_logical(logical: usize) -> Self {
        Self((logical % LINE_NUMBER_MODULUS) as u16)
    }

    #[must_use]
    pub const fn new(value: u16) -> Option<Self> {
        if (value as usize) < LINE_NUMBER_MODULUS {
            Some(Self(value))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// MSB first
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn to_bytes(self) -> [u8; 2] {
        [(self.0 >> 7) as u8 & 0x7f, self.0 as u8 & 0x7f]
    }

    #[must_use]
    pub const fn from_bytes(msb: u8, lsb: u8) -> Self {
        Self(((msb as u16 & 0x7f) << 7) | (lsb as u16 & 0x7f))
    }
}

/// Split raw bytes into frames of at most `max_len` bytes.
///
/// Always returns at least one (possibly empty) frame.
#[must_use]
pub fn split_into_frames(data: &[u8], max_len: usize) -> Vec<&[u8]> {
    debug_assert!(max_len > 0);
    if data.is_empty() {
        return vec![data];
    }
    data.chunks(max_len.max(1)).collect()
}

/// Split text into lines of bounded length.
///
/// Trailing carriage returns are stripped. Empty text results in a
/// single, empty line.
pub fn split_text_lines(text: &str, max_len: usize) -> Result<Vec<&str>> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .enumerate()
        .map(|(index, line)| {
            if line.len() > max_len {
                return Err(Error::LineTooLong {
                    index,
                    len: line.len(),
                    max_len,
                });
            }
            Ok(line)
        })
        .collect()
}

#[must_use]
pub fn join_text_lines<I, S>(lines: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .fold(String::new(), |mut text, line| {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(line.as_ref());
            text
        })
}

/// Build a text line message: `F0 <prefix> <command> <msb> <lsb> <text> F7`
pub fn encode_line(
    prefix: &[u8],
    command: u8,
    line_number: LineNumber,
    text: &str,
) -> Result<SysexMessage> {
    ensure_seven_bit(text.as_bytes())?;
    let mut payload = Vec::with_capacity(prefix.len() + 3 + text.len());
    payload.extend_from_slice(prefix);
    payload.push(command);
    payload.extend_from_slice(&line_number.to_bytes());
    payload.extend_from_slice(text.as_bytes());
    sysex_from_payload(&payload)
}

/// Inverse of [`encode_line()`].
///
/// Returns `None` if the message is not a text line with the given
/// prefix and command.
#[must_use]
pub fn decode_line(
    message: &SysexMessage,
    prefix: &[u8],
    command: u8,
) -> Option<(LineNumber, String)> {
    let rest = message.payload().strip_prefix(prefix)?;
    let [cmd, msb, lsb, text @ ..] = rest else {
        return None;
    };
    if *cmd != command {
        return None;
    }
    // All payload bytes are 7-bit clean, i.e. ASCII.
    let text = String::from_utf8_lossy(text).into_owned();
    Some((LineNumber::from_bytes(*msb, *lsb), text))
}
