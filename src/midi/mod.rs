// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

//! MIDI message types and the seam to the (external) transport.

use std::borrow::Cow;

use enum_as_inner::EnumAsInner;
use thiserror::Error;

#[cfg(feature = "midir")]
pub mod midir;

pub const SYSEX_START: u8 = 0xf0;
pub const SYSEX_END: u8 = 0xf7;

/// Sub-ID of the universal non-realtime sysex messages
pub const UNIVERSAL_NON_REALTIME: u8 = 0x7e;

/// Device id for addressing all devices in universal messages
pub const UNIVERSAL_ALL_DEVICES: u8 = 0x7f;

const MIDI_CMD_CC: u8 = 0xb0;
const MIDI_CMD_PROGRAM_CHANGE: u8 = 0xc0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SysexError {
    #[error("missing sysex start/end framing")]
    MissingFraming,
    #[error("data byte {value:#04x} at offset {offset} exceeds 7 bits")]
    NotSevenBitClean { offset: usize, value: u8 },
}

/// Zero-based MIDI channel in the range `0..=15`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MidiChannel(u8);

impl MidiChannel {
    pub const COUNT: u8 = 16;

    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if index < Self::COUNT {
            Some(Self(index))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn index(self) -> u8 {
        self.0
    }
}

/// A single, well-formed System Exclusive message
///
/// Always starts with `F0`, ends with `F7` and all bytes in between
/// are 7-bit clean.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SysexMessage(Vec<u8>);

impl SysexMessage {
    pub fn new(bytes: Vec<u8>) -> Result<Self, SysexError> {
        let [SYSEX_START, data @ .., SYSEX_END] = bytes.as_slice() else {
            return Err(SysexError::MissingFraming);
        };
        if let Some((offset, &value)) = data.iter().enumerate().find(|(_, &byte)| byte > 0x7f) {
            return Err(SysexError::NotSevenBitClean {
                offset: offset + 1,
                value,
            });
        }
        Ok(Self(bytes))
    }

    /// Wrap the payload with start/end framing.
    pub fn from_payload(payload: &[u8]) -> Result<Self, SysexError> {
        let mut bytes = Vec::with_capacity(payload.len() + 2);
        bytes.push(SYSEX_START);
        bytes.extend_from_slice(payload);
        bytes.push(SYSEX_END);
        Self::new(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// All bytes between the start and end framing
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.0[1..self.0.len() - 1]
    }

    #[must_use]
    pub fn has_prefix(&self, prefix: &[u8]) -> bool {
        self.payload().starts_with(prefix)
    }
}

impl std::fmt::Display for MidiChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Displayed 1-based as on the devices
        write!(f, "{}", u16::from(self.0) + 1)
    }
}

impl std::fmt::Debug for SysexMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SysexMessage({len} bytes: {bytes:02x?})", len = self.0.len(), bytes = self.0)
    }
}

impl AsRef<[u8]> for SysexMessage {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl TryFrom<Vec<u8>> for SysexMessage {
    type Error = SysexError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        Self::new(bytes)
    }
}

/// Outgoing or incoming MIDI message
#[derive(Debug, Clone, PartialEq, Eq, EnumAsInner, derive_more::From)]
pub enum MidiMessage {
    #[from]
    Sysex(SysexMessage),
    ProgramChange {
        channel: MidiChannel,
        program: u8,
    },
    ControlChange {
        channel: MidiChannel,
        controller: u8,
        value: u8,
    },
    /// Any other message, passed through verbatim
    Raw(Vec<u8>),
}

impl MidiMessage {
    #[must_use]
    pub fn to_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Self::Sysex(message) => Cow::Borrowed(message.as_bytes()),
            Self::ProgramChange { channel, program } => {
                Cow::Owned(vec![MIDI_CMD_PROGRAM_CHANGE | channel.index(), program & 0x7f])
            }
            Self::ControlChange {
                channel,
                controller,
                value,
            } => Cow::Owned(vec![
                MIDI_CMD_CC | channel.index(),
                controller & 0x7f,
                value & 0x7f,
            ]),
            Self::Raw(bytes) => Cow::Borrowed(bytes),
        }
    }
}

/// Split a flat byte buffer, e.g. the contents of a `.syx` file,
/// into sysex messages.
///
/// Bytes outside of start/end framing and malformed messages are skipped.
#[must_use]
pub fn split_sysex(bytes: &[u8]) -> Vec<SysexMessage> {
    let mut messages = Vec::new();
    let mut start = None;
    for (index, &byte) in bytes.iter().enumerate() {
        match byte {
            SYSEX_START => {
                if let Some(start) = start {
                    log::debug!("Skipping unterminated sysex message at offset {start}");
                }
                start = Some(index);
            }
            SYSEX_END => {
                let Some(begin) = start.take() else {
                    continue;
                };
                match SysexMessage::new(bytes[begin..=index].to_vec()) {
                    Ok(message) => messages.push(message),
                    Err(err) => log::debug!("Skipping sysex message at offset {begin}: {err}"),
                }
            }
            _ => (),
        }
    }
    messages
}

/// Parse a flat byte buffer into MIDI messages.
///
/// Used for request messages produced by scripts, which may freely
/// mix sysex and channel messages.
#[must_use]
pub fn parse_midi_messages(bytes: &[u8]) -> Vec<MidiMessage> {
    let mut messages = Vec::new();
    let mut rest = bytes;
    while let Some(&status) = rest.first() {
        let len = match status {
            SYSEX_START => rest
                .iter()
                .position(|&byte| byte == SYSEX_END)
                .map_or(rest.len(), |end| end + 1),
            0x80..=0xbf | 0xe0..=0xef => 3,
            0xc0..=0xdf => 2,
            _ => 1,
        }
        .min(rest.len());
        let (head, tail) = rest.split_at(len);
        rest = tail;
        let channel = MidiChannel(status & 0x0f);
        let message = match *head {
            [SYSEX_START, ..] => match SysexMessage::new(head.to_vec()) {
                Ok(message) => MidiMessage::Sysex(message),
                Err(err) => {
                    log::warn!("Invalid sysex message {head:02x?}: {err}");
                    MidiMessage::Raw(head.to_vec())
                }
            },
            [status, program] if status & 0xf0 == MIDI_CMD_PROGRAM_CHANGE => {
                MidiMessage::ProgramChange { channel, program }
            }
            [status, controller, value] if status & 0xf0 == MIDI_CMD_CC => {
                MidiMessage::ControlChange {
                    channel,
                    controller,
                    value,
                }
            }
            _ => MidiMessage::Raw(head.to_vec()),
        };
        messages.push(message);
    }
    messages
}

/// Frame payloads that are 7-bit clean by construction.
///
/// Invalid payloads are logged and skipped.
pub(crate) fn sysex_messages<I>(payloads: I) -> Vec<SysexMessage>
where
    I: IntoIterator<Item = Vec<u8>>,
{
    payloads
        .into_iter()
        .filter_map(|payload| {
            SysexMessage::from_payload(&payload)
                .map_err(|err| log::error!("Invalid sysex payload {payload:02x?}: {err}"))
                .ok()
        })
        .collect()
}

/// Concatenate the bytes of multiple sysex messages.
#[must_use]
pub fn flatten_sysex(messages: &[SysexMessage]) -> Vec<u8> {
    messages
        .iter()
        .flat_map(|message| message.as_bytes().iter().copied())
        .collect()
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("disconnected")]
    Disconnected,
    #[error("Send: {msg}")]
    Send { msg: Cow<'static, str> },
}

pub type OutputResult<T> = std::result::Result<T, OutputError>;

/// Sending side of a MIDI port, provided by the transport.
pub trait MidiOutputConnection {
    fn send_midi_output(&mut self, output: &[u8]) -> OutputResult<()>;
}

impl<C> MidiOutputConnection for Box<C>
where
    C: MidiOutputConnection + ?Sized,
{
    fn send_midi_output(&mut self, output: &[u8]) -> OutputResult<()> {
        C::send_midi_output(self, output)
    }
}

/// Send all messages in order.
pub fn send_midi_messages<C>(connection: &mut C, messages: &[MidiMessage]) -> OutputResult<()>
where
    C: MidiOutputConnection + ?Sized,
{
    for message in messages {
        let bytes = message.to_bytes();
        log::trace!("Sending MIDI output: {bytes:02x?}");
        connection.send_midi_output(&bytes)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests;
