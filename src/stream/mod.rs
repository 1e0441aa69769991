// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

//! Accumulation of multi-message transfers.
//!
//! The state machine only drives a transfer. Deciding if a message
//! belongs to the transfer and if the transfer is complete is delegated
//! to the device through [`StreamLoadCapability`].

use std::time::Duration;

use thiserror::Error;

use crate::{
    BankDumpCapability, BankNumber, Device, EditBufferCapability, GlobalSettingsCapability,
    MidiMessage, OutputError, Patch, ProgramDumpCapability, ProgramNumber, StreamLoadCapability,
    SysexMessage,
};

mod task;
pub use self::task::{receiver_stream, run_stream, run_stream_abortable};

/// Kind of transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    EditBufferDump,
    ProgramDump,
    BankDump,
    GlobalSettingsDump,
    /// Device-specific
    Custom(u8),
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EditBufferDump => f.write_str("edit buffer dump"),
            Self::ProgramDump => f.write_str("program dump"),
            Self::BankDump => f.write_str("bank dump"),
            Self::GlobalSettingsDump => f.write_str("global settings dump"),
            Self::Custom(kind) => write!(f, "custom dump {kind}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum StreamState {
    Idle,
    Requested,
    Accumulating,
    Complete,
    Decoded,
    Aborted,
}

impl StreamState {
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Requested | Self::Accumulating)
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Decoded | Self::Aborted)
    }
}

/// Classification of an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Not part of the transfer
    NotMine,
    /// Part of the transfer that is not yet complete
    Partial,
    /// Completes the transfer
    Match,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{device} not responding: {operation} timed out after {timeout:?}")]
    ProtocolTimeout {
        device: String,
        operation: String,
        timeout: Duration,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("cannot {operation} in state {state}")]
    InvalidState {
        state: StreamState,
        operation: &'static str,
    },

    #[error("exceeded {max_messages} messages")]
    TooManyMessages { max_messages: usize },

    #[error("input closed")]
    InputClosed,

    #[error(transparent)]
    Output(#[from] OutputError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Per-operation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Maximum time between two accepted messages
    ///
    /// Defaults to [`Device::default_timeout()`] if `None`.
    pub timeout: Option<Duration>,

    /// Upper bound for the number of accumulated messages
    pub max_messages: usize,
}

impl StreamConfig {
    pub const DEFAULT_MAX_MESSAGES: usize = 4096;

    #[must_use]
    pub fn timeout_for(&self, device: &dyn Device) -> Duration {
        self.timeout.unwrap_or_else(|| device.default_timeout())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            max_messages: Self::DEFAULT_MAX_MESSAGES,
        }
    }
}

/// Classify a message against the messages accumulated so far.
///
/// Pure function that does not modify any state.
#[must_use]
pub fn classify(
    protocol: &dyn StreamLoadCapability,
    stream_type: StreamType,
    accumulated: &[SysexMessage],
    message: &SysexMessage,
) -> Classification {
    if !protocol.is_message_part_of_stream(message, stream_type) {
        return Classification::NotMine;
    }
    let mut messages = Vec::with_capacity(accumulated.len() + 1);
    messages.extend_from_slice(accumulated);
    messages.push(message.clone());
    if protocol.is_stream_complete(&messages, stream_type) {
        Classification::Match
    } else {
        Classification::Partial
    }
}

/// Outcome of feeding a message into a [`StreamAccumulator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    Ignored,
    Accumulated {
        /// Request for the next element, if the device needs one
        advance: Option<Vec<MidiMessage>>,
    },
    Completed,
}

/// Drives a single transfer from request to decoding.
pub struct StreamAccumulator<'a> {
    protocol: &'a dyn StreamLoadCapability,
    stream_type: StreamType,
    state: StreamState,
    messages: Vec<SysexMessage>,
    next_index: usize,
    max_messages: usize,
}

impl std::fmt::Debug for StreamAccumulator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAccumulator")
            .field("stream_type", &self.stream_type)
            .field("state", &self.state)
            .field("messages", &self.messages.len())
            .field("next_index", &self.next_index)
            .finish_non_exhaustive()
    }
}

impl<'a> StreamAccumulator<'a> {
    #[must_use]
    pub fn new(protocol: &'a dyn StreamLoadCapability, stream_type: StreamType) -> Self {
        Self {
            protocol,
            stream_type,
            state: StreamState::Idle,
            messages: Vec::new(),
            next_index: 0,
            max_messages: StreamConfig::DEFAULT_MAX_MESSAGES,
        }
    }

    /// Index of the first requested element, e.g. the bank number.
    #[must_use]
    pub fn starting_at(mut self, index: usize) -> Self {
        self.next_index = index;
        self
    }

    #[must_use]
    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }

    #[must_use]
    pub const fn state(&self) -> StreamState {
        self.state
    }

    #[must_use]
    pub const fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    #[must_use]
    pub fn messages(&self) -> &[SysexMessage] {
        &self.messages
    }

    /// Start the transfer and return the request messages.
    pub fn start(&mut self) -> Result<Vec<MidiMessage>> {
        if self.state != StreamState::Idle {
            return Err(Error::InvalidState {
                state: self.state,
                operation: "start",
            });
        }
        let request = self
            .protocol
            .request_stream_element(self.next_index, self.stream_type);
        log::debug!(
            "Requesting {stream_type} element {index}",
            stream_type = self.stream_type,
            index = self.next_index
        );
        self.state = StreamState::Requested;
        Ok(request)
    }

    pub fn handle_message(&mut self, message: &SysexMessage) -> Result<FeedOutcome> {
        if !self.state.is_active() {
            log::debug!(
                "Ignoring message in state {state}: {message:?}",
                state = self.state
            );
            return Ok(FeedOutcome::Ignored);
        }
        if !self
            .protocol
            .is_message_part_of_stream(message, self.stream_type)
        {
            log::trace!("Ignoring unrelated message: {message:?}");
            return Ok(FeedOutcome::Ignored);
        }
        if self.messages.len() >= self.max_messages {
            self.abort();
            return Err(Error::TooManyMessages {
                max_messages: self.max_messages,
            });
        }
        self.messages.push(message.clone());
        self.state = StreamState::Accumulating;
        if self
            .protocol
            .is_stream_complete(&self.messages, self.stream_type)
        {
            log::debug!(
                "Completed {stream_type} with {count} message(s)",
                stream_type = self.stream_type,
                count = self.messages.len()
            );
            self.state = StreamState::Complete;
            return Ok(FeedOutcome::Completed);
        }
        let advance = self
            .protocol
            .should_stream_advance(&self.messages, self.stream_type)
            .then(|| {
                self.next_index += 1;
                log::debug!(
                    "Advancing {stream_type} to element {index}",
                    stream_type = self.stream_type,
                    index = self.next_index
                );
                self.protocol
                    .request_stream_element(self.next_index, self.stream_type)
            });
        Ok(FeedOutcome::Accumulated { advance })
    }

    /// Decode the accumulated messages.
    ///
    /// Only permitted after the transfer is complete.
    pub fn decode(&mut self) -> Result<Vec<Patch>> {
        if self.state != StreamState::Complete {
            return Err(Error::InvalidState {
                state: self.state,
                operation: "decode",
            });
        }
        let patches = self
            .protocol
            .patches_from_stream(&self.messages, self.stream_type);
        self.state = StreamState::Decoded;
        Ok(patches)
    }

    /// Abort the transfer and discard all accumulated messages.
    pub fn abort(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        log::debug!(
            "Aborting {stream_type} in state {state} after {count} message(s)",
            stream_type = self.stream_type,
            state = self.state,
            count = self.messages.len()
        );
        self.messages.clear();
        self.state = StreamState::Aborted;
    }
}

/// Edit buffer transfers as a stream
#[allow(missing_debug_implementations)]
pub struct EditBufferStream<'a>(pub &'a dyn EditBufferCapability);

impl StreamLoadCapability for EditBufferStream<'_> {
    fn request_stream_element(&self, _index: usize, _stream_type: StreamType) -> Vec<MidiMessage> {
        self.0.request_edit_buffer_dump()
    }

    fn is_message_part_of_stream(&self, message: &SysexMessage, _stream_type: StreamType) -> bool {
        self.0.is_part_of_edit_buffer_dump(message)
    }

    fn is_stream_complete(&self, messages: &[SysexMessage], _stream_type: StreamType) -> bool {
        self.0.is_edit_buffer_dump_complete(messages)
    }

    fn should_stream_advance(&self, _messages: &[SysexMessage], _stream_type: StreamType) -> bool {
        false
    }

    fn patches_from_stream(
        &self,
        messages: &[SysexMessage],
        _stream_type: StreamType,
    ) -> Vec<Patch> {
        self.0
            .patch_from_edit_buffer(messages)
            .into_iter()
            .collect()
    }
}

/// Program dumps as a stream, the element index is the program number.
#[allow(missing_debug_implementations)]
pub struct ProgramDumpStream<'a>(pub &'a dyn ProgramDumpCapability);

impl StreamLoadCapability for ProgramDumpStream<'_> {
    fn request_stream_element(&self, index: usize, _stream_type: StreamType) -> Vec<MidiMessage> {
        self.0
            .request_program_dump(ProgramNumber::new(element_number(index)))
    }

    fn is_message_part_of_stream(&self, message: &SysexMessage, _stream_type: StreamType) -> bool {
        self.0.is_part_of_single_program_dump(message)
    }

    fn is_stream_complete(&self, messages: &[SysexMessage], _stream_type: StreamType) -> bool {
        self.0.is_single_program_dump(messages)
    }

    fn should_stream_advance(&self, _messages: &[SysexMessage], _stream_type: StreamType) -> bool {
        false
    }

    fn patches_from_stream(
        &self,
        messages: &[SysexMessage],
        _stream_type: StreamType,
    ) -> Vec<Patch> {
        self.0
            .patch_from_program_dump(messages)
            .into_iter()
            .collect()
    }
}

/// Bank dumps as a stream, the element index is the bank number.
#[allow(missing_debug_implementations)]
pub struct BankDumpStream<'a>(pub &'a dyn BankDumpCapability);

impl StreamLoadCapability for BankDumpStream<'_> {
    fn request_stream_element(&self, index: usize, _stream_type: StreamType) -> Vec<MidiMessage> {
        self.0
            .request_bank_dump(BankNumber::new(element_number(index)))
    }

    fn is_message_part_of_stream(&self, message: &SysexMessage, _stream_type: StreamType) -> bool {
        self.0.is_bank_dump(message)
    }

    fn is_stream_complete(&self, messages: &[SysexMessage], _stream_type: StreamType) -> bool {
        self.0.is_bank_dump_finished(messages)
    }

    fn should_stream_advance(&self, _messages: &[SysexMessage], _stream_type: StreamType) -> bool {
        false
    }

    fn patches_from_stream(
        &self,
        messages: &[SysexMessage],
        _stream_type: StreamType,
    ) -> Vec<Patch> {
        self.0.patches_from_bank(messages)
    }
}

/// Global settings dumps as a stream
///
/// The settings are decoded into a single patch without a program number.
#[allow(missing_debug_implementations)]
pub struct GlobalSettingsStream<'a>(pub &'a dyn GlobalSettingsCapability);

impl StreamLoadCapability for GlobalSettingsStream<'_> {
    fn request_stream_element(&self, _index: usize, _stream_type: StreamType) -> Vec<MidiMessage> {
        self.0.request_global_settings()
    }

    fn is_message_part_of_stream(&self, message: &SysexMessage, _stream_type: StreamType) -> bool {
        self.0.is_global_settings_dump(message)
    }

    fn is_stream_complete(&self, messages: &[SysexMessage], _stream_type: StreamType) -> bool {
        self.0.is_global_settings_finished(messages)
    }

    fn should_stream_advance(&self, _messages: &[SysexMessage], _stream_type: StreamType) -> bool {
        false
    }

    fn patches_from_stream(
        &self,
        messages: &[SysexMessage],
        _stream_type: StreamType,
    ) -> Vec<Patch> {
        self.0
            .settings_from_dump(messages)
            .map(Patch::new)
            .into_iter()
            .collect()
    }
}

fn element_number(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

/// Select the protocol for a transfer.
///
/// Dedicated capabilities take precedence over the generic
/// [`StreamLoadCapability`] of the device.
#[must_use]
pub fn stream_protocol_for<'a>(
    device: &'a dyn Device,
    stream_type: StreamType,
) -> Option<Box<dyn StreamLoadCapability + 'a>> {
    let dedicated = match stream_type {
        StreamType::EditBufferDump => device
            .edit_buffer()
            .map(|capability| boxed(EditBufferStream(capability))),
        StreamType::ProgramDump => device
            .program_dump()
            .map(|capability| boxed(ProgramDumpStream(capability))),
        StreamType::BankDump => device
            .bank_dump()
            .map(|capability| boxed(BankDumpStream(capability))),
        StreamType::GlobalSettingsDump => device
            .global_settings()
            .map(|capability| boxed(GlobalSettingsStream(capability))),
        StreamType::Custom(_) => None,
    };
    dedicated.or_else(|| {
        device
            .stream_load()
            .map(|capability| boxed(StreamLoadRef(capability)))
    })
}

fn boxed<'a, P>(protocol: P) -> Box<dyn StreamLoadCapability + 'a>
where
    P: StreamLoadCapability + 'a,
{
    Box::new(protocol)
}

struct StreamLoadRef<'a>(&'a dyn StreamLoadCapability);

impl StreamLoadCapability for StreamLoadRef<'_> {
    fn request_stream_element(&self, index: usize, stream_type: StreamType) -> Vec<MidiMessage> {
        self.0.request_stream_element(index, stream_type)
    }

    fn is_message_part_of_stream(&self, message: &SysexMessage, stream_type: StreamType) -> bool {
        self.0.is_message_part_of_stream(message, stream_type)
    }

    fn is_stream_complete(&self, messages: &[SysexMessage], stream_type: StreamType) -> bool {
        self.0.is_stream_complete(messages, stream_type)
    }

    fn should_stream_advance(&self, messages: &[SysexMessage], stream_type: StreamType) -> bool {
        self.0.should_stream_advance(messages, stream_type)
    }

    fn patches_from_stream(
        &self,
        messages: &[SysexMessage],
        stream_type: StreamType,
    ) -> Vec<Patch> {
        self.0.patches_from_stream(messages, stream_type)
    }
}
