// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

//! Behringer BCR2000 and BCF2000
//!
//! Presets are exchanged as BCL text, one line per message. Lines sent to
//! the device are acknowledged individually, see [`crate::handshake`].

use std::borrow::Cow;

use crate::{
    codec::{self, decode_line, encode_line, join_text_lines, LineNumber},
    handshake::{prepare_lines, HandshakeUpload, LineProtocol, LineReply, UploadOptions},
    BankNumber, CustomProgramChangeCapability, Device, DeviceDetection, EditBufferCapability,
    HasBanksCapability, MidiChannel, MidiMessage, Patch, PatchData, PatchHash, ProgramNumber,
    StreamLoadCapability, StreamType, SysexMessage,
};

use super::{request_messages, DeviceDescriptor};

pub const DEVICE_DESCRIPTOR: DeviceDescriptor = DeviceDescriptor {
    vendor_name: "Behringer",
    model_name: "BCR2000/BCF2000",
    manufacturer_id: &MANUFACTURER_ID,
};

const MANUFACTURER_ID: [u8; 3] = [0x00, 0x20, 0x32];

/// Addresses all devices or all models
pub const ANY_DEVICE_ID: u8 = 0x7f;

const CMD_IDENTITY_REQUEST: u8 = 0x01;
const CMD_IDENTITY_REPLY: u8 = 0x02;
const CMD_TEXT_LINE: u8 = 0x20;
const CMD_TEXT_LINE_REPLY: u8 = 0x21;
const CMD_PRESET_SELECT: u8 = 0x22;
const CMD_DATA_REQUEST: u8 = 0x40;
const CMD_PRESET_NAME_REQUEST: u8 = 0x42;

/// The currently edited preset
const EDIT_BUFFER_PRESET: u8 = 0x7f;

pub const PRESET_COUNT: u32 = 32;

const END_OF_DUMP: &str = "$end";

const NAME_DIRECTIVE: &str = ".name";

/// Error codes in replies to text lines
const ERROR_DESCRIPTIONS: [&str; 24] = [
    "no error",
    "unknown token",
    "data without token",
    "argument missing",
    "wrong device",
    "wrong revision",
    "missing revision",
    "internal error",
    "mode missing",
    "bad item index",
    "not a number",
    "value out of range",
    "invalid argument",
    "invalid command",
    "wrong number of arguments",
    "too much data",
    "already defined",
    "preset missing",
    "preset too complex",
    "wrong preset",
    "preset too new",
    "preset check",
    "sequence error",
    "wrong context",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Model {
    #[strum(to_string = "BCR2000")]
    Bcr2000,
    #[strum(to_string = "BCF2000")]
    Bcf2000,
}

impl Model {
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::Bcr2000 => 0x15,
            Self::Bcf2000 => 0x14,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bcr2000 {
    model: Model,
    device_id: u8,
}

impl Bcr2000 {
    /// Address a single device
    ///
    /// Device ids are in the range 0..=15, [`ANY_DEVICE_ID`] addresses
    /// all devices.
    #[must_use]
    pub const fn new(model: Model, device_id: u8) -> Self {
        Self { model, device_id }
    }

    #[must_use]
    pub const fn model(&self) -> Model {
        self.model
    }

    #[must_use]
    pub const fn device_id(&self) -> u8 {
        self.device_id
    }

    fn prefix(&self) -> [u8; 5] {
        let [m0, m1, m2] = MANUFACTURER_ID;
        [m0, m1, m2, self.device_id, self.model.id()]
    }

    fn payload(&self, command: u8, args: &[u8]) -> Vec<u8> {
        let mut payload = self.prefix().to_vec();
        payload.push(command);
        payload.extend_from_slice(args);
        payload
    }

    /// Arguments of a command sent by this device
    fn command_args<'a>(&self, message: &'a SysexMessage, command: u8) -> Option<&'a [u8]> {
        let [m0, m1, m2, device_id, model_id, cmd, args @ ..] = message.payload() else {
            return None;
        };
        if [*m0, *m1, *m2] != MANUFACTURER_ID || *model_id != self.model.id() || *cmd != command {
            return None;
        }
        if self.device_id != ANY_DEVICE_ID && *device_id != self.device_id {
            return None;
        }
        Some(args)
    }

    fn text_line(&self, message: &SysexMessage) -> Option<String> {
        let args = self.command_args(message, CMD_TEXT_LINE)?;
        let [_msb, _lsb, text @ ..] = args else {
            return None;
        };
        Some(String::from_utf8_lossy(text).into_owned())
    }

    fn is_end_of_dump(&self, message: &SysexMessage) -> bool {
        self.text_line(message)
            .is_some_and(|text| text.trim() == END_OF_DUMP)
    }

    fn data_request(&self, preset: u8) -> Vec<MidiMessage> {
        request_messages([self.payload(CMD_DATA_REQUEST, &[preset])])
    }

    #[must_use]
    pub fn request_preset_name(&self, preset: u8) -> Vec<MidiMessage> {
        request_messages([self.payload(CMD_PRESET_NAME_REQUEST, &[preset & 0x7f])])
    }

    /// BCL text of a complete dump
    fn text_from_lines(&self, messages: &[SysexMessage]) -> String {
        join_text_lines(messages.iter().filter_map(|message| self.text_line(message)))
    }

    /// Prepare the acknowledged upload of a BCL script.
    pub fn upload<'a>(
        &'a self,
        text: &str,
        options: &UploadOptions,
    ) -> codec::Result<HandshakeUpload<'a>> {
        let lines = prepare_lines(text, options)?;
        log::debug!(
            "Uploading {count} line(s) to {model}",
            count = lines.len(),
            model = self.model
        );
        Ok(HandshakeUpload::new(self, lines))
    }
}

fn patch_text(patch: &Patch) -> Cow<'_, str> {
    String::from_utf8_lossy(patch.data())
}

fn preset_name(text: &str) -> Option<&str> {
    text.lines().find_map(|line| {
        let args = line.trim().strip_prefix(NAME_DIRECTIVE)?;
        let name = args.trim();
        Some(
            name.strip_prefix('\'')
                .and_then(|name| name.strip_suffix('\''))
                .unwrap_or(name),
        )
    })
}

impl Device for Bcr2000 {
    fn name(&self) -> Cow<'_, str> {
        format!("Behringer {model}", model = self.model).into()
    }

    fn patch_name(&self, patch: &Patch) -> Option<String> {
        preset_name(&patch_text(patch)).map(|name| name.trim_end().to_owned())
    }

    fn fingerprint(&self, patch: &Patch) -> String {
        let text = patch_text(patch);
        let without_name = join_text_lines(
            text.lines()
                .filter(|line| !line.trim().starts_with(NAME_DIRECTIVE)),
        );
        PatchHash::of(without_name.as_bytes()).to_hex()
    }

    fn renamed_patch(&self, patch: &Patch, name: &str) -> Option<Patch> {
        let text = patch_text(patch);
        let name = name.replace('\'', "");
        let mut renamed_any = false;
        let lines = text.lines().map(|line| {
            if line.trim().starts_with(NAME_DIRECTIVE) {
                renamed_any = true;
                Cow::Owned(format!("  {NAME_DIRECTIVE} '{name}'"))
            } else {
                Cow::Borrowed(line)
            }
        });
        let text = join_text_lines(lines.collect::<Vec<_>>());
        if !renamed_any {
            return None;
        }
        let mut renamed = patch.clone();
        renamed.replace_data(PatchData::new(text.into_bytes()));
        Some(renamed)
    }

    fn is_default_name(&self, name: &str) -> bool {
        name.trim().is_empty() || name.trim() == "*"
    }

    fn detection(&self) -> Option<&dyn DeviceDetection> {
        Some(self)
    }

    fn edit_buffer(&self) -> Option<&dyn EditBufferCapability> {
        Some(self)
    }

    fn stream_load(&self) -> Option<&dyn StreamLoadCapability> {
        Some(self)
    }

    fn has_banks(&self) -> Option<&dyn HasBanksCapability> {
        Some(self)
    }

    fn custom_program_change(&self) -> Option<&dyn CustomProgramChangeCapability> {
        Some(self)
    }
}

impl DeviceDetection for Bcr2000 {
    fn device_detect_messages(&self, _channel: MidiChannel) -> Vec<MidiMessage> {
        let [m0, m1, m2] = MANUFACTURER_ID;
        request_messages([vec![
            m0,
            m1,
            m2,
            ANY_DEVICE_ID,
            ANY_DEVICE_ID,
            CMD_IDENTITY_REQUEST,
        ]])
    }

    fn channel_if_valid_device_response(&self, message: &SysexMessage) -> Option<MidiChannel> {
        let [m0, m1, m2, device_id, model_id, CMD_IDENTITY_REPLY, ref identity @ ..] =
            *message.payload()
        else {
            return None;
        };
        if [m0, m1, m2] != MANUFACTURER_ID || model_id != self.model.id() {
            return None;
        }
        let channel = MidiChannel::new(device_id)?;
        log::info!(
            "Detected {identity} with device id {channel}",
            identity = String::from_utf8_lossy(identity).trim()
        );
        Some(channel)
    }
}

/// A dump of the current preset consists of text lines until `$end`.
impl EditBufferCapability for Bcr2000 {
    fn request_edit_buffer_dump(&self) -> Vec<MidiMessage> {
        self.data_request(EDIT_BUFFER_PRESET)
    }

    fn is_edit_buffer_dump(&self, messages: &[SysexMessage]) -> bool {
        !messages.is_empty()
            && messages
                .iter()
                .all(|message| self.is_part_of_edit_buffer_dump(message))
            && self.is_edit_buffer_dump_complete(messages)
    }

    fn is_part_of_edit_buffer_dump(&self, message: &SysexMessage) -> bool {
        self.command_args(message, CMD_TEXT_LINE).is_some()
    }

    fn is_edit_buffer_dump_complete(&self, messages: &[SysexMessage]) -> bool {
        messages
            .last()
            .is_some_and(|message| self.is_end_of_dump(message))
    }

    fn patch_from_edit_buffer(&self, messages: &[SysexMessage]) -> Option<Patch> {
        if !self.is_edit_buffer_dump(messages) {
            return None;
        }
        let text = self.text_from_lines(messages);
        Some(Patch::new(PatchData::new(text.into_bytes())))
    }

    /// Unacknowledged transfer, use [`Bcr2000::upload()`] for sending
    /// to the device.
    fn patch_to_edit_buffer(&self, patch: &Patch) -> Vec<SysexMessage> {
        let text = patch_text(patch);
        let lines = match prepare_lines(&text, &UploadOptions::default()) {
            Ok(lines) => lines,
            Err(err) => {
                log::error!("Failed to encode BCL text: {err}");
                return Vec::new();
            }
        };
        let mut messages = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            match self.encode_line(LineNumber::from_logical(index), line) {
                Ok(message) => messages.push(message),
                Err(err) => {
                    log::error!("Failed to encode BCL line {index}: {err}");
                    return Vec::new();
                }
            }
        }
        messages
    }
}

/// Presets are requested one by one, the element index is the preset.
impl StreamLoadCapability for Bcr2000 {
    fn request_stream_element(&self, index: usize, _stream_type: StreamType) -> Vec<MidiMessage> {
        let preset = u8::try_from(index).unwrap_or(EDIT_BUFFER_PRESET);
        self.data_request(preset & 0x7f)
    }

    fn is_message_part_of_stream(&self, message: &SysexMessage, stream_type: StreamType) -> bool {
        stream_type == StreamType::BankDump && self.command_args(message, CMD_TEXT_LINE).is_some()
    }

    fn is_stream_complete(&self, messages: &[SysexMessage], stream_type: StreamType) -> bool {
        stream_type == StreamType::BankDump
            && self.finished_presets(messages) >= PRESET_COUNT as usize
    }

    fn should_stream_advance(&self, messages: &[SysexMessage], stream_type: StreamType) -> bool {
        stream_type == StreamType::BankDump
            && messages
                .last()
                .is_some_and(|message| self.is_end_of_dump(message))
    }

    fn patches_from_stream(
        &self,
        messages: &[SysexMessage],
        stream_type: StreamType,
    ) -> Vec<Patch> {
        if stream_type != StreamType::BankDump {
            return Vec::new();
        }
        messages
            .split_inclusive(|message| self.is_end_of_dump(message))
            .filter(|preset| preset.last().is_some_and(|message| self.is_end_of_dump(message)))
            .zip(0..)
            .map(|(preset, program)| {
                let text = self.text_from_lines(preset);
                Patch::with_program(
                    PatchData::new(text.into_bytes()),
                    ProgramNumber::new(program),
                )
            })
            .collect()
    }
}

impl Bcr2000 {
    fn finished_presets(&self, messages: &[SysexMessage]) -> usize {
        messages
            .iter()
            .filter(|message| self.is_end_of_dump(message))
            .count()
    }
}

impl HasBanksCapability for Bcr2000 {
    fn number_of_banks(&self) -> u32 {
        1
    }

    fn number_of_patches(&self, _bank: BankNumber) -> u32 {
        PRESET_COUNT
    }

    fn friendly_bank_name(&self, _bank: BankNumber) -> String {
        "Presets".to_owned()
    }
}

impl CustomProgramChangeCapability for Bcr2000 {
    fn goto_program(&self, program: ProgramNumber) -> Vec<MidiMessage> {
        let preset = u8::try_from(program.index_in_bank(PRESET_COUNT)).unwrap_or_default();
        request_messages([self.payload(CMD_PRESET_SELECT, &[preset])])
    }
}

impl LineProtocol for Bcr2000 {
    fn encode_line(&self, line_number: LineNumber, text: &str) -> codec::Result<SysexMessage> {
        encode_line(&self.prefix(), CMD_TEXT_LINE, line_number, text)
    }

    fn decode_reply(&self, message: &SysexMessage) -> Option<LineReply> {
        let [msb, lsb, error_code, ..] = *self.command_args(message, CMD_TEXT_LINE_REPLY)? else {
            return None;
        };
        Some(LineReply {
            line_number: LineNumber::from_bytes(msb, lsb),
            error_code,
        })
    }

    fn describe_error(&self, error_code: u8) -> Cow<'static, str> {
        ERROR_DESCRIPTIONS
            .get(usize::from(error_code))
            .map_or_else(
                || format!("unknown error {error_code}").into(),
                |description| Cow::Borrowed(*description),
            )
    }
}

/// Decode a single text line sent by any device of the family.
#[must_use]
pub fn decode_text_line(message: &SysexMessage) -> Option<(LineNumber, String)> {
    let payload = message.payload();
    let [m0, m1, m2, device_id, model_id, ..] = *payload else {
        return None;
    };
    if [m0, m1, m2] != MANUFACTURER_ID {
        return None;
    }
    decode_line(message, &[m0, m1, m2, device_id, model_id], CMD_TEXT_LINE)
}

#[cfg(test)]
mod tests;
