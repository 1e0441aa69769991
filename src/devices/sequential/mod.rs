// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

//! Sequential and Dave Smith Instruments synthesizers
//!
//! Patch data is transmitted with 7-to-8 MSB escaping.

use std::borrow::Cow;

use crate::{
    codec::{escape, unescape},
    midi::{sysex_messages, UNIVERSAL_ALL_DEVICES, UNIVERSAL_NON_REALTIME},
    BankDescriptor, BankNumber, Device, DeviceDetection, EditBufferCapability,
    HasBankDescriptorsCapability, HasBanksCapability, MidiChannel, MidiMessage, Patch, PatchHash,
    ProgramDumpCapability, ProgramNumber, StreamLoadCapability, StreamType, SysexMessage,
};

use super::{request_messages, DeviceDescriptor};

pub const DEVICE_DESCRIPTOR: DeviceDescriptor = DeviceDescriptor {
    vendor_name: "Sequential",
    model_name: "Prophet '08, Mopho, Tetra, OB-6, Prophet Rev2",
    manufacturer_id: &[MANUFACTURER_ID],
};

const MANUFACTURER_ID: u8 = 0x01;

const CMD_PROGRAM_DUMP: u8 = 0x02;
const CMD_EDIT_BUFFER_DUMP: u8 = 0x03;
const CMD_PROGRAM_DUMP_REQUEST: u8 = 0x05;
const CMD_EDIT_BUFFER_REQUEST: u8 = 0x06;

const GENERAL_INFORMATION: u8 = 0x06;
const IDENTITY_REQUEST: u8 = 0x01;
const IDENTITY_REPLY: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter, strum::Display)]
pub enum Model {
    #[strum(to_string = "Prophet '08")]
    Prophet08,
    #[strum(to_string = "Mopho")]
    Mopho,
    #[strum(to_string = "Tetra")]
    Tetra,
    #[strum(to_string = "OB-6")]
    Ob6,
    #[strum(to_string = "Prophet Rev2")]
    ProphetRev2,
}

impl Model {
    /// Model id in sysex messages
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::Prophet08 => 0x23,
            Self::Mopho => 0x25,
            Self::Tetra => 0x26,
            Self::Ob6 => 0x2e,
            Self::ProphetRev2 => 0x2f,
        }
    }

    #[must_use]
    pub fn from_id(id: u8) -> Option<Self> {
        use strum::IntoEnumIterator as _;
        Self::iter().find(|model| model.id() == id)
    }

    /// Size of the unescaped patch data
    #[must_use]
    pub const fn data_size(self) -> usize {
        match self {
            Self::Prophet08 | Self::Tetra => 384,
            Self::Mopho => 256,
            Self::Ob6 => 1024,
            Self::ProphetRev2 => 2046,
        }
    }

    /// Offset and length of the name in the patch data
    #[must_use]
    pub const fn name_position(self) -> (usize, usize) {
        match self {
            Self::Prophet08 | Self::Mopho | Self::Tetra => (184, 16),
            Self::Ob6 => (107, 20),
            Self::ProphetRev2 => (235, 20),
        }
    }

    #[must_use]
    pub const fn bank_names(self) -> &'static [&'static str] {
        match self {
            Self::Prophet08 => &["A", "B"],
            Self::Mopho => &["U1", "U2", "U3"],
            Self::Tetra => &["U1", "U2", "U3", "U4"],
            Self::Ob6 => &[
                "000", "100", "200", "300", "400", "500", "600", "700", "800", "900",
            ],
            Self::ProphetRev2 => &["U1", "U2", "U3", "U4", "F1", "F2", "F3", "F4"],
        }
    }

    #[must_use]
    pub const fn patches_per_bank(self) -> u32 {
        match self {
            Self::Ob6 => 100,
            _ => 128,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sequential {
    model: Model,
}

impl Sequential {
    #[must_use]
    pub const fn new(model: Model) -> Self {
        Self { model }
    }

    #[must_use]
    pub const fn model(&self) -> Model {
        self.model
    }

    fn payload(&self, command: u8, args: &[u8], data: Option<&[u8]>) -> Vec<u8> {
        let mut payload = vec![MANUFACTURER_ID, self.model.id(), command];
        payload.extend_from_slice(args);
        if let Some(data) = data {
            payload.extend(escape(data));
        }
        payload
    }

    fn command_args<'a>(&self, message: &'a SysexMessage, command: u8) -> Option<&'a [u8]> {
        match message.payload() {
            [MANUFACTURER_ID, model_id, cmd, args @ ..]
                if *model_id == self.model.id() && *cmd == command =>
            {
                Some(args)
            }
            _ => None,
        }
    }

    fn unescape_data(&self, escaped: &[u8]) -> Option<Vec<u8>> {
        match unescape(escaped, self.model.data_size()) {
            Ok(data) => Some(data),
            Err(err) => {
                log::warn!("Dropping invalid {model} data: {err}", model = self.model);
                None
            }
        }
    }

    fn bank_and_program(&self, program: ProgramNumber) -> (u8, u8) {
        let per_bank = self.model.patches_per_bank();
        let bank = program.bank(per_bank).value();
        let index = program.index_in_bank(per_bank);
        (
            u8::try_from(bank).unwrap_or(0x7f) & 0x7f,
            u8::try_from(index).unwrap_or(0x7f) & 0x7f,
        )
    }

    /// Decode a program dump into its absolute program number and data.
    fn program_dump_data(&self, message: &SysexMessage) -> Option<(ProgramNumber, Vec<u8>)> {
        let [bank, program, escaped @ ..] = self.command_args(message, CMD_PROGRAM_DUMP)? else {
            return None;
        };
        let data = self.unescape_data(escaped)?;
        let program = ProgramNumber::from_bank(
            BankNumber::new((*bank).into()),
            (*program).into(),
            self.model.patches_per_bank(),
        );
        Some((program, data))
    }

    fn edit_buffer_data(&self, message: &SysexMessage) -> Option<Vec<u8>> {
        let escaped = self.command_args(message, CMD_EDIT_BUFFER_DUMP)?;
        self.unescape_data(escaped)
    }

    fn patches_per_bank(&self) -> usize {
        self.model.patches_per_bank() as usize
    }
}

impl Device for Sequential {
    fn name(&self) -> Cow<'_, str> {
        self.model.to_string().into()
    }

    fn patch_name(&self, patch: &Patch) -> Option<String> {
        let (offset, len) = self.model.name_position();
        let name = patch.data().get(offset..offset + len)?;
        let name = name
            .iter()
            .map(|&byte| if byte.is_ascii_graphic() { char::from(byte) } else { ' ' })
            .collect::<String>();
        Some(name.trim_end().to_owned())
    }

    // Renaming does not change the sound.
    fn fingerprint(&self, patch: &Patch) -> String {
        let (offset, len) = self.model.name_position();
        let data = patch.data();
        if data.len() < offset + len {
            return data.content_hash().to_hex();
        }
        let mut blanked = data.to_vec();
        blanked[offset..offset + len].fill(0);
        PatchHash::of(&blanked).to_hex()
    }

    fn renamed_patch(&self, patch: &Patch, name: &str) -> Option<Patch> {
        let (offset, len) = self.model.name_position();
        if patch.data().len() < offset + len {
            return None;
        }
        let mut data = patch.data().to_vec();
        let padded = name
            .bytes()
            .filter(|byte| byte.is_ascii() && !byte.is_ascii_control())
            .chain(std::iter::repeat(b' '))
            .take(len);
        for (byte, c) in data[offset..offset + len].iter_mut().zip(padded) {
            *byte = c;
        }
        let mut renamed = patch.clone();
        renamed.replace_data(data.into());
        Some(renamed)
    }

    fn detection(&self) -> Option<&dyn DeviceDetection> {
        Some(self)
    }

    fn edit_buffer(&self) -> Option<&dyn EditBufferCapability> {
        Some(self)
    }

    fn program_dump(&self) -> Option<&dyn ProgramDumpCapability> {
        Some(self)
    }

    fn stream_load(&self) -> Option<&dyn StreamLoadCapability> {
        Some(self)
    }

    fn has_banks(&self) -> Option<&dyn HasBanksCapability> {
        Some(self)
    }

    fn has_bank_descriptors(&self) -> Option<&dyn HasBankDescriptorsCapability> {
        Some(self)
    }
}

impl DeviceDetection for Sequential {
    /// Universal device inquiry
    fn device_detect_messages(&self, _channel: MidiChannel) -> Vec<MidiMessage> {
        request_messages([vec![
            UNIVERSAL_NON_REALTIME,
            UNIVERSAL_ALL_DEVICES,
            GENERAL_INFORMATION,
            IDENTITY_REQUEST,
        ]])
    }

    fn channel_if_valid_device_response(&self, message: &SysexMessage) -> Option<MidiChannel> {
        let [
            UNIVERSAL_NON_REALTIME,
            channel,
            GENERAL_INFORMATION,
            IDENTITY_REPLY,
            MANUFACTURER_ID,
            family,
            ..,
        ] = *message.payload()
        else {
            return None;
        };
        if family != self.model.id() {
            return None;
        }
        let channel = MidiChannel::new(channel).unwrap_or_default();
        log::info!("Detected {model} on channel {channel}", model = self.model);
        Some(channel)
    }
}

impl EditBufferCapability for Sequential {
    fn request_edit_buffer_dump(&self) -> Vec<MidiMessage> {
        request_messages([self.payload(CMD_EDIT_BUFFER_REQUEST, &[], None)])
    }

    fn is_edit_buffer_dump(&self, messages: &[SysexMessage]) -> bool {
        matches!(messages, [message] if self.command_args(message, CMD_EDIT_BUFFER_DUMP).is_some())
    }

    fn patch_from_edit_buffer(&self, messages: &[SysexMessage]) -> Option<Patch> {
        let [message] = messages else {
            return None;
        };
        let data = self.edit_buffer_data(message)?;
        Some(Patch::new(data.into()))
    }

    fn patch_to_edit_buffer(&self, patch: &Patch) -> Vec<SysexMessage> {
        sysex_messages([self.payload(
            CMD_EDIT_BUFFER_DUMP,
            &[],
            Some(patch.data().as_slice()),
        )])
    }
}

impl ProgramDumpCapability for Sequential {
    fn request_program_dump(&self, program: ProgramNumber) -> Vec<MidiMessage> {
        let (bank, program) = self.bank_and_program(program);
        request_messages([self.payload(CMD_PROGRAM_DUMP_REQUEST, &[bank, program], None)])
    }

    fn is_single_program_dump(&self, messages: &[SysexMessage]) -> bool {
        matches!(messages, [message] if self.command_args(message, CMD_PROGRAM_DUMP).is_some())
    }

    fn program_number_of(&self, messages: &[SysexMessage]) -> Option<ProgramNumber> {
        let [message] = messages else {
            return None;
        };
        self.program_dump_data(message).map(|(program, _)| program)
    }

    fn patch_from_program_dump(&self, messages: &[SysexMessage]) -> Option<Patch> {
        let [message] = messages else {
            return None;
        };
        let (program, data) = self.program_dump_data(message)?;
        Some(Patch::with_program(data.into(), program))
    }

    fn patch_to_program_dump(&self, patch: &Patch, program: ProgramNumber) -> Vec<SysexMessage> {
        let (bank, program) = self.bank_and_program(program);
        sysex_messages([self.payload(
            CMD_PROGRAM_DUMP,
            &[bank, program],
            Some(patch.data().as_slice()),
        )])
    }
}

/// Banks are loaded program by program, the element index is the
/// absolute program number.
impl StreamLoadCapability for Sequential {
    fn request_stream_element(&self, index: usize, _stream_type: StreamType) -> Vec<MidiMessage> {
        let program = ProgramNumber::new(u32::try_from(index).unwrap_or(u32::MAX));
        self.request_program_dump(program)
    }

    /// Corrupted program dumps are dropped and do not count
    /// towards completion.
    fn is_message_part_of_stream(&self, message: &SysexMessage, stream_type: StreamType) -> bool {
        stream_type == StreamType::BankDump && self.program_dump_data(message).is_some()
    }

    fn is_stream_complete(&self, messages: &[SysexMessage], stream_type: StreamType) -> bool {
        stream_type == StreamType::BankDump && messages.len() >= self.patches_per_bank()
    }

    fn should_stream_advance(&self, messages: &[SysexMessage], stream_type: StreamType) -> bool {
        stream_type == StreamType::BankDump && messages.len() < self.patches_per_bank()
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
            .iter()
            .filter_map(|message| self.program_dump_data(message))
            .map(|(program, data)| Patch::with_program(data.into(), program))
            .collect()
    }
}

impl HasBanksCapability for Sequential {
    #[allow(clippy::cast_possible_truncation)]
    fn number_of_banks(&self) -> u32 {
        self.model.bank_names().len() as u32
    }

    fn number_of_patches(&self, _bank: BankNumber) -> u32 {
        self.model.patches_per_bank()
    }

    fn friendly_bank_name(&self, bank: BankNumber) -> String {
        self.model
            .bank_names()
            .get(bank.value() as usize)
            .map_or_else(|| format!("Bank {bank}", bank = bank.value() + 1), ToString::to_string)
    }
}

impl HasBankDescriptorsCapability for Sequential {
    fn bank_descriptors(&self) -> Vec<BankDescriptor> {
        (0..self.number_of_banks())
            .map(BankNumber::new)
            .map(|bank| BankDescriptor {
                bank,
                size: self.model.patches_per_bank(),
                name: self.friendly_bank_name(bank),
                is_rom: false,
                kind: "Program".to_owned(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests;
