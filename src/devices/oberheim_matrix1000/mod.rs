// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

//! Oberheim Matrix 1000
//!
//! All patch data is nibble-packed with a trailing 7-bit checksum.

use std::borrow::Cow;

use crate::{
    codec::{self, nibble_pack, nibble_packed_len, nibble_unpack},
    midi::sysex_messages,
    BankDescriptor, BankDumpCapability, BankNumber, CustomProgramChangeCapability, Device,
    DeviceDetection, EditBufferCapability, GlobalSettingsCapability, HasBankDescriptorsCapability,
    HasBanksCapability, LegacyLoaderCapability, MidiChannel, MidiMessage, ParameterDefinition,
    ParameterId, Patch, PatchData, PatchHash, ProgramDumpCapability, ProgramNumber,
    SynthParametersCapability, SysexMessage,
};

use super::{request_messages, DeviceDescriptor};

pub const DEVICE_DESCRIPTOR: DeviceDescriptor = DeviceDescriptor {
    vendor_name: "Oberheim",
    model_name: "Matrix 1000",
    manufacturer_id: &[MANUFACTURER_ID],
};

const MANUFACTURER_ID: u8 = 0x10;
const FAMILY_ID: u8 = 0x06;

const CMD_SINGLE_PATCH: u8 = 0x01;
const CMD_SPLIT: u8 = 0x02;
const CMD_MASTER: u8 = 0x03;
const CMD_REQUEST: u8 = 0x04;
const CMD_REMOTE_PARAMETER_EDIT: u8 = 0x06;
const CMD_SET_BANK: u8 = 0x0a;
const CMD_UNLOCK_BANK: u8 = 0x0c;
const CMD_EDIT_BUFFER_WRITE: u8 = 0x0d;
const CMD_STORE: u8 = 0x0e;

const REQUEST_TYPE_BANK: u8 = 0;
const REQUEST_TYPE_SINGLE_PATCH: u8 = 1;
const REQUEST_TYPE_MASTER: u8 = 3;
const REQUEST_TYPE_EDIT_BUFFER: u8 = 4;

/// Version of the master parameter format
const MASTER_VERSION: u8 = 0x03;

pub const PATCH_SIZE: usize = 134;
pub const MASTER_SIZE: usize = 172;

pub const NAME_LEN: usize = 8;

pub const NUMBER_OF_BANKS: u32 = 10;
pub const PATCHES_PER_BANK: u32 = 100;

/// Banks 0 and 1 can be written, all others are ROM.
pub const NUMBER_OF_RAM_BANKS: u32 = 2;

/// Messages in a bank dump
pub const BANK_DUMP_PATCH_COUNT: usize = 100;
pub const BANK_DUMP_SPLIT_COUNT: usize = 80;

const MASTER_BASIC_CHANNEL_OFFSET: usize = 8;

const PARAMETERS: &[ParameterDefinition] = &[
    parameter(0, "DCO 1 Frequency", 0, 63, 9),
    parameter(1, "DCO 1 Waveshape", 0, 63, 10),
    parameter(2, "DCO 1 Pulse Width", 0, 63, 11),
    parameter(10, "DCO 2 Frequency", 0, 63, 14),
    parameter(11, "DCO 2 Waveshape", 0, 63, 15),
    parameter(12, "DCO 2 Pulse Width", 0, 63, 16),
    parameter(14, "DCO 2 Detune", -31, 31, 19),
    parameter(20, "Mix", 0, 63, 20),
    parameter(21, "VCF Frequency", 0, 127, 21),
    parameter(24, "VCF Resonance", 0, 63, 24),
    parameter(27, "VCA 1 Volume", 0, 63, 27),
];

const fn parameter(
    id: u16,
    name: &'static str,
    min_value: i32,
    max_value: i32,
    offset: usize,
) -> ParameterDefinition {
    ParameterDefinition {
        id: ParameterId(id),
        name,
        min_value,
        max_value,
        offset,
    }
}

const PREFIX: [u8; 2] = [MANUFACTURER_ID, FAMILY_ID];

fn command_of(message: &SysexMessage) -> Option<u8> {
    match message.payload() {
        [MANUFACTURER_ID, FAMILY_ID, command, ..] => Some(*command),
        _ => None,
    }
}

fn payload(command: u8, args: &[u8], data: Option<&[u8]>) -> Vec<u8> {
    let data_len = data.map_or(0, |data| nibble_packed_len(data.len()));
    let mut payload = Vec::with_capacity(PREFIX.len() + 1 + args.len() + data_len);
    payload.extend_from_slice(&PREFIX);
    payload.push(command);
    payload.extend_from_slice(args);
    if let Some(data) = data {
        payload.extend(nibble_pack(data));
    }
    payload
}

fn request(request_type: u8, number: u8) -> Vec<u8> {
    payload(CMD_REQUEST, &[request_type, number], None)
}

fn set_bank(bank: BankNumber) -> Vec<u8> {
    payload(CMD_SET_BANK, &[bank_byte(bank)], None)
}

#[allow(clippy::cast_possible_truncation)]
const fn bank_byte(bank: BankNumber) -> u8 {
    (bank.value() % NUMBER_OF_BANKS) as u8
}

#[allow(clippy::cast_possible_truncation)]
const fn program_byte(program: ProgramNumber) -> u8 {
    program.index_in_bank(PATCHES_PER_BANK) as u8
}

/// Decode the nibbles that follow the given number of argument bytes.
///
/// Checksum failures are logged and dropped.
fn unpack_data(message: &SysexMessage, num_args: usize, expected_len: usize) -> Option<Vec<u8>> {
    let nibbles = message.payload().get(PREFIX.len() + 1 + num_args..)?;
    if nibbles.len() != nibble_packed_len(expected_len) {
        return None;
    }
    match nibble_unpack(nibbles) {
        Ok(data) => Some(data),
        Err(err) => {
            log::warn!("Dropping corrupted Matrix 1000 message: {err}");
            None
        }
    }
}

fn valid_patch_data(patch: &Patch) -> Option<&[u8]> {
    let data = patch.data().as_slice();
    if data.len() != PATCH_SIZE {
        log::warn!(
            "Invalid Matrix 1000 patch: expected {PATCH_SIZE} bytes, actual {len}",
            len = data.len()
        );
        return None;
    }
    Some(data)
}

fn single_patch_data(message: &SysexMessage) -> Option<(u8, Vec<u8>)> {
    if command_of(message)? != CMD_SINGLE_PATCH {
        return None;
    }
    let program = *message.payload().get(PREFIX.len() + 1)?;
    let data = unpack_data(message, 1, PATCH_SIZE)?;
    Some((program, data))
}

fn master_data(message: &SysexMessage) -> Option<Vec<u8>> {
    if command_of(message)? != CMD_MASTER {
        return None;
    }
    if *message.payload().get(PREFIX.len() + 1)? != MASTER_VERSION {
        return None;
    }
    unpack_data(message, 1, MASTER_SIZE)
}

fn is_valid_split(message: &SysexMessage) -> bool {
    if command_of(message) != Some(CMD_SPLIT) {
        return false;
    }
    // Split number, data and checksum
    let Some(nibbles) = message.payload().get(PREFIX.len() + 2..) else {
        return false;
    };
    match nibble_unpack(nibbles) {
        Ok(_) => true,
        Err(err) => {
            log::warn!("Dropping corrupted Matrix 1000 split message: {err}");
            false
        }
    }
}

/// Patch name stored in 6-bit characters
#[must_use]
pub fn decode_name(data: &[u8]) -> String {
    data.iter()
        .take(NAME_LEN)
        .map(|&byte| {
            let byte = byte & 0x3f;
            char::from(if byte < 0x20 { byte + 0x40 } else { byte })
        })
        .collect::<String>()
        .trim_end()
        .to_owned()
}

#[must_use]
pub fn encode_name(name: &str) -> [u8; NAME_LEN] {
    let mut encoded = [0x20; NAME_LEN];
    for (byte, c) in encoded.iter_mut().zip(name.chars()) {
        let c = c.to_ascii_uppercase();
        *byte = match u8::try_from(c) {
            Ok(c @ 0x20..=0x5f) => c & 0x3f,
            _ => 0x20,
        };
    }
    encoded
}

#[derive(Debug, Clone, Default)]
pub struct Matrix1000 {
    channel: MidiChannel,
}

impl Matrix1000 {
    #[must_use]
    pub const fn new(channel: MidiChannel) -> Self {
        Self { channel }
    }

    #[must_use]
    pub const fn channel(&self) -> MidiChannel {
        self.channel
    }

    /// Store the edit buffer at the given program.
    #[must_use]
    pub fn store_edit_buffer(&self, program: ProgramNumber) -> Vec<SysexMessage> {
        let bank = program.bank(PATCHES_PER_BANK);
        sysex_messages([
            payload(CMD_UNLOCK_BANK, &[], None),
            payload(
                CMD_STORE,
                &[program_byte(program), bank_byte(bank), 0x00],
                None,
            ),
        ])
    }
}

impl Device for Matrix1000 {
    fn name(&self) -> Cow<'_, str> {
        DEVICE_DESCRIPTOR.model_name.into()
    }

    fn patch_name(&self, patch: &Patch) -> Option<String> {
        let data = patch.data();
        (data.len() == PATCH_SIZE).then(|| decode_name(data))
    }

    // Renaming does not change the sound.
    fn fingerprint(&self, patch: &Patch) -> String {
        let data = patch.data();
        PatchHash::of(data.get(NAME_LEN..).unwrap_or_default()).to_hex()
    }

    fn renamed_patch(&self, patch: &Patch, name: &str) -> Option<Patch> {
        if patch.data().len() != PATCH_SIZE {
            return None;
        }
        let mut renamed = patch.clone();
        let mut data = renamed.data().to_vec();
        data[..NAME_LEN].copy_from_slice(&encode_name(name));
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

    fn bank_dump(&self) -> Option<&dyn BankDumpCapability> {
        Some(self)
    }

    fn has_banks(&self) -> Option<&dyn HasBanksCapability> {
        Some(self)
    }

    fn has_bank_descriptors(&self) -> Option<&dyn HasBankDescriptorsCapability> {
        Some(self)
    }

    fn global_settings(&self) -> Option<&dyn GlobalSettingsCapability> {
        Some(self)
    }

    fn custom_program_change(&self) -> Option<&dyn CustomProgramChangeCapability> {
        Some(self)
    }

    fn legacy_loader(&self) -> Option<&dyn LegacyLoaderCapability> {
        Some(self)
    }

    fn synth_parameters(&self) -> Option<&dyn SynthParametersCapability> {
        Some(self)
    }
}

impl DeviceDetection for Matrix1000 {
    fn device_detect_messages(&self, _channel: MidiChannel) -> Vec<MidiMessage> {
        request_messages([request(REQUEST_TYPE_MASTER, 0)])
    }

    fn channel_if_valid_device_response(&self, message: &SysexMessage) -> Option<MidiChannel> {
        let data = master_data(message)?;
        let channel = MidiChannel::new(data[MASTER_BASIC_CHANNEL_OFFSET]).unwrap_or_default();
        log::info!("Detected Matrix 1000 on channel {channel}");
        Some(channel)
    }
}

impl EditBufferCapability for Matrix1000 {
    fn request_edit_buffer_dump(&self) -> Vec<MidiMessage> {
        request_messages([request(REQUEST_TYPE_EDIT_BUFFER, 0)])
    }

    fn is_edit_buffer_dump(&self, messages: &[SysexMessage]) -> bool {
        matches!(messages, [message] if single_patch_data(message).is_some())
    }

    fn patch_from_edit_buffer(&self, messages: &[SysexMessage]) -> Option<Patch> {
        let [message] = messages else {
            return None;
        };
        let (_, data) = single_patch_data(message)?;
        Some(Patch::new(data.into()))
    }

    fn patch_to_edit_buffer(&self, patch: &Patch) -> Vec<SysexMessage> {
        let Some(data) = valid_patch_data(patch) else {
            return Vec::new();
        };
        sysex_messages([payload(CMD_EDIT_BUFFER_WRITE, &[0x00], Some(data))])
    }
}

impl ProgramDumpCapability for Matrix1000 {
    fn request_program_dump(&self, program: ProgramNumber) -> Vec<MidiMessage> {
        let bank = program.bank(PATCHES_PER_BANK);
        request_messages([
            set_bank(bank),
            request(REQUEST_TYPE_SINGLE_PATCH, program_byte(program)),
        ])
    }

    fn is_single_program_dump(&self, messages: &[SysexMessage]) -> bool {
        self.is_edit_buffer_dump(messages)
    }

    /// The dump carries the program within the bank only, so the returned
    /// number is relative to the bank that was selected for the request.
    fn program_number_of(&self, messages: &[SysexMessage]) -> Option<ProgramNumber> {
        let [message] = messages else {
            return None;
        };
        let (program, _) = single_patch_data(message)?;
        Some(ProgramNumber::new(program.into()))
    }

    fn patch_from_program_dump(&self, messages: &[SysexMessage]) -> Option<Patch> {
        let [message] = messages else {
            return None;
        };
        let (program, data) = single_patch_data(message)?;
        Some(Patch::with_program(
            data.into(),
            ProgramNumber::new(program.into()),
        ))
    }

    /// Only the program within the bank is encoded, the bank must be
    /// selected beforehand.
    fn patch_to_program_dump(&self, patch: &Patch, program: ProgramNumber) -> Vec<SysexMessage> {
        let Some(data) = valid_patch_data(patch) else {
            return Vec::new();
        };
        sysex_messages([payload(
            CMD_SINGLE_PATCH,
            &[program_byte(program)],
            Some(data),
        )])
    }
}

impl BankDumpCapability for Matrix1000 {
    fn request_bank_dump(&self, bank: BankNumber) -> Vec<MidiMessage> {
        request_messages([set_bank(bank), request(REQUEST_TYPE_BANK, 0)])
    }

    fn is_bank_dump(&self, message: &SysexMessage) -> bool {
        match command_of(message) {
            Some(CMD_SINGLE_PATCH) => single_patch_data(message).is_some(),
            Some(CMD_SPLIT) => is_valid_split(message),
            Some(CMD_MASTER) => master_data(message).is_some(),
            _ => false,
        }
    }

    fn is_bank_dump_finished(&self, messages: &[SysexMessage]) -> bool {
        let count = |command| {
            messages
                .iter()
                .filter(|message| command_of(message) == Some(command))
                .count()
        };
        count(CMD_SINGLE_PATCH) == BANK_DUMP_PATCH_COUNT
            && count(CMD_SPLIT) == BANK_DUMP_SPLIT_COUNT
            && count(CMD_MASTER) >= 1
    }

    /// Program numbers are relative to the dumped bank.
    fn patches_from_bank(&self, messages: &[SysexMessage]) -> Vec<Patch> {
        messages
            .iter()
            .filter_map(single_patch_data)
            .map(|(program, data)| {
                Patch::with_program(data.into(), ProgramNumber::new(program.into()))
            })
            .collect()
    }
}

impl HasBanksCapability for Matrix1000 {
    fn number_of_banks(&self) -> u32 {
        NUMBER_OF_BANKS
    }

    fn number_of_patches(&self, _bank: BankNumber) -> u32 {
        PATCHES_PER_BANK
    }

    fn friendly_bank_name(&self, bank: BankNumber) -> String {
        format!("Bank {bank}")
    }
}

impl HasBankDescriptorsCapability for Matrix1000 {
    fn bank_descriptors(&self) -> Vec<BankDescriptor> {
        (0..NUMBER_OF_BANKS)
            .map(BankNumber::new)
            .map(|bank| BankDescriptor {
                bank,
                size: PATCHES_PER_BANK,
                name: self.friendly_bank_name(bank),
                is_rom: bank.value() >= NUMBER_OF_RAM_BANKS,
                kind: "Patch".to_owned(),
            })
            .collect()
    }
}

impl GlobalSettingsCapability for Matrix1000 {
    fn request_global_settings(&self) -> Vec<MidiMessage> {
        request_messages([request(REQUEST_TYPE_MASTER, 0)])
    }

    fn is_global_settings_dump(&self, message: &SysexMessage) -> bool {
        master_data(message).is_some()
    }

    fn is_global_settings_finished(&self, messages: &[SysexMessage]) -> bool {
        messages.iter().any(|message| master_data(message).is_some())
    }

    fn settings_from_dump(&self, messages: &[SysexMessage]) -> Option<PatchData> {
        messages.iter().rev().find_map(master_data).map(Into::into)
    }

    fn settings_to_messages(&self, settings: &PatchData) -> Vec<SysexMessage> {
        if settings.len() != MASTER_SIZE {
            log::warn!(
                "Invalid master parameters: expected {MASTER_SIZE} bytes, actual {len}",
                len = settings.len()
            );
            return Vec::new();
        }
        sysex_messages([payload(CMD_MASTER, &[MASTER_VERSION], Some(settings.as_slice()))])
    }
}

impl CustomProgramChangeCapability for Matrix1000 {
    fn goto_program(&self, program: ProgramNumber) -> Vec<MidiMessage> {
        let mut messages = request_messages([set_bank(program.bank(PATCHES_PER_BANK))]);
        messages.push(MidiMessage::ProgramChange {
            channel: self.channel,
            program: program_byte(program),
        });
        messages
    }
}

impl LegacyLoaderCapability for Matrix1000 {
    /// Raw patch data without any sysex framing
    fn is_legacy_format(&self, _file_name: &str, bytes: &[u8]) -> bool {
        !bytes.is_empty() && bytes.len() % PATCH_SIZE == 0 && bytes.first() != Some(&0xf0)
    }

    fn load_legacy(&self, file_name: &str, bytes: &[u8]) -> Vec<Patch> {
        if !self.is_legacy_format(file_name, bytes) {
            return Vec::new();
        }
        log::debug!(
            "Loading {count} raw patch(es) from {file_name}",
            count = bytes.len() / PATCH_SIZE
        );
        bytes
            .chunks_exact(PATCH_SIZE)
            .map(|data| Patch::new(data.into()))
            .collect()
    }
}

impl SynthParametersCapability for Matrix1000 {
    fn parameters(&self) -> &[ParameterDefinition] {
        PARAMETERS
    }

    fn parameter_value(&self, patch: &Patch, id: ParameterId) -> Option<i32> {
        let param = self.parameter(id)?;
        let byte = *patch.data().get(param.offset)?;
        #[allow(clippy::cast_possible_wrap)]
        let value = if param.min_value < 0 {
            // Sign-extend from 7 bits
            i32::from(((byte << 1) as i8) >> 1)
        } else {
            i32::from(byte)
        };
        param.contains(value).then_some(value)
    }

    fn set_parameter_messages(
        &self,
        id: ParameterId,
        value: i32,
    ) -> codec::Result<Vec<MidiMessage>> {
        let param = self.parameter(id).filter(|param| param.contains(value));
        let (Some(param), Ok(number)) = (param, u8::try_from(id.0)) else {
            return Err(codec::Error::ValueOutOfRange {
                offset: id.0.into(),
                value: value.into(),
            });
        };
        debug_assert!(number < 0x80);
        // 7-bit two's complement
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let value = (value as i8 as u8) & 0x7f;
        log::debug!("Setting {name} to {value:#04x}", name = param.name);
        Ok(request_messages([payload(
            CMD_REMOTE_PARAMETER_EDIT,
            &[number, value],
            None,
        )]))
    }
}
