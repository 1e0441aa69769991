// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

use crate::{
    BankNumber, MidiMessage, Patch, PatchData, ProgramNumber, StreamType, SysexMessage,
};

/// Transfer of the currently edited sound
pub trait EditBufferCapability {
    fn request_edit_buffer_dump(&self) -> Vec<MidiMessage>;

    fn is_edit_buffer_dump(&self, messages: &[SysexMessage]) -> bool;

    /// Edit buffer dumps that span multiple messages need to override
    /// this method and [`Self::is_edit_buffer_dump_complete()`].
    fn is_part_of_edit_buffer_dump(&self, message: &SysexMessage) -> bool {
        self.is_edit_buffer_dump(std::slice::from_ref(message))
    }

    fn is_edit_buffer_dump_complete(&self, messages: &[SysexMessage]) -> bool {
        self.is_edit_buffer_dump(messages)
    }

    fn patch_from_edit_buffer(&self, messages: &[SysexMessage]) -> Option<Patch>;

    fn patch_to_edit_buffer(&self, patch: &Patch) -> Vec<SysexMessage>;
}

/// Transfer of stored programs
pub trait ProgramDumpCapability {
    fn request_program_dump(&self, program: ProgramNumber) -> Vec<MidiMessage>;

    fn is_single_program_dump(&self, messages: &[SysexMessage]) -> bool;

    fn is_part_of_single_program_dump(&self, message: &SysexMessage) -> bool {
        self.is_single_program_dump(std::slice::from_ref(message))
    }

    fn program_number_of(&self, messages: &[SysexMessage]) -> Option<ProgramNumber>;

    fn patch_from_program_dump(&self, messages: &[SysexMessage]) -> Option<Patch>;

    /// Encode a patch for storing it at the given program.
    fn patch_to_program_dump(&self, patch: &Patch, program: ProgramNumber) -> Vec<SysexMessage>;
}

/// Transfer of a whole bank that is requested at once
pub trait BankDumpCapability {
    fn request_bank_dump(&self, bank: BankNumber) -> Vec<MidiMessage>;

    fn is_bank_dump(&self, message: &SysexMessage) -> bool;

    /// Must become `true` exactly when the last message of the bank
    /// has been received.
    fn is_bank_dump_finished(&self, messages: &[SysexMessage]) -> bool;

    fn patches_from_bank(&self, messages: &[SysexMessage]) -> Vec<Patch>;
}

/// Element-wise transfers of a stream of messages
///
/// Devices that require a request per element return `true` from
/// [`Self::should_stream_advance()`] after each element.
pub trait StreamLoadCapability {
    fn request_stream_element(&self, index: usize, stream_type: StreamType) -> Vec<MidiMessage>;

    fn is_message_part_of_stream(&self, message: &SysexMessage, stream_type: StreamType) -> bool;

    fn is_stream_complete(&self, messages: &[SysexMessage], stream_type: StreamType) -> bool;

    fn should_stream_advance(&self, messages: &[SysexMessage], stream_type: StreamType) -> bool;

    fn patches_from_stream(&self, messages: &[SysexMessage], stream_type: StreamType)
        -> Vec<Patch>;
}

/// Transfer of device-wide settings
pub trait GlobalSettingsCapability {
    fn request_global_settings(&self) -> Vec<MidiMessage>;

    fn is_global_settings_dump(&self, message: &SysexMessage) -> bool;

    fn is_global_settings_finished(&self, messages: &[SysexMessage]) -> bool;

    fn settings_from_dump(&self, messages: &[SysexMessage]) -> Option<PatchData>;

    fn settings_to_messages(&self, settings: &PatchData) -> Vec<SysexMessage>;
}

/// Import of file formats that are not plain sysex
pub trait LegacyLoaderCapability {
    fn is_legacy_format(&self, file_name: &str, bytes: &[u8]) -> bool;

    fn load_legacy(&self, file_name: &str, bytes: &[u8]) -> Vec<Patch>;
}
