// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

//! Names of the functions that script modules may define.
//!
//! A capability is available if all of its required functions
//! are defined.

use std::collections::BTreeSet;

use crate::{Capability, CapabilitySet};

use super::script::ScriptModule;

pub const NAME: &str = "name";
pub const NAME_FROM_DUMP: &str = "nameFromDump";
pub const CALCULATE_FINGERPRINT: &str = "calculateFingerprint";
pub const RENAME_PATCH: &str = "renamePatch";
pub const IS_DEFAULT_NAME: &str = "isDefaultName";
pub const TRANSFER_TIMEOUT_MILLISECONDS: &str = "transferTimeoutMilliseconds";
pub const GENERAL_MESSAGE_DELAY: &str = "generalMessageDelay";

pub const CREATE_DEVICE_DETECT_MESSAGE: &str = "createDeviceDetectMessage";
pub const CHANNEL_IF_VALID_DEVICE_RESPONSE: &str = "channelIfValidDeviceResponse";
pub const NEEDS_CHANNEL_SPECIFIC_DETECTION: &str = "needsChannelSpecificDetection";

pub const CREATE_EDIT_BUFFER_REQUEST: &str = "createEditBufferRequest";
pub const IS_EDIT_BUFFER_DUMP: &str = "isEditBufferDump";
pub const IS_PART_OF_EDIT_BUFFER_DUMP: &str = "isPartOfEditBufferDump";
pub const CONVERT_TO_EDIT_BUFFER: &str = "convertToEditBuffer";

pub const CREATE_PROGRAM_DUMP_REQUEST: &str = "createProgramDumpRequest";
pub const IS_SINGLE_PROGRAM_DUMP: &str = "isSingleProgramDump";
pub const IS_PART_OF_SINGLE_PROGRAM_DUMP: &str = "isPartOfSingleProgramDump";
pub const NUMBER_FROM_DUMP: &str = "numberFromDump";
pub const CONVERT_TO_PROGRAM_DUMP: &str = "convertToProgramDump";

pub const CREATE_BANK_DUMP_REQUEST: &str = "createBankDumpRequest";
pub const IS_PART_OF_BANK_DUMP: &str = "isPartOfBankDump";
pub const IS_BANK_DUMP_FINISHED: &str = "isBankDumpFinished";
pub const EXTRACT_PATCHES_FROM_ALL_BANK_MESSAGES: &str = "extractPatchesFromAllBankMessages";
pub const EXTRACT_PATCHES_FROM_BANK: &str = "extractPatchesFromBank";

pub const NUMBER_OF_BANKS: &str = "numberOfBanks";
pub const NUMBER_OF_PATCHES_PER_BANK: &str = "numberOfPatchesPerBank";
pub const FRIENDLY_BANK_NAME: &str = "friendlyBankName";

pub const BANK_DESCRIPTORS: &str = "bankDescriptors";

pub const CREATE_CUSTOM_PROGRAM_CHANGE: &str = "createCustomProgramChange";

pub const CREATE_GLOBAL_SETTINGS_REQUEST: &str = "createGlobalSettingsRequest";
pub const IS_PART_OF_GLOBAL_SETTINGS: &str = "isPartOfGlobalSettings";
pub const IS_GLOBAL_SETTINGS_FINISHED: &str = "isGlobalSettingsFinished";

/// All functions that are looked up
const KNOWN_FUNCTIONS: &[&str] = &[
    NAME,
    NAME_FROM_DUMP,
    CALCULATE_FINGERPRINT,
    RENAME_PATCH,
    IS_DEFAULT_NAME,
    TRANSFER_TIMEOUT_MILLISECONDS,
    GENERAL_MESSAGE_DELAY,
    CREATE_DEVICE_DETECT_MESSAGE,
    CHANNEL_IF_VALID_DEVICE_RESPONSE,
    NEEDS_CHANNEL_SPECIFIC_DETECTION,
    CREATE_EDIT_BUFFER_REQUEST,
    IS_EDIT_BUFFER_DUMP,
    IS_PART_OF_EDIT_BUFFER_DUMP,
    CONVERT_TO_EDIT_BUFFER,
    CREATE_PROGRAM_DUMP_REQUEST,
    IS_SINGLE_PROGRAM_DUMP,
    IS_PART_OF_SINGLE_PROGRAM_DUMP,
    NUMBER_FROM_DUMP,
    CONVERT_TO_PROGRAM_DUMP,
    CREATE_BANK_DUMP_REQUEST,
    IS_PART_OF_BANK_DUMP,
    IS_BANK_DUMP_FINISHED,
    EXTRACT_PATCHES_FROM_ALL_BANK_MESSAGES,
    EXTRACT_PATCHES_FROM_BANK,
    NUMBER_OF_BANKS,
    NUMBER_OF_PATCHES_PER_BANK,
    FRIENDLY_BANK_NAME,
    BANK_DESCRIPTORS,
    CREATE_CUSTOM_PROGRAM_CHANGE,
    CREATE_GLOBAL_SETTINGS_REQUEST,
    IS_PART_OF_GLOBAL_SETTINGS,
    IS_GLOBAL_SETTINGS_FINISHED,
];

const DETECTION: &[&str] = &[
    CREATE_DEVICE_DETECT_MESSAGE,
    CHANNEL_IF_VALID_DEVICE_RESPONSE,
];

/// Required functions per capability
///
/// Capabilities that are missing here are never provided
/// by script modules.
const REQUIRED_FUNCTIONS: &[(Capability, &[&str])] = &[
    (
        Capability::EditBuffer,
        &[CREATE_EDIT_BUFFER_REQUEST, IS_EDIT_BUFFER_DUMP],
    ),
    (
        Capability::ProgramDump,
        &[CREATE_PROGRAM_DUMP_REQUEST, IS_SINGLE_PROGRAM_DUMP],
    ),
    (
        Capability::BankDump,
        &[
            CREATE_BANK_DUMP_REQUEST,
            IS_PART_OF_BANK_DUMP,
            IS_BANK_DUMP_FINISHED,
        ],
    ),
    (
        Capability::HasBanks,
        &[NUMBER_OF_BANKS, NUMBER_OF_PATCHES_PER_BANK],
    ),
    (Capability::HasBankDescriptors, &[BANK_DESCRIPTORS]),
    (
        Capability::CustomProgramChange,
        &[CREATE_CUSTOM_PROGRAM_CHANGE],
    ),
    (
        Capability::GlobalSettings,
        &[
            CREATE_GLOBAL_SETTINGS_REQUEST,
            IS_PART_OF_GLOBAL_SETTINGS,
            IS_GLOBAL_SETTINGS_FINISHED,
        ],
    ),
];

/// Variant of the bank extraction function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankExtraction {
    /// All messages of the bank at once
    AllMessages,
    /// Message by message
    PerMessage,
}

/// Functions of a module, probed once after loading
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbedFunctions {
    pub capabilities: CapabilitySet,
    pub detection: bool,
    pub bank_extraction: Option<BankExtraction>,
    defined: BTreeSet<&'static str>,
}

impl ProbedFunctions {
    #[must_use]
    pub fn defines(&self, name: &str) -> bool {
        self.defined.contains(name)
    }

    fn defines_all(&self, names: &[&str]) -> bool {
        names.iter().all(|name| self.defines(name))
    }
}

#[must_use]
pub fn probe_functions(module: &dyn ScriptModule) -> ProbedFunctions {
    let defined = KNOWN_FUNCTIONS
        .iter()
        .copied()
        .filter(|name| module.has_function(name))
        .collect::<BTreeSet<_>>();
    let mut probed = ProbedFunctions {
        defined,
        ..Default::default()
    };
    // The variant for all messages at once takes precedence.
    probed.bank_extraction = if probed.defines(EXTRACT_PATCHES_FROM_ALL_BANK_MESSAGES) {
        Some(BankExtraction::AllMessages)
    } else if probed.defines(EXTRACT_PATCHES_FROM_BANK) {
        Some(BankExtraction::PerMessage)
    } else {
        None
    };
    probed.capabilities = REQUIRED_FUNCTIONS
        .iter()
        .filter(|(capability, names)| {
            probed.defines_all(names)
                && (*capability != Capability::BankDump || probed.bank_extraction.is_some())
        })
        .map(|(capability, _)| *capability)
        .collect();
    probed.detection = probed.defines_all(DETECTION);
    probed
}
