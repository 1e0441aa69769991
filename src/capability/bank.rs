// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

use crate::{BankNumber, MidiMessage, ProgramNumber};

pub trait HasBanksCapability {
    fn number_of_banks(&self) -> u32;

    fn number_of_patches(&self, bank: BankNumber) -> u32;

    fn friendly_bank_name(&self, bank: BankNumber) -> String {
        format!("Bank {bank}", bank = bank.value() + 1)
    }
}

/// Properties of a bank
///
/// Rebuilt on every query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankDescriptor {
    pub bank: BankNumber,
    pub size: u32,
    pub name: String,
    /// Read-only
    pub is_rom: bool,
    /// Kind of data, e.g. "Patch" or "Tone"
    pub kind: String,
}

pub trait HasBankDescriptorsCapability {
    fn bank_descriptors(&self) -> Vec<BankDescriptor>;
}

/// Program changes that need more than a plain MIDI program change,
/// e.g. for selecting the bank.
pub trait CustomProgramChangeCapability {
    fn goto_program(&self, program: ProgramNumber) -> Vec<MidiMessage>;
}
