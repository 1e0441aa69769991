// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

//! Patch data and program addressing.

use sha2::{Digest as _, Sha256};

/// Decoded bytes of a single patch or settings block
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, derive_more::Deref, derive_more::From)]
pub struct PatchData(Vec<u8>);

impl PatchData {
    #[must_use]
    pub const fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }

    /// Content hash for cache lookups and default fingerprints
    #[must_use]
    pub fn content_hash(&self) -> PatchHash {
        PatchHash::of(&self.0)
    }
}

impl From<&[u8]> for PatchData {
    fn from(from: &[u8]) -> Self {
        Self(from.to_vec())
    }
}

/// SHA-256 digest of patch data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatchHash([u8; 32]);

impl PatchHash {
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for PatchHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Zero-based bank index
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display,
)]
pub struct BankNumber(u32);

impl BankNumber {
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

/// Zero-based, absolute program number across all banks
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display,
)]
pub struct ProgramNumber(u32);

impl ProgramNumber {
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn from_bank(bank: BankNumber, index_in_bank: u32, patches_per_bank: u32) -> Self {
        Self(bank.0 * patches_per_bank + index_in_bank)
    }

    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn bank(self, patches_per_bank: u32) -> BankNumber {
        debug_assert!(patches_per_bank > 0);
        BankNumber(self.0 / patches_per_bank)
    }

    #[must_use]
    pub const fn index_in_bank(self, patches_per_bank: u32) -> u32 {
        debug_assert!(patches_per_bank > 0);
        self.0 % patches_per_bank
    }
}

/// A patch as exchanged with a device
///
/// The data is immutable except through [`Patch::replace_data()`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    data: PatchData,
    program: Option<ProgramNumber>,
}

impl Patch {
    #[must_use]
    pub const fn new(data: PatchData) -> Self {
        Self {
            data,
            program: None,
        }
    }

    #[must_use]
    pub const fn with_program(data: PatchData, program: ProgramNumber) -> Self {
        Self {
            data,
            program: Some(program),
        }
    }

    #[must_use]
    pub const fn data(&self) -> &PatchData {
        &self.data
    }

    /// Original storage location, if known
    #[must_use]
    pub const fn program(&self) -> Option<ProgramNumber> {
        self.program
    }

    /// Replace the data, returning the previous data.
    pub fn replace_data(&mut self, data: PatchData) -> PatchData {
        std::mem::replace(&mut self.data, data)
    }

    #[must_use]
    pub fn into_data(self) -> PatchData {
        self.data
    }
}
