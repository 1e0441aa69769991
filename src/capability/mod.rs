// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

//! Capability roles and runtime negotiation.
//!
//! Each role is a narrow trait. A [`Device`] exposes a role through an
//! accessor that returns `None` if the role is not supported. Absence
//! of a capability is normal and never an error.

use std::{borrow::Cow, time::Duration};

use strum::{EnumCount, IntoEnumIterator as _};

use crate::Patch;

mod bank;
pub use self::bank::{
    BankDescriptor, CustomProgramChangeCapability, HasBankDescriptorsCapability,
    HasBanksCapability,
};

mod control;
pub use self::control::{
    DeviceDetection, ParameterDefinition, ParameterId, SynthParametersCapability,
};

mod dump;
pub use self::dump::{
    BankDumpCapability, EditBufferCapability, GlobalSettingsCapability, LegacyLoaderCapability,
    ProgramDumpCapability, StreamLoadCapability,
};

/// Timeout for transfers if the device does not specify otherwise
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Fixed capability roles
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::EnumIter,
    strum::EnumCount,
    strum::Display,
)]
#[repr(u8)]
pub enum Capability {
    EditBuffer,
    ProgramDump,
    BankDump,
    StreamLoad,
    HasBanks,
    HasBankDescriptors,
    GlobalSettings,
    CustomProgramChange,
    LegacyLoader,
    SynthParameters,
}

impl Capability {
    const fn bit(self) -> u16 {
        1 << self as u8
    }
}

/// Bitmap of capabilities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySet(u16);

const _: () = assert!(Capability::COUNT <= u16::BITS as usize);

impl CapabilitySet {
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn contains(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn insert(&mut self, capability: Capability) {
        self.0 |= capability.bit();
    }

    #[must_use]
    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::iter().filter(move |capability| self.contains(*capability))
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

/// A synthesizer or controller
///
/// Capabilities are exposed through the accessor methods. Their presence
/// must not change during the lifetime of an instance, except for explicit
/// reloading of script-backed devices.
pub trait Device: Send + Sync {
    fn name(&self) -> Cow<'_, str>;

    /// Timeout for a single step of a transfer
    fn default_timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    fn patch_name(&self, _patch: &Patch) -> Option<String> {
        None
    }

    /// Identity of the sound, ignoring the name and other metadata.
    ///
    /// Defaults to the content hash of the patch data.
    fn fingerprint(&self, patch: &Patch) -> String {
        patch.data().content_hash().to_hex()
    }

    /// A copy of the patch with a new name, if renaming is supported.
    fn renamed_patch(&self, _patch: &Patch, _name: &str) -> Option<Patch> {
        None
    }

    fn is_default_name(&self, _name: &str) -> bool {
        false
    }

    fn detection(&self) -> Option<&dyn DeviceDetection> {
        None
    }

    fn edit_buffer(&self) -> Option<&dyn EditBufferCapability> {
        None
    }

    fn program_dump(&self) -> Option<&dyn ProgramDumpCapability> {
        None
    }

    fn bank_dump(&self) -> Option<&dyn BankDumpCapability> {
        None
    }

    fn stream_load(&self) -> Option<&dyn StreamLoadCapability> {
        None
    }

    fn has_banks(&self) -> Option<&dyn HasBanksCapability> {
        None
    }

    fn has_bank_descriptors(&self) -> Option<&dyn HasBankDescriptorsCapability> {
        None
    }

    fn global_settings(&self) -> Option<&dyn GlobalSettingsCapability> {
        None
    }

    fn custom_program_change(&self) -> Option<&dyn CustomProgramChangeCapability> {
        None
    }

    fn legacy_loader(&self) -> Option<&dyn LegacyLoaderCapability> {
        None
    }

    fn synth_parameters(&self) -> Option<&dyn SynthParametersCapability> {
        None
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::EditBuffer => self.edit_buffer().is_some(),
            Capability::ProgramDump => self.program_dump().is_some(),
            Capability::BankDump => self.bank_dump().is_some(),
            Capability::StreamLoad => self.stream_load().is_some(),
            Capability::HasBanks => self.has_banks().is_some(),
            Capability::HasBankDescriptors => self.has_bank_descriptors().is_some(),
            Capability::GlobalSettings => self.global_settings().is_some(),
            Capability::CustomProgramChange => self.custom_program_change().is_some(),
            Capability::LegacyLoader => self.legacy_loader().is_some(),
            Capability::SynthParameters => self.synth_parameters().is_some(),
        }
    }

    fn capabilities(&self) -> CapabilitySet {
        Capability::iter()
            .filter(|capability| self.supports(*capability))
            .collect()
    }
}

/// A bound capability implementation
#[derive(Clone, Copy)]
#[allow(missing_debug_implementations)]
pub enum CapabilityRef<'a> {
    EditBuffer(&'a dyn EditBufferCapability),
    ProgramDump(&'a dyn ProgramDumpCapability),
    BankDump(&'a dyn BankDumpCapability),
    StreamLoad(&'a dyn StreamLoadCapability),
    HasBanks(&'a dyn HasBanksCapability),
    HasBankDescriptors(&'a dyn HasBankDescriptorsCapability),
    GlobalSettings(&'a dyn GlobalSettingsCapability),
    CustomProgramChange(&'a dyn CustomProgramChangeCapability),
    LegacyLoader(&'a dyn LegacyLoaderCapability),
    SynthParameters(&'a dyn SynthParametersCapability),
}

impl CapabilityRef<'_> {
    #[must_use]
    pub const fn capability(&self) -> Capability {
        match self {
            Self::EditBuffer(_) => Capability::EditBuffer,
            Self::ProgramDump(_) => Capability::ProgramDump,
            Self::BankDump(_) => Capability::BankDump,
            Self::StreamLoad(_) => Capability::StreamLoad,
            Self::HasBanks(_) => Capability::HasBanks,
            Self::HasBankDescriptors(_) => Capability::HasBankDescriptors,
            Self::GlobalSettings(_) => Capability::GlobalSettings,
            Self::CustomProgramChange(_) => Capability::CustomProgramChange,
            Self::LegacyLoader(_) => Capability::LegacyLoader,
            Self::SynthParameters(_) => Capability::SynthParameters,
        }
    }
}

/// Bind a capability of a device by its role.
#[must_use]
pub fn capability_ref(device: &dyn Device, capability: Capability) -> Option<CapabilityRef<'_>> {
    let bound = match capability {
        Capability::EditBuffer => CapabilityRef::EditBuffer(device.edit_buffer()?),
        Capability::ProgramDump => CapabilityRef::ProgramDump(device.program_dump()?),
        Capability::BankDump => CapabilityRef::BankDump(device.bank_dump()?),
        Capability::StreamLoad => CapabilityRef::StreamLoad(device.stream_load()?),
        Capability::HasBanks => CapabilityRef::HasBanks(device.has_banks()?),
        Capability::HasBankDescriptors => {
            CapabilityRef::HasBankDescriptors(device.has_bank_descriptors()?)
        }
        Capability::GlobalSettings => CapabilityRef::GlobalSettings(device.global_settings()?),
        Capability::CustomProgramChange => {
            CapabilityRef::CustomProgramChange(device.custom_program_change()?)
        }
        Capability::LegacyLoader => CapabilityRef::LegacyLoader(device.legacy_loader()?),
        Capability::SynthParameters => CapabilityRef::SynthParameters(device.synth_parameters()?),
    };
    Some(bound)
}

/// Static binding of a capability trait to its role.
pub trait CapabilityRole<'a> {
    const CAPABILITY: Capability;

    fn bind(device: &'a dyn Device) -> Option<&'a Self>;
}

macro_rules! impl_capability_role {
    ($capability_trait:ident, $capability:ident, $accessor:ident) => {
        impl<'a> CapabilityRole<'a> for dyn $capability_trait + 'a {
            const CAPABILITY: Capability = Capability::$capability;

            fn bind(device: &'a dyn Device) -> Option<&'a Self> {
                device.$accessor()
            }
        }
    };
}

impl_capability_role!(EditBufferCapability, EditBuffer, edit_buffer);
impl_capability_role!(ProgramDumpCapability, ProgramDump, program_dump);
impl_capability_role!(BankDumpCapability, BankDump, bank_dump);
impl_capability_role!(StreamLoadCapability, StreamLoad, stream_load);
impl_capability_role!(HasBanksCapability, HasBanks, has_banks);
impl_capability_role!(
    HasBankDescriptorsCapability,
    HasBankDescriptors,
    has_bank_descriptors
);
impl_capability_role!(GlobalSettingsCapability, GlobalSettings, global_settings);
impl_capability_role!(
    CustomProgramChangeCapability,
    CustomProgramChange,
    custom_program_change
);
impl_capability_role!(LegacyLoaderCapability, LegacyLoader, legacy_loader);
impl_capability_role!(SynthParametersCapability, SynthParameters, synth_parameters);

/// Query a capability by its trait.
///
/// ```
/// # use patchio::{has_capability, Device, EditBufferCapability};
/// fn supports_edit_buffer(device: &dyn Device) -> bool {
///     has_capability::<dyn EditBufferCapability>(device).is_some()
/// }
/// ```
#[must_use]
pub fn has_capability<'a, T>(device: &'a dyn Device) -> Option<&'a T>
where
    T: CapabilityRole<'a> + ?Sized,
{
    T::bind(device)
}

#[cfg(test)]
mod tests;
