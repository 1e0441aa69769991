// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

#![allow(rustdoc::invalid_rust_codeblocks)]
#![doc = include_str!("../README.md")]
#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(missing_debug_implementations)]
//#![warn(missing_docs)] // FIXME
#![warn(unreachable_pub)]
#![warn(unsafe_code)]
#![warn(clippy::pedantic)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(rustdoc::broken_intra_doc_links)]
// Repetitions of module/type names occur frequently when using many
// modules for keeping the size of the source files handy. Often
// types have the same name as their parent module.
#![allow(clippy::module_name_repetitions)]
// Repeating the type name in `..Default::default()` expressions
// is not needed since the context is obvious.
#![allow(clippy::default_trait_access)]

pub mod adaptation;
pub use self::adaptation::Adaptation;

pub mod capability;
pub use self::capability::{
    capability_ref, has_capability, BankDescriptor, BankDumpCapability, Capability,
    CapabilityRef, CapabilityRole, CapabilitySet, CustomProgramChangeCapability, Device,
    DeviceDetection, EditBufferCapability, GlobalSettingsCapability,
    HasBankDescriptorsCapability, HasBanksCapability, LegacyLoaderCapability,
    ParameterDefinition, ParameterId, ProgramDumpCapability, StreamLoadCapability,
    SynthParametersCapability,
};

pub mod codec;

pub mod devices;

pub mod handshake;

pub mod midi;
pub use self::midi::{
    parse_midi_messages, split_sysex, MidiChannel, MidiMessage, MidiOutputConnection,
    OutputError, OutputResult, SysexError, SysexMessage,
};

mod patch;
pub use self::patch::{BankNumber, Patch, PatchData, PatchHash, ProgramNumber};

pub mod registry;
pub use self::registry::{RegisteredId, Registry};

pub mod stream;
pub use self::stream::{Classification, StreamAccumulator, StreamState, StreamType};
