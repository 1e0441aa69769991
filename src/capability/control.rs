// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

use crate::{codec, MidiChannel, MidiMessage, Patch, SysexMessage};

/// Detection of a device on a MIDI port
pub trait DeviceDetection {
    fn device_detect_messages(&self, channel: MidiChannel) -> Vec<MidiMessage>;

    fn channel_if_valid_device_response(&self, message: &SysexMessage) -> Option<MidiChannel>;

    /// Whether the detect messages must be sent once per channel
    fn needs_channel_specific_detection(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
pub struct ParameterId(pub u16);

/// A synth parameter and its location in the patch data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDefinition {
    pub id: ParameterId,
    pub name: &'static str,
    pub min_value: i32,
    pub max_value: i32,
    /// Byte offset in the patch data
    pub offset: usize,
}

impl ParameterDefinition {
    #[must_use]
    pub const fn contains(&self, value: i32) -> bool {
        self.min_value <= value && value <= self.max_value
    }
}

pub trait SynthParametersCapability {
    fn parameters(&self) -> &[ParameterDefinition];

    fn parameter(&self, id: ParameterId) -> Option<&ParameterDefinition> {
        self.parameters().iter().find(|param| param.id == id)
    }

    fn parameter_value(&self, patch: &Patch, id: ParameterId) -> Option<i32>;

    /// Messages for changing a single parameter of the edit buffer.
    ///
    /// Values outside of the parameter's range are rejected.
    fn set_parameter_messages(&self, id: ParameterId, value: i32)
        -> codec::Result<Vec<MidiMessage>>;
}
