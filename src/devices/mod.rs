// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

#[cfg(feature = "behringer-bcr2000")]
pub mod behringer_bcr2000;

#[cfg(feature = "oberheim-matrix1000")]
pub mod oberheim_matrix1000;

#[cfg(feature = "sequential")]
pub mod sequential;

/// Static properties of a device family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor_name: &'static str,
    pub model_name: &'static str,
    /// Manufacturer id as sent in sysex messages
    pub manufacturer_id: &'static [u8],
}

// Descriptors of supported device families.
pub const DEVICE_DESCRIPTORS: &[&DeviceDescriptor] = &[
    #[cfg(feature = "behringer-bcr2000")]
    &behringer_bcr2000::DEVICE_DESCRIPTOR,
    #[cfg(feature = "oberheim-matrix1000")]
    &oberheim_matrix1000::DEVICE_DESCRIPTOR,
    #[cfg(feature = "sequential")]
    &sequential::DEVICE_DESCRIPTOR,
];

#[cfg(any(
    feature = "behringer-bcr2000",
    feature = "oberheim-matrix1000",
    feature = "sequential"
))]
fn request_messages<I>(payloads: I) -> Vec<crate::MidiMessage>
where
    I: IntoIterator<Item = Vec<u8>>,
{
    crate::midi::sysex_messages(payloads)
        .into_iter()
        .map(Into::into)
        .collect()
}
