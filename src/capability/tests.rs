// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

use super::*;
use crate::{MidiMessage, ProgramNumber, SysexMessage};

struct EditBufferOnly;

impl EditBufferCapability for EditBufferOnly {
    fn request_edit_buffer_dump(&self) -> Vec<MidiMessage> {
        vec![SysexMessage::from_payload(&[0x7d, 0x01]).unwrap().into()]
    }

    fn is_edit_buffer_dump(&self, messages: &[SysexMessage]) -> bool {
        messages.len() == 1 && messages[0].has_prefix(&[0x7d, 0x02])
    }

    fn patch_from_edit_buffer(&self, messages: &[SysexMessage]) -> Option<Patch> {
        let data = messages.first()?.payload().get(2..)?;
        Some(Patch::new(data.into()))
    }

    fn patch_to_edit_buffer(&self, patch: &Patch) -> Vec<SysexMessage> {
        let mut payload = vec![0x7d, 0x02];
        payload.extend_from_slice(patch.data());
        vec![SysexMessage::from_payload(&payload).unwrap()]
    }
}

impl Device for EditBufferOnly {
    fn name(&self) -> Cow<'_, str> {
        "Edit buffer only".into()
    }

    fn edit_buffer(&self) -> Option<&dyn EditBufferCapability> {
        Some(self)
    }
}

#[test]
fn capability_set() {
    let mut set = CapabilitySet::empty();
    assert!(set.is_empty());
    set.insert(Capability::BankDump);
    let set = set.with(Capability::EditBuffer);
    assert_eq!(2, set.len());
    assert!(set.contains(Capability::EditBuffer));
    assert!(set.contains(Capability::BankDump));
    assert!(!set.contains(Capability::ProgramDump));
    assert_eq!(
        vec![Capability::EditBuffer, Capability::BankDump],
        set.iter().collect::<Vec<_>>()
    );
    assert_eq!(set, set.iter().collect());
}

#[test]
fn native_capabilities() {
    let device = EditBufferOnly;
    assert_eq!(
        CapabilitySet::empty().with(Capability::EditBuffer),
        device.capabilities()
    );
    assert!(has_capability::<dyn EditBufferCapability>(&device).is_some());
    assert!(has_capability::<dyn BankDumpCapability>(&device).is_none());
    assert!(has_capability::<dyn SynthParametersCapability>(&device).is_none());
    assert_eq!(
        Some(Capability::EditBuffer),
        capability_ref(&device, Capability::EditBuffer).map(|bound| bound.capability())
    );
    assert!(capability_ref(&device, Capability::StreamLoad).is_none());
    assert!(device.detection().is_none());
}

#[test]
fn bound_capability_operations() {
    let device = EditBufferOnly;
    let edit_buffer = has_capability::<dyn EditBufferCapability>(&device).unwrap();
    let patch = Patch::new(vec![0x01u8, 0x02, 0x03].into());
    let messages = edit_buffer.patch_to_edit_buffer(&patch);
    assert!(edit_buffer.is_part_of_edit_buffer_dump(&messages[0]));
    assert!(edit_buffer.is_edit_buffer_dump_complete(&messages));
    assert_eq!(Some(patch), edit_buffer.patch_from_edit_buffer(&messages));
}

#[test]
fn default_fingerprint_is_content_hash() {
    let device = EditBufferOnly;
    let patch = Patch::new(vec![0x01u8, 0x02].into());
    let renamed = Patch::with_program(vec![0x01u8, 0x02].into(), ProgramNumber::new(7));
    assert_eq!(device.fingerprint(&patch), device.fingerprint(&renamed));
    assert_eq!(64, device.fingerprint(&patch).len());
}
