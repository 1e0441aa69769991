// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

use strum::IntoEnumIterator as _;

use super::*;
use crate::{
    stream::{stream_protocol_for, FeedOutcome},
    Capability, StreamAccumulator, StreamState,
};

#[allow(clippy::cast_possible_truncation)]
fn patch_data(model: Model) -> Vec<u8> {
    let mut data = (0..model.data_size())
        .map(|i| (i * 13) as u8)
        .collect::<Vec<_>>();
    let (offset, len) = model.name_position();
    let name = format!("{:<len$}", "Warm Pad");
    data[offset..offset + len].copy_from_slice(name.as_bytes());
    data
}

fn message(payload: Vec<u8>) -> SysexMessage {
    SysexMessage::from_payload(&payload).unwrap()
}

#[test]
fn model_table() {
    for model in Model::iter() {
        assert_eq!(Some(model), Model::from_id(model.id()));
        let (offset, len) = model.name_position();
        assert!(offset + len <= model.data_size());
    }
    assert_eq!(None, Model::from_id(0x00));
    assert_eq!("OB-6", Model::Ob6.to_string());
}

#[test]
fn program_dump_round_trip() {
    let device = Sequential::new(Model::ProphetRev2);
    let data = patch_data(Model::ProphetRev2);
    let patch = Patch::new(data.clone().into());
    // U2, program 4
    let program = ProgramNumber::new(132);
    let messages = device.patch_to_program_dump(&patch, program);
    assert_eq!(1, messages.len());
    assert!(messages[0].has_prefix(&[0x01, 0x2f, 0x02, 0x01, 0x04]));
    // Escaped Rev2 program data
    assert_eq!(5 + 2339, messages[0].payload().len());

    assert!(device.is_single_program_dump(&messages));
    assert_eq!(Some(program), device.program_number_of(&messages));
    let decoded = device.patch_from_program_dump(&messages).unwrap();
    assert_eq!(data.as_slice(), decoded.data().as_slice());
    assert_eq!(Some(program), decoded.program());
}

#[test]
fn request_program_dump() {
    let device = Sequential::new(Model::Ob6);
    assert_eq!(
        vec![MidiMessage::from(message(vec![0x01, 0x2e, 0x05, 0x02, 0x07]))],
        device.request_program_dump(ProgramNumber::new(207))
    );
}

#[test]
fn other_models_are_ignored() {
    let mopho = Sequential::new(Model::Mopho);
    let tetra = Sequential::new(Model::Tetra);
    let patch = Patch::new(patch_data(Model::Mopho).into());
    let messages = mopho.patch_to_edit_buffer(&patch);
    assert!(mopho.is_edit_buffer_dump(&messages));
    assert!(!tetra.is_edit_buffer_dump(&messages));
    assert!(!mopho.is_single_program_dump(&messages));
}

#[test]
fn edit_buffer_round_trip() {
    let device = Sequential::new(Model::Prophet08);
    assert_eq!(
        vec![MidiMessage::from(message(vec![0x01, 0x23, 0x06]))],
        device.request_edit_buffer_dump()
    );
    let patch = Patch::new(patch_data(Model::Prophet08).into());
    let messages = device.patch_to_edit_buffer(&patch);
    assert_eq!(Some(patch), device.patch_from_edit_buffer(&messages));
}

#[test]
fn names() {
    let device = Sequential::new(Model::Ob6);
    let patch = Patch::new(patch_data(Model::Ob6).into());
    assert_eq!(Some("Warm Pad".to_owned()), device.patch_name(&patch));
    let renamed = device.renamed_patch(&patch, "Brass Stab").unwrap();
    assert_eq!(Some("Brass Stab".to_owned()), device.patch_name(&renamed));
    assert_eq!(device.fingerprint(&patch), device.fingerprint(&renamed));

    let mut changed = renamed.data().to_vec();
    changed[0] ^= 0x01;
    let changed = Patch::new(changed.into());
    assert_ne!(device.fingerprint(&renamed), device.fingerprint(&changed));
}

#[test]
fn detection() {
    let device = Sequential::new(Model::Tetra);
    assert_eq!(
        vec![MidiMessage::from(message(vec![0x7e, 0x7f, 0x06, 0x01]))],
        device.device_detect_messages(MidiChannel::default())
    );
    let reply = message(vec![
        0x7e, 0x03, 0x06, 0x02, 0x01, 0x26, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
    ]);
    assert_eq!(
        MidiChannel::new(3),
        device.channel_if_valid_device_response(&reply)
    );
    assert_eq!(
        None,
        Sequential::new(Model::Mopho).channel_if_valid_device_response(&reply)
    );
}

#[test]
fn banks() {
    let device = Sequential::new(Model::ProphetRev2);
    assert_eq!(8, device.number_of_banks());
    assert_eq!("F1", device.friendly_bank_name(BankNumber::new(4)));
    assert_eq!("Bank 9", device.friendly_bank_name(BankNumber::new(8)));
    let descriptors = device.bank_descriptors();
    assert_eq!(8, descriptors.len());
    assert!(descriptors.iter().all(|descriptor| descriptor.size == 128));
}

#[test]
fn bank_stream_advances_per_program() {
    let device = Sequential::new(Model::Ob6);
    assert!(device.capabilities().contains(Capability::StreamLoad));
    let protocol = stream_protocol_for(&device, StreamType::BankDump).unwrap();
    let mut accumulator =
        StreamAccumulator::new(&*protocol, StreamType::BankDump).starting_at(100);
    assert_eq!(
        device.request_program_dump(ProgramNumber::new(100)),
        accumulator.start().unwrap()
    );
    let patch = Patch::new(patch_data(Model::Ob6).into());
    for index in 100..200 {
        let dump = device.patch_to_program_dump(&patch, ProgramNumber::new(index));
        let outcome = accumulator.handle_message(&dump[0]).unwrap();
        if index < 199 {
            assert_eq!(
                FeedOutcome::Accumulated {
                    advance: Some(device.request_program_dump(ProgramNumber::new(index + 1)))
                },
                outcome
            );
        } else {
            assert_eq!(FeedOutcome::Completed, outcome);
        }
    }
    let patches = accumulator.decode().unwrap();
    assert_eq!(100, patches.len());
    assert_eq!(Some(ProgramNumber::new(150)), patches[50].program());
}

#[test]
fn corrupted_program_dump_is_dropped_from_bank_stream() {
    let device = Sequential::new(Model::Ob6);
    let protocol = stream_protocol_for(&device, StreamType::BankDump).unwrap();
    let mut accumulator = StreamAccumulator::new(&*protocol, StreamType::BankDump);
    accumulator.start().unwrap();
    let patch = Patch::new(patch_data(Model::Ob6).into());
    for index in 0..42 {
        let dump = device.patch_to_program_dump(&patch, ProgramNumber::new(index));
        accumulator.handle_message(&dump[0]).unwrap();
    }
    // Excess data that does not unescape to zero padding
    let dump = device.patch_to_program_dump(&patch, ProgramNumber::new(42));
    let mut payload = dump[0].payload().to_vec();
    payload.extend_from_slice(&[0x00, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f, 0x7f]);
    let corrupted = message(payload);
    assert!(!device.is_message_part_of_stream(&corrupted, StreamType::BankDump));
    assert_eq!(
        FeedOutcome::Ignored,
        accumulator.handle_message(&corrupted).unwrap()
    );
    assert_eq!(42, accumulator.messages().len());
    assert_eq!(StreamState::Accumulating, accumulator.state());

    // The retransmitted dump is accepted
    for index in 42..100 {
        let dump = device.patch_to_program_dump(&patch, ProgramNumber::new(index));
        accumulator.handle_message(&dump[0]).unwrap();
    }
    assert_eq!(StreamState::Complete, accumulator.state());
    assert_eq!(100, accumulator.decode().unwrap().len());
}
