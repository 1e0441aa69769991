// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

use super::*;
use crate::{
    handshake::{UploadReport, UploadStep},
    stream::{stream_protocol_for, FeedOutcome},
    Capability, StreamAccumulator,
};

const PRESET_BCL: &str = "$rev R1\n$preset\n  .name 'Filter Sweep'\n  .snapshot off\n\
                          $encoder 1\n  .easypar CC 1 74 0 127 absolute\n$end";

fn device() -> Bcr2000 {
    Bcr2000::new(Model::Bcr2000, 0)
}

fn text_line_message(line: usize, text: &str) -> SysexMessage {
    device()
        .encode_line(LineNumber::from_logical(line), text)
        .unwrap()
}

fn preset_messages(offset: usize) -> Vec<SysexMessage> {
    PRESET_BCL
        .lines()
        .enumerate()
        .map(|(index, line)| text_line_message(offset + index, line))
        .collect()
}

fn line_reply(line: usize, error_code: u8) -> SysexMessage {
    let [msb, lsb] = LineNumber::from_logical(line).to_bytes();
    SysexMessage::from_payload(&[0x00, 0x20, 0x32, 0x00, 0x15, 0x21, msb, lsb, error_code]).unwrap()
}

#[test]
fn text_line_encoding() {
    let message = text_line_message(130, "$end");
    assert_eq!(
        &[0xf0, 0x00, 0x20, 0x32, 0x00, 0x15, 0x20, 0x01, 0x02, b'$', b'e', b'n', b'd', 0xf7],
        message.as_bytes()
    );
    assert_eq!(
        Some((LineNumber::from_logical(130), "$end".to_owned())),
        decode_text_line(&message)
    );
    assert!(device().encode_line(LineNumber::from_logical(0), "Ä").is_err());
}

#[test]
fn edit_buffer_until_end() {
    let device = device();
    assert_eq!(
        vec![MidiMessage::from(
            SysexMessage::from_payload(&[0x00, 0x20, 0x32, 0x00, 0x15, 0x40, 0x7f]).unwrap()
        )],
        device.request_edit_buffer_dump()
    );
    let messages = preset_messages(0);
    let (last, init) = messages.split_last().unwrap();
    assert!(init.iter().all(|message| device.is_part_of_edit_buffer_dump(message)));
    assert!(!device.is_edit_buffer_dump_complete(init));
    assert!(device.is_edit_buffer_dump_complete(&messages));
    assert!(device.is_end_of_dump(last));

    let patch = device.patch_from_edit_buffer(&messages).unwrap();
    assert_eq!(PRESET_BCL.as_bytes(), patch.data().as_slice());
    assert_eq!(Some("Filter Sweep".to_owned()), device.patch_name(&patch));
    assert_eq!(None, device.patch_from_edit_buffer(init));
}

#[test]
fn other_devices_are_ignored() {
    let messages = preset_messages(0);
    assert!(!Bcr2000::new(Model::Bcf2000, 0).is_edit_buffer_dump(&messages));
    assert!(!Bcr2000::new(Model::Bcr2000, 1).is_edit_buffer_dump(&messages));
    assert!(Bcr2000::new(Model::Bcr2000, ANY_DEVICE_ID).is_edit_buffer_dump(&messages));
}

#[test]
fn edit_buffer_stream() {
    let device = device();
    let protocol = stream_protocol_for(&device, StreamType::EditBufferDump).unwrap();
    let mut accumulator = StreamAccumulator::new(&*protocol, StreamType::EditBufferDump);
    accumulator.start().unwrap();
    let messages = preset_messages(0);
    let (last, init) = messages.split_last().unwrap();
    for message in init {
        assert_eq!(
            FeedOutcome::Accumulated { advance: None },
            accumulator.handle_message(message).unwrap()
        );
    }
    assert_eq!(
        FeedOutcome::Ignored,
        accumulator.handle_message(&line_reply(0, 0)).unwrap()
    );
    assert_eq!(
        FeedOutcome::Completed,
        accumulator.handle_message(last).unwrap()
    );
    assert_eq!(1, accumulator.decode().unwrap().len());
}

#[test]
fn preset_stream_advances_after_each_preset() {
    let device = device();
    let protocol = stream_protocol_for(&device, StreamType::BankDump).unwrap();
    let mut accumulator = StreamAccumulator::new(&*protocol, StreamType::BankDump);
    assert_eq!(
        device.request_stream_element(0, StreamType::BankDump),
        accumulator.start().unwrap()
    );
    for preset in 0..PRESET_COUNT as usize {
        let messages = preset_messages(0);
        let (last, init) = messages.split_last().unwrap();
        for message in init {
            assert_eq!(
                FeedOutcome::Accumulated { advance: None },
                accumulator.handle_message(message).unwrap()
            );
        }
        let outcome = accumulator.handle_message(last).unwrap();
        if preset + 1 < PRESET_COUNT as usize {
            assert_eq!(
                FeedOutcome::Accumulated {
                    advance: Some(device.data_request(u8::try_from(preset + 1).unwrap()))
                },
                outcome
            );
        } else {
            assert_eq!(FeedOutcome::Completed, outcome);
        }
    }
    let patches = accumulator.decode().unwrap();
    assert_eq!(PRESET_COUNT as usize, patches.len());
    assert_eq!(Some(ProgramNumber::new(31)), patches[31].program());
    assert_eq!(Some("Filter Sweep".to_owned()), device.patch_name(&patches[31]));
}

#[test]
fn rename_keeps_fingerprint() {
    let device = device();
    let patch = Patch::new(PatchData::new(PRESET_BCL.as_bytes().to_vec()));
    let renamed = device.renamed_patch(&patch, "Lead's").unwrap();
    assert_eq!(Some("Leads".to_owned()), device.patch_name(&renamed));
    assert_eq!(device.fingerprint(&patch), device.fingerprint(&renamed));

    let unnamed = Patch::new(PatchData::new(b"$rev R1\n$end".to_vec()));
    assert_eq!(None, device.renamed_patch(&unnamed, "Name"));
    assert_eq!(None, device.patch_name(&unnamed));
}

#[test]
fn patch_to_edit_buffer_skips_comments() {
    let device = device();
    let patch = Patch::new(PatchData::new(
        b"; generated\n$rev R1\n\n$end ; done\n".to_vec(),
    ));
    let messages = device.patch_to_edit_buffer(&patch);
    assert_eq!(
        vec![
            Some((LineNumber::from_logical(0), "$rev R1".to_owned())),
            Some((LineNumber::from_logical(1), "$end".to_owned())),
        ],
        messages.iter().map(decode_text_line).collect::<Vec<_>>()
    );
}

#[test]
fn detection() {
    let device = device();
    assert_eq!(
        vec![MidiMessage::from(
            SysexMessage::from_payload(&[0x00, 0x20, 0x32, 0x7f, 0x7f, 0x01]).unwrap()
        )],
        device.device_detect_messages(MidiChannel::default())
    );
    let mut reply = vec![0x00, 0x20, 0x32, 0x02, 0x15, 0x02];
    reply.extend_from_slice(b"BCR2000 1.10");
    let reply = SysexMessage::from_payload(&reply).unwrap();
    assert_eq!(
        MidiChannel::new(2),
        device.channel_if_valid_device_response(&reply)
    );
    assert_eq!(
        None,
        Bcr2000::new(Model::Bcf2000, 0).channel_if_valid_device_response(&reply)
    );
}

#[test]
fn preset_select_and_name_request() {
    let device = device();
    assert!(device.supports(Capability::CustomProgramChange));
    assert_eq!(
        vec![MidiMessage::from(
            SysexMessage::from_payload(&[0x00, 0x20, 0x32, 0x00, 0x15, 0x22, 0x05]).unwrap()
        )],
        device.goto_program(ProgramNumber::new(5))
    );
    assert_eq!(
        vec![MidiMessage::from(
            SysexMessage::from_payload(&[0x00, 0x20, 0x32, 0x00, 0x15, 0x42, 0x1f]).unwrap()
        )],
        device.request_preset_name(31)
    );
}

#[test]
fn error_descriptions() {
    let device = device();
    assert_eq!("no error", device.describe_error(0));
    assert_eq!("wrong context", device.describe_error(23));
    assert_eq!("unknown error 24", device.describe_error(24));
}

#[test]
fn upload_reports_line_errors() {
    let device = device();
    let mut upload = device
        .upload("$rev R1\n; comment\n$preset\n$end\n", &UploadOptions::default())
        .unwrap();
    let first = upload.start().unwrap();
    assert_eq!(
        Some((LineNumber::from_logical(0), "$rev R1".to_owned())),
        decode_text_line(&first)
    );
    assert!(matches!(
        upload.handle_reply(&line_reply(0, 0)).unwrap(),
        UploadStep::Next(_)
    ));
    assert!(matches!(
        upload.handle_reply(&line_reply(1, 13)).unwrap(),
        UploadStep::Next(_)
    ));
    assert_eq!(
        UploadStep::Completed,
        upload.handle_reply(&line_reply(2, 0)).unwrap()
    );
    let UploadReport { errors, .. } = upload.take_report().unwrap();
    assert_eq!(1, errors.len());
    assert_eq!("$preset", errors[0].text);
    assert_eq!("invalid command", errors[0].description);
}
