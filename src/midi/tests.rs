// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

use super::*;

#[test]
fn sysex_message_requires_framing() {
    assert_eq!(
        Err(SysexError::MissingFraming),
        SysexMessage::new(vec![0x10, 0x06, 0xf7])
    );
    assert_eq!(
        Err(SysexError::MissingFraming),
        SysexMessage::new(vec![0xf0, 0x10, 0x06])
    );
    assert!(SysexMessage::new(vec![0xf0, 0xf7]).is_ok());
}

#[test]
fn sysex_message_rejects_8_bit_data() {
    assert_eq!(
        Err(SysexError::NotSevenBitClean {
            offset: 2,
            value: 0x80
        }),
        SysexMessage::new(vec![0xf0, 0x10, 0x80, 0xf7])
    );
}

#[test]
fn sysex_message_payload() {
    let message = SysexMessage::from_payload(&[0x10, 0x06, 0x04, 0x01, 0x05]).unwrap();
    assert_eq!(&[0x10, 0x06, 0x04, 0x01, 0x05], message.payload());
    assert!(message.has_prefix(&[0x10, 0x06]));
    assert!(!message.has_prefix(&[0x01]));
}

#[test]
fn split_sysex_skips_garbage_and_unterminated_messages() {
    let bytes = [
        0x00, 0xf0, 0x01, 0x02, 0xf7, 0x7f, 0xf0, 0x03, 0xf0, 0x04, 0xf7, 0xf7,
    ];
    let messages = split_sysex(&bytes);
    assert_eq!(2, messages.len());
    assert_eq!(&[0x01, 0x02], messages[0].payload());
    assert_eq!(&[0x04], messages[1].payload());
}

#[test]
fn parse_mixed_midi_messages() {
    let bytes = [0xf0, 0x10, 0x06, 0x0a, 0x01, 0xf7, 0xc3, 0x05, 0xb0, 0x00, 0x01];
    let messages = parse_midi_messages(&bytes);
    assert_eq!(3, messages.len());
    assert_eq!(
        &[0x10, 0x06, 0x0a, 0x01],
        messages[0].as_sysex().unwrap().payload()
    );
    assert_eq!(
        MidiMessage::ProgramChange {
            channel: MidiChannel::new(3).unwrap(),
            program: 5
        },
        messages[1]
    );
    assert_eq!(
        MidiMessage::ControlChange {
            channel: MidiChannel::new(0).unwrap(),
            controller: 0,
            value: 1
        },
        messages[2]
    );
}

#[test]
fn midi_message_bytes() {
    let program_change = MidiMessage::ProgramChange {
        channel: MidiChannel::new(15).unwrap(),
        program: 99,
    };
    assert_eq!(&[0xcf, 99], program_change.to_bytes().as_ref());
}

#[test]
fn midi_channel_range() {
    assert!(MidiChannel::new(15).is_some());
    assert!(MidiChannel::new(16).is_none());
    assert_eq!("1", MidiChannel::new(0).unwrap().to_string());
}

#[derive(Default)]
struct RecordingConnection {
    sent: Vec<Vec<u8>>,
}

impl MidiOutputConnection for RecordingConnection {
    fn send_midi_output(&mut self, output: &[u8]) -> OutputResult<()> {
        self.sent.push(output.to_vec());
        Ok(())
    }
}

#[test]
fn send_messages_in_order() {
    let mut connection = RecordingConnection::default();
    let messages = parse_midi_messages(&[0xf0, 0x01, 0xf7, 0xc0, 0x01]);
    send_midi_messages(&mut connection, &messages).unwrap();
    assert_eq!(vec![vec![0xf0, 0x01, 0xf7], vec![0xc0, 0x01]], connection.sent);
}
