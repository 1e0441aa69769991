// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

//! Thin transport adapter on top of [`midir`].
//!
//! Only connects ports by name and converts messages. Queueing,
//! throttling and hot-plugging are left to the application.

use midir::{
    ConnectError, Ignore, InitError, MidiInput, MidiInputConnection, MidiInputPort, MidiOutput,
    MidiOutputConnection, MidiOutputPort, SendError,
};
use thiserror::Error;
use tokio::sync::mpsc;

use super::{OutputError, SysexMessage, SYSEX_START};

#[derive(Debug, Error)]
pub enum MidiPortError {
    #[error("no port named \"{port_name_prefix}*\"")]
    NotFound { port_name_prefix: String },
    #[error(transparent)]
    Init(#[from] InitError),
    #[error(transparent)]
    ConnectInput(#[from] ConnectError<MidiInput>),
    #[error(transparent)]
    ConnectOutput(#[from] ConnectError<MidiOutput>),
}

impl From<SendError> for OutputError {
    fn from(err: SendError) -> Self {
        OutputError::Send {
            msg: err.to_string().into(),
        }
    }
}

impl super::MidiOutputConnection for MidiOutputConnection {
    fn send_midi_output(&mut self, output: &[u8]) -> super::OutputResult<()> {
        self.send(output).map_err(Into::into)
    }
}

fn find_input_port(input: &MidiInput, port_name_prefix: &str) -> Option<(String, MidiInputPort)> {
    input.ports().into_iter().find_map(|port| {
        let port_name = input.port_name(&port).ok()?;
        port_name
            .starts_with(port_name_prefix)
            .then_some((port_name, port))
    })
}

fn find_output_port(
    output: &MidiOutput,
    port_name_prefix: &str,
) -> Option<(String, MidiOutputPort)> {
    output.ports().into_iter().find_map(|port| {
        let port_name = output.port_name(&port).ok()?;
        port_name
            .starts_with(port_name_prefix)
            .then_some((port_name, port))
    })
}

/// Connect the first output port whose name starts with the given prefix.
pub fn connect_output_port(
    client_name: &str,
    port_name_prefix: &str,
) -> Result<MidiOutputConnection, MidiPortError> {
    let output = MidiOutput::new(client_name)?;
    let Some((port_name, port)) = find_output_port(&output, port_name_prefix) else {
        return Err(MidiPortError::NotFound {
            port_name_prefix: port_name_prefix.to_owned(),
        });
    };
    log::info!("Connecting output port \"{port_name}\"");
    output.connect(&port, &port_name).map_err(Into::into)
}

// Adapter for the midir callback closure
fn handle_input(micros: u64, input: &[u8], sender: &mut mpsc::UnboundedSender<SysexMessage>) {
    if input.first() != Some(&SYSEX_START) {
        log::trace!("Ignoring MIDI input: {micros} {input:02x?}");
        return;
    }
    match SysexMessage::new(input.to_vec()) {
        Ok(message) => {
            log::trace!("Received sysex input: {micros} {message:?}");
            if sender.send(message).is_err() {
                log::debug!("Dropping sysex input: receiver closed");
            }
        }
        Err(err) => log::warn!("Invalid sysex input {input:02x?}: {err}"),
    }
}

/// Connect the first input port whose name starts with the given prefix
/// and forward all incoming sysex messages.
pub fn connect_sysex_input_port(
    client_name: &str,
    port_name_prefix: &str,
    sender: mpsc::UnboundedSender<SysexMessage>,
) -> Result<MidiInputConnection<mpsc::UnboundedSender<SysexMessage>>, MidiPortError> {
    let mut input = MidiInput::new(client_name)?;
    // Sysex messages are ignored by default
    input.ignore(Ignore::None);
    let Some((port_name, port)) = find_input_port(&input, port_name_prefix) else {
        return Err(MidiPortError::NotFound {
            port_name_prefix: port_name_prefix.to_owned(),
        });
    };
    log::info!("Connecting input port \"{port_name}\"");
    input
        .connect(
            &port,
            &port_name,
            |micros, input, sender| handle_input(micros, input, sender),
            sender,
        )
        .map_err(Into::into)
}
