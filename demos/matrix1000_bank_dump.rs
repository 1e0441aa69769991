// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

use std::env;

use patchio::{
    devices::oberheim_matrix1000::Matrix1000,
    midi::midir::{connect_output_port, connect_sysex_input_port},
    stream::{receiver_stream, run_stream, stream_protocol_for},
    Device as _, MidiChannel, StreamAccumulator, StreamType,
};
use tokio::sync::mpsc;

const CLIENT_NAME: &str = "patchio";

fn main() {
    pretty_env_logger::init();
    match run() {
        Ok(()) => (),
        Err(err) => println!("Error: {err}"),
    }
}

fn run() -> anyhow::Result<()> {
    let mut args = env::args().skip(1);
    let Some(port_name_prefix) = args.next() else {
        anyhow::bail!("usage: matrix1000-bank-dump <port name prefix> [bank] [channel]");
    };
    let bank = args.next().map(|arg| arg.parse::<usize>()).transpose()?.unwrap_or(0);
    let channel = args
        .next()
        .map(|arg| arg.parse::<u8>())
        .transpose()?
        .unwrap_or(1);
    let Some(channel) = channel.checked_sub(1).and_then(MidiChannel::new) else {
        anyhow::bail!("invalid MIDI channel {channel}");
    };

    let device = Matrix1000::new(channel);
    let Some(protocol) = stream_protocol_for(&device, StreamType::BankDump) else {
        anyhow::bail!("{name} does not support bank dumps", name = device.name());
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let _input = connect_sysex_input_port(CLIENT_NAME, &port_name_prefix, tx)?;
    let mut output = connect_output_port(CLIENT_NAME, &port_name_prefix)?;
    let mut input = receiver_stream(rx);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let mut accumulator =
        StreamAccumulator::new(protocol.as_ref(), StreamType::BankDump).starting_at(bank);
    let patches = runtime.block_on(run_stream(
        &mut accumulator,
        &mut output,
        &mut input,
        &device.name(),
        device.default_timeout(),
    ))?;

    println!("Received {count} patches from bank {bank}", count = patches.len());
    for patch in &patches {
        let name = device.patch_name(patch).unwrap_or_default();
        let program = patch
            .program()
            .map(|program| program.to_string())
            .unwrap_or_default();
        println!(
            "{program:>4} {name:<8} {hash}",
            hash = patch.data().content_hash().to_hex(),
        );
    }
    Ok(())
}
