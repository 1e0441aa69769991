// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

use std::time::Duration;

use futures_core::Stream;
use futures_util::{
    future::{AbortRegistration, Abortable, Aborted},
    StreamExt as _,
};
use tokio::{sync::mpsc, time::Instant};

use crate::{midi::send_midi_messages, MidiOutputConnection, Patch, SysexMessage};

use super::{Error, FeedOutcome, Result, StreamAccumulator};

/// Adapt a channel receiver, e.g. fed by a MIDI input callback.
pub fn receiver_stream(
    rx: mpsc::UnboundedReceiver<SysexMessage>,
) -> impl Stream<Item = SysexMessage> + Unpin {
    Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
        let message = rx.recv().await?;
        Some((message, rx))
    }))
}

/// Run a transfer until it is complete and decode the result.
///
/// The timeout restarts after every accepted message. Unrelated input
/// does not extend the deadline.
pub async fn run_stream<C, S>(
    accumulator: &mut StreamAccumulator<'_>,
    output: &mut C,
    input: &mut S,
    device_name: &str,
    timeout: Duration,
) -> Result<Vec<Patch>>
where
    C: MidiOutputConnection + ?Sized,
    S: Stream<Item = SysexMessage> + Unpin + ?Sized,
{
    let request = accumulator.start()?;
    if let Err(err) = send_midi_messages(output, &request) {
        accumulator.abort();
        return Err(err.into());
    }
    let mut deadline = Instant::now() + timeout;
    loop {
        let Ok(next) = tokio::time::timeout_at(deadline, input.next()).await else {
            accumulator.abort();
            let operation = accumulator.stream_type().to_string();
            log::warn!("{device_name} not responding: {operation} timed out after {timeout:?}");
            return Err(Error::ProtocolTimeout {
                device: device_name.to_owned(),
                operation,
                timeout,
            });
        };
        let Some(message) = next else {
            accumulator.abort();
            return Err(Error::InputClosed);
        };
        log::trace!("Received {message:?}");
        match accumulator.handle_message(&message)? {
            FeedOutcome::Ignored => (),
            FeedOutcome::Accumulated { advance } => {
                deadline = Instant::now() + timeout;
                let Some(request) = advance else {
                    continue;
                };
                if let Err(err) = send_midi_messages(output, &request) {
                    accumulator.abort();
                    return Err(err.into());
                }
            }
            FeedOutcome::Completed => break,
        }
    }
    accumulator.decode()
}

/// Run a transfer that can be cancelled through the corresponding
/// [`futures_util::future::AbortHandle`].
///
/// A cancelled transfer is aborted and never decoded.
pub async fn run_stream_abortable<C, S>(
    accumulator: &mut StreamAccumulator<'_>,
    output: &mut C,
    input: &mut S,
    device_name: &str,
    timeout: Duration,
    abort_registration: AbortRegistration,
) -> Result<Vec<Patch>>
where
    C: MidiOutputConnection + ?Sized,
    S: Stream<Item = SysexMessage> + Unpin + ?Sized,
{
    let transfer = run_stream(accumulator, output, input, device_name, timeout);
    match Abortable::new(transfer, abort_registration).await {
        Ok(result) => result,
        Err(Aborted) => {
            log::info!(
                "{device_name}: {stream_type} cancelled",
                stream_type = accumulator.stream_type()
            );
            accumulator.abort();
            Err(Error::Cancelled)
        }
    }
}
