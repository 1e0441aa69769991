// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

//! Acknowledged, line-by-line upload of text.
//!
//! Each line is sent with a 14-bit line number. The device replies with
//! the line number and an error code before the next line is sent.
//! Errors are collected and reported after the last line, the upload
//! is never aborted because of them.

use std::{borrow::Cow, time::Duration};

use futures_core::Stream;
use futures_util::StreamExt as _;
use thiserror::Error;
use tokio::time::Instant;

use crate::{
    codec::{self, split_text_lines, LineNumber, LINE_NUMBER_MODULUS, MAX_LINE_LEN},
    midi::send_midi_messages,
    MidiOutputConnection, OutputError, SysexMessage,
};

/// Reply to a single line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineReply {
    pub line_number: LineNumber,
    /// 0 = ok
    pub error_code: u8,
}

/// Device-specific encoding of lines and replies
pub trait LineProtocol {
    fn encode_line(&self, line_number: LineNumber, text: &str) -> codec::Result<SysexMessage>;

    fn decode_reply(&self, message: &SysexMessage) -> Option<LineReply>;

    /// Human-readable classification of an error code
    fn describe_error(&self, error_code: u8) -> Cow<'static, str>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Send lines unmodified, i.e. including comments and blank lines
    pub verbatim: bool,

    pub max_line_len: usize,

    /// Start of a comment that extends until the end of the line
    pub comment_marker: Option<char>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            verbatim: false,
            max_line_len: MAX_LINE_LEN,
            comment_marker: Some(';'),
        }
    }
}

/// Split the text into the lines that are sent.
///
/// Unless verbatim, comments and surrounding whitespace are stripped
/// and blank lines are skipped. Results in at least one line.
pub fn prepare_lines(text: &str, options: &UploadOptions) -> codec::Result<Vec<String>> {
    let UploadOptions {
        verbatim,
        max_line_len,
        comment_marker,
    } = options;
    let mut lines = Vec::new();
    for line in split_text_lines(text, usize::MAX)? {
        let line = if *verbatim {
            line
        } else {
            let line = comment_marker
                .and_then(|marker| line.find(marker))
                .map_or(line, |end| &line[..end]);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            line
        };
        if line.len() > *max_line_len {
            return Err(codec::Error::LineTooLong {
                index: lines.len(),
                len: line.len(),
                max_len: *max_line_len,
            });
        }
        codec::ensure_seven_bit(line.as_bytes())?;
        lines.push(line.to_owned());
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    Ok(lines)
}

/// Observed line number does not follow the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unexpected line number {observed} instead of {expected}")]
pub struct SequenceAnomaly {
    pub expected: usize,
    pub observed: usize,
}

/// Result of tracking a single line number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tracked {
    pub logical: usize,
    pub anomaly: Option<SequenceAnomaly>,
}

/// Map wrapping 14-bit line numbers onto monotonic, logical numbers.
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    last_wire: Option<LineNumber>,
    overflow_counter: usize,
    expected: Option<usize>,
}

impl SequenceTracker {
    /// Accepts any number as the first number.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_wire: None,
            overflow_counter: 0,
            expected: None,
        }
    }

    /// Expects the given logical number first.
    #[must_use]
    pub const fn expecting(first_logical: usize) -> Self {
        Self {
            last_wire: None,
            overflow_counter: first_logical / LINE_NUMBER_MODULUS,
            expected: Some(first_logical),
        }
    }

    #[must_use]
    pub const fn overflow_counter(&self) -> usize {
        self.overflow_counter
    }

    #[must_use]
    pub const fn last_line_number(&self) -> Option<LineNumber> {
        self.last_wire
    }

    /// Resolve a wire number into a logical number.
    ///
    /// A late number from before the most recent wraparound is resolved
    /// into the previous epoch. Late numbers are reported as anomalies
    /// and do not move the expected number backward.
    pub fn track(&mut self, wire: LineNumber) -> Tracked {
        let current = usize::from(wire.value());
        if let Some(last_wire) = self.last_wire {
            let last = usize::from(last_wire.value());
            // A large backward jump is a wraparound, a small one is a
            // repeated or reordered number.
            if current < last && last - current > LINE_NUMBER_MODULUS / 2 {
                self.overflow_counter += 1;
            } else if current > last
                && current - last > LINE_NUMBER_MODULUS / 2
                && self.overflow_counter > 0
            {
                let logical = (self.overflow_counter - 1) * LINE_NUMBER_MODULUS + current;
                let expected = self
                    .expected
                    .unwrap_or(self.overflow_counter * LINE_NUMBER_MODULUS + last + 1);
                return Tracked {
                    logical,
                    anomaly: Some(SequenceAnomaly {
                        expected,
                        observed: logical,
                    }),
                };
            }
        }
        let logical = self.overflow_counter * LINE_NUMBER_MODULUS + current;
        let anomaly = self
            .expected
            .filter(|&expected| expected != logical)
            .map(|expected| SequenceAnomaly {
                expected,
                observed: logical,
            });
        let is_late = anomaly.is_some_and(|anomaly| anomaly.observed < anomaly.expected);
        if !is_late {
            self.last_wire = Some(wire);
            self.expected = Some(logical + 1);
        }
        Tracked { logical, anomaly }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransferCounters {
    pub num_messages: usize,
    pub received_messages: usize,
    sequence: SequenceTracker,
}

impl TransferCounters {
    #[must_use]
    pub const fn new(num_messages: usize) -> Self {
        Self {
            num_messages,
            received_messages: 0,
            sequence: SequenceTracker::expecting(0),
        }
    }

    #[must_use]
    pub const fn last_line_number(&self) -> Option<LineNumber> {
        self.sequence.last_line_number()
    }

    #[must_use]
    pub const fn overflow_counter(&self) -> usize {
        self.sequence.overflow_counter()
    }
}

/// A line rejected by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineError {
    pub line: usize,
    pub text: String,
    pub error_code: u8,
    pub description: Cow<'static, str>,
}

#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    pub counters: TransferCounters,
    pub errors: Vec<LineError>,
    pub anomalies: Vec<SequenceAnomaly>,
}

impl UploadReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum UploadState {
    Ready,
    AwaitingReply,
    Completed,
    Aborted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadStep {
    NotMine,
    /// Send the next line
    Next(SysexMessage),
    /// Reply for a line other than the last one sent, recorded
    /// as an anomaly
    OutOfSequence,
    Completed,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot {operation} in state {state}")]
    InvalidState {
        state: UploadState,
        operation: &'static str,
    },

    #[error("{device} not responding: no reply for line {line} after {timeout:?}")]
    ProtocolTimeout {
        device: String,
        line: usize,
        timeout: Duration,
    },

    #[error("input closed")]
    InputClosed,

    #[error(transparent)]
    Codec(#[from] codec::Error),

    #[error(transparent)]
    Output(#[from] OutputError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// State of a single upload
pub struct HandshakeUpload<'a> {
    protocol: &'a dyn LineProtocol,
    lines: Vec<String>,
    next_line: usize,
    state: UploadState,
    report: UploadReport,
}

impl std::fmt::Debug for HandshakeUpload<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeUpload")
            .field("lines", &self.lines.len())
            .field("next_line", &self.next_line)
            .field("state", &self.state)
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

impl<'a> HandshakeUpload<'a> {
    /// Prepare an upload of non-empty lines.
    #[must_use]
    pub fn new(protocol: &'a dyn LineProtocol, lines: Vec<String>) -> Self {
        let lines = if lines.is_empty() {
            vec![String::new()]
        } else {
            lines
        };
        let report = UploadReport {
            counters: TransferCounters::new(lines.len()),
            ..Default::default()
        };
        Self {
            protocol,
            lines,
            next_line: 0,
            state: UploadState::Ready,
            report,
        }
    }

    #[must_use]
    pub const fn state(&self) -> UploadState {
        self.state
    }

    #[must_use]
    pub const fn counters(&self) -> &TransferCounters {
        &self.report.counters
    }

    fn encode_next_line(&mut self) -> Result<SysexMessage> {
        let index = self.next_line;
        let text = &self.lines[index];
        let message = self
            .protocol
            .encode_line(LineNumber::from_logical(index), text)?;
        self.next_line += 1;
        Ok(message)
    }

    /// Encode the first line.
    pub fn start(&mut self) -> Result<SysexMessage> {
        if self.state != UploadState::Ready {
            return Err(Error::InvalidState {
                state: self.state,
                operation: "start",
            });
        }
        let message = self.encode_next_line()?;
        log::debug!(
            "Starting upload of {num_lines} line(s)",
            num_lines = self.lines.len()
        );
        self.state = UploadState::AwaitingReply;
        Ok(message)
    }

    pub fn handle_reply(&mut self, message: &SysexMessage) -> Result<UploadStep> {
        if self.state != UploadState::AwaitingReply {
            return Ok(UploadStep::NotMine);
        }
        let Some(LineReply {
            line_number,
            error_code,
        }) = self.protocol.decode_reply(message)
        else {
            return Ok(UploadStep::NotMine);
        };
        let counters = &mut self.report.counters;
        counters.received_messages += 1;
        let Tracked { logical, .. } = counters.sequence.track(line_number);
        // Only the reply for the last line sent is acknowledged.
        let awaited = self.next_line - 1;
        if logical != awaited {
            let anomaly = SequenceAnomaly {
                expected: awaited,
                observed: logical,
            };
            log::warn!("Upload out of sequence: {anomaly}");
            self.report.anomalies.push(anomaly);
            return Ok(UploadStep::OutOfSequence);
        }
        if error_code != 0 {
            let text = self.lines[logical].clone();
            let description = self.protocol.describe_error(error_code);
            log::warn!("Line {logical} \"{text}\" rejected: {description} ({error_code})");
            self.report.errors.push(LineError {
                line: logical,
                text,
                error_code,
                description,
            });
        }
        if self.next_line == self.lines.len() {
            log::debug!(
                "Upload completed with {num_errors} error(s)",
                num_errors = self.report.errors.len()
            );
            self.state = UploadState::Completed;
            return Ok(UploadStep::Completed);
        }
        self.encode_next_line().map(UploadStep::Next)
    }

    pub fn abort(&mut self) {
        if matches!(self.state, UploadState::Completed | UploadState::Aborted) {
            return;
        }
        log::debug!(
            "Aborting upload after {received} of {num_messages} replies",
            received = self.report.counters.received_messages,
            num_messages = self.report.counters.num_messages
        );
        self.state = UploadState::Aborted;
    }

    /// Take the report after completion.
    pub fn take_report(&mut self) -> Result<UploadReport> {
        if self.state != UploadState::Completed {
            return Err(Error::InvalidState {
                state: self.state,
                operation: "take report",
            });
        }
        Ok(std::mem::take(&mut self.report))
    }
}

/// Upload all lines, waiting for a reply after each line.
pub async fn run_upload<C, S>(
    upload: &mut HandshakeUpload<'_>,
    output: &mut C,
    input: &mut S,
    device_name: &str,
    timeout: Duration,
) -> Result<UploadReport>
where
    C: MidiOutputConnection + ?Sized,
    S: Stream<Item = SysexMessage> + Unpin + ?Sized,
{
    let first = upload.start()?;
    send_sysex(upload, output, first)?;
    let mut deadline = Instant::now() + timeout;
    loop {
        let Ok(next) = tokio::time::timeout_at(deadline, input.next()).await else {
            upload.abort();
            let line = upload.next_line.saturating_sub(1);
            log::warn!("{device_name} not responding: no reply for line {line} after {timeout:?}");
            return Err(Error::ProtocolTimeout {
                device: device_name.to_owned(),
                line,
                timeout,
            });
        };
        let Some(message) = next else {
            upload.abort();
            return Err(Error::InputClosed);
        };
        match upload.handle_reply(&message)? {
            UploadStep::NotMine | UploadStep::OutOfSequence => (),
            UploadStep::Next(message) => {
                send_sysex(upload, output, message)?;
                deadline = Instant::now() + timeout;
            }
            UploadStep::Completed => break,
        }
    }
    upload.take_report()
}

fn send_sysex<C>(
    upload: &mut HandshakeUpload<'_>,
    output: &mut C,
    message: SysexMessage,
) -> Result<()>
where
    C: MidiOutputConnection + ?Sized,
{
    send_midi_messages(output, &[message.into()]).map_err(|err| {
        upload.abort();
        err.into()
    })
}
