// SPDX-FileCopyrightText: The patchio authors
// SPDX-License-Identifier: MPL-2.0

use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};

/// A failed call into a script module
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
#[display("{module}: {function}() failed: {message}")]
pub struct ScriptErrorReport {
    pub module: String,
    pub function: String,
    pub message: String,
}

/// Dispatches reports without blocking the caller.
#[derive(Debug, Clone, Default)]
pub struct ScriptErrorReporter {
    tx: Option<UnboundedSender<ScriptErrorReport>>,
}

impl ScriptErrorReporter {
    /// Create a reporter and the receiver of its reports.
    #[must_use]
    pub fn channel() -> (Self, UnboundedReceiver<ScriptErrorReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Logs directly if there is no receiver.
    pub fn report(&self, report: ScriptErrorReport) {
        let Some(tx) = &self.tx else {
            log::warn!("{report}");
            return;
        };
        if let Err(mpsc::error::SendError(report)) = tx.send(report) {
            log::warn!("{report}");
        }
    }
}

/// Spawn a task that logs all received reports.
///
/// The task finishes after all reporters have been dropped.
#[must_use]
pub fn spawn_script_error_log_task(
    mut rx: UnboundedReceiver<ScriptErrorReport>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(report) = rx.recv().await {
            log::warn!("{report}");
        }
        log::debug!("Script error log task finished");
    })
}
