//! Progress events and the channel that carries them
//!
//! A run has exactly one producer (the pipeline) and one consumer (whoever
//! relays progress to the caller). The channel is unbounded, so emitting
//! never waits on the consumer. Dropping the [`ProgressStream`] cancels the
//! run: the pipeline stops before its next stage and any external process
//! still running is killed.

use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::domain::DomainName;

/// What an event reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CheckingOwnership,
    CheckingAddress,
    CreatingDirectory,
    Downloading,
    Extracting,
    SettingPermissions,
    ConfiguringProxy,
    IssuingCertificate,
    /// Terminal: the run finished
    Completed,
    /// Terminal: the domain was installed before this run
    AlreadyInstalled,
    /// Terminal: the run stopped on an error
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::CheckingOwnership => "checking_ownership",
            Stage::CheckingAddress => "checking_address",
            Stage::CreatingDirectory => "creating_directory",
            Stage::Downloading => "downloading",
            Stage::Extracting => "extracting",
            Stage::SettingPermissions => "setting_permissions",
            Stage::ConfiguringProxy => "configuring_proxy",
            Stage::IssuingCertificate => "issuing_certificate",
            Stage::Completed => "completed",
            Stage::AlreadyInstalled => "already_installed",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Info,
    Success,
    Failure,
}

/// One line of progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub kind: EventKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_url: Option<String>,
}

impl ProgressEvent {
    pub fn info(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind: EventKind::Info,
            message: message.into(),
            setup_url: None,
        }
    }

    pub fn success(message: impl Into<String>, setup_url: Option<String>) -> Self {
        Self {
            stage: Stage::Completed,
            kind: EventKind::Success,
            message: message.into(),
            setup_url,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            stage: Stage::Failed,
            kind: EventKind::Failure,
            message: message.into(),
            setup_url: None,
        }
    }

    /// `true` for the event that ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(self.stage, Stage::Completed | Stage::AlreadyInstalled | Stage::Failed)
    }
}

/// Why a run failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// The TXT token is not published
    OwnershipNotVerified { token: String },
    /// The A record does not point at the server
    AddressNotSet { expected: Ipv4Addr },
    /// Another run holds the domain
    InProgress,
    /// A standalone step needs an installation that does not exist
    NotInstalled,
    /// An external command failed; `detail` is its own output
    Command {
        stage: Stage,
        program: String,
        detail: String,
    },
    /// An external command ran out of time
    Timeout {
        stage: Stage,
        program: String,
        after_secs: u64,
    },
    /// The consumer disconnected
    Cancelled,
    /// Anything else
    Unexpected { stage: Option<Stage>, detail: String },
}

impl FailureReason {
    /// Build the reason for an error raised while performing `stage`
    pub fn from_error(stage: Stage, error: crate::Error) -> Self {
        match error {
            crate::Error::CommandFailed { program, detail } => FailureReason::Command {
                stage,
                program,
                detail,
            },
            crate::Error::Timeout { program, after } => FailureReason::Timeout {
                stage,
                program,
                after_secs: after.as_secs(),
            },
            crate::Error::Cancelled => FailureReason::Cancelled,
            other => FailureReason::Unexpected {
                stage: Some(stage),
                detail: other.to_string(),
            },
        }
    }

    /// Caller-facing message, including remediation where there is one
    pub fn describe(&self, domain: &DomainName) -> String {
        match self {
            FailureReason::OwnershipNotVerified { token } => format!(
                "Ownership of {domain} not verified. Add a TXT record to {domain} containing \"{token}\" and try again."
            ),
            FailureReason::AddressNotSet { expected } => format!(
                "Address record not set. Point the A record of {domain} to {expected} and try again."
            ),
            FailureReason::InProgress => {
                format!("Provisioning of {domain} is already in progress.")
            }
            FailureReason::NotInstalled => {
                format!("{domain} has not been provisioned yet.")
            }
            FailureReason::Command { stage, detail, .. } => {
                format!("Step {stage} failed: {detail}")
            }
            FailureReason::Timeout {
                stage,
                program,
                after_secs,
            } => format!("Step {stage} timed out: {program} did not finish within {after_secs}s"),
            FailureReason::Cancelled => format!("Provisioning of {domain} was cancelled."),
            FailureReason::Unexpected { detail, .. } => {
                format!("Unexpected error while provisioning {domain}: {detail}")
            }
        }
    }
}

/// Terminal result of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded { setup_url: String },
    AlreadyInstalled,
    Failed(FailureReason),
}

/// Create a connected sender/stream pair
pub fn progress_channel() -> (ProgressSender, ProgressStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let sender = ProgressSender {
        tx,
        cancel: cancel.clone(),
    };
    let stream = ProgressStream {
        rx,
        _cancel_on_drop: cancel.drop_guard(),
    };
    (sender, stream)
}

/// Producer half, owned by the pipeline
#[derive(Debug)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    cancel: CancellationToken,
}

impl ProgressSender {
    /// Emit an event
    ///
    /// Returns `false` once the consumer is gone; the run is cancelled from then on.
    pub fn send(&self, event: ProgressEvent) -> bool {
        if self.tx.send(event).is_err() {
            self.cancel.cancel();
            return false;
        }
        true
    }

    /// Fires when the consumer goes away
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}

/// Consumer half
///
/// Yields events in emission order and ends after the terminal event.
#[derive(Debug)]
pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
    _cancel_on_drop: DropGuard,
}

impl ProgressStream {
    /// Receive the next event
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
