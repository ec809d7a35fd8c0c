//! Deletion engine.
//!
//! Walks one channel's message ids in order, skips anything the ledger already
//! knows about, and drives each remaining id through the remote delete with
//! rate-limit backoff. Successful deletions are written through to the ledger
//! before the next id is touched, so an interrupted run only ever repeats work
//! that was not yet recorded.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;

use crate::ledger::DeletionLedger;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    /// Delay after a confirmed deletion before the next id is attempted.
    pub pacing: Duration,
    /// Rate-limited attempts allowed per message before giving up.
    pub max_retries: u32,
    /// Wait used when a rate-limit response carries no retry hint.
    pub fallback_retry_after: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            pacing: Duration::from_millis(2500),
            max_retries: 5,
            fallback_retry_after: Duration::from_secs(5),
        }
    }
}

/// Credential for a single run. Handed to the deleter on every call.
#[derive(Clone)]
pub struct RunContext {
    credential: String,
}

impl RunContext {
    pub fn new(credential: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
        }
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("credential", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusKind {
    Success,
    RateLimited,
    ClientError(u16),
    ServerError(u16),
    NetworkFailure,
}

/// Outcome of one network attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteDeleteResult {
    pub status_kind: StatusKind,
    pub retry_after: Option<Duration>,
    pub error_detail: Option<String>,
}

impl RemoteDeleteResult {
    pub fn success() -> Self {
        Self {
            status_kind: StatusKind::Success,
            retry_after: None,
            error_detail: None,
        }
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self {
            status_kind: StatusKind::RateLimited,
            retry_after,
            error_detail: None,
        }
    }

    pub fn rejected(status: u16, detail: Option<String>) -> Self {
        let status_kind = if status >= 500 {
            StatusKind::ServerError(status)
        } else {
            StatusKind::ClientError(status)
        };
        Self {
            status_kind,
            retry_after: None,
            error_detail: detail,
        }
    }

    pub fn network_failure(detail: impl Into<String>) -> Self {
        Self {
            status_kind: StatusKind::NetworkFailure,
            retry_after: None,
            error_detail: Some(detail.into()),
        }
    }
}

/// The remote "delete message" operation.
pub trait MessageDeleter {
    fn delete(
        &self,
        context: &RunContext,
        channel_id: &str,
        message_id: &str,
    ) -> impl Future<Output = RemoteDeleteResult>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FailureReason {
    #[serde(rename_all = "camelCase")]
    RetryBudgetExhausted { attempts: u32 },
    #[serde(rename_all = "camelCase")]
    RemoteRejected { status: u16, detail: Option<String> },
    #[serde(rename_all = "camelCase")]
    TransportError { detail: Option<String> },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::RetryBudgetExhausted { attempts } => {
                write!(f, "rate limited {attempts} times, giving up")
            }
            FailureReason::RemoteRejected { status, detail } => match detail {
                Some(detail) => write!(f, "rejected with status {status}: {detail}"),
                None => write!(f, "rejected with status {status}"),
            },
            FailureReason::TransportError { detail } => match detail {
                Some(detail) => write!(f, "transport error: {detail}"),
                None => write!(f, "transport error"),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    AlreadyDeleted,
    /// Ledger query failed; treated as deleted rather than risk a repeat call.
    LedgerUnavailable,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    Pending,
    Succeeded,
    Failed(FailureReason),
    Skipped(SkipReason),
}

impl TaskOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskOutcome::Pending)
    }
}

#[derive(Clone, Debug)]
pub struct DeletionTask {
    pub channel_id: String,
    pub message_id: String,
    pub attempt_count: u32,
    pub outcome: TaskOutcome,
}

impl DeletionTask {
    fn new(channel_id: &str, message_id: &str) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            attempt_count: 0,
            outcome: TaskOutcome::Pending,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedMessage {
    pub message_id: String,
    pub reason: FailureReason,
}

/// Per-channel result. Every input id lands in exactly one list, in input order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRunSummary {
    pub channel_id: String,
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedMessage>,
    pub skipped: Vec<String>,
}

impl ChannelRunSummary {
    fn new(channel_id: &str) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            ..Self::default()
        }
    }

    fn push(&mut self, task: DeletionTask) {
        match task.outcome {
            TaskOutcome::Succeeded => self.succeeded.push(task.message_id),
            TaskOutcome::Skipped(_) => self.skipped.push(task.message_id),
            TaskOutcome::Failed(reason) => self.failed.push(FailedMessage {
                message_id: task.message_id,
                reason,
            }),
            TaskOutcome::Pending => {}
        }
    }

    pub fn failure_reason(&self, message_id: &str) -> Option<&FailureReason> {
        self.failed
            .iter()
            .find(|failed| failed.message_id == message_id)
            .map(|failed| &failed.reason)
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

pub struct DeletionEngine<'a, L, D> {
    ledger: &'a L,
    deleter: &'a D,
    context: RunContext,
    settings: EngineSettings,
}

impl<'a, L: DeletionLedger, D: MessageDeleter> DeletionEngine<'a, L, D> {
    pub fn new(ledger: &'a L, deleter: &'a D, context: RunContext, settings: EngineSettings) -> Self {
        Self {
            ledger,
            deleter,
            context,
            settings,
        }
    }

    pub async fn run_channel(&self, channel_id: &str, message_ids: &[String]) -> ChannelRunSummary {
        self.run_channel_with_progress(channel_id, message_ids, |_| {})
            .await
    }

    /// Like [`run_channel`](Self::run_channel), calling `on_terminal` as each
    /// id reaches its final outcome.
    pub async fn run_channel_with_progress<F>(
        &self,
        channel_id: &str,
        message_ids: &[String],
        mut on_terminal: F,
    ) -> ChannelRunSummary
    where
        F: FnMut(&DeletionTask),
    {
        let mut summary = ChannelRunSummary::new(channel_id);
        let total = message_ids.len();
        tracing::info!(channel_id, total, "starting channel run");

        for (index, message_id) in message_ids.iter().enumerate() {
            let mut task = DeletionTask::new(channel_id, message_id);
            self.process(&mut task).await;
            on_terminal(&task);

            let succeeded = task.outcome == TaskOutcome::Succeeded;
            summary.push(task);
            if succeeded && index + 1 < total {
                tokio::time::sleep(self.settings.pacing).await;
            }
        }

        tracing::info!(
            channel_id,
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            "channel run finished"
        );
        summary
    }

    async fn process(&self, task: &mut DeletionTask) {
        match self.ledger.has_been_deleted(&task.channel_id, &task.message_id) {
            Ok(true) => {
                tracing::debug!(message_id = %task.message_id, "already deleted, skipping");
                task.outcome = TaskOutcome::Skipped(SkipReason::AlreadyDeleted);
                return;
            }
            Ok(false) => {}
            Err(error) => {
                tracing::warn!(
                    message_id = %task.message_id,
                    %error,
                    "ledger query failed, assuming already deleted"
                );
                task.outcome = TaskOutcome::Skipped(SkipReason::LedgerUnavailable);
                return;
            }
        }

        let max_retries = self.settings.max_retries.max(1);
        while !task.outcome.is_terminal() {
            let result = self
                .deleter
                .delete(&self.context, &task.channel_id, &task.message_id)
                .await;

            match result.status_kind {
                StatusKind::Success => {
                    if let Err(error) = self.ledger.record_deletion(&task.channel_id, &task.message_id) {
                        tracing::error!(
                            message_id = %task.message_id,
                            %error,
                            "deleted remotely but failed to record in ledger"
                        );
                    }
                    tracing::info!(message_id = %task.message_id, "deleted");
                    task.outcome = TaskOutcome::Succeeded;
                }
                StatusKind::RateLimited => {
                    let wait = result.retry_after.unwrap_or(self.settings.fallback_retry_after);
                    tracing::warn!(
                        message_id = %task.message_id,
                        wait_ms = wait.as_millis() as u64,
                        attempt = task.attempt_count + 1,
                        "rate limited"
                    );
                    tokio::time::sleep(wait).await;
                    task.attempt_count += 1;
                    if task.attempt_count >= max_retries {
                        task.outcome = TaskOutcome::Failed(FailureReason::RetryBudgetExhausted {
                            attempts: task.attempt_count,
                        });
                    }
                }
                StatusKind::ClientError(status) | StatusKind::ServerError(status) => {
                    tracing::error!(
                        message_id = %task.message_id,
                        status,
                        detail = result.error_detail.as_deref().unwrap_or("-"),
                        "delete rejected"
                    );
                    task.outcome = TaskOutcome::Failed(FailureReason::RemoteRejected {
                        status,
                        detail: result.error_detail,
                    });
                }
                StatusKind::NetworkFailure => {
                    tracing::error!(
                        message_id = %task.message_id,
                        detail = result.error_detail.as_deref().unwrap_or("-"),
                        "delete request failed"
                    );
                    task.outcome = TaskOutcome::Failed(FailureReason::TransportError {
                        detail: result.error_detail,
                    });
                }
            }
        }
    }
}
