//! Run lifecycle and the bounded wait for completion.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::{ConversationGateway, GatewayError, GatewayResult};

/// Status of an assistant run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    /// The assistant wants tool outputs; this proxy never supplies any.
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    /// A status this client does not know about yet.
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Whether the run can still make progress on its own.
    #[must_use]
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            Self::Queued | Self::InProgress | Self::Cancelling | Self::Unknown
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error detail attached to a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLastError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// One invocation of an assistant against a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub last_error: Option<RunLastError>,
}

impl Run {
    fn failure_reason(&self) -> String {
        self.last_error
            .as_ref()
            .map(|e| format!("{}: {}", e.code, e.message))
            .unwrap_or_else(|| self.status.to_string())
    }
}

/// How long and how often to poll a run.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Poll `run` until it completes.
///
/// Returns the completed run. Any other terminal status becomes
/// [`GatewayError::RunNotCompleted`]; running past `policy.timeout` cancels
/// the run and returns [`GatewayError::RunTimedOut`]. A failed status check
/// also cancels the run before its error is returned.
pub async fn wait_for_run(
    gateway: &dyn ConversationGateway,
    thread_id: &str,
    run: Run,
    policy: PollPolicy,
) -> GatewayResult<Run> {
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut run = run;
    let mut polls: u32 = 0;

    loop {
        match run.status {
            RunStatus::Completed => {
                tracing::debug!(
                    thread_id = %thread_id,
                    run_id = %run.id,
                    polls,
                    elapsed = ?started.elapsed(),
                    "Run completed"
                );
                return Ok(run);
            }
            RunStatus::RequiresAction => {
                cancel_quietly(gateway, thread_id, &run.id).await;
                return Err(GatewayError::RunNotCompleted {
                    reason: "run requested tool outputs".to_string(),
                    run_id: run.id,
                    status: RunStatus::RequiresAction,
                });
            }
            status if !status.is_pending() => {
                return Err(GatewayError::RunNotCompleted {
                    reason: run.failure_reason(),
                    run_id: run.id,
                    status,
                });
            }
            _ => {}
        }

        if Instant::now() + policy.interval > deadline {
            cancel_quietly(gateway, thread_id, &run.id).await;
            return Err(GatewayError::RunTimedOut {
                run_id: run.id,
                status: run.status,
                waited_secs: started.elapsed().as_secs(),
            });
        }

        tokio::time::sleep(policy.interval).await;
        polls += 1;
        run = match gateway.retrieve_run(thread_id, &run.id).await {
            Ok(next) => next,
            Err(e) => {
                cancel_quietly(gateway, thread_id, &run.id).await;
                return Err(e);
            }
        };
        tracing::trace!(run_id = %run.id, status = %run.status, polls, "Polled run");
    }
}

async fn cancel_quietly(gateway: &dyn ConversationGateway, thread_id: &str, run_id: &str) {
    if let Err(e) = gateway.cancel_run(thread_id, run_id).await {
        tracing::warn!(
            thread_id = %thread_id,
            run_id = %run_id,
            error = %e,
            "Failed to cancel run"
        );
    }
}
