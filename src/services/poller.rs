//! Fixed-interval, fixed-budget polling of a submitted vendor task.
//!
//! After a warm-up delay the loop issues one query at a time, sleeping a
//! fixed interval between non-terminal replies, until the vendor reports
//! success or error, the query endpoint fails, the budget runs out, or the
//! [`CancellationToken`] fires.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{PollSettings, TransportErrorPolicy};
use crate::error::{HTTP_TIMEOUT_INFO, URL_ERROR_INFO};
use crate::models::job::{PollOutcome, PollReport};

/// Vendor view of a task after one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Still running; carries the raw status string.
    Pending(String),
    Succeeded(String),
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The query endpoint answered with a non-2xx status.
    #[error("query endpoint returned HTTP {0}")]
    Status(u16),

    /// Network failure, timeout, or an unreadable body.
    #[error("query transport failed: {0}")]
    Transport(String),
}

/// One status lookup against the vendor.
#[async_trait]
pub trait TaskQuery: Send + Sync {
    async fn query(&self, task_id: &str) -> Result<TaskState, QueryError>;
}

/// Sleep for `duration` unless cancelled first. Returns `false` on cancel.
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Poll `task_id` until it reaches a terminal state or the budget is spent.
///
/// At least one query is always issued once the warm-up delay has elapsed.
/// The wall-clock budget, when set, is measured from the call to this
/// function (i.e. it includes the warm-up delay).
pub async fn poll_until_done<Q>(
    query: &Q,
    task_id: &str,
    settings: &PollSettings,
    cancel: &CancellationToken,
) -> PollReport
where
    Q: TaskQuery + ?Sized,
{
    let started = Instant::now();
    let deadline = settings.max_wait.map(|w| started + w);
    let mut attempts = 0u32;
    let mut last_info: Option<String> = None;

    tracing::debug!(
        task_id,
        delay_ms = settings.initial_delay.as_millis() as u64,
        "Waiting before first poll"
    );
    if !pause(settings.initial_delay, cancel).await {
        return PollReport {
            outcome: PollOutcome::Cancelled,
            attempts,
        };
    }

    while attempts < settings.max_attempts {
        attempts += 1;

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(task_id, attempt = attempts, "Polling cancelled");
                return PollReport { outcome: PollOutcome::Cancelled, attempts };
            }
            result = query.query(task_id) => result,
        };

        match result {
            Ok(TaskState::Succeeded(image)) => {
                tracing::info!(task_id, attempt = attempts, "Task succeeded");
                return PollReport {
                    outcome: PollOutcome::Succeeded(image),
                    attempts,
                };
            }
            Ok(TaskState::Failed(message)) => {
                tracing::warn!(task_id, attempt = attempts, message = %message, "Task failed");
                return PollReport {
                    outcome: PollOutcome::Failed(message),
                    attempts,
                };
            }
            Ok(TaskState::Pending(status)) => {
                tracing::debug!(task_id, attempt = attempts, status = %status, "Task still running");
                last_info = None;
            }
            Err(QueryError::Status(code)) => {
                tracing::warn!(task_id, attempt = attempts, status = code, "Query endpoint rejected request");
                return PollReport {
                    outcome: PollOutcome::Failed(URL_ERROR_INFO.to_string()),
                    attempts,
                };
            }
            Err(QueryError::Transport(e)) => {
                tracing::warn!(task_id, attempt = attempts, error = %e, "Error during polling");
                if settings.on_transport_error == TransportErrorPolicy::Abort {
                    return PollReport {
                        outcome: PollOutcome::Failed(HTTP_TIMEOUT_INFO.to_string()),
                        attempts,
                    };
                }
                last_info = Some(HTTP_TIMEOUT_INFO.to_string());
            }
        }

        if attempts == settings.max_attempts {
            break;
        }

        let mut wait = settings.interval;
        if let Some(deadline) = deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            wait = wait.min(remaining);
        }

        if !pause(wait, cancel).await {
            return PollReport {
                outcome: PollOutcome::Cancelled,
                attempts,
            };
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
    }

    tracing::warn!(task_id, attempts, "Poll budget exhausted");
    PollReport {
        outcome: PollOutcome::TimedOut { last_info },
        attempts,
    }
}
