//! Task polling: turns a fire-and-forget generation call into an observable,
//! cancellable operation with exactly one outcome.
//!
//! Flow: start-generation → task id → poll `task-result` every `interval`
//! until SUCCESS / FAILURE, a poll error, the optional deadline, or cancellation.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::ClientError;
use crate::http::ApiClient;
use crate::models::task::{GenerateRequest, TaskStatus};

/// Message used when a failed task carries no readable reason.
pub const UNKNOWN_FAILURE: &str = "An unexpected error occurred.";

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    /// `None` polls until the task terminates.
    pub timeout: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: None,
        }
    }
}

/// The single terminal result of a submitted task.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Succeeded(T),
    /// The job ran and reported failure.
    Failed(String),
    /// Polling broke; the job's own fate is unknown.
    Lost(ClientError),
    TimedOut,
    Cancelled,
}

impl<T> TaskOutcome<T> {
    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Succeeded(_) => "succeeded",
            TaskOutcome::Failed(_) => "failed",
            TaskOutcome::Lost(_) => "lost",
            TaskOutcome::TimedOut => "timed out",
            TaskOutcome::Cancelled => "cancelled",
        }
    }
}

/// Owner-side view of one polled task.
///
/// `outcome()` consumes the handle, so the result is observed at most once; the
/// polling loop sends exactly one value, so it is observed at least once.
pub struct TaskHandle<T> {
    task_id: String,
    cancel: CancellationToken,
    outcome: oneshot::Receiver<TaskOutcome<T>>,
}

impl<T> TaskHandle<T> {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Stops the polling clock. The outcome becomes `Cancelled` unless it was already delivered.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn outcome(self) -> TaskOutcome<T> {
        self.outcome.await.unwrap_or_else(|_| {
            TaskOutcome::Lost(ClientError::UnexpectedResponse(
                "polling stopped without a result".to_string(),
            ))
        })
    }
}

#[derive(Clone)]
pub struct TaskPoller {
    api: ApiClient,
    config: PollConfig,
}

impl TaskPoller {
    pub fn new(api: ApiClient, config: PollConfig) -> Self {
        Self { api, config }
    }

    /// Starts the job and begins polling it, bound to `cancel`. Fails only if the
    /// job was not accepted. A token cancelled while the start request is in
    /// flight yields `Cancelled` without a single poll.
    pub async fn submit<T>(
        &self,
        command: &GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<TaskHandle<T>, ClientError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let task_id = self.api.start_generation(command).await?;
        info!("Generation task {task_id} accepted ({:?})", command.command);
        Ok(self.watch(task_id, cancel))
    }

    fn watch<T>(&self, task_id: String, cancel: CancellationToken) -> TaskHandle<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        tokio::spawn(run_poll(
            self.api.clone(),
            task_id.clone(),
            self.config.clone(),
            cancel.clone(),
            tx,
        ));

        TaskHandle {
            task_id,
            cancel,
            outcome: rx,
        }
    }
}

async fn run_poll<T: DeserializeOwned>(
    api: ApiClient,
    task_id: String,
    config: PollConfig,
    cancel: CancellationToken,
    tx: oneshot::Sender<TaskOutcome<T>>,
) {
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => TaskOutcome::Cancelled,
        outcome = poll_until_terminal(&api, &task_id, &config) => outcome,
    };
    // A cancel that lands while the final poll resolves still wins.
    let outcome = if cancel.is_cancelled() {
        TaskOutcome::Cancelled
    } else {
        outcome
    };

    info!("Task {task_id} {}", outcome.label());
    let _ = tx.send(outcome);
}

async fn poll_until_terminal<T: DeserializeOwned>(
    api: &ApiClient,
    task_id: &str,
    config: &PollConfig,
) -> TaskOutcome<T> {
    let deadline = config.timeout.map(|t| Instant::now() + t);
    let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_status = None;

    loop {
        match deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = sleep_until(deadline) => return TaskOutcome::TimedOut,
                }
            }
            None => {
                ticker.tick().await;
            }
        }

        let envelope = match api.task_result(task_id).await {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Polling task {task_id} failed: {e}");
                return TaskOutcome::Lost(e);
            }
        };

        if last_status != Some(envelope.status) {
            debug!("Task {task_id} status: {:?}", envelope.status);
            last_status = Some(envelope.status);
        }

        match envelope.status {
            TaskStatus::Pending | TaskStatus::Started => continue,
            TaskStatus::Succeeded => {
                let Some(result) = envelope.result else {
                    return TaskOutcome::Lost(ClientError::UnexpectedResponse(
                        "task succeeded without a result".to_string(),
                    ));
                };
                return match serde_json::from_value(result) {
                    Ok(result) => TaskOutcome::Succeeded(result),
                    Err(e) => TaskOutcome::Lost(ClientError::Decode(e)),
                };
            }
            TaskStatus::Failed => {
                let message = envelope
                    .result
                    .as_ref()
                    .and_then(|v| v.as_str())
                    .unwrap_or(UNKNOWN_FAILURE)
                    .to_string();
                return TaskOutcome::Failed(message);
            }
        }
    }
}
