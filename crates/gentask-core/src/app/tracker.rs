//! TaskTracker - 1 session 分の状態から snapshot を組み立てる
//!
//! 応答 1 件ごとに normalize -> progress -> extract を通して `StatusSnapshot` を作る。
//! タイマーも配送も知らない（それは scheduler と gate の仕事）。

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::Value;
use tracing::warn;

use super::envelope::non_empty_str;
use super::extractor::extract_with_fallback;
use super::normalizer::normalize;
use super::progress::ProgressEstimator;
use crate::config::{PollPolicy, ProgressConfig};
use crate::domain::{BackendError, PollFailure, StatusSnapshot, TaskId, TaskKind, TaskStatus};

/// Where a failed task's own explanation may live, in precedence order.
const FAILURE_MESSAGE_POINTERS: &[&str] = &[
    "/error/message",
    "/error",
    "/message",
    "/msg",
    "/fail_reason",
    "/failReason",
    "/reason",
];

pub struct TaskTracker {
    task_id: TaskId,
    kind: TaskKind,
    policy: PollPolicy,
    estimator: ProgressEstimator,
    rng: StdRng,

    progress: u8,
    attempt: u32,
    /// Attempt number this session started from (non-zero after a restart).
    base_attempt: u32,
    raw_status: Option<String>,
    network_failures: u32,
}

impl TaskTracker {
    pub fn new(task_id: TaskId, kind: TaskKind, policy: PollPolicy, progress: &ProgressConfig) -> Self {
        let rng = match progress.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            task_id,
            kind,
            policy,
            estimator: ProgressEstimator::from_config(progress),
            rng,
            progress: 0,
            attempt: 0,
            base_attempt: 0,
            raw_status: None,
            network_failures: 0,
        }
    }

    /// Continue attempt numbering after `last` (progress still starts at 0).
    pub fn resume_after(mut self, last: Option<&StatusSnapshot>) -> Self {
        if let Some(last) = last {
            self.attempt = last.attempt;
            self.base_attempt = last.attempt;
        }
        self
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Responses received by this session.
    pub fn attempts_used(&self) -> u32 {
        self.attempt - self.base_attempt
    }

    pub fn budget_exhausted(&self) -> bool {
        self.attempts_used() >= self.policy.max_attempts
    }

    /// Snapshot for one query response. Every response counts as an attempt.
    pub fn on_response(&mut self, response: &Value) -> StatusSnapshot {
        self.attempt += 1;
        self.network_failures = 0;

        let normalized = match normalize(self.kind, response) {
            Ok(n) => n,
            Err(failure) => return self.failed(failure),
        };
        self.raw_status = Some(normalized.raw_status.clone());

        match normalized.status {
            TaskStatus::Succeeded => {
                let artifacts = extract_with_fallback(self.kind, &normalized.payload, response);
                if artifacts.is_empty() {
                    return self.failed(PollFailure::ArtifactMissing);
                }
                self.progress = self
                    .estimator
                    .estimate(self.progress, TaskStatus::Succeeded, &mut self.rng);
                self.snapshot(TaskStatus::Succeeded).with_artifacts(artifacts)
            }
            TaskStatus::Failed => {
                let message = failure_message(&normalized.payload)
                    .unwrap_or_else(|| format!("backend reported {}", normalized.raw_status));
                self.failed(PollFailure::Backend(message))
            }
            status => {
                self.progress = self.estimator.estimate(self.progress, status, &mut self.rng);
                self.snapshot(status)
            }
        }
    }

    /// A query that returned no response.
    ///
    /// `None` means "retry on the next tick"; `Some` is the terminal snapshot.
    pub fn on_error(&mut self, error: BackendError) -> Option<StatusSnapshot> {
        match error {
            BackendError::Network(message) if self.network_failures < self.policy.network_retry_limit => {
                self.network_failures += 1;
                warn!(
                    task_id = %self.task_id,
                    kind = %self.kind,
                    failures = self.network_failures,
                    limit = self.policy.network_retry_limit,
                    "query failed, retrying: {message}"
                );
                None
            }
            other => Some(self.failed(other.into())),
        }
    }

    pub fn timed_out(&self) -> StatusSnapshot {
        let failure = PollFailure::Timeout {
            attempts: self.attempts_used(),
        };
        self.snapshot(failure.status()).with_error(failure.to_string())
    }

    fn failed(&self, failure: PollFailure) -> StatusSnapshot {
        self.snapshot(failure.status()).with_error(failure.to_string())
    }

    fn snapshot(&self, status: TaskStatus) -> StatusSnapshot {
        let raw = self.raw_status.clone().unwrap_or_else(|| status.to_string());
        StatusSnapshot::new(self.task_id.clone(), status, raw, self.progress, self.attempt)
    }
}

fn failure_message(payload: &Value) -> Option<String> {
    FAILURE_MESSAGE_POINTERS
        .iter()
        .filter_map(|ptr| payload.pointer(ptr))
        .find_map(non_empty_str)
        .map(str::to_string)
}
