//! TaskHandle / StatusSnapshot - UI 層へ渡す値

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::artifact::Artifact;
use super::ids::TaskId;
use super::kind::TaskKind;
use super::status::TaskStatus;

/// Result of a successful submission. Immutable for the task's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskHandle {
    task_id: TaskId,
    kind: TaskKind,
    submitted_at: DateTime<Utc>,
}

impl TaskHandle {
    pub fn new(task_id: TaskId, kind: TaskKind, submitted_at: DateTime<Utc>) -> Self {
        Self {
            task_id,
            kind,
            submitted_at,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

/// Immutable status report for a task at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub task_id: TaskId,
    pub status: TaskStatus,

    /// Status string exactly as the backend sent it.
    pub raw_status: String,

    /// 0..=100
    pub progress_percent: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<Artifact>>,

    /// Number of completed poll responses when this snapshot was produced.
    pub attempt: u32,
}

impl StatusSnapshot {
    pub fn new(
        task_id: TaskId,
        status: TaskStatus,
        raw_status: impl Into<String>,
        progress_percent: u8,
        attempt: u32,
    ) -> Self {
        Self {
            task_id,
            status,
            raw_status: raw_status.into(),
            progress_percent: progress_percent.min(100),
            error_message: None,
            artifacts: None,
            attempt,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_artifacts(mut self, artifacts: Vec<Artifact>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
