//! Status - タスクの正規化済みステータスと controller 側の状態

use serde::{Deserialize, Serialize};

/// Canonical status every backend-specific status string is normalized into.
///
/// State transitions:
/// - Queued -> Running -> Succeeded
/// - Queued -> Running -> Failed | TimedOut | Cancelled
///
/// Terminal states are sticky: no transition ever leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::TimedOut | TaskStatus::Cancelled
        )
    }
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::TimedOut => "timed_out",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one task as seen by `TaskController`.
///
/// `Submitting` は `start()` 呼び出しから submit の応答までの間だけ存在する。
/// submit が失敗したタスクは `Polling` に入らない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Submitting,
    Polling,
    Finished(TaskStatus),
}

impl ControllerState {
    pub fn is_finished(self) -> bool {
        matches!(self, ControllerState::Finished(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::queued(TaskStatus::Queued, false)]
    #[case::running(TaskStatus::Running, false)]
    #[case::succeeded(TaskStatus::Succeeded, true)]
    #[case::failed(TaskStatus::Failed, true)]
    #[case::timed_out(TaskStatus::TimedOut, true)]
    #[case::cancelled(TaskStatus::Cancelled, true)]
    fn terminal_states(#[case] status: TaskStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }

    #[test]
    fn status_serializes_snake_case() {
        let s = serde_json::to_string(&TaskStatus::TimedOut).unwrap();
        assert_eq!(s, "\"timed_out\"");
    }
}
