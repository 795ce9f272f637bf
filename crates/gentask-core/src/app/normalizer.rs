//! StatusNormalizer - backend の status 文字列を `TaskStatus` に写像する純粋関数
//!
//! status 文字列だけが正。フィールドの有無から成功/失敗を推測しない。

use serde_json::Value;
use tracing::warn;

use super::envelope::{locate_status, unwrap_result};
use crate::domain::{PollFailure, TaskKind, TaskStatus, UnknownStatusWarning};

const RUNNING: &[&str] = &["running", "init", "in_queue", "generating"];
const SUCCEEDED: &[&str] = &["succeeded", "success", "completed", "done"];
const FAILED: &[&str] = &["failed", "fail", "error", "expired"];

/// A query response reduced to what the engine cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedStatus {
    pub raw_status: String,
    pub status: TaskStatus,

    /// The unwrapped task-result object.
    pub payload: Value,

    pub warning: Option<UnknownStatusWarning>,
}

/// Map a raw status label through the fixed table (case-insensitive).
///
/// Unrecognized labels resolve to `Running` plus a warning, so polling continues
/// instead of abandoning a task that reports some new in-progress label.
pub fn classify(raw: &str) -> (TaskStatus, Option<UnknownStatusWarning>) {
    let label = raw.trim().to_ascii_lowercase();
    if RUNNING.contains(&label.as_str()) {
        (TaskStatus::Running, None)
    } else if SUCCEEDED.contains(&label.as_str()) {
        (TaskStatus::Succeeded, None)
    } else if FAILED.contains(&label.as_str()) {
        (TaskStatus::Failed, None)
    } else {
        let warning = UnknownStatusWarning {
            raw: raw.to_string(),
        };
        (TaskStatus::Running, Some(warning))
    }
}

/// Normalize one query response.
///
/// Fails only when no status string can be found at all.
pub fn normalize(kind: TaskKind, raw_response: &Value) -> Result<NormalizedStatus, PollFailure> {
    let raw_status = locate_status(raw_response).ok_or_else(|| {
        PollFailure::MalformedResponse(format!("no status field in {kind} response"))
    })?;

    let (status, warning) = classify(&raw_status);
    if let Some(w) = &warning {
        warn!(%kind, raw_status = %w.raw, "{w}");
    }

    Ok(NormalizedStatus {
        raw_status,
        status,
        payload: unwrap_result(raw_response).clone(),
        warning,
    })
}
