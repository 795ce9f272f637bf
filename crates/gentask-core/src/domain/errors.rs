//! Errors - エラー型と分類
//!
//! submit 時のエラーは `start()` の戻り値としてそのまま呼び出し元へ返す。
//! poll 中のエラーは throw せず、終端 snapshot の `error_message` に変換して配送する
//! （その時点で呼び出し元は await しておらず、listen しているだけなので）。

use thiserror::Error;

use super::kind::TaskKind;
use super::status::TaskStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown task kind: {0}")]
pub struct UnknownKind(pub String);

/// What a `GenerationBackend` reports when a call does not yield a response body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Transport failure (connection reset, timeout, 5xx without body, ...).
    #[error("network error: {0}")]
    Network(String),

    #[error("insufficient credits: {0}")]
    InsufficientCredits(String),

    /// The backend answered but refused the request.
    #[error("rejected by backend: {0}")]
    Rejected(String),
}

/// Submission-time errors. Never retried by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("missing required fields for {kind}: {}", .missing.join(", "))]
    Validation { kind: TaskKind, missing: Vec<String> },

    #[error("insufficient credits: {0}")]
    Quota(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed submit response: {0}")]
    MalformedResponse(String),

    #[error("rejected by backend: {0}")]
    Rejected(String),

    #[error("no backend registered for task kind {0}")]
    NoBackend(TaskKind),
}

impl From<BackendError> for SubmitError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Network(msg) => SubmitError::Network(msg),
            BackendError::InsufficientCredits(msg) => SubmitError::Quota(msg),
            BackendError::Rejected(msg) => SubmitError::Rejected(msg),
        }
    }
}

/// Poll-time failures. Rendered into a terminal snapshot, never returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollFailure {
    /// Transport failures exhausted the retry limit; carries the underlying message.
    #[error("{0}")]
    Network(String),

    #[error("malformed status response: {0}")]
    MalformedResponse(String),

    #[error("succeeded with no output")]
    ArtifactMissing,

    #[error("timed out after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("{0}")]
    Backend(String),
}

impl PollFailure {
    /// Terminal status this failure resolves to.
    pub fn status(&self) -> TaskStatus {
        match self {
            PollFailure::Timeout { .. } => TaskStatus::TimedOut,
            _ => TaskStatus::Failed,
        }
    }
}

impl From<BackendError> for PollFailure {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Network(msg) => PollFailure::Network(msg),
            other => PollFailure::Backend(other.to_string()),
        }
    }
}

/// Non-fatal: the backend sent a status string outside the known tables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status '{raw}', treating as running")]
pub struct UnknownStatusWarning {
    pub raw: String,
}
