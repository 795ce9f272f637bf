//! TaskSubmitter - 外部 submit 呼び出しの薄いラッパー
//!
//! 1. kind ごとの必須フィールドを検査（足りなければネットワークに出ない）
//! 2. backend.submit
//! 3. 応答から taskId を precedence table で探して `TaskHandle` にする
//!
//! リトライはしない。再送するかどうかは呼び出し側が決める。

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use super::envelope::locate_task_id;
use super::registry::BackendRegistry;
use crate::domain::{SubmitError, TaskHandle, TaskId, TaskKind};
use crate::ports::Clock;

/// Fields from `kind.required_fields()` that are absent, null or empty in `payload`.
pub fn missing_fields(kind: TaskKind, payload: &Value) -> Vec<String> {
    kind.required_fields()
        .iter()
        .filter(|field| is_blank(payload.get(**field)))
        .map(|field| field.to_string())
        .collect()
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        Some(_) => false,
    }
}

pub fn validate(kind: TaskKind, payload: &Value) -> Result<(), SubmitError> {
    let missing = missing_fields(kind, payload);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SubmitError::Validation { kind, missing })
    }
}

pub struct TaskSubmitter {
    registry: Arc<BackendRegistry>,
    clock: Arc<dyn Clock>,
}

impl TaskSubmitter {
    pub fn new(registry: Arc<BackendRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self { registry, clock }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub async fn submit(&self, kind: TaskKind, payload: &Value) -> Result<TaskHandle, SubmitError> {
        validate(kind, payload)?;

        let backend = self.registry.get(kind).ok_or(SubmitError::NoBackend(kind))?;
        let response = backend.submit(payload).await?;
        debug!(%kind, %response, "submit response");

        let task_id = locate_task_id(&response).ok_or_else(|| {
            SubmitError::MalformedResponse(format!("no task id in {kind} submit response"))
        })?;

        let handle = TaskHandle::new(TaskId::new(task_id), kind, self.clock.now());
        info!(%kind, task_id = %handle.task_id(), "task submitted");
        Ok(handle)
    }
}
