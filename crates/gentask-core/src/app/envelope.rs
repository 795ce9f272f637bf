//! Envelope precedence tables.
//!
//! Backends nest the interesting object inconsistently (`result`, `data`, or
//! nothing at all). Every lookup that has to cope with that goes through the
//! tables here instead of ad hoc `if data ... else if result ...` chains.

use serde_json::Value;

/// Where a submit response may carry the task id, in precedence order.
pub const TASK_ID_POINTERS: &[&str] = &["/result/taskId", "/data/taskId", "/data/id", "/id", "/taskId"];

/// Wrapper keys unwrapped before reading a query response, in precedence order.
pub const RESULT_WRAPPERS: &[&str] = &["result", "data"];

/// Field names that may hold the status string.
pub const STATUS_FIELDS: &[&str] = &["status", "task_status", "state"];

/// First task id found following `TASK_ID_POINTERS`.
///
/// Integer ids are accepted and rendered as decimal strings. Empty strings are skipped.
pub fn locate_task_id(response: &Value) -> Option<String> {
    TASK_ID_POINTERS
        .iter()
        .filter_map(|ptr| response.pointer(ptr))
        .find_map(scalar_text)
}

/// The task-result object: `result` → `data` → the response itself.
///
/// Only objects are unwrapped. `data: [...]` (image lists) stays in place so the
/// extractor can see it.
pub fn unwrap_result(response: &Value) -> &Value {
    RESULT_WRAPPERS
        .iter()
        .filter_map(|key| response.get(*key))
        .find(|inner| inner.is_object())
        .unwrap_or(response)
}

/// Raw status string from the unwrapped object, falling back to the top level.
pub fn locate_status(response: &Value) -> Option<String> {
    let unwrapped = unwrap_result(response);
    status_in(unwrapped).or_else(|| status_in(response))
}

fn status_in(obj: &Value) -> Option<String> {
    STATUS_FIELDS
        .iter()
        .filter_map(|field| obj.get(*field))
        .find_map(|v| match v {
            // { "status": { "state": "running", ... } }
            Value::Object(_) => ["status", "state"]
                .iter()
                .filter_map(|k| v.get(*k))
                .find_map(scalar_text),
            other => scalar_text(other),
        })
}

/// Non-empty string content of a JSON value.
pub fn non_empty_str(v: &Value) -> Option<&str> {
    v.as_str().map(str::trim).filter(|s| !s.is_empty())
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(_) => non_empty_str(v).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
