//! ScriptedBackend - 開発用・テスト用の GenerationBackend
//!
//! query の応答を事前に台本（script）として渡しておき、呼ばれるたびに順に返す。
//! 台本を使い切ったら最後の応答を返し続ける。カーソルは task ごとに独立。
//!
//! # 学習ポイント
//! - std::sync::Mutex は await を跨がない短いクリティカルセクションだけに使う
//! - 呼び出し回数は AtomicUsize で数える（テストで「4 回目の poll が無い」を確認するため）

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::domain::{BackendError, TaskId};
use crate::ports::GenerationBackend;

type Step = Result<Value, BackendError>;

pub struct ScriptedBackend {
    submit_response: Option<Step>,
    script: Vec<Step>,
    query_delay: Duration,
    cursors: Mutex<HashMap<TaskId, usize>>,
    submit_calls: AtomicUsize,
    query_calls: AtomicUsize,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    /// Submits answer `{"taskId": "task-<n>"}`, queries answer `{"status": "running"}`.
    pub fn new() -> Self {
        Self {
            submit_response: None,
            script: Vec::new(),
            query_delay: Duration::ZERO,
            cursors: Mutex::new(HashMap::new()),
            submit_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
        }
    }

    /// `running` responses followed by `last`.
    pub fn running_then(polls: usize, last: Value) -> Self {
        let mut script: Vec<Step> = (0..polls).map(|_| Ok(json!({"status": "running"}))).collect();
        script.push(Ok(last));
        Self::new().with_script(script)
    }

    pub fn with_submit_response(mut self, response: Value) -> Self {
        self.submit_response = Some(Ok(response));
        self
    }

    pub fn with_submit_error(mut self, err: BackendError) -> Self {
        self.submit_response = Some(Err(err));
        self
    }

    pub fn with_script(mut self, script: Vec<Step>) -> Self {
        self.script = script;
        self
    }

    /// Simulated round-trip latency of each query.
    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    fn next_step(&self, task_id: &TaskId) -> Step {
        let mut cursors = self.cursors.lock().unwrap_or_else(PoisonError::into_inner);
        let cursor = cursors.entry(task_id.clone()).or_insert(0);
        let step = match self.script.get(*cursor).or_else(|| self.script.last()) {
            Some(step) => step.clone(),
            None => Ok(json!({"status": "running"})),
        };
        *cursor += 1;
        step
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn submit(&self, _payload: &Value) -> Result<Value, BackendError> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.submit_response {
            Some(step) => step.clone(),
            None => Ok(json!({"taskId": format!("task-{n}")})),
        }
    }

    async fn query(&self, task_id: &TaskId) -> Result<Value, BackendError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if !self.query_delay.is_zero() {
            tokio::time::sleep(self.query_delay).await;
        }
        self.next_step(task_id)
    }
}
