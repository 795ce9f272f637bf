//! TaskController - 呼び出し側に見せる唯一の入口
//!
//! submit → PollSession の起動 → snapshot の配送 → cancel / dispose までを束ねる。
//! 状態は `SessionArena`（taskId ごとの session）と submit 中カウンタだけ。
//!
//! # 不変条件
//! - 1 taskId につき live な session は最大 1 本（再 start は古い方を黙って引退させる）
//! - cancel が返った後、その task の snapshot は届かない
//! - 1 task につき terminal snapshot はちょうど 1 回

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::scheduler::{PollJob, PollingScheduler};
use super::session::{DeliveryGate, SessionArena, Subscriber};
use super::submitter::TaskSubmitter;
use super::tracker::TaskTracker;
use crate::config::EngineConfig;
use crate::domain::{ControllerState, StatusSnapshot, SubmitError, TaskHandle, TaskId, TaskKind};
use crate::observability::SessionCounts;
use crate::ports::IdGenerator;

/// Cheap to clone; every clone drives the same set of sessions.
#[derive(Clone)]
pub struct TaskController {
    inner: Arc<Inner>,
}

struct Inner {
    submitter: TaskSubmitter,
    config: EngineConfig,
    ids: Arc<dyn IdGenerator>,
    arena: Arc<SessionArena>,
    scheduler: PollingScheduler,
    submitting: AtomicUsize,
}

impl TaskController {
    /// Use `EngineBuilder` unless you are wiring the parts by hand.
    pub fn new(submitter: TaskSubmitter, config: EngineConfig, ids: Arc<dyn IdGenerator>) -> Self {
        let arena = Arc::new(SessionArena::new());
        Self {
            inner: Arc::new(Inner {
                submitter,
                config,
                ids,
                scheduler: PollingScheduler::new(Arc::clone(&arena)),
                arena,
                submitting: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Submit a task and start polling it.
    ///
    /// Nothing is polled when submission fails. Must be awaited inside a tokio runtime.
    pub async fn start(&self, kind: TaskKind, payload: &Value) -> Result<TaskId, SubmitError> {
        let handle = {
            let _submitting = InFlight::enter(&self.inner.submitting);
            self.inner.submitter.submit(kind, payload).await?
        };
        self.begin_polling(&handle)?;
        Ok(handle.task_id().clone())
    }

    fn begin_polling(&self, handle: &TaskHandle) -> Result<(), SubmitError> {
        let kind = handle.kind();
        let backend = self
            .inner
            .submitter
            .registry()
            .get(kind)
            .ok_or(SubmitError::NoBackend(kind))?;
        let policy = self.inner.config.policy(kind);
        let session_id = self.inner.ids.generate_session_id();
        let task_id = handle.task_id().clone();

        self.inner.arena.install(&task_id, |handover| {
            let tracker = TaskTracker::new(task_id.clone(), kind, policy, &self.inner.config.progress)
                .resume_after(handover.last());
            let gate = Arc::new(DeliveryGate::from_handover(task_id.clone(), handover));
            self.inner.scheduler.start(PollJob {
                session_id,
                task_id: task_id.clone(),
                kind,
                backend,
                policy,
                tracker,
                gate,
            })
        });

        info!(
            %task_id,
            %kind,
            session = %session_id,
            interval_ms = policy.interval_ms,
            max_attempts = policy.max_attempts,
            "polling started"
        );
        Ok(())
    }

    /// Attach the subscriber for `task_id`, replacing any previous one.
    ///
    /// Snapshots produced before this call are delivered first, in order.
    /// Returns `false` if the controller does not know the task.
    pub fn on_update<F>(&self, task_id: &TaskId, callback: F) -> bool
    where
        F: Fn(StatusSnapshot) + Send + Sync + 'static,
    {
        let Some((session_id, gate)) = self.inner.arena.gate(task_id) else {
            warn!(%task_id, "on_update for unknown task");
            return false;
        };
        let subscriber: Subscriber = Arc::new(callback);
        gate.subscribe(subscriber);
        // 終わった session の backlog を流し切ったら arena から外す
        if gate.is_closed() {
            self.inner.arena.remove_if_ended(task_id, session_id);
        }
        true
    }

    /// Stop polling `task_id` and deliver a `Cancelled` snapshot.
    ///
    /// Idempotent. Returns `true` only for the call that actually cancelled.
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        let Some(session) = self.inner.arena.take_live(task_id) else {
            debug!(%task_id, "cancel: no live session");
            return false;
        };
        let cancelled = session.cancel();
        if cancelled {
            info!(%task_id, kind = %session.kind(), session = %session.id(), "task cancelled");
        }
        cancelled
    }

    /// Cancel every live session and forget every parked one.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn counts(&self) -> SessionCounts {
        SessionCounts {
            submitting: self.inner.submitting.load(Ordering::Acquire),
            ..self.inner.arena.counts()
        }
    }

    pub fn is_live(&self, task_id: &TaskId) -> bool {
        self.inner.arena.is_live(task_id)
    }

    /// Lifecycle of a known task. Forgotten and unknown tasks are `Idle`.
    pub fn state(&self, task_id: &TaskId) -> ControllerState {
        match self.inner.arena.gate(task_id) {
            None => ControllerState::Idle,
            Some((_, gate)) if !gate.is_closed() => ControllerState::Polling,
            Some((_, gate)) => gate
                .last()
                .map(|s| ControllerState::Finished(s.status))
                .unwrap_or(ControllerState::Idle),
        }
    }
}

impl Inner {
    fn dispose(&self) {
        let sessions = self.arena.drain();
        let mut cancelled = 0;
        for session in &sessions {
            if session.cancel() {
                cancelled += 1;
            }
        }
        if !sessions.is_empty() {
            info!(cancelled, dropped = sessions.len() - cancelled, "controller disposed");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Counts a `start` call as submitting until dropped (also on early return or cancellation).
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
