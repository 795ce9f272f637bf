//! PollingScheduler - 1 task につき 1 本の poll ループを spawn する
//!
//! - `interval` の最初の即時 tick は捨てる（最初の query は `interval` 後）
//! - query は loop の中で await する。応答待ちの間に期限が来た tick は捨て、
//!   次の query は「応答が返った後の最初の格子点」(origin + k * interval) まで待つ。
//!   同じ task の query が並列に走ることも、溜まった tick で連射することもない
//! - snapshot の配送は必ず `DeliveryGate` を通す。cancel 済みなら捨てられる

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info};

use super::session::{DeliveryGate, PollSession, SessionArena};
use super::tracker::TaskTracker;
use crate::config::PollPolicy;
use crate::domain::{SessionId, TaskId, TaskKind};
use crate::ports::GenerationBackend;

/// Shortest tick the scheduler will run (`interval` rejects zero).
const MIN_INTERVAL: Duration = Duration::from_millis(1);

pub struct PollingScheduler {
    arena: Arc<SessionArena>,
}

/// Everything one poll loop needs.
pub struct PollJob {
    pub session_id: SessionId,
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub backend: Arc<dyn GenerationBackend>,
    pub policy: PollPolicy,
    pub tracker: TaskTracker,
    pub gate: Arc<DeliveryGate>,
}

impl PollingScheduler {
    pub fn new(arena: Arc<SessionArena>) -> Self {
        Self { arena }
    }

    /// Spawn the loop and return its session handle.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(&self, job: PollJob) -> PollSession {
        let session_id = job.session_id;
        let kind = job.kind;
        let gate = Arc::clone(&job.gate);
        let arena = Arc::clone(&self.arena);

        let join = tokio::spawn(async move {
            let task_id = job.task_id.clone();
            poll_loop(job).await;
            arena.finish(&task_id, session_id);
        });

        PollSession::new(session_id, kind, gate, join.abort_handle())
    }
}

async fn poll_loop(job: PollJob) {
    let PollJob {
        session_id,
        task_id,
        kind,
        backend,
        policy,
        mut tracker,
        gate,
    } = job;

    let period = policy.interval().max(MIN_INTERVAL);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // 即時 tick
    let origin = ticker.tick().await;

    loop {
        ticker.tick().await;
        if gate.is_closed() {
            break;
        }

        debug!(%task_id, %kind, session = %session_id, attempt = tracker.attempt() + 1, "querying");
        let response = backend.query(&task_id).await;
        // Skip だけだと応答待ち中に過ぎた tick が 1 回分すぐ返ってくる
        ticker.reset_at(next_on_grid(origin, period, Instant::now()));

        let snapshot = match response {
            Ok(raw) => tracker.on_response(&raw),
            Err(err) => match tracker.on_error(err) {
                Some(snapshot) => snapshot,
                None => continue,
            },
        };

        let status = snapshot.status;
        let attempt = snapshot.attempt;
        if !gate.deliver(snapshot) {
            // cancel / retire 済み
            break;
        }
        debug!(%task_id, %status, attempt, progress = tracker.progress(), "snapshot delivered");

        if status.is_terminal() {
            info!(%task_id, %kind, %status, attempt, "task resolved");
            break;
        }

        if tracker.budget_exhausted() {
            let timed_out = tracker.timed_out();
            if gate.deliver(timed_out) {
                info!(%task_id, %kind, attempts = tracker.attempts_used(), "task timed out");
            }
            break;
        }
    }
}

/// First tick instant `origin + k * period` strictly after `now`.
fn next_on_grid(origin: Instant, period: Duration, now: Instant) -> Instant {
    let elapsed = now.saturating_duration_since(origin).as_nanos();
    let into = elapsed % period.as_nanos();
    let into = Duration::from_nanos(u64::try_from(into).unwrap_or(u64::MAX));
    now + period.saturating_sub(into)
}
