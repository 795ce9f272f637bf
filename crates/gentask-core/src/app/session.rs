//! PollSession / DeliveryGate / SessionArena
//!
//! - `DeliveryGate`: 1 task 分の配送口。`closed` フラグと未配送の snapshot キューを同じ Mutex で守る。
//!   closed の判定とキューへの積み込みはロックの中、callback の呼び出しはロックの外で行う。
//!   callback を呼ぶのは `dispatch` ロックを取った 1 スレッドだけなので順序は崩れず、
//!   cancel は配送中の callback が終わるのを待ってから Cancelled を流して返る
//!   （in-flight だった query の応答は、積む時点で closed を見て捨てられる）。
//! - `PollSession`: 動いている poll ループ 1 本（tokio task の AbortHandle + gate）。
//! - `SessionArena`: `TaskId -> PollSession` の map。1 taskId につき live な session は最大 1 本。
//!
//! ロック順序は arena -> gate。callback はどちらのロックも持たずに呼ばれるので、
//! callback から controller を呼び返してよい。

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tokio::task::AbortHandle;
use tracing::debug;

use crate::domain::{SessionId, StatusSnapshot, TaskId, TaskKind, TaskStatus};
use crate::observability::SessionCounts;

/// Callback receiving every snapshot of one task.
pub type Subscriber = Arc<dyn Fn(StatusSnapshot) + Send + Sync>;

#[derive(Default)]
struct GateState {
    closed: bool,
    subscriber: Option<Subscriber>,
    /// Accepted snapshots not yet handed to a subscriber.
    pending: VecDeque<StatusSnapshot>,
    last: Option<StatusSnapshot>,
    /// Thread currently running a callback of this gate.
    dispatching: Option<ThreadId>,
}

/// What a retired gate passes on to the session replacing it.
#[derive(Default)]
pub struct Handover {
    subscriber: Option<Subscriber>,
    pending: VecDeque<StatusSnapshot>,
    last: Option<StatusSnapshot>,
}

impl Handover {
    pub fn last(&self) -> Option<&StatusSnapshot> {
        self.last.as_ref()
    }
}

pub struct DeliveryGate {
    task_id: TaskId,
    state: Mutex<GateState>,
    /// Held while callbacks run; serializes delivery without blocking `state`.
    dispatch: Mutex<()>,
}

impl DeliveryGate {
    pub fn new(task_id: TaskId) -> Self {
        Self::from_handover(task_id, Handover::default())
    }

    pub fn from_handover(task_id: TaskId, handover: Handover) -> Self {
        Self {
            task_id,
            state: Mutex::new(GateState {
                subscriber: handover.subscriber,
                pending: handover.pending,
                last: handover.last,
                ..GateState::default()
            }),
            dispatch: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Deliver a snapshot unless the gate is closed. A terminal snapshot closes it.
    ///
    /// Returns `false` when the snapshot was discarded.
    pub fn deliver(&self, snapshot: StatusSnapshot) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                debug!(task_id = %self.task_id, attempt = snapshot.attempt, "gate closed, snapshot discarded");
                return false;
            }
            if snapshot.is_terminal() {
                state.closed = true;
            }
            Self::enqueue(&mut state, snapshot);
        }
        self.flush();
        true
    }

    /// Close the gate and emit a `Cancelled` snapshot derived from the last one.
    ///
    /// Returns `false` if the gate was already closed (idempotent).
    pub fn cancel(&self) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
            let snapshot = cancelled_after(&self.task_id, state.last.as_ref());
            Self::enqueue(&mut state, snapshot);
        }
        self.flush();
        true
    }

    /// Close without emitting anything and hand over subscriber, pending snapshots and last snapshot.
    ///
    /// A gate that already closed hands over nothing: its lifecycle is over.
    pub fn retire(&self) -> Handover {
        let mut state = self.lock();
        if state.closed {
            return Handover::default();
        }
        state.closed = true;
        Handover {
            subscriber: state.subscriber.take(),
            pending: std::mem::take(&mut state.pending),
            last: state.last.take(),
        }
    }

    /// Attach (or replace) the subscriber and flush pending snapshots to it.
    pub fn subscribe(&self, subscriber: Subscriber) {
        self.lock().subscriber = Some(subscriber);
        self.flush();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn has_subscriber(&self) -> bool {
        self.lock().subscriber.is_some()
    }

    pub fn last(&self) -> Option<StatusSnapshot> {
        self.lock().last.clone()
    }

    fn enqueue(state: &mut GateState, snapshot: StatusSnapshot) {
        state.last = Some(snapshot.clone());
        state.pending.push_back(snapshot);
    }

    /// Hand pending snapshots to the subscriber, one at a time, outside the state lock.
    fn flush(&self) {
        let me = thread::current().id();
        if self.lock().dispatching == Some(me) {
            // callback の中から呼ばれた: 外側の flush が続きを流す
            return;
        }
        let _turn = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner);
        let _reset = DispatchingReset(self);
        loop {
            let (subscriber, snapshot) = {
                let mut state = self.lock();
                let Some(subscriber) = state.subscriber.clone() else {
                    return;
                };
                let Some(snapshot) = state.pending.pop_front() else {
                    return;
                };
                state.dispatching = Some(me);
                (subscriber, snapshot)
            };
            subscriber(snapshot);
        }
    }
}

/// Clears `dispatching` when a flush ends, also when a callback panics.
struct DispatchingReset<'a>(&'a DeliveryGate);

impl Drop for DispatchingReset<'_> {
    fn drop(&mut self) {
        self.0.lock().dispatching = None;
    }
}

/// `Cancelled` snapshot that freezes whatever the last snapshot showed.
fn cancelled_after(task_id: &TaskId, last: Option<&StatusSnapshot>) -> StatusSnapshot {
    match last {
        Some(last) => StatusSnapshot::new(
            task_id.clone(),
            TaskStatus::Cancelled,
            last.raw_status.clone(),
            last.progress_percent,
            last.attempt,
        ),
        None => StatusSnapshot::new(task_id.clone(), TaskStatus::Cancelled, "cancelled", 0, 0),
    }
}

/// One live poll loop.
pub struct PollSession {
    id: SessionId,
    kind: TaskKind,
    gate: Arc<DeliveryGate>,
    abort: AbortHandle,
}

impl PollSession {
    pub fn new(id: SessionId, kind: TaskKind, gate: Arc<DeliveryGate>, abort: AbortHandle) -> Self {
        Self {
            id,
            kind,
            gate,
            abort,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn gate(&self) -> &Arc<DeliveryGate> {
        &self.gate
    }

    pub fn is_live(&self) -> bool {
        !self.gate.is_closed()
    }

    /// Stop the timer and close the gate with a `Cancelled` snapshot.
    ///
    /// Idempotent: returns `false` when the session had already ended.
    pub fn cancel(&self) -> bool {
        self.abort.abort();
        self.gate.cancel()
    }

    /// Stop the timer and close the gate silently, for replacement.
    pub fn retire(&self) -> Handover {
        self.abort.abort();
        self.gate.retire()
    }
}

/// `TaskId -> PollSession`, at most one session per task.
#[derive(Default)]
pub struct SessionArena {
    sessions: Mutex<HashMap<TaskId, PollSession>>,
}

impl SessionArena {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, PollSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a session for `task_id`, retiring any previous one first.
    ///
    /// `make` runs under the arena lock, so the new session's loop cannot
    /// observe the arena before it is installed.
    pub fn install(&self, task_id: &TaskId, make: impl FnOnce(Handover) -> PollSession) {
        let mut sessions = self.lock();
        let handover = match sessions.remove(task_id) {
            Some(previous) => {
                debug!(%task_id, session = %previous.id(), "retiring previous session");
                previous.retire()
            }
            None => Handover::default(),
        };
        let session = make(handover);
        sessions.insert(task_id.clone(), session);
    }

    pub fn gate(&self, task_id: &TaskId) -> Option<(SessionId, Arc<DeliveryGate>)> {
        self.lock()
            .get(task_id)
            .map(|s| (s.id(), Arc::clone(s.gate())))
    }

    /// Remove and return the live session for `task_id`.
    ///
    /// Ended sessions stay where they are (they may be parked with undelivered snapshots).
    pub fn take_live(&self, task_id: &TaskId) -> Option<PollSession> {
        let mut sessions = self.lock();
        if sessions.get(task_id).is_some_and(PollSession::is_live) {
            sessions.remove(task_id)
        } else {
            None
        }
    }

    /// Called by a session's own loop when it ends.
    ///
    /// Keeps the entry parked if its snapshots still wait for a subscriber.
    pub fn finish(&self, task_id: &TaskId, session_id: SessionId) {
        let mut sessions = self.lock();
        let Some(session) = sessions.get(task_id) else {
            return;
        };
        if session.id() != session_id {
            return;
        }
        if session.gate().has_subscriber() {
            sessions.remove(task_id);
        }
    }

    /// Drop the entry if it is the given session and has ended.
    pub fn remove_if_ended(&self, task_id: &TaskId, session_id: SessionId) {
        let mut sessions = self.lock();
        if sessions
            .get(task_id)
            .is_some_and(|s| s.id() == session_id && !s.is_live())
        {
            sessions.remove(task_id);
        }
    }

    pub fn is_live(&self, task_id: &TaskId) -> bool {
        self.lock().get(task_id).is_some_and(PollSession::is_live)
    }

    /// Remove every entry, returning them so the caller can cancel outside the lock.
    pub fn drain(&self) -> Vec<PollSession> {
        self.lock().drain().map(|(_, session)| session).collect()
    }

    pub fn counts(&self) -> SessionCounts {
        let sessions = self.lock();
        let mut counts = SessionCounts::default();
        for session in sessions.values() {
            if session.is_live() {
                counts.polling += 1;
            } else {
                counts.parked += 1;
            }
        }
        counts
    }
}
