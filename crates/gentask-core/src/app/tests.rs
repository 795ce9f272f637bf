//! TaskController のシナリオテスト
//!
//! 時間は `start_paused` で止めてあるので、interval は sleep で決定的に進む。
//! snapshot は subscriber から mpsc に流して await で受け取る。

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tracing_test::traced_test;

use super::{EngineBuilder, TaskController};
use crate::config::{EngineConfig, PollPolicy, ProgressConfig};
use crate::domain::{
    ArtifactType, BackendError, ControllerState, StatusSnapshot, SubmitError, TaskId, TaskKind, TaskStatus,
};
use crate::impls::ScriptedBackend;
use crate::observability::SessionCounts;
use crate::ports::GenerationBackend;

const INTERVAL: Duration = Duration::from_millis(100);

fn video_payload() -> Value {
    json!({"image": "img://1", "prompt": "a cat"})
}

fn controller_with(backend: Arc<dyn GenerationBackend>, max_attempts: u32) -> TaskController {
    let config = EngineConfig::default()
        .with_policy(TaskKind::Video, PollPolicy::new(INTERVAL, max_attempts))
        .with_progress(ProgressConfig {
            seed: Some(7),
            ..ProgressConfig::default()
        });
    EngineBuilder::new()
        .register(TaskKind::Video, backend)
        .unwrap()
        .config(config)
        .build()
        .unwrap()
}

fn subscribe(controller: &TaskController, task_id: &TaskId) -> mpsc::UnboundedReceiver<StatusSnapshot> {
    let (tx, rx) = mpsc::unbounded_channel();
    assert!(controller.on_update(task_id, move |snapshot| {
        let _ = tx.send(snapshot);
    }));
    rx
}

async fn until_terminal(rx: &mut mpsc::UnboundedReceiver<StatusSnapshot>) -> Vec<StatusSnapshot> {
    let mut seen = Vec::new();
    while let Some(snapshot) = rx.recv().await {
        let terminal = snapshot.is_terminal();
        seen.push(snapshot);
        if terminal {
            break;
        }
    }
    seen
}

fn attempts(snapshots: &[StatusSnapshot]) -> Vec<u32> {
    snapshots.iter().map(|s| s.attempt).collect()
}

#[tokio::test(start_paused = true)]
async fn video_runs_to_success() {
    let backend = Arc::new(
        ScriptedBackend::running_then(
            3,
            json!({"status": "succeeded", "content": {"video_url": "https://cdn/v.mp4"}}),
        )
        .with_submit_response(json!({"code": 0, "data": {"taskId": "T1"}})),
    );
    let controller = controller_with(backend.clone(), 120);

    let task_id = controller.start(TaskKind::Video, &video_payload()).await.unwrap();
    assert_eq!(task_id.as_str(), "T1");
    let mut rx = subscribe(&controller, &task_id);

    let seen = until_terminal(&mut rx).await;
    assert_eq!(attempts(&seen), vec![1, 2, 3, 4]);
    assert!(seen[..3].iter().all(|s| s.status == TaskStatus::Running));

    let done = &seen[3];
    assert_eq!(done.status, TaskStatus::Succeeded);
    assert_eq!(done.progress_percent, 100);
    let artifacts = done.artifacts.as_ref().unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].artifact_type, ArtifactType::Video);
    assert_eq!(artifacts[0].url, "https://cdn/v.mp4");

    sleep(INTERVAL * 10).await;
    assert_eq!(backend.query_calls(), 4);
    assert!(!controller.is_live(&task_id));
    assert_eq!(controller.counts(), SessionCounts::default());
}

#[tokio::test(start_paused = true)]
async fn empty_success_becomes_failure() {
    let backend = Arc::new(ScriptedBackend::running_then(1, json!({"status": "succeeded"})));
    let controller = controller_with(backend, 120);

    let task_id = controller.start(TaskKind::Video, &video_payload()).await.unwrap();
    let mut rx = subscribe(&controller, &task_id);

    let seen = until_terminal(&mut rx).await;
    let last = seen.last().unwrap();
    assert_eq!(last.status, TaskStatus::Failed);
    assert_eq!(last.raw_status, "succeeded");
    assert_eq!(last.error_message.as_deref(), Some("succeeded with no output"));
    assert!(last.artifacts.is_none());
    assert!(last.progress_percent <= 90);
}

#[tokio::test(start_paused = true)]
async fn attempts_run_out() {
    let backend = Arc::new(ScriptedBackend::new());
    let controller = controller_with(backend.clone(), 3);

    let task_id = controller.start(TaskKind::Video, &video_payload()).await.unwrap();
    let mut rx = subscribe(&controller, &task_id);

    let seen = until_terminal(&mut rx).await;
    assert_eq!(attempts(&seen), vec![1, 2, 3, 3]);

    let timed_out = &seen[3];
    assert_eq!(timed_out.status, TaskStatus::TimedOut);
    assert_eq!(timed_out.error_message.as_deref(), Some("timed out after 3 attempts"));
    assert_eq!(timed_out.progress_percent, seen[2].progress_percent);

    sleep(INTERVAL * 10).await;
    assert_eq!(backend.query_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn progress_is_monotonic_and_capped() {
    let backend = Arc::new(ScriptedBackend::running_then(
        40,
        json!({"status": "done", "videoUrl": "https://cdn/v.mp4"}),
    ));
    let controller = controller_with(backend, 120);

    let task_id = controller.start(TaskKind::Video, &video_payload()).await.unwrap();
    let mut rx = subscribe(&controller, &task_id);
    let seen = until_terminal(&mut rx).await;

    let (running, last) = seen.split_at(seen.len() - 1);
    assert!(running.windows(2).all(|w| w[0].progress_percent <= w[1].progress_percent));
    assert!(running.iter().all(|s| s.progress_percent <= 90));
    assert_eq!(last[0].progress_percent, 100);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn cancel_discards_in_flight_response() {
    let backend = Arc::new(ScriptedBackend::new().with_query_delay(Duration::from_millis(300)));
    let controller = controller_with(backend.clone(), 120);

    let task_id = controller.start(TaskKind::Video, &video_payload()).await.unwrap();
    let mut rx = subscribe(&controller, &task_id);

    // 1 件目は t=400ms に届き、2 件目の query (t=500ms に送信) は t=650ms の時点で応答待ち
    sleep(Duration::from_millis(650)).await;
    assert!(controller.is_live(&task_id));
    assert!(controller.cancel(&task_id));

    let seen = until_terminal(&mut rx).await;
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].status, TaskStatus::Running);
    assert_eq!(seen[0].attempt, 1);

    let cancelled = &seen[1];
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    assert_eq!(cancelled.attempt, 1);
    assert_eq!(cancelled.progress_percent, seen[0].progress_percent);
    assert_eq!(cancelled.raw_status, "running");

    sleep(Duration::from_secs(2)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(backend.query_calls(), 2);
    assert!(!controller.is_live(&task_id));
    assert!(logs_contain("task cancelled"));
}

#[tokio::test(start_paused = true)]
async fn cancel_is_idempotent() {
    let backend = Arc::new(ScriptedBackend::new());
    let controller = controller_with(backend, 120);

    let task_id = controller.start(TaskKind::Video, &video_payload()).await.unwrap();
    let mut rx = subscribe(&controller, &task_id);
    sleep(INTERVAL * 2 + INTERVAL / 2).await;

    assert!(controller.cancel(&task_id));
    assert!(!controller.cancel(&task_id));
    assert!(!controller.cancel(&TaskId::from("never-started")));

    sleep(INTERVAL * 5).await;
    let mut seen = Vec::new();
    while let Ok(snapshot) = rx.try_recv() {
        seen.push(snapshot);
    }
    let terminals: Vec<_> = seen.iter().filter(|s| s.is_terminal()).collect();
    assert_eq!(terminals.len(), 1);
    assert_eq!(terminals[0].status, TaskStatus::Cancelled);
    assert_eq!(seen.last().unwrap().status, TaskStatus::Cancelled);
    assert_eq!(attempts(&seen), vec![1, 2, 2]);
}

#[tokio::test(start_paused = true)]
async fn cancel_before_first_response() {
    let backend = Arc::new(ScriptedBackend::new());
    let controller = controller_with(backend.clone(), 120);

    let task_id = controller.start(TaskKind::Video, &video_payload()).await.unwrap();
    let mut rx = subscribe(&controller, &task_id);
    assert!(controller.cancel(&task_id));

    let seen = until_terminal(&mut rx).await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].status, TaskStatus::Cancelled);
    assert_eq!(seen[0].attempt, 0);
    assert_eq!(seen[0].progress_percent, 0);

    sleep(INTERVAL * 5).await;
    assert_eq!(backend.query_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn network_errors_retry_then_fail() {
    let backend = Arc::new(ScriptedBackend::new().with_script(vec![
        Ok(json!({"status": "running"})),
        Err(BackendError::Network("connection reset".into())),
    ]));
    let controller = controller_with(backend.clone(), 120);

    let task_id = controller.start(TaskKind::Video, &video_payload()).await.unwrap();
    let mut rx = subscribe(&controller, &task_id);

    let seen = until_terminal(&mut rx).await;
    assert_eq!(seen.len(), 2);
    let failed = &seen[1];
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.attempt, 1);
    assert_eq!(failed.error_message.as_deref(), Some("connection reset"));
    // 1 回の成功 + 3 回のリトライ + 上限超えの 1 回
    assert_eq!(backend.query_calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn unknown_status_keeps_polling() {
    let backend = Arc::new(ScriptedBackend::new().with_script(vec![
        Ok(json!({"status": "rendering_frames"})),
        Ok(json!({"data": {"status": "SUCCESS", "video_url": "https://cdn/v.mp4"}})),
    ]));
    let controller = controller_with(backend, 120);

    let task_id = controller.start(TaskKind::Video, &video_payload()).await.unwrap();
    let mut rx = subscribe(&controller, &task_id);

    let seen = until_terminal(&mut rx).await;
    assert_eq!(seen[0].status, TaskStatus::Running);
    assert_eq!(seen[0].raw_status, "rendering_frames");
    assert_eq!(seen[1].status, TaskStatus::Succeeded);
    assert_eq!(seen[1].raw_status, "SUCCESS");
}

#[tokio::test(start_paused = true)]
async fn snapshots_wait_for_a_subscriber() {
    let backend = Arc::new(ScriptedBackend::running_then(
        1,
        json!({"status": "completed", "videoUrl": "https://cdn/v.mp4"}),
    ));
    let controller = controller_with(backend, 120);

    let task_id = controller.start(TaskKind::Video, &video_payload()).await.unwrap();
    sleep(INTERVAL * 5).await;

    assert!(!controller.is_live(&task_id));
    assert_eq!(controller.counts().parked, 1);
    assert_eq!(controller.state(&task_id), ControllerState::Finished(TaskStatus::Succeeded));

    let mut rx = subscribe(&controller, &task_id);
    let seen = until_terminal(&mut rx).await;
    assert_eq!(attempts(&seen), vec![1, 2]);
    assert_eq!(seen[1].status, TaskStatus::Succeeded);

    assert_eq!(controller.counts(), SessionCounts::default());
    assert_eq!(controller.state(&task_id), ControllerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn callback_can_query_the_controller() {
    let backend = Arc::new(ScriptedBackend::running_then(
        2,
        json!({"status": "succeeded", "videoUrl": "https://cdn/v.mp4"}),
    ));
    let controller = controller_with(backend, 120);
    let task_id = controller.start(TaskKind::Video, &video_payload()).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (observer, watched) = (controller.clone(), task_id.clone());
    assert!(controller.on_update(&task_id, move |snapshot| {
        let counts = observer.counts();
        let live = observer.is_live(&watched);
        let _ = tx.send((snapshot, counts.polling, live));
    }));

    let mut seen = Vec::new();
    while let Some((snapshot, polling, live)) = rx.recv().await {
        let terminal = snapshot.is_terminal();
        seen.push((snapshot.status, polling, live));
        if terminal {
            break;
        }
    }
    assert_eq!(
        seen,
        vec![
            (TaskStatus::Running, 1, true),
            (TaskStatus::Running, 1, true),
            // terminal snapshot は gate を閉じてから配送される
            (TaskStatus::Succeeded, 0, false),
        ]
    );

    controller.dispose();
}

#[tokio::test(start_paused = true)]
async fn restart_replaces_the_session() {
    let backend = Arc::new(ScriptedBackend::new().with_submit_response(json!({"taskId": "T1"})));
    let controller = controller_with(backend.clone(), 120);

    let task_id = controller.start(TaskKind::Video, &video_payload()).await.unwrap();
    let mut rx = subscribe(&controller, &task_id);
    sleep(INTERVAL * 2 + INTERVAL / 2).await;

    let again = controller.start(TaskKind::Video, &video_payload()).await.unwrap();
    assert_eq!(again, task_id);
    assert_eq!(controller.counts().polling, 1);

    sleep(INTERVAL * 2 + INTERVAL / 2).await;
    assert!(controller.cancel(&task_id));

    let seen = until_terminal(&mut rx).await;
    // 古い session からの Cancelled は無い。attempt は巻き戻らない
    assert_eq!(attempts(&seen), vec![1, 2, 3, 4, 4]);
    assert_eq!(seen.iter().filter(|s| s.is_terminal()).count(), 1);
    assert_eq!(seen[2].status, TaskStatus::Running);
    assert!(seen[2].progress_percent <= 8);
}

#[tokio::test(start_paused = true)]
async fn dispose_cancels_everything() {
    let backend = Arc::new(ScriptedBackend::new());
    let controller = controller_with(backend.clone(), 120);

    let a = controller.start(TaskKind::Video, &video_payload()).await.unwrap();
    let b = controller.start(TaskKind::Video, &video_payload()).await.unwrap();
    assert_ne!(a, b);
    let mut rx_a = subscribe(&controller, &a);
    let mut rx_b = subscribe(&controller, &b);
    sleep(INTERVAL + INTERVAL / 2).await;
    assert_eq!(controller.counts().polling, 2);

    controller.dispose();
    assert_eq!(controller.counts(), SessionCounts::default());

    for rx in [&mut rx_a, &mut rx_b] {
        let seen = until_terminal(rx).await;
        assert_eq!(seen.last().unwrap().status, TaskStatus::Cancelled);
    }

    let calls = backend.query_calls();
    sleep(INTERVAL * 10).await;
    assert_eq!(backend.query_calls(), calls);
    assert!(!controller.cancel(&a));
}

#[tokio::test(start_paused = true)]
async fn failed_submission_starts_nothing() {
    let backend = Arc::new(ScriptedBackend::new());
    let controller = controller_with(backend.clone(), 120);

    let err = controller
        .start(TaskKind::Video, &json!({"prompt": "no image"}))
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Validation { .. }));

    let err = controller.start(TaskKind::Image, &json!({"prompt": "x"})).await.unwrap_err();
    assert_eq!(err, SubmitError::NoBackend(TaskKind::Image));

    sleep(INTERVAL * 5).await;
    assert_eq!(backend.submit_calls(), 0);
    assert_eq!(backend.query_calls(), 0);
    assert_eq!(controller.counts(), SessionCounts::default());
    assert!(!controller.on_update(&TaskId::from("task-1"), |_| {}));
}

#[tokio::test(start_paused = true)]
async fn quota_error_surfaces_from_start() {
    let backend = Arc::new(
        ScriptedBackend::new().with_submit_error(BackendError::InsufficientCredits("balance 0".into())),
    );
    let controller = controller_with(backend.clone(), 120);

    let err = controller.start(TaskKind::Video, &video_payload()).await.unwrap_err();
    assert_eq!(err, SubmitError::Quota("balance 0".into()));
    assert_eq!(backend.submit_calls(), 1);
    assert_eq!(controller.counts(), SessionCounts::default());
}

/// Query that takes longer than the poll interval; records overlap and send instants.
#[derive(Default)]
struct SlowBackend {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    sent_at: Mutex<Vec<Instant>>,
}

#[async_trait]
impl GenerationBackend for SlowBackend {
    async fn submit(&self, _payload: &Value) -> Result<Value, BackendError> {
        Ok(json!({"taskId": "slow"}))
    }

    async fn query(&self, _task_id: &TaskId) -> Result<Value, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent_at.lock().unwrap().push(Instant::now());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        sleep(Duration::from_millis(250)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({"status": "running"}))
    }
}

#[tokio::test(start_paused = true)]
async fn slow_queries_skip_ticks() {
    let backend = Arc::new(SlowBackend::default());
    let controller = controller_with(backend.clone(), 120);

    let origin = Instant::now();
    let task_id = controller.start(TaskKind::Video, &video_payload()).await.unwrap();
    sleep(Duration::from_millis(1050)).await;
    controller.cancel(&task_id);

    // 250ms の応答待ちの間に来た tick は捨てられ、次の query は格子点に揃う
    let sent_ms: Vec<u128> = backend
        .sent_at
        .lock()
        .unwrap()
        .iter()
        .map(|at| at.duration_since(origin).as_millis())
        .collect();
    assert_eq!(sent_ms, vec![100, 400, 700, 1000]);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 4);
    assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);
}
