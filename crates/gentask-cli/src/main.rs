//! gentask-cli - scripted backend に対して engine を 1 task 分動かすデモ
//!
//! snapshot を 1 行 1 JSON で stdout に出す。ログは stderr。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tracing::{info, warn};

use gentask_core::app::EngineBuilder;
use gentask_core::config::{EngineConfig, PollPolicy};
use gentask_core::domain::TaskKind;
use gentask_core::impls::ScriptedBackend;

#[derive(Debug, Parser)]
#[command(name = "gentask", version, about = "Submit one generation task to a scripted backend and follow it")]
struct Cli {
    #[arg(long, default_value = "video")]
    kind: TaskKind,

    /// `running` responses before the final one.
    #[arg(long, default_value_t = 3)]
    polls: usize,

    #[arg(long, value_enum, default_value_t = Outcome::Succeeded)]
    outcome: Outcome,

    /// Overrides the kind's default (and `GENTASK_<KIND>_INTERVAL_MS`).
    #[arg(long)]
    interval_ms: Option<u64>,

    #[arg(long)]
    max_attempts: Option<u32>,

    /// Cancel after this many snapshots.
    #[arg(long)]
    cancel_after: Option<usize>,

    /// Submission payload as JSON. Defaults to a placeholder for each required field.
    #[arg(long)]
    payload: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Outcome {
    /// Final response carries an output URL.
    Succeeded,
    /// Success label with no output.
    Empty,
    Failed,
    /// A status label the normalizer does not know; polls until attempts run out.
    Unknown,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let kind = cli.kind;
    let config = EngineConfig::from_env();
    let mut policy = config.policy(kind);
    if let Some(ms) = cli.interval_ms {
        policy = PollPolicy {
            interval_ms: ms,
            ..policy
        };
    }
    if let Some(n) = cli.max_attempts {
        policy = PollPolicy {
            max_attempts: n,
            ..policy
        };
    }
    let config = config.with_policy(kind, policy);

    let backend = ScriptedBackend::running_then(cli.polls, final_response(kind, cli.outcome));
    let controller = EngineBuilder::new()
        .register(kind, Arc::new(backend))?
        .config(config)
        .expect_kinds(&[kind])
        .build()?;

    let payload = match &cli.payload {
        Some(raw) => serde_json::from_str(raw).context("--payload is not valid JSON")?,
        None => placeholder_payload(kind),
    };

    let task_id = controller.start(kind, &payload).await?;
    info!(%task_id, %kind, "following task");

    let (tx, mut rx) = mpsc::unbounded_channel();
    controller.on_update(&task_id, move |snapshot| {
        let _ = tx.send(snapshot);
    });

    let mut received = 0;
    loop {
        tokio::select! {
            snapshot = rx.recv() => {
                let Some(snapshot) = snapshot else { break };
                println!("{}", serde_json::to_string(&snapshot)?);
                received += 1;
                if snapshot.is_terminal() {
                    break;
                }
                if cli.cancel_after.is_some_and(|n| received >= n) {
                    controller.cancel(&task_id);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!(%task_id, "interrupted, cancelling");
                controller.cancel(&task_id);
            }
        }
    }

    controller.dispose();
    Ok(())
}

/// `RUST_LOG`, then `GENTASK_LOG`, then `info`.
fn init_tracing() {
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => {
            let level = std::env::var("GENTASK_LOG").unwrap_or_else(|_| "info".to_string());
            match level.parse::<tracing_subscriber::EnvFilter>() {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("WARN: GENTASK_LOG='{level}' is not a valid tracing filter ({e}); falling back to 'info'");
                    tracing_subscriber::EnvFilter::new("info")
                }
            }
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn placeholder_payload(kind: TaskKind) -> Value {
    let fields: Map<String, Value> = kind
        .required_fields()
        .iter()
        .map(|field| (field.to_string(), Value::String(format!("demo-{field}"))))
        .collect();
    Value::Object(fields)
}

fn final_response(kind: TaskKind, outcome: Outcome) -> Value {
    match outcome {
        Outcome::Succeeded => sample_output(kind),
        Outcome::Empty => json!({"status": "succeeded"}),
        Outcome::Failed => json!({"status": "failed", "error": {"message": "generation rejected"}}),
        Outcome::Unknown => json!({"status": "rendering"}),
    }
}

fn sample_output(kind: TaskKind) -> Value {
    const CDN: &str = "https://cdn.example.invalid";
    match kind {
        TaskKind::Image => json!({
            "status": "succeeded",
            "data": [{"url": format!("{CDN}/image-0.png")}, {"url": format!("{CDN}/image-1.png")}]
        }),
        TaskKind::Video => json!({
            "status": "succeeded",
            "content": {"video_url": format!("{CDN}/clip.mp4"), "cover_url": format!("{CDN}/clip.jpg")}
        }),
        TaskKind::StyleTransfer => json!({"status": "succeeded", "image_url": format!("{CDN}/styled.png")}),
        TaskKind::TextToSpeech => json!({
            "status": "succeeded",
            "audio_url": format!("{CDN}/speech.mp3"),
            "duration": 3.2
        }),
        TaskKind::VoiceClone => json!({
            "status": "succeeded",
            "demo_audio_url": format!("{CDN}/voice-demo.mp3"),
            "voice_id": "voice-demo"
        }),
        TaskKind::CustomAvatar => json!({
            "status": "succeeded",
            "content": {"fileUrl": format!("{CDN}/avatar.zip"), "cover_url": format!("{CDN}/avatar.jpg")}
        }),
        TaskKind::Model3D => json!({
            "status": "succeeded",
            "model_url": format!("{CDN}/mesh.glb"),
            "preview_url": format!("{CDN}/mesh.png"),
            "format": "glb"
        }),
    }
}
