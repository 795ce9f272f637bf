//! gentask-core
//!
//! Submit-then-poll engine for asynchronous generation tasks (image, video,
//! speech, voice clone, avatar, 3D model).
//!
//! # モジュール構成
//! - **domain**: 値だけ（TaskKind, TaskId, TaskStatus, StatusSnapshot, Artifact, errors）
//! - **ports**: 外側との境界（GenerationBackend, Clock, IdGenerator）
//! - **app**: engine 本体（submitter, scheduler, controller, normalizer, extractor, ...）
//! - **impls**: 開発・テスト用の実装（ScriptedBackend）
//! - **config**: poll 間隔・試行回数・合成プログレスの設定
//! - **observability**: SessionCounts
//!
//! # 使用例
//! ```ignore
//! let controller = EngineBuilder::new()
//!     .register(TaskKind::Video, Arc::new(backend))?
//!     .config(EngineConfig::from_env())
//!     .build()?;
//!
//! let task_id = controller.start(TaskKind::Video, &json!({"image": url, "prompt": "a cat"})).await?;
//! controller.on_update(&task_id, |snapshot| println!("{snapshot:?}"));
//! ```

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;

pub use app::{BuildError, EngineBuilder, TaskController};
pub use config::{EngineConfig, PollPolicy, ProgressConfig};
pub use domain::{Artifact, ArtifactType, StatusSnapshot, SubmitError, TaskHandle, TaskId, TaskKind, TaskStatus};
pub use observability::SessionCounts;
