//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせて submit → poll → 配送 のエンジンを実装します。
//!
//! # 主要コンポーネント
//! - **EngineBuilder**: backend / config / clock の構築とワイヤリング
//! - **TaskController**: 呼び出し側の入口（start / on_update / cancel / dispose）
//! - **TaskSubmitter**: 必須フィールド検査と submit
//! - **PollingScheduler**: task ごとの poll ループ
//! - **TaskTracker**: 応答 1 件から snapshot を組み立てる
//! - **normalizer / progress / extractor / envelope**: 純粋関数群

pub mod builder;
pub mod controller;
pub mod envelope;
pub mod extractor;
pub mod normalizer;
pub mod progress;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod submitter;
pub mod tracker;

#[cfg(test)]
mod tests;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, EngineBuilder};
pub use self::controller::TaskController;
pub use self::normalizer::{NormalizedStatus, classify, normalize};
pub use self::progress::ProgressEstimator;
pub use self::registry::{BackendRegistry, RegistryError};
pub use self::scheduler::PollingScheduler;
pub use self::session::{DeliveryGate, PollSession, SessionArena};
pub use self::submitter::TaskSubmitter;
pub use self::tracker::TaskTracker;
