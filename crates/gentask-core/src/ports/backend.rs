//! GenerationBackend port - 生成サービスへの opaque な submit / query
//!
//! engine はエンドポイントもペイロードのスキーマも知らない。
//! 知っているのは「submit の応答のどこかに taskId がある」「query の応答のどこかに status がある」だけ。

use async_trait::async_trait;

use crate::domain::{BackendError, TaskId};

/// One remote generation service (one per `TaskKind`).
///
/// # 設計原則
/// - 戻り値は生の JSON。envelope の剥がし方は `app::envelope` の precedence table が担う
/// - 認証・クレジット残高・ストレージは実装側の責務
/// - リトライしない（submit は呼び出し側の判断、query は scheduler が面倒を見る）
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn submit(&self, payload: &serde_json::Value) -> Result<serde_json::Value, BackendError>;

    async fn query(&self, task_id: &TaskId) -> Result<serde_json::Value, BackendError>;
}
