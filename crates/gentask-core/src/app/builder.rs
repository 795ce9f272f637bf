//! EngineBuilder - TaskController の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 開発体験の改善（明確なエラーメッセージ）

use std::sync::Arc;

use super::controller::TaskController;
use super::registry::{BackendRegistry, RegistryError};
use super::submitter::TaskSubmitter;
use crate::config::{ConfigError, EngineConfig};
use crate::domain::TaskKind;
use crate::ports::{Clock, GenerationBackend, IdGenerator, SystemClock, UlidGenerator};

/// EngineBuilder は TaskController を構築
///
/// # 使用例
/// ```ignore
/// let controller = EngineBuilder::new()
///     .register(TaskKind::Video, Arc::new(my_video_backend))?
///     .config(EngineConfig::from_env())
///     .expect_kinds(&[TaskKind::Video])
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - expect_kinds() で backend が必要な kind を宣言
/// - build() 時に「期待集合 ⊆ 登録済み集合」と config の妥当性をチェック
/// - 不足があれば BuildError を返す
pub struct EngineBuilder {
    registry: BackendRegistry,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn IdGenerator>>,
    expected_kinds: Option<Vec<TaskKind>>,
}

/// BuildError は TaskController 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing backends for task kinds: {0:?}. These kinds were expected but not registered.")]
    MissingBackends(Vec<TaskKind>),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            registry: BackendRegistry::new(),
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            ids: None,
            expected_kinds: None,
        }
    }

    /// kind ごとの backend を登録（同じ kind の二重登録はエラー）
    pub fn register(
        mut self,
        kind: TaskKind,
        backend: Arc<dyn GenerationBackend>,
    ) -> Result<Self, RegistryError> {
        self.registry.register(kind, backend)?;
        Ok(self)
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// `TaskHandle::submitted_at` の時計（テストでは `FixedClock`）
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 省略時は `UlidGenerator<SystemClock>`
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// backend が登録されているべき kind のリストを設定
    pub fn expect_kinds(mut self, kinds: &[TaskKind]) -> Self {
        self.expected_kinds = Some(kinds.to_vec());
        self
    }

    /// # 検証
    /// - expect_kinds() で設定された kind が全て登録されているかチェック
    /// - config の interval / attempts / progress 設定をチェック
    pub fn build(self) -> Result<TaskController, BuildError> {
        if let Some(expected) = &self.expected_kinds {
            let registered = self.registry.registered_kinds();
            let mut missing: Vec<TaskKind> = expected
                .iter()
                .filter(|kind| !registered.contains(kind))
                .copied()
                .collect();
            missing.sort();
            missing.dedup();
            if !missing.is_empty() {
                return Err(BuildError::MissingBackends(missing));
            }
        }
        self.config.validate()?;

        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(SystemClock)),
        };
        let submitter = TaskSubmitter::new(Arc::new(self.registry), self.clock);
        Ok(TaskController::new(submitter, self.config, ids))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollPolicy;
    use crate::impls::ScriptedBackend;
    use std::time::Duration;

    #[test]
    fn test_build_success() {
        let controller = EngineBuilder::new()
            .register(TaskKind::Video, Arc::new(ScriptedBackend::new()))
            .unwrap()
            .expect_kinds(&[TaskKind::Video])
            .build();
        assert!(controller.is_ok());
    }

    #[test]
    fn test_build_missing_backends() {
        let controller = EngineBuilder::new()
            .register(TaskKind::Video, Arc::new(ScriptedBackend::new()))
            .unwrap()
            .expect_kinds(&[TaskKind::Video, TaskKind::Model3D, TaskKind::Image])
            .build();
        assert!(matches!(
            controller,
            Err(BuildError::MissingBackends(missing)) if missing == vec![TaskKind::Image, TaskKind::Model3D]
        ));
    }

    #[test]
    fn test_build_no_expect_kinds() {
        let controller = EngineBuilder::new().build();
        assert!(controller.is_ok());
    }

    #[test]
    fn test_duplicate_backend() {
        let result = EngineBuilder::new()
            .register(TaskKind::Image, Arc::new(ScriptedBackend::new()))
            .unwrap()
            .register(TaskKind::Image, Arc::new(ScriptedBackend::new()));
        assert!(matches!(result, Err(RegistryError::DuplicateBackend(TaskKind::Image))));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = EngineConfig::default().with_policy(TaskKind::Video, PollPolicy::new(Duration::ZERO, 10));
        let controller = EngineBuilder::new().config(config).build();
        assert!(matches!(controller, Err(BuildError::Config(_))));
    }
}
