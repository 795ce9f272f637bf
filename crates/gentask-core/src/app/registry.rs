//! BackendRegistry - TaskKind ごとの GenerationBackend
//!
//! 初期化時に組み立て（mutable）、実行時は `Arc` で共有して読むだけ（immutable）。
//! ロック不要。

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::TaskKind;
use crate::ports::GenerationBackend;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("backend for task kind '{0}' is already registered")]
    DuplicateBackend(TaskKind),
}

#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<TaskKind, Arc<dyn GenerationBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Register the backend serving `kind`.
    pub fn register(
        &mut self,
        kind: TaskKind,
        backend: Arc<dyn GenerationBackend>,
    ) -> Result<(), RegistryError> {
        if self.backends.contains_key(&kind) {
            return Err(RegistryError::DuplicateBackend(kind));
        }
        self.backends.insert(kind, backend);
        Ok(())
    }

    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn GenerationBackend>> {
        self.backends.get(&kind).cloned()
    }

    pub fn registered_kinds(&self) -> Vec<TaskKind> {
        let mut kinds: Vec<_> = self.backends.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
