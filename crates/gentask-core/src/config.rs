//! Engine configuration: poll cadence per task kind and progress estimation.
//!
//! Every field has a default, so `EngineConfig::default()` works without any
//! environment variables or files. The `interval × max_attempts` product is
//! the wall-clock budget of one task; creation screens historically used very
//! different combinations, so it is set per kind rather than globally.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::TaskKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Poll cadence and budget for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Delay before the first query and between subsequent queries.
    pub interval_ms: u64,

    /// Non-terminal responses tolerated before the task is `TimedOut`.
    pub max_attempts: u32,

    /// Consecutive transport failures retried before the task is `Failed`.
    #[serde(default = "default_network_retry_limit")]
    pub network_retry_limit: u32,
}

fn default_network_retry_limit() -> u32 {
    3
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            max_attempts,
            network_retry_limit: default_network_retry_limit(),
        }
    }

    /// Defaults tuned to each kind's expected latency.
    ///
    /// - image / tts: 数十秒で終わる
    /// - video / style transfer: 数分
    /// - custom avatar / 3D: 数十分かかることがある
    pub fn for_kind(kind: TaskKind) -> Self {
        let (interval_ms, max_attempts) = match kind {
            TaskKind::Image => (3_000, 100),
            TaskKind::Video => (5_000, 120),
            TaskKind::StyleTransfer => (5_000, 120),
            TaskKind::TextToSpeech => (2_000, 90),
            TaskKind::VoiceClone => (5_000, 60),
            TaskKind::CustomAvatar => (10_000, 180),
            TaskKind::Model3D => (20_000, 90),
        };
        Self {
            interval_ms,
            max_attempts,
            network_retry_limit: default_network_retry_limit(),
        }
    }

    pub fn with_network_retry_limit(mut self, limit: u32) -> Self {
        self.network_retry_limit = limit;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Upper bound on how long a task may poll before timing out.
    pub fn budget(&self) -> Duration {
        self.interval() * self.max_attempts
    }

    fn validate(&self, kind: TaskKind) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::Invalid(format!("{kind}: interval_ms must be > 0")));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(format!("{kind}: max_attempts must be > 0")));
        }
        Ok(())
    }
}

/// Highest synthetic progress a non-terminal task may show.
pub const MAX_RUNNING_PROGRESS: u8 = 90;

/// Synthetic progress parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub min_step: u8,
    pub max_step: u8,

    /// Highest value reachable before the backend confirms success (at most 90).
    pub ceiling: u8,

    /// Fixed RNG seed. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            min_step: 1,
            max_step: 8,
            ceiling: MAX_RUNNING_PROGRESS,
            seed: None,
        }
    }
}

impl ProgressConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_step > self.max_step {
            return Err(ConfigError::Invalid(format!(
                "progress.min_step ({}) > progress.max_step ({})",
                self.min_step, self.max_step
            )));
        }
        if self.ceiling > MAX_RUNNING_PROGRESS {
            return Err(ConfigError::Invalid(format!(
                "progress.ceiling ({}) must not exceed {MAX_RUNNING_PROGRESS}",
                self.ceiling
            )));
        }
        Ok(())
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-kind overrides. Kinds not listed use `PollPolicy::for_kind`.
    pub policies: BTreeMap<TaskKind, PollPolicy>,

    pub progress: ProgressConfig,
}

impl EngineConfig {
    pub fn policy(&self, kind: TaskKind) -> PollPolicy {
        self.policies
            .get(&kind)
            .copied()
            .unwrap_or_else(|| PollPolicy::for_kind(kind))
    }

    pub fn with_policy(mut self, kind: TaskKind, policy: PollPolicy) -> Self {
        self.policies.insert(kind, policy);
        self
    }

    pub fn with_progress(mut self, progress: ProgressConfig) -> Self {
        self.progress = progress;
        self
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Build from environment variables, falling back to defaults.
    ///
    /// - `GENTASK_<KIND>_INTERVAL_MS`, `GENTASK_<KIND>_MAX_ATTEMPTS`
    /// - `GENTASK_NETWORK_RETRY_LIMIT` (all kinds)
    /// - `GENTASK_PROGRESS_SEED`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let retry_limit: Option<u32> = parse_var(&lookup, "GENTASK_NETWORK_RETRY_LIMIT");

        for kind in TaskKind::ALL {
            let key = kind.env_key();
            let mut policy = config.policy(kind);
            let mut touched = false;

            if let Some(ms) = parse_var::<u64>(&lookup, &format!("GENTASK_{key}_INTERVAL_MS"))
                && ms > 0
            {
                policy.interval_ms = ms;
                touched = true;
            }
            if let Some(n) = parse_var::<u32>(&lookup, &format!("GENTASK_{key}_MAX_ATTEMPTS"))
                && n > 0
            {
                policy.max_attempts = n;
                touched = true;
            }
            if let Some(limit) = retry_limit {
                policy.network_retry_limit = limit;
                touched = true;
            }
            if touched {
                config.policies.insert(kind, policy);
            }
        }

        config.progress.seed = parse_var(&lookup, "GENTASK_PROGRESS_SEED");
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (kind, policy) in &self.policies {
            policy.validate(*kind)?;
        }
        self.progress.validate()
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
