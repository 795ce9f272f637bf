//! ProgressEstimator - 合成プログレス
//!
//! backend は進捗を返さないので、tick ごとに少しずつ増やして「動いている感」を出す。
//! 乱数源は引数で受け取るので、seed 固定の RNG を渡せば決定的になる。

use rand::Rng;

use crate::config::{MAX_RUNNING_PROGRESS, ProgressConfig};
use crate::domain::TaskStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEstimator {
    min_step: u8,
    max_step: u8,
    ceiling: u8,
}

impl Default for ProgressEstimator {
    fn default() -> Self {
        Self::from_config(&ProgressConfig::default())
    }
}

impl ProgressEstimator {
    pub fn from_config(config: &ProgressConfig) -> Self {
        Self {
            min_step: config.min_step.min(config.max_step),
            max_step: config.min_step.max(config.max_step),
            ceiling: config.ceiling.min(MAX_RUNNING_PROGRESS),
        }
    }

    pub fn ceiling(&self) -> u8 {
        self.ceiling
    }

    /// Next progress value.
    ///
    /// - non-terminal: `previous + step`, step in `min_step..=max_step`, capped at the ceiling.
    ///   Never below `previous`.
    /// - `Succeeded`: 100.
    /// - `Failed` / `TimedOut` / `Cancelled`: `previous` unchanged.
    pub fn estimate<R: Rng>(&self, previous: u8, status: TaskStatus, rng: &mut R) -> u8 {
        match status {
            TaskStatus::Succeeded => 100,
            TaskStatus::Failed | TaskStatus::TimedOut | TaskStatus::Cancelled => previous,
            TaskStatus::Queued | TaskStatus::Running => {
                if previous >= self.ceiling {
                    return previous;
                }
                let step = rng.gen_range(self.min_step..=self.max_step);
                previous.saturating_add(step).min(self.ceiling)
            }
        }
    }
}
