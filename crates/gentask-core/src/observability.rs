use serde::{Deserialize, Serialize};

/// How many tasks the controller is tracking, by phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounts {
    /// `start` calls waiting for the backend's submit response.
    pub submitting: usize,
    /// Live poll sessions.
    pub polling: usize,
    /// Finished sessions holding snapshots nobody has subscribed to yet.
    pub parked: usize,
}

impl SessionCounts {
    pub fn total(&self) -> usize {
        self.submitting + self.polling + self.parked
    }
}
