//! IdGenerator port - SessionId の生成
//!
//! TaskId は backend が採番するので、engine が作るのは SessionId だけ。

use crate::domain::SessionId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は session ごとの一意な ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数の session task から使われる）
pub trait IdGenerator: Send + Sync {
    fn generate_session_id(&self) -> SessionId;
}

/// UlidGenerator は Clock の時刻 + 乱数で ULID を組み立てる
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_session_id(&self) -> SessionId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        SessionId::from(ulid)
    }
}
