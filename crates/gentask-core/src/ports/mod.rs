//! Ports - 抽象化レイヤー
//!
//! engine の外側（生成サービス、時刻、ID 採番）へのインターフェース。
//! 実装の詳細はここに書かない。開発用の実装は `impls` に置く。

pub mod backend;
pub mod clock;
pub mod id_generator;

pub use self::backend::GenerationBackend;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
