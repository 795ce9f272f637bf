//! Impls - ports の開発用・テスト用実装
//!
//! 本番の backend（HTTP クライアント）はアプリケーション側で実装する。
//! ここにはネットワークに出ないものだけを置く。

pub mod scripted;

pub use self::scripted::ScriptedBackend;
