//! API Log Writer
//!
//! ----------------------------------------------------------------------------
//!
//! このクレートは、バックエンドサービスのリクエスト／レスポンスログを、
//! カテゴリごとのファイルへ追記するための`RotatingWriter`構造体を提供する。
//!
//! カテゴリは以下の3種類で、それぞれ専用のアクティブファイルをもつ。
//!
//! - `info`: 受信したリクエスト（`info/log.info`）
//! - `service`: 外部サービスへの呼び出し（`service/log.service`）
//! - `summary`: トランザクションのサマリー（`summary/log.sum`）
//!
//! `RotationScheduler`は、一定間隔で現在時刻を確認し、毎時0分、15分、30分、45分に
//! アクティブファイルの名前にタイムスタンプを付加して退避（アーカイブ）する。
//! 退避後、次の追記でアクティブファイルが新しく作成される。
//!
//! ログの書き込みに失敗しても、呼び出し元にエラーを返さない。失敗は`health`モジュールで
//! 集計され、`tracing`を通じて間引きして報告される。

pub mod appenders;
pub mod category;
pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod scheduler;

pub use appenders::{CategorySink, RotatingWriter, RotationOutcome};
pub use category::Category;
pub use clock::{Clock, SystemClock};
pub use config::{ArchiveSuffix, LogConfig};
pub use error::LogError;
pub use health::{CategoryHealth, HealthSnapshot};
pub use scheduler::{should_rotate, RotationScheduler};
