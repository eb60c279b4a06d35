use time::OffsetDateTime;

/// 現在時刻を提供する。
///
/// ローテーションの判定とアーカイブ名の作成に使用する。
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// システムのローカル時刻を返す`Clock`
///
/// ローカルのオフセットを取得できない場合は、UTCを返す。
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
    }
}
