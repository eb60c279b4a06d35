use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use path_clean::PathClean;

/// ベースパスの既定値
pub const DEFAULT_BASE_PATH: &str = "./log";

/// スケジューラーが時刻を確認する間隔の既定値
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// 書き込みエラーを報告する最小間隔の既定値
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// アーカイブファイル名に付加するタイムスタンプの精度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveSuffix {
    /// `<yyyymmdd>_<HHMM>`
    #[default]
    Minute,
    /// `<yyyymmdd>_<HHMMSS>`
    Second,
}

/// ログライターの設定
///
/// 一度作成して`RotatingWriter`に渡す。`RotatingWriter`の作成後に設定を変更する手段はない。
#[derive(Debug, Clone)]
pub struct LogConfig {
    base_path: PathBuf,
    archive_suffix: ArchiveSuffix,
    tick_interval: Duration,
    report_interval: Duration,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            base_path: clean_path(Path::new(DEFAULT_BASE_PATH)),
            archive_suffix: ArchiveSuffix::default(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            report_interval: DEFAULT_REPORT_INTERVAL,
        }
    }
}

impl LogConfig {
    /// ベースパスを設定する。
    ///
    /// パスは検証せず、`clean_path`で正規化して保持する。
    #[must_use]
    pub fn with_base_path(mut self, path: impl AsRef<Path>) -> Self {
        self.base_path = clean_path(path.as_ref());
        self
    }

    #[must_use]
    pub fn with_archive_suffix(mut self, suffix: ArchiveSuffix) -> Self {
        self.archive_suffix = suffix;
        self
    }

    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    #[must_use]
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn archive_suffix(&self) -> ArchiveSuffix {
        self.archive_suffix
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn report_interval(&self) -> Duration {
        self.report_interval
    }
}

/// パスを字句的に正規化して返却する。
///
/// - `.`を取り除く。
/// - `..`は直前の通常の要素と打ち消し合う。ルートより上には遡らない。
/// - 結果が空の場合は`.`を返す。
///
/// ファイルシステムにはアクセスしない。
///
/// # 引数
///
/// * path: 正規化するパス。
///
/// # 戻り値
///
/// 正規化したパス。
pub fn clean_path(path: &Path) -> PathBuf {
    path.clean()
}

/// ベースパスを絶対パスに解決する。
///
/// 相対パスの場合は、カレントディレクトリを基準にする。カレントディレクトリを
/// 取得できない場合は、正規化したパスをそのまま返す。
pub(crate) fn resolve_base(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return clean_path(path);
    }

    match env::current_dir() {
        Ok(cwd) => clean_path(&cwd.join(path)),
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "unable to resolve log base path");
            clean_path(path)
        }
    }
}
