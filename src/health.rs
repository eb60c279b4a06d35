//! 書き込みとローテーションの失敗を集計する。
//!
//! ログの書き込みは呼び出し元にエラーを返さないため、失敗はここで数え、
//! 一定間隔ごとに`tracing::error!`で報告する。ディスクフルのように失敗が続く場合でも、
//! 報告は間隔あたり1回に抑え、抑制した件数を添える。

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::{category::Category, error::LogError};

#[derive(Debug, Default)]
struct CategoryCounters {
    records_written: AtomicU64,
    append_failures: AtomicU64,
    rotations: AtomicU64,
    rotation_failures: AtomicU64,
}

impl CategoryCounters {
    fn snapshot(&self) -> CategoryHealth {
        CategoryHealth {
            records_written: self.records_written.load(Ordering::Relaxed),
            append_failures: self.append_failures.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            rotation_failures: self.rotation_failures.load(Ordering::Relaxed),
        }
    }
}

/// カテゴリごとの集計値
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryHealth {
    /// 書き込みに成功したレコード数
    pub records_written: u64,
    /// 書き込みに失敗したレコード数
    pub append_failures: u64,
    /// アーカイブしたファイル数
    pub rotations: u64,
    /// アーカイブに失敗した回数
    pub rotation_failures: u64,
}

/// ある時点の集計値
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub info: CategoryHealth,
    pub service: CategoryHealth,
    pub summary: CategoryHealth,
}

impl HealthSnapshot {
    pub fn category(&self, category: Category) -> CategoryHealth {
        match category {
            Category::Info => self.info,
            Category::Service => self.service,
            Category::Summary => self.summary,
        }
    }

    /// すべてのカテゴリの失敗件数の合計
    pub fn total_failures(&self) -> u64 {
        Category::ALL
            .iter()
            .map(|c| {
                let h = self.category(*c);
                h.append_failures + h.rotation_failures
            })
            .sum()
    }
}

pub(crate) struct WriterHealth {
    counters: [CategoryCounters; 3],
    reporter: RateLimitedReporter,
}

impl WriterHealth {
    pub(crate) fn new(report_interval: Duration) -> Self {
        Self {
            counters: Default::default(),
            reporter: RateLimitedReporter::new(report_interval),
        }
    }

    pub(crate) fn record_written(&self, category: Category) {
        self.counters[category.index()]
            .records_written
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_append_failure(&self, category: Category, error: &LogError) {
        self.counters[category.index()]
            .append_failures
            .fetch_add(1, Ordering::Relaxed);
        self.reporter.report(category, "append", error);
    }

    pub(crate) fn record_rotation(&self, category: Category) {
        self.counters[category.index()]
            .rotations
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rotation_failure(&self, category: Category, error: &LogError) {
        self.counters[category.index()]
            .rotation_failures
            .fetch_add(1, Ordering::Relaxed);
        self.reporter.report(category, "rotate", error);
    }

    pub(crate) fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            info: self.counters[Category::Info.index()].snapshot(),
            service: self.counters[Category::Service.index()].snapshot(),
            summary: self.counters[Category::Summary.index()].snapshot(),
        }
    }
}

/// 失敗の報告を一定間隔あたり1回に制限する。
struct RateLimitedReporter {
    min_interval: Duration,
    last_report: Mutex<Option<Instant>>,
    suppressed: AtomicU64,
}

impl RateLimitedReporter {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_report: Mutex::new(None),
            suppressed: AtomicU64::new(0),
        }
    }

    /// 報告した場合は`true`、抑制した場合は`false`を返却する。
    fn report(&self, category: Category, operation: &str, error: &LogError) -> bool {
        let should_report = {
            let mut last = self.last_report.lock();
            let now = Instant::now();
            match *last {
                Some(at) if now.duration_since(at) < self.min_interval => false,
                _ => {
                    *last = Some(now);
                    true
                }
            }
        };

        if !should_report {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let suppressed = self.suppressed.swap(0, Ordering::Relaxed);
        tracing::error!(
            category = %category,
            operation,
            error = %error,
            suppressed,
            "log write failed"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use std::{io, path::PathBuf};

    use super::*;

    fn open_error() -> LogError {
        LogError::Open {
            path: PathBuf::from("/nonexistent/log.info"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        }
    }

    #[test]
    fn test_reporter_suppresses_within_interval() {
        let reporter = RateLimitedReporter::new(Duration::from_secs(60));
        let error = open_error();

        assert!(reporter.report(Category::Info, "append", &error));
        assert!(!reporter.report(Category::Info, "append", &error));
        assert!(!reporter.report(Category::Service, "append", &error));
        assert_eq!(2, reporter.suppressed.load(Ordering::Relaxed));
    }

    #[test]
    fn test_reporter_reports_after_interval() {
        let reporter = RateLimitedReporter::new(Duration::ZERO);
        let error = open_error();

        assert!(reporter.report(Category::Info, "append", &error));
        assert!(reporter.report(Category::Info, "append", &error));
    }

    #[test]
    fn test_counters_are_per_category() {
        let health = WriterHealth::new(Duration::from_secs(60));
        let error = open_error();

        health.record_written(Category::Info);
        health.record_written(Category::Info);
        health.record_append_failure(Category::Service, &error);
        health.record_rotation(Category::Summary);
        health.record_rotation_failure(Category::Summary, &error);

        let snapshot = health.snapshot();
        assert_eq!(2, snapshot.info.records_written);
        assert_eq!(1, snapshot.service.append_failures);
        assert_eq!(1, snapshot.summary.rotations);
        assert_eq!(1, snapshot.summary.rotation_failures);
        assert_eq!(2, snapshot.total_failures());
    }
}
