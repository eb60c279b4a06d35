use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    appenders::{RotatingWriter, RotationOutcome},
    clock::{Clock, SystemClock},
};

/// 分がローテーションの境界（0分、15分、30分、45分）かどうかを返却する。
pub fn should_rotate(minute: u8) -> bool {
    minute == 0 || minute % 15 == 0
}

/// 一定間隔で時刻を確認し、境界であればアクティブファイルをアーカイブするバックグラウンドスレッド
///
/// `stop`を呼び出すか破棄すると、スレッドに停止を通知して終了を待つ。実行中のアーカイブは中断しない。
pub struct RotationScheduler {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RotationScheduler {
    /// システム時刻でスケジューラーを開始する。
    pub fn start(writer: Arc<RotatingWriter>) -> io::Result<RotationScheduler> {
        Self::start_with_clock(writer, Arc::new(SystemClock))
    }

    /// 指定された`Clock`でスケジューラーを開始する。
    ///
    /// 確認の間隔は`LogConfig::tick_interval`に従う。
    ///
    /// # 引数
    ///
    /// * writer: アーカイブする`RotatingWriter`。
    /// * clock: 現在時刻を提供する`Clock`。
    ///
    /// # 戻り値
    ///
    /// `RotationScheduler`インスタンス。スレッドを作成できなかった場合はエラー。
    pub fn start_with_clock(
        writer: Arc<RotatingWriter>,
        clock: Arc<dyn Clock>,
    ) -> io::Result<RotationScheduler> {
        let interval = writer.config().tick_interval();
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("apilog-rotation".into())
            .spawn(move || run(writer, clock, interval, flag))?;

        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    /// スケジューラーを停止し、スレッドの終了を待つ。
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        self.shutdown.store(true, Ordering::Release);
        handle.thread().unpark();
        if handle.join().is_err() {
            tracing::error!("rotation scheduler thread panicked");
        }
    }
}

impl Drop for RotationScheduler {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

fn run(
    writer: Arc<RotatingWriter>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
) {
    tracing::debug!(?interval, "rotation scheduler started");

    while !shutdown.load(Ordering::Acquire) {
        for (category, outcome) in writer.tick(&clock.now()) {
            if let RotationOutcome::Archived(path) = outcome {
                tracing::info!(category = %category, path = %path.display(), "log file rotated");
            }
        }
        // unpark で停止通知を受け取ると即座に戻る
        thread::park_timeout(interval);
    }

    tracing::debug!("rotation scheduler stopped");
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        time::{Duration, Instant},
    };

    use parking_lot::Mutex;
    use tempfile::TempDir;
    use time::{macros::datetime, OffsetDateTime};

    use super::*;
    use crate::{category::Category, config::LogConfig};

    struct ManualClock(Mutex<OffsetDateTime>);

    impl ManualClock {
        fn new(now: OffsetDateTime) -> Self {
            Self(Mutex::new(now))
        }

        fn set(&self, now: OffsetDateTime) {
            *self.0.lock() = now;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> OffsetDateTime {
            *self.0.lock()
        }
    }

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_should_rotate() {
        for minute in 0..60u8 {
            let expected = matches!(minute, 0 | 15 | 30 | 45);
            assert_eq!(expected, should_rotate(minute), "minute {minute}");
        }
    }

    #[test]
    fn test_scheduler_archives_at_boundary() {
        let dir = TempDir::new().unwrap();
        let config = LogConfig::default()
            .with_base_path(dir.path())
            .with_tick_interval(Duration::from_millis(10));
        let writer = Arc::new(RotatingWriter::new(config));
        let clock = Arc::new(ManualClock::new(datetime!(2024-06-15 12:29:59 UTC)));

        writer.append(Category::Info, "X");
        let scheduler = RotationScheduler::start_with_clock(Arc::clone(&writer), clock.clone())
            .unwrap();

        thread::sleep(Duration::from_millis(50));
        assert!(writer.archived_files(Category::Info).is_empty());

        clock.set(datetime!(2024-06-15 12:30:00 UTC));
        assert!(wait_until(Duration::from_secs(5), || {
            !writer.archived_files(Category::Info).is_empty()
        }));
        scheduler.stop();

        let archived = dir.path().join("info/log.info20240615_1230");
        assert_eq!(vec![archived.clone()], writer.archived_files(Category::Info));
        assert_eq!("X\n", fs::read_to_string(&archived).unwrap());
        assert!(!writer.active_path(Category::Info).exists());
        assert!(!dir.path().join("service").exists());
        assert_eq!(1, writer.health().info.rotations);
    }

    #[test]
    fn test_scheduler_does_not_refire_within_minute() {
        let dir = TempDir::new().unwrap();
        let config = LogConfig::default()
            .with_base_path(dir.path())
            .with_tick_interval(Duration::from_millis(5));
        let writer = Arc::new(RotatingWriter::new(config));
        let clock = Arc::new(ManualClock::new(datetime!(2024-06-15 00:00:00 UTC)));

        writer.append(Category::Summary, "first");
        let scheduler = RotationScheduler::start_with_clock(Arc::clone(&writer), clock.clone())
            .unwrap();
        assert!(wait_until(Duration::from_secs(5), || {
            writer.health().summary.rotations == 1
        }));

        writer.append(Category::Summary, "second");
        clock.set(datetime!(2024-06-15 00:00:30 UTC));
        thread::sleep(Duration::from_millis(50));
        scheduler.stop();

        assert_eq!(1, writer.health().summary.rotations);
        assert_eq!(
            "second\n",
            fs::read_to_string(writer.active_path(Category::Summary)).unwrap()
        );
    }

    #[test]
    fn test_drop_stops_scheduler() {
        let dir = TempDir::new().unwrap();
        let config = LogConfig::default()
            .with_base_path(dir.path())
            .with_tick_interval(Duration::from_secs(3600));
        let writer = Arc::new(RotatingWriter::new(config));
        let clock = Arc::new(ManualClock::new(datetime!(2024-06-15 12:07:00 UTC)));

        let started = Instant::now();
        let scheduler = RotationScheduler::start_with_clock(Arc::clone(&writer), clock).unwrap();
        drop(scheduler);

        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(1, Arc::strong_count(&writer));
    }
}
