use std::{
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use regex::Regex;
use time::{macros::format_description, Date, OffsetDateTime};
use tracing_subscriber::fmt::MakeWriter;

use crate::{
    category::Category,
    config::{resolve_base, ArchiveSuffix, LogConfig},
    error::LogError,
    health::{HealthSnapshot, WriterHealth},
    scheduler::should_rotate,
};

/// ローテーションを試みた結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// アクティブファイルを指定されたパスに退避した。
    Archived(PathBuf),
    /// アクティブファイルが存在しなかった。
    NoActiveFile,
    /// 同じ分のうちに、すでに退避済み、または退避に失敗済み。
    AlreadyRotated,
    /// 退避に失敗した。アクティブファイルはそのまま残る。
    Failed,
}

/// ローテーションを実施した分を表すキー
type BoundaryKey = (Date, u8, u8);

fn boundary_key(now: &OffsetDateTime) -> BoundaryKey {
    (now.date(), now.hour(), now.minute())
}

#[derive(Debug, Default)]
struct SlotState {
    last_boundary: Option<BoundaryKey>,
}

/// カテゴリごとのアクティブファイル
///
/// `state`のロックを保持している間だけ、アクティブファイルを開く、または名前を変更する。
#[derive(Debug)]
struct Slot {
    active_path: PathBuf,
    state: Mutex<SlotState>,
}

/// カテゴリごとのファイルにログを追記し、タイムスタンプ付きの名前でアーカイブする。
///
/// 追記のたびにファイルを開いて閉じるため、呼び出しをまたいでファイルハンドルを保持しない。
/// 同じカテゴリへの追記とアーカイブは、カテゴリごとのロックで直列化される。
pub struct RotatingWriter {
    config: LogConfig,
    base_path: PathBuf,
    slots: [Slot; 3],
    health: WriterHealth,
}

impl RotatingWriter {
    /// `RotatingWriter`を作成する。
    ///
    /// ベースパスはここで一度だけ絶対パスに解決し、以降の追記とアーカイブで共有する。
    /// ディレクトリとファイルは最初の追記で作成する。
    ///
    /// # Arguments
    ///
    /// * config: ログライターの設定。
    ///
    /// # Returns
    ///
    /// `RotatingWriter`インスタンス。
    pub fn new(config: LogConfig) -> RotatingWriter {
        let base_path = resolve_base(config.base_path());
        let slots = Category::ALL.map(|category| Slot {
            active_path: base_path.join(category.subpath()),
            state: Mutex::new(SlotState::default()),
        });
        let health = WriterHealth::new(config.report_interval());

        Self {
            config,
            base_path,
            slots,
            health,
        }
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// 絶対パスに解決したベースパス
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn active_path(&self, category: Category) -> &Path {
        &self.slot(category).active_path
    }

    /// 書き込みとローテーションの集計値を返却する。
    pub fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }

    /// レコードに改行を付加して、カテゴリのアクティブファイルに追記する。
    ///
    /// 失敗しても呼び出し元にはエラーを返さない。
    pub fn append(&self, category: Category, record: &str) {
        let mut line = String::with_capacity(record.len() + 1);
        line.push_str(record);
        line.push('\n');
        self.append_raw(category, line.as_bytes());
    }

    /// バイト列をそのまま、カテゴリのアクティブファイルに追記する。
    pub fn append_raw(&self, category: Category, bytes: &[u8]) {
        let slot = self.slot(category);
        let _state = slot.state.lock();

        match write_record(&slot.active_path, bytes) {
            Ok(()) => self.health.record_written(category),
            Err(e) => self.health.record_append_failure(category, &e),
        }
    }

    /// アクティブファイルをアーカイブしたときのパスを返却する。
    pub fn archive_path(
        &self,
        category: Category,
        now: &OffsetDateTime,
    ) -> Result<PathBuf, LogError> {
        create_archive_path(
            &self.slot(category).active_path,
            self.config.archive_suffix(),
            now,
        )
    }

    /// カテゴリのアクティブファイルをアーカイブする。
    ///
    /// 時刻がローテーションの境界かどうかは確認しない。同じ分のうちに一度アーカイブを試みた
    /// カテゴリは、成功と失敗にかかわらず、次の分まで`RotationOutcome::AlreadyRotated`を返す。
    /// アクティブファイルが存在しなかった場合は記録しない。アーカイブ先のファイルがすでに
    /// 存在する場合は上書きせず、失敗として扱う。
    pub fn rotate_category(&self, category: Category, now: &OffsetDateTime) -> RotationOutcome {
        let slot = self.slot(category);
        let mut state = slot.state.lock();

        let key = boundary_key(now);
        if state.last_boundary == Some(key) {
            return RotationOutcome::AlreadyRotated;
        }

        let result = self
            .archive_path(category, now)
            .and_then(|to| archive(&slot.active_path, &to).map(|archived| archived.then_some(to)));

        match result {
            Ok(Some(to)) => {
                state.last_boundary = Some(key);
                self.health.record_rotation(category);
                tracing::debug!(
                    category = %category,
                    path = %to.display(),
                    "archived active log file"
                );
                RotationOutcome::Archived(to)
            }
            Ok(None) => RotationOutcome::NoActiveFile,
            Err(e) => {
                // 失敗した分も記録し、再試行は次の境界に回す
                state.last_boundary = Some(key);
                self.health.record_rotation_failure(category, &e);
                RotationOutcome::Failed
            }
        }
    }

    /// 時刻がローテーションの境界であれば、すべてのカテゴリをアーカイブする。
    ///
    /// カテゴリごとに独立して処理するため、あるカテゴリの失敗は他のカテゴリに影響しない。
    /// 境界でない場合は空の`Vec`を返す。
    pub fn tick(&self, now: &OffsetDateTime) -> Vec<(Category, RotationOutcome)> {
        if !should_rotate(now.minute()) {
            return Vec::new();
        }

        Category::ALL
            .iter()
            .map(|category| (*category, self.rotate_category(*category, now)))
            .collect()
    }

    /// カテゴリのアーカイブファイルを、古い順に返却する。
    ///
    /// アクティブファイルと同じディレクトリにある、アクティブファイル名にタイムスタンプを
    /// 付加した名前のファイルだけを対象にする。
    pub fn archived_files(&self, category: Category) -> Vec<PathBuf> {
        let active_path = &self.slot(category).active_path;
        let (Some(directory), Some(filename)) = (
            active_path.parent(),
            active_path.file_name().and_then(|n| n.to_str()),
        ) else {
            return Vec::new();
        };

        let pattern = format!(r"^{}\d{{8}}_\d{{4}}(\d{{2}})?$", regex::escape(filename));
        let archive_name = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(e) => {
                tracing::warn!(error = %e, "invalid archive file pattern");
                return Vec::new();
            }
        };

        let entries = match fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| archive_name.is_match(name))
            })
            .map(|entry| entry.path())
            .collect();
        files.sort();

        files
    }

    /// カテゴリのファイルに書き込む`MakeWriter`を返却する。
    ///
    /// `tracing_subscriber::fmt`のレイヤーに渡すと、イベントをカテゴリのファイルに出力できる。
    pub fn sink(self: &Arc<Self>, category: Category) -> CategorySink {
        CategorySink {
            writer: Arc::clone(self),
            category,
        }
    }

    fn slot(&self, category: Category) -> &Slot {
        &self.slots[category.index()]
    }
}

/// `tracing_subscriber`からカテゴリのファイルに書き込むための`MakeWriter`
#[derive(Clone)]
pub struct CategorySink {
    writer: Arc<RotatingWriter>,
    category: Category,
}

/// `CategorySink`が作成するライター
///
/// 書き込みのたびに`RotatingWriter::append_raw`を呼び出す。
pub struct CategoryLineWriter<'a> {
    writer: &'a RotatingWriter,
    category: Category,
}

impl io::Write for CategoryLineWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.append_raw(self.category, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CategorySink {
    type Writer = CategoryLineWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        CategoryLineWriter {
            writer: self.writer.as_ref(),
            category: self.category,
        }
    }
}

/// アーカイブファイル名に付加するタイムスタンプを作成して、返却する。
///
/// タイムスタンプは、`<yyyymmdd>_<HHMM>`または`<yyyymmdd>_<HHMMSS>`となる（24時間表記）。
///
/// # 引数
///
/// - suffix: タイムスタンプの精度。
/// - now: アーカイブする時刻。
///
/// # 戻り値
///
/// タイムスタンプ。
fn create_archive_suffix(suffix: ArchiveSuffix, now: &OffsetDateTime) -> Result<String, LogError> {
    let formatted = match suffix {
        ArchiveSuffix::Minute => {
            now.format(format_description!("[year][month][day]_[hour][minute]"))?
        }
        ArchiveSuffix::Second => {
            now.format(format_description!("[year][month][day]_[hour][minute][second]"))?
        }
    };

    Ok(formatted)
}

/// アーカイブファイルのパスを作成して、返却する。
///
/// アーカイブファイルのパスは、`{active_path}<timestamp>`となる。
fn create_archive_path(
    active_path: &Path,
    suffix: ArchiveSuffix,
    now: &OffsetDateTime,
) -> Result<PathBuf, LogError> {
    let mut path = OsString::from(active_path.as_os_str());
    path.push(create_archive_suffix(suffix, now)?);

    Ok(PathBuf::from(path))
}

/// ライターを作成する。
///
/// ファイルを開けなかった場合は、親ディレクトリを作成してから開き直す。
///
/// # 引数
///
/// * path: アクティブファイルのパス。
///
/// # 戻り値
///
/// 追記モードで開いた`File`インスタンス。
fn create_writer(path: &Path) -> Result<File, LogError> {
    let mut open_options = OpenOptions::new();
    open_options.append(true).create(true);

    let open_error = |source: io::Error| LogError::Open {
        path: path.to_path_buf(),
        source,
    };

    let new_file = open_options.open(path);
    if new_file.is_err() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| LogError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
            return open_options.open(path).map_err(open_error);
        }
    }

    new_file.map_err(open_error)
}

fn write_record(path: &Path, bytes: &[u8]) -> Result<(), LogError> {
    let mut file = create_writer(path)?;
    file.write_all(bytes).map_err(|source| LogError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// アクティブファイルの名前を変更する。
///
/// アクティブファイルが存在しない場合は`Ok(false)`を返す。
fn archive(from: &Path, to: &Path) -> Result<bool, LogError> {
    match fs::symlink_metadata(from) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(source) => {
            return Err(LogError::Rename {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source,
            })
        }
    }

    if to.exists() {
        return Err(LogError::ArchiveExists(to.to_path_buf()));
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(LogError::Rename {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        }),
    }
}
