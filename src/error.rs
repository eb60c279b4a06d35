use std::{io, path::PathBuf};

use thiserror::Error;

/// ログの書き込みとローテーションで発生するエラー
///
/// クレートの内部でのみ使用し、公開APIの呼び出し元には返さない。
#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to open log file {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to write log file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to archive {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("archive {0} already exists")]
    ArchiveExists(PathBuf),

    #[error("failed to format archive timestamp: {0}")]
    Format(#[from] time::error::Format),
}
