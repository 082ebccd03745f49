use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Whole-job failures. Per-rung failures never surface here; they are
/// recorded in the rung's [`RungResult`](super::RungResult) so sibling
/// rungs keep their artifacts.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("source file unreadable at {path}: {source}")]
    SourceUnreadable { source: io::Error, path: PathBuf },
    #[error("io error at {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
}

pub type TranscodeResult<T> = Result<T, TranscodeError>;
