use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for all operations in the `packup-core` crate.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Bad configuration: rejected before any I/O side effect.
    #[error("{0}")]
    Config(String),

    /// An exclusion pattern that does not compile. Patterns are validated
    /// once at startup, never per-file.
    #[error("invalid exclude pattern '{pattern}'")]
    Pattern {
        pattern: String,
        source: globset::Error,
    },

    /// An I/O error with the path it happened on. Benign not-found races
    /// are swallowed at the call site and never reach this variant.
    #[error("I/O error on path '{}'", .path.display())]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    /// A filesystem node that is neither a regular file, directory, symlink,
    /// nor one of the device types the scanner deliberately ignores.
    #[error("unsupported filesystem node type at '{}'", .0.display())]
    UnsupportedEntry(PathBuf),
}

impl BackupError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BackupError::Io { source, path: path.into() }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
