use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LxdeltaError>;

#[derive(Debug, Error)]
pub enum LxdeltaError {
    #[error("corrupt archive '{archive}': {source}")]
    CorruptArchive {
        archive: String,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "member '{member}' in '{archive}' is truncated: declared {expected} bytes, got {actual}"
    )]
    TruncatedMember {
        archive: String,
        member: String,
        expected: u64,
        actual: u64,
    },

    #[error("baseline fingerprints not found at '{}'", .0.display())]
    MissingBaseline(PathBuf),

    #[error("malformed record in '{}' at line {line}: expected 2 fields, found {fields}", path.display())]
    MalformedRecord {
        path: PathBuf,
        line: u64,
        fields: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to {action} '{}': {source}", path.display())]
    FileAccess {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("delta bucket '{}' failed: {source}", destination.display())]
    Bucket {
        destination: PathBuf,
        #[source]
        source: Box<LxdeltaError>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("container runtime error: {0}")]
    Runtime(String),

    #[error("hook error: {0}")]
    Hook(String),

    #[error("{0}")]
    Other(String),
}

impl LxdeltaError {
    /// Wrap an I/O error with the operation and path that produced it.
    pub fn file(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LxdeltaError::FileAccess {
            action,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(archive: &str, source: std::io::Error) -> Self {
        LxdeltaError::CorruptArchive {
            archive: archive.to_string(),
            source,
        }
    }
}
