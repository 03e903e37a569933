use thiserror::Error;

pub type Result<T> = std::result::Result<T, FsError>;

/// Every failure the file system reports to callers.
///
/// All variants except [`FsError::InvariantViolation`] describe expected
/// conditions and leave the file system unchanged. An invariant violation
/// means internal state is already inconsistent.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("not enough free blocks: requested {requested}, available {available}")]
    InsufficientSpace { requested: usize, available: usize },
    #[error("file '{0}' not found")]
    FileNotFound(String),
    #[error("directory '{0}' not found")]
    DirectoryNotFound(String),
    #[error("path component '{0}' not found")]
    PathNotFound(String),
    #[error("file '{0}' is read-only")]
    ReadOnlyViolation(String),
    #[error("name '{0}' is already in use")]
    NameCollision(String),
    #[error("invalid name: '{0}'")]
    InvalidName(String),
    #[error("unknown access mode '{0}', expected one of r, w, a, rw")]
    InvalidMode(String),
    #[error("cannot place directory '{0}' inside itself")]
    IntoOwnSubtree(String),
    #[error("file system invariant violated: {0}")]
    InvariantViolation(String),
    #[error("malformed snapshot: {0}")]
    Snapshot(String),
    #[error("block device error")]
    Io(#[from] std::io::Error),
}
