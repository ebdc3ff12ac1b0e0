use std::path::PathBuf;

use thiserror::Error;

use crate::scanner::ScannerKind;

/// Failures that abort an analysis run. Everything else degrades to an issue
/// or to missing information.
#[derive(Debug, Error)]
pub enum DoctorError {
    #[error("project path does not exist: {0}")]
    ProjectNotFound(PathBuf),

    #[error("no package.json found at {0}")]
    ManifestMissing(PathBuf),

    #[error("failed to parse {path}: {reason}")]
    ManifestParse { path: PathBuf, reason: String },

    #[error("a {0} scanner is already registered")]
    DuplicateScanner(ScannerKind),

    #[error("no {0} scanner is registered")]
    UnknownScanner(ScannerKind),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by a [`PackageManagerAdapter`](crate::adapter::PackageManagerAdapter).
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("lockfile not found: {0}")]
    LockfileMissing(PathBuf),

    #[error("invalid lockfile {path}: {reason}")]
    LockfileParse { path: PathBuf, reason: String },

    #[error("`{command}` exited with {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: String,
        stderr: String,
    },

    #[error("`{command}` did not finish within {secs}s")]
    CommandTimeout { command: String, secs: u64 },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
