mod from;

use std::fmt::Display;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{commit::AssemblyStage, progress::FileError};

pub type Result<T> = std::result::Result<T, Error>;

pub const OK: Result<()> = Ok(());

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("could not read `{path}`: {reason}")]
    Read { path: String, reason: String },

    #[error("`{path}` is too large ({size} bytes, limit is {limit} bytes)")]
    FileTooLarge { path: String, size: u64, limit: u64 },

    #[error("remote error: {message}")]
    RemoteTransient { status: Option<u16>, message: String },

    #[error("rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("remote rejected request (status {status}): {message}")]
    RemotePermanent { status: u16, message: String },

    #[error("failed to create object for `{path}` after {attempts} attempt(s): {source}")]
    ObjectCreation {
        path: String,
        attempts: u32,
        source: Box<Error>,
    },

    #[error("path `{0}` is malformed")]
    PathMalformed(String),

    #[error("run aborted: {0}")]
    RunAborted(String),

    #[error("upload cancelled")]
    Cancelled,

    #[error("{stage} failed: {source}")]
    Assembly {
        stage: AssemblyStage,
        source: Box<Error>,
    },

    #[error("{0} conflicting path(s) were not resolved")]
    ConflictsDeclined(usize),

    #[error("nothing to commit")]
    NothingToCommit,

    /// The run ended without a commit after some files had already failed.
    #[error("{source} ({} file(s) failed)", .errors.len())]
    Uncommitted {
        source: Box<Error>,
        errors: Vec<FileError>,
    },

    #[error("no item found for key `{0}`")]
    ItemNotFound(String),

    #[error("branch `{0}` does not exist")]
    BranchNotFound(String),

    #[error("repository `{0}` already exists")]
    RepositoryExists(String),

    #[error("store URL `{0}` is invalid")]
    InvalidStoreUrl(String),

    #[error("repository `{0}` is invalid (expected OWNER/NAME[@BRANCH])")]
    InvalidRepository(String),

    #[error("source `{0}` is invalid (expected OWNER/NAME[@BRANCH][:PATH,...][=PREFIX])")]
    InvalidSource(String),

    #[error("{0}")]
    Cli(String),

    #[error(transparent)]
    Other(AnyError),
}

#[derive(Error, Debug)]
pub struct AnyError(anyhow::Error);

impl Display for AnyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for AnyError {
    fn eq(&self, _other: &Self) -> bool {
        false
    }
}

impl Error {
    pub fn other<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Other(AnyError(error.into()))
    }

    pub fn read<P: ToString, R: ToString>(path: P, reason: R) -> Self {
        Error::Read {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Files that failed before a run ended without a commit.
    pub fn file_errors(&self) -> &[FileError] {
        match self {
            Error::Uncommitted { errors, .. } => errors,
            _ => &[],
        }
    }

    /// Whether the remote refused a tree because of its entries' paths.
    pub fn is_malformed_tree(&self) -> bool {
        matches!(
            self,
            Error::PathMalformed(_) | Error::RemotePermanent { status: 422, .. }
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(error: anyhow::Error) -> Self {
        Error::Other(AnyError(error))
    }
}
