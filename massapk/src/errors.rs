use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::utils::path_str;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported host platform: {0}")]
    UnsupportedPlatform(String),

    #[error("required binary `{0}` not available to context")]
    MissingBin(String),
    #[error("missing required env var: {0}")]
    MissingEnv(String),

    #[error("{0}")]
    IO(io::Error),

    #[error("command failed with status {0}: {1}")]
    CommandError(i32, String),

    #[error("task was cancelled by user")]
    Cancelled,

    #[error("failed to get basedirs")]
    NoBaseDirs,

    #[error("no device connected after waiting {0} seconds")]
    DeviceTimeout(u64),

    #[error("no path reported for package {0}")]
    NoPackagePath(String),

    #[error("failed to pull {0}: {1}")]
    PullFailed(String, String),

    #[error("{0:?} already exists")]
    BackupExists(PathBuf),

    #[error("{0:?} isn't a directory")]
    NotADirectory(PathBuf),

    #[error("zip archive error: {0}")]
    Archive(String),

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("decryption failed, wrong password or corrupted archive")]
    Decrypt,

    #[error("not an encrypted backup: {0}")]
    BadEnvelope(String),

    #[error("generic error: {0}")]
    Generic(String),

    #[error("invalid config {0}: {1}")]
    InvalidConfig(String, String),

    #[error("file or folder {0} doesn't exist")]
    MissingFile(String),
}

impl Error {
    pub fn new_generic<S: ToString + ?Sized>(s: &S) -> Self {
        Self::Generic(s.to_string())
    }

    pub fn new_cfg<S: ToString + ?Sized>(path: &Path, s: &S) -> Self {
        Self::InvalidConfig(path_str(path).into_owned(), s.to_string())
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::IO(err)
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Self::IO(e),
            e => Self::Archive(e.to_string()),
        }
    }
}
