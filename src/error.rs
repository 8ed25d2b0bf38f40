//! Errors raised while discovering, rendering and writing site files.
//!
//! Every variant names the path it failed on, so the batch driver can abort
//! with a useful message and the dev server can pick a status code.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiteError {
    #[error("failed to read `{0}`")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("failed to write `{0}`")]
    Write(PathBuf, #[source] std::io::Error),

    #[error("failed to walk `{0}`")]
    Walk(PathBuf, #[source] walkdir::Error),

    #[error("failed to read template `{0}`")]
    Template(PathBuf, #[source] std::io::Error),

    #[error("`{0}` is not valid UTF-8")]
    NotUtf8(PathBuf),

    #[error("invalid front matter in `{0}`: {1}")]
    FrontMatter(PathBuf, String),

    #[error("failed to watch `{0}`")]
    Watch(PathBuf, #[source] notify::Error),
}

impl SiteError {
    /// Whether the error means the requested file simply is not there.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Read(_, err) if err.kind() == std::io::ErrorKind::NotFound)
    }
}

pub type SiteResult<T> = std::result::Result<T, SiteError>;
