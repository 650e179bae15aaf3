//! Crate-wide error taxonomy.
//!
//! Mirrors the error kinds called out by the indexing/search design: most
//! are recovered internally by the Indexer (`NotFound`, `BadFile`), some are
//! fatal at startup (`NotInRepository`, `MigrationFailure`), and
//! `EmbeddingProviderFailure` aborts the current Indexer run as a whole.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Error {
    /// No version-control marker found walking up from the start path.
    NotInRepository(PathBuf),
    /// A local lookup came back empty; callers treat this as absence, not failure.
    NotFound(String),
    /// The store detected a duplicate it didn't expect.
    AlreadyExists(String),
    /// A file disappeared or its rendered content no longer matches its stored digest.
    BadFile(PathBuf),
    /// The embedding provider RPC failed; the caller rolls back the whole Indexer run.
    EmbeddingProviderFailure(String),
    /// A schema migration could not be applied; the store refuses to serve.
    MigrationFailure(String),
    Io(std::io::Error),
    Sql(rusqlite::Error),
    Http(reqwest::Error),
    Json(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotInRepository(p) => {
                write!(f, "not inside a repository (searched upward from {})", p.display())
            }
            Error::NotFound(what) => write!(f, "not found: {what}"),
            Error::AlreadyExists(what) => write!(f, "already exists: {what}"),
            Error::BadFile(p) => write!(f, "bad file: {}", p.display()),
            Error::EmbeddingProviderFailure(msg) => write!(f, "embedding provider failed: {msg}"),
            Error::MigrationFailure(msg) => write!(f, "migration failed: {msg}"),
            Error::Io(e) => write!(f, "io error: {e}"),
            Error::Sql(e) => write!(f, "sql error: {e}"),
            Error::Http(e) => write!(f, "http error: {e}"),
            Error::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Sql(e) => Some(e),
            Error::Http(e) => Some(e),
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Sql(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
