//! Error taxonomy for a mirror run
//!
//! Only [`MirrorError::Persist`] is ever surfaced as a run-level failure. The
//! other variants are recovered where they occur and exist so that the
//! recovery path logs a typed, greppable message.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirrorError {
    /// The persisted record could not be read or parsed
    #[error("Configuration error in {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// No removable mirror target was usable
    #[error("No removable storage found under {candidates:?}")]
    StorageUnavailable { candidates: Vec<PathBuf> },

    /// The remote repository listing could not be obtained
    #[error("Catalog fetch failed: {0}")]
    CatalogFetch(String),

    /// A single repository clone or update failed
    #[error("{operation} failed for {repo}: {diagnostic}")]
    VcsOperation {
        repo: String,
        operation: &'static str,
        diagnostic: String,
    },

    /// The persisted record could not be written back
    #[error("Failed to persist configuration to {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, MirrorError>;
