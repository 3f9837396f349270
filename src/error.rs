//! Error taxonomy (spec §7).
//!
//! Errors split into two families. [`ScanError`] covers everything that can
//! happen while resolving or scanning a *single* package or provenance; it
//! is recoverable by construction — every call site that can produce one
//! folds it into an [`crate::model::Issue`] instead of propagating it.
//! [`FatalError`] covers the three conditions that abort a whole run; it is
//! the only error type `ScanController::scan` can return `Err` for.

use crate::model::Identifier;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("provenance unresolvable for {id}: {message}")]
    ProvenanceUnresolvable { id: Identifier, message: String },

    #[error("nested provenance unresolvable: {message}")]
    NestedProvenanceUnresolvable { message: String },

    #[error("could not download provenance: {message}")]
    DownloadFailed { message: String },

    #[error("scan storage error: {message}")]
    ScanStorage { message: String },

    #[error("scanner {scanner} failed for provenance: {message}")]
    ScannerFailure { scanner: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScanError {
    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed { message: message.into() }
    }

    pub fn provenance_unresolvable(id: Identifier, message: impl Into<String>) -> Self {
        Self::ProvenanceUnresolvable { id, message: message.into() }
    }
}

/// The three fatal, run-aborting conditions from §7. Nothing else may
/// escape [`crate::controller::ScanController::scan`] as an `Err`.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("unsupported VCS type or URL: {0}")]
    UnsupportedVcs(String),

    #[error("working-tree cache has already been shut down")]
    CacheShutDown,

    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),
}

/// Errors specific to the working-tree cache (C1), convertible into
/// [`FatalError`] at the point the controller owns the cache for a run.
#[derive(Debug, thiserror::Error)]
pub enum WorkingTreeError {
    #[error(transparent)]
    Fatal(#[from] FatalError),

    #[error("vcs operation failed: {0}")]
    Vcs(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from materializing a provenance into a local directory (C2).
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error(transparent)]
    WorkingTree(#[from] WorkingTreeError),

    #[error("http error fetching {url}: {message}")]
    Http { url: String, message: String },

    #[error("failed to unpack archive from {path}: {message}")]
    Unpack { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    pub fn into_scan_error(self) -> ScanError {
        ScanError::download_failed(self.to_string())
    }
}
