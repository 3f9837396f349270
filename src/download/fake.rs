//! Deterministic in-memory [`ArtifactFetcher`] and [`Downloader`] for tests,
//! in the same register as `vcs::fake` and `scanner::fake`: no network, no
//! real archive format, just files materialized directly into `dest`.

use super::{ArtifactFetcher, Downloader};
use crate::error::DownloadError;
use crate::model::KnownProvenance;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Clone, Default)]
pub struct FakeArtifact {
    pub head_ok: bool,
    /// Files materialized into `dest` on `fetch_and_unpack`, keyed by path
    /// relative to the archive root.
    pub files: BTreeMap<String, String>,
}

/// Stands in for fetching and unpacking a real tarball: `fetch_and_unpack`
/// writes `files` straight into `dest` rather than round-tripping through
/// `tar`/`flate2`.
#[derive(Default)]
pub struct FakeArtifactFetcher {
    artifacts: Mutex<BTreeMap<String, FakeArtifact>>,
    head_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl FakeArtifactFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifact(self, url: impl Into<String>, artifact: FakeArtifact) -> Self {
        self.artifacts.lock().unwrap().insert(url.into(), artifact);
        self
    }

    pub fn head_call_count(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_call_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactFetcher for FakeArtifactFetcher {
    async fn head_ok(&self, url: &str) -> Result<bool, DownloadError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.artifacts.lock().unwrap().get(url).map(|a| a.head_ok).unwrap_or(false))
    }

    async fn fetch_and_unpack(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let artifact = self.artifacts.lock().unwrap().get(url).cloned();
        let Some(artifact) = artifact else {
            return Err(DownloadError::Http {
                url: url.to_string(),
                message: "no fake artifact registered for this url".into(),
            });
        };
        for (path, contents) in &artifact.files {
            let full = dest.join(path);
            if let Some(parent) = full.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(full, contents).await?;
        }
        Ok(())
    }
}

/// A [`Downloader`] that always fails, for exercising §7's
/// *DownloadFailed* path without a real provenance to resolve.
pub struct FailingDownloader {
    pub message: String,
}

impl FailingDownloader {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[async_trait]
impl Downloader for FailingDownloader {
    async fn download(&self, _provenance: &KnownProvenance) -> Result<PathBuf, DownloadError> {
        Err(DownloadError::Http { url: String::new(), message: self.message.clone() })
    }
}
