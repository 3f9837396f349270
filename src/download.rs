//! C2: the provenance downloader.
//!
//! One operation, `download`, that materializes any *known* provenance into
//! a fresh, caller-owned directory. For an [`ArtifactProvenance`] that means
//! fetch-and-unpack; for a [`RepositoryProvenance`] it means acquiring the
//! working tree (C1), updating it non-recursively, pruning dangling nested
//! directories from a previous recursive update, and copying the root out.
//! The returned directory is independent of the cache — the caller may
//! delete it without racing future operations.

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

use crate::error::DownloadError;
use crate::model::{ArtifactProvenance, KnownProvenance, RepositoryProvenance};
use crate::vcs::VcsRegistry;
use crate::worktree::{WorkingTreeCache, WorkingTreeKey};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// `true` if a HEAD request against `url` succeeds (HTTP 200).
    async fn head_ok(&self, url: &str) -> Result<bool, DownloadError>;

    /// Downloads and unpacks the archive at `url` into `dest`, which must
    /// already exist and be empty.
    async fn fetch_and_unpack(&self, url: &str, dest: &Path) -> Result<(), DownloadError>;
}

pub struct ReqwestArtifactFetcher {
    client: reqwest::Client,
}

impl ReqwestArtifactFetcher {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for ReqwestArtifactFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactFetcher for ReqwestArtifactFetcher {
    async fn head_ok(&self, url: &str) -> Result<bool, DownloadError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| DownloadError::Http { url: url.to_string(), message: e.to_string() })?;
        Ok(response.status().is_success())
    }

    async fn fetch_and_unpack(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::Http { url: url.to_string(), message: e.to_string() })?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DownloadError::Http { url: url.to_string(), message: e.to_string() })?;
        let dest_owned = dest.to_path_buf();
        let dest_for_err = dest.to_path_buf();
        tokio::task::spawn_blocking(move || unpack_tar_gz(&bytes, &dest_owned))
            .await
            .map_err(|e| DownloadError::Unpack { path: dest_for_err.clone(), message: e.to_string() })?
            .map_err(|message| DownloadError::Unpack { path: dest_for_err, message })
    }
}

fn unpack_tar_gz(bytes: &[u8], dest: &Path) -> Result<(), String> {
    let decoder = flate2::read::GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);
    archive.unpack(dest).map_err(|e| e.to_string())
}

#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, provenance: &KnownProvenance) -> Result<PathBuf, DownloadError>;
}

pub struct DefaultDownloader<'a> {
    pub fetcher: &'a dyn ArtifactFetcher,
    pub working_trees: &'a WorkingTreeCache,
    pub vcs: &'a VcsRegistry,
    /// Base directory new download targets are created under.
    pub download_dir: PathBuf,
}

impl<'a> DefaultDownloader<'a> {
    pub fn new(
        fetcher: &'a dyn ArtifactFetcher,
        working_trees: &'a WorkingTreeCache,
        vcs: &'a VcsRegistry,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self { fetcher, working_trees, vcs, download_dir: download_dir.into() }
    }

    async fn fresh_dir(&self) -> Result<PathBuf, DownloadError> {
        let name = format!("dl-{}", crate::utils::sha256_hex(uuid_bytes().as_slice()));
        let dir = self.download_dir.join(name);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    async fn download_artifact(&self, artifact: &ArtifactProvenance) -> Result<PathBuf, DownloadError> {
        let dest = self.fresh_dir().await?;
        self.fetcher.fetch_and_unpack(&artifact.url, &dest).await?;
        Ok(dest)
    }

    async fn download_repository(&self, repo: &RepositoryProvenance) -> Result<PathBuf, DownloadError> {
        let key = WorkingTreeKey::new(&repo.vcs_type, &repo.url, "");
        let vcs = self.vcs;
        let revision = repo.resolved_revision.clone();
        let root_dir = self
            .working_trees
            .with_working_tree(key, vcs, move |dir| {
                let backend = vcs.resolve(&repo.vcs_type, &repo.url);
                async move {
                    let backend = backend.ok_or_else(|| {
                        crate::error::WorkingTreeError::Vcs("backend vanished".into())
                    })?;
                    backend
                        .update(&dir, &revision, false)
                        .await
                        .map_err(|e| crate::error::WorkingTreeError::Vcs(e.to_string()))?;
                    prune_dangling_nested_dirs(&dir, &backend).await;
                    Ok(dir)
                }
            })
            .await?;

        let dest = self.fresh_dir().await?;
        let src = root_dir;
        let dest_for_copy = dest.clone();
        tokio::task::spawn_blocking(move || {
            // `content_only` copies the tree's *contents* into the already-
            // existing `dest_for_copy` rather than nesting it one level
            // under a directory named after `src`.
            let mut options = fs_extra::dir::CopyOptions::new();
            options.content_only = true;
            options.overwrite = true;
            fs_extra::dir::copy(&src, &dest_for_copy, &options).map(|_| ())
        })
        .await
        .map_err(|e| DownloadError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?
        .map_err(|e| DownloadError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        Ok(dest)
    }
}

async fn prune_dangling_nested_dirs(dir: &Path, backend: &std::sync::Arc<dyn crate::vcs::VcsBackend>) {
    let Ok(nested) = backend.nested_working_trees(dir).await else { return };
    let declared: std::collections::HashSet<PathBuf> =
        nested.iter().map(|n| dir.join(&n.path)).collect();
    let Ok(entries) = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(3)
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
    else {
        return;
    };
    for entry in entries {
        if entry.file_type().is_dir() && entry.path().join(".git").exists() && !declared.contains(entry.path())
        {
            let _ = tokio::fs::remove_dir_all(entry.path()).await;
        }
    }
}

fn uuid_bytes() -> Vec<u8> {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    let tid = format!("{:?}", std::thread::current().id());
    format!("{nanos}-{tid}").into_bytes()
}

#[async_trait]
impl<'a> Downloader for DefaultDownloader<'a> {
    async fn download(&self, provenance: &KnownProvenance) -> Result<PathBuf, DownloadError> {
        match provenance {
            KnownProvenance::Artifact(artifact) => self.download_artifact(artifact).await,
            KnownProvenance::Repository(repo) => self.download_repository(repo).await,
        }
    }
}
