//! An in-memory [`VcsBackend`] used by unit and integration tests, in the
//! same register as the teacher's `project_util`/`tests/mocked.rs` fakes:
//! deterministic, no network or real VCS tooling required.
//!
//! Mirrors real git's trick of remembering `origin` in on-disk state: `init`
//! stamps the working directory with a `.fake-url` marker so later calls
//! (`update`, `revision_candidates`, ...) that only receive `dir` can still
//! look up which fake repository they belong to.

use super::{NestedWorkingTree, RevisionCandidate, VcsBackend, VcsBackendError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

static INIT_COUNT: Lazy<AtomicUsize> = Lazy::new(|| AtomicUsize::new(0));
static UPDATE_COUNT: Lazy<AtomicUsize> = Lazy::new(|| AtomicUsize::new(0));

#[derive(Clone, Default)]
pub struct FakeRepo {
    pub candidates: Vec<RevisionCandidate>,
    pub submodules: Vec<NestedWorkingTree>,
    /// Files materialized into the working tree on `update`, keyed by
    /// repository-relative path.
    pub files: BTreeMap<String, String>,
}

pub struct FakeVcsBackend {
    vcs_type: String,
    repos: Mutex<BTreeMap<String, FakeRepo>>,
}

const URL_MARKER: &str = ".fake-url";
const HEAD_MARKER: &str = ".fake-head";

impl FakeVcsBackend {
    pub fn new(vcs_type: impl Into<String>) -> Self {
        Self { vcs_type: vcs_type.into(), repos: Mutex::new(BTreeMap::new()) }
    }

    pub fn with_repo(self, url: impl Into<String>, repo: FakeRepo) -> Self {
        self.repos.lock().unwrap().insert(url.into(), repo);
        self
    }

    pub fn init_count() -> usize {
        INIT_COUNT.load(Ordering::SeqCst)
    }

    pub fn update_count() -> usize {
        UPDATE_COUNT.load(Ordering::SeqCst)
    }

    fn repo_for(&self, url: &str) -> FakeRepo {
        self.repos.lock().unwrap().get(url).cloned().unwrap_or_default()
    }

    async fn read_url(dir: &Path) -> Result<String, VcsBackendError> {
        tokio::fs::read_to_string(dir.join(URL_MARKER))
            .await
            .map_err(|e| VcsBackendError::msg(format!("fake working tree not initialized: {e}")))
    }
}

#[async_trait]
impl VcsBackend for FakeVcsBackend {
    fn vcs_type(&self) -> &str {
        &self.vcs_type
    }

    async fn init(&self, dir: &Path, url: &str) -> Result<(), VcsBackendError> {
        INIT_COUNT.fetch_add(1, Ordering::SeqCst);
        tokio::fs::create_dir_all(dir).await.map_err(|e| VcsBackendError::msg(e.to_string()))?;
        tokio::fs::write(dir.join(URL_MARKER), url)
            .await
            .map_err(|e| VcsBackendError::msg(e.to_string()))
    }

    async fn update(&self, dir: &Path, revision: &str, recursive: bool) -> Result<(), VcsBackendError> {
        UPDATE_COUNT.fetch_add(1, Ordering::SeqCst);
        let url = Self::read_url(dir).await?;
        let repo = self.repo_for(&url);
        for (path, contents) in &repo.files {
            let full = dir.join(path);
            if let Some(parent) = full.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| VcsBackendError::msg(e.to_string()))?;
            }
            tokio::fs::write(full, contents).await.map_err(|e| VcsBackendError::msg(e.to_string()))?;
        }
        if recursive {
            for nested in &repo.submodules {
                let nested_dir = dir.join(&nested.path);
                tokio::fs::create_dir_all(&nested_dir)
                    .await
                    .map_err(|e| VcsBackendError::msg(e.to_string()))?;
                tokio::fs::write(nested_dir.join(URL_MARKER), &nested.url)
                    .await
                    .map_err(|e| VcsBackendError::msg(e.to_string()))?;
                tokio::fs::write(nested_dir.join(HEAD_MARKER), &nested.revision)
                    .await
                    .map_err(|e| VcsBackendError::msg(e.to_string()))?;
            }
        }
        tokio::fs::write(dir.join(HEAD_MARKER), revision)
            .await
            .map_err(|e| VcsBackendError::msg(e.to_string()))
    }

    async fn current_revision(&self, dir: &Path) -> Result<String, VcsBackendError> {
        match tokio::fs::read_to_string(dir.join(HEAD_MARKER)).await {
            Ok(rev) => Ok(rev),
            Err(_) => Ok("0000000000000000000000000000000000000000".to_string()),
        }
    }

    async fn revision_candidates(
        &self,
        dir: &Path,
        requested_revision: &str,
    ) -> Result<Vec<RevisionCandidate>, VcsBackendError> {
        let url = Self::read_url(dir).await?;
        let repo = self.repo_for(&url);
        if !repo.candidates.is_empty() {
            return Ok(repo.candidates);
        }
        if requested_revision.is_empty() {
            Ok(vec![RevisionCandidate { revision: "main".into(), fixed: false }])
        } else {
            Ok(vec![RevisionCandidate { revision: requested_revision.to_string(), fixed: true }])
        }
    }

    async fn nested_working_trees(&self, dir: &Path) -> Result<Vec<NestedWorkingTree>, VcsBackendError> {
        let url = Self::read_url(dir).await?;
        Ok(self.repo_for(&url).submodules)
    }
}
