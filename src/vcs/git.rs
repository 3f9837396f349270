//! A `git2`-backed [`VcsBackend`]. `git2` itself is synchronous; every
//! method hands the blocking work to [`tokio::task::spawn_blocking`], the
//! same pattern the teacher uses in `SolFilesCache::async_read`/`async_write`
//! to keep blocking file I/O off the async executor.

use super::{NestedWorkingTree, RevisionCandidate, VcsBackend, VcsBackendError};
use async_trait::async_trait;
use git2::{Repository, SubmoduleIgnore};
use std::path::Path;

pub struct GitBackend;

impl GitBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GitBackend {
    fn default() -> Self {
        Self::new()
    }
}

async fn blocking<T, F>(f: F) -> Result<T, VcsBackendError>
where
    F: FnOnce() -> Result<T, git2::Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| VcsBackendError::msg(e.to_string()))?
        .map_err(|e| VcsBackendError::msg(e.to_string()))
}

#[async_trait]
impl VcsBackend for GitBackend {
    fn vcs_type(&self) -> &str {
        "git"
    }

    fn accepts(&self, url: &str) -> bool {
        url.ends_with(".git")
            || url.starts_with("git://")
            || url.starts_with("git@")
            || url.starts_with("https://")
            || url.starts_with("http://")
            || url.starts_with("ssh://")
    }

    async fn init(&self, dir: &Path, url: &str) -> Result<(), VcsBackendError> {
        let dir = dir.to_path_buf();
        let url = url.to_string();
        blocking(move || {
            if dir.join(".git").exists() {
                return Ok(());
            }
            let mut builder = git2::build::RepoBuilder::new();
            builder.bare(false);
            // `clone` performs the equivalent of `git clone --no-checkout`
            // is not directly exposed; we clone normally and the first
            // `update()` call simply resets to the requested revision.
            builder.clone(&url, &dir)?;
            Ok(())
        })
        .await
    }

    async fn update(&self, dir: &Path, revision: &str, recursive: bool) -> Result<(), VcsBackendError> {
        let dir = dir.to_path_buf();
        let revision = revision.to_string();
        blocking(move || {
            let repo = Repository::open(&dir)?;
            {
                let mut remote = repo.find_remote("origin")?;
                remote.fetch(&[&revision] as &[&str], None, None).or_else(|_| remote.fetch::<&str>(&[], None, None))?;
            }
            let object = repo.revparse_single(&revision)?;
            repo.set_head_detached(object.id())?;
            let mut checkout = git2::build::CheckoutBuilder::new();
            checkout.force();
            repo.checkout_head(Some(&mut checkout))?;

            if recursive {
                for mut submodule in repo.submodules()? {
                    submodule.update(true, None)?;
                }
            }
            Ok(())
        })
        .await
    }

    async fn current_revision(&self, dir: &Path) -> Result<String, VcsBackendError> {
        let dir = dir.to_path_buf();
        blocking(move || {
            let repo = Repository::open(&dir)?;
            let head = repo.head()?;
            let oid = head.peel_to_commit()?.id();
            Ok(oid.to_string())
        })
        .await
    }

    async fn revision_candidates(
        &self,
        dir: &Path,
        requested_revision: &str,
    ) -> Result<Vec<RevisionCandidate>, VcsBackendError> {
        if requested_revision.is_empty() {
            return Ok(vec![RevisionCandidate { revision: "HEAD".into(), fixed: false }]);
        }
        let dir = dir.to_path_buf();
        let requested = requested_revision.to_string();
        blocking(move || {
            let repo = Repository::open(&dir)?;
            let mut candidates = Vec::new();
            // A 40-char hex string is a fixed commit id by construction.
            let looks_like_sha = requested.len() >= 7
                && requested.len() <= 40
                && requested.chars().all(|c| c.is_ascii_hexdigit());
            if looks_like_sha {
                candidates.push(RevisionCandidate { revision: requested.clone(), fixed: true });
            }
            // Tags are fixed; branches and bare `HEAD` are moving refs.
            if repo.find_reference(&format!("refs/tags/{requested}")).is_ok() {
                candidates.push(RevisionCandidate { revision: requested.clone(), fixed: true });
            }
            if !looks_like_sha {
                candidates.push(RevisionCandidate { revision: requested.clone(), fixed: false });
            }
            Ok(candidates)
        })
        .await
    }

    async fn nested_working_trees(&self, dir: &Path) -> Result<Vec<NestedWorkingTree>, VcsBackendError> {
        let dir = dir.to_path_buf();
        blocking(move || {
            let repo = Repository::open(&dir)?;
            let mut nested = Vec::new();
            for mut submodule in repo.submodules()? {
                submodule.set_ignore(SubmoduleIgnore::None);
                let path = path_slash::PathExt::to_slash_lossy(submodule.path()).to_string();
                let url = submodule.url().unwrap_or_default().to_string();
                let revision = submodule
                    .workdir_id()
                    .or_else(|| submodule.head_id())
                    .map(|id| id.to_string())
                    .unwrap_or_default();
                nested.push(NestedWorkingTree { path, url, revision });
            }
            Ok(nested)
        })
        .await
    }
}
