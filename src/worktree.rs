//! C1: the working-tree cache.
//!
//! A process-wide (well, run-wide — see [`crate::controller`]'s ownership
//! note) pool of initialized VCS working trees, keyed by `(vcs_type, url,
//! path)`. Exposes exactly one operation: run an arbitrary action with
//! exclusive access to the working tree for a key. Repeated scans of
//! packages sharing a VCS URL dominate wall time; reusing one checkout
//! amortizes clone cost while per-key locking keeps distinct repositories
//! scanning in parallel.

use crate::error::{FatalError, WorkingTreeError};
use crate::vcs::VcsRegistry;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct WorkingTreeKey {
    pub vcs_type: String,
    pub url: String,
    pub path: String,
}

impl WorkingTreeKey {
    pub fn new(vcs_type: impl Into<String>, url: impl Into<String>, path: impl Into<String>) -> Self {
        Self { vcs_type: vcs_type.into(), url: url.into(), path: path.into() }
    }

    fn dir_name(&self) -> String {
        crate::utils::sha256_hex(format!("{}\0{}\0{}", self.vcs_type, self.url, self.path).as_bytes())
    }
}

struct WorkingTreeState {
    dir: PathBuf,
    initialized: bool,
}

/// Access is mediated through a per-key [`tokio::sync::Mutex`] so an action
/// may suspend on I/O (clone/update) without blocking unrelated keys; the
/// map itself is guarded by a short-held `std::sync::Mutex` that is never
/// held across an `.await`.
pub struct WorkingTreeCache {
    base_dir: PathBuf,
    trees: std::sync::Mutex<HashMap<WorkingTreeKey, Arc<Mutex<WorkingTreeState>>>>,
    terminated: AtomicBool,
}

impl WorkingTreeCache {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            trees: std::sync::Mutex::new(HashMap::new()),
            terminated: AtomicBool::new(false),
        }
    }

    fn entry(&self, key: &WorkingTreeKey) -> Arc<Mutex<WorkingTreeState>> {
        let mut trees = self.trees.lock().unwrap();
        trees
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(WorkingTreeState {
                    dir: self.base_dir.join(key.dir_name()),
                    initialized: false,
                }))
            })
            .clone()
    }

    /// Executes `action` with exclusive access to the working tree for
    /// `key`. On first use of the key a fresh directory is allocated and
    /// the VCS is initialized there (no revision checked out yet); the
    /// action sees the tree in whatever state the previous action left it
    /// — the cache itself never updates revisions.
    pub async fn with_working_tree<T, F, Fut>(
        &self,
        key: WorkingTreeKey,
        vcs: &VcsRegistry,
        action: F,
    ) -> Result<T, WorkingTreeError>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = Result<T, WorkingTreeError>>,
    {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(FatalError::CacheShutDown.into());
        }

        let state = self.entry(&key);
        let mut guard = state.lock().await;

        // Re-check after acquiring the lock: shutdown may have raced us to
        // the front of the queue for this key.
        if self.terminated.load(Ordering::SeqCst) {
            return Err(FatalError::CacheShutDown.into());
        }

        if !guard.initialized {
            let backend = vcs
                .resolve(&key.vcs_type, &key.url)
                .ok_or_else(|| FatalError::UnsupportedVcs(key.vcs_type.clone()))?;
            tokio::fs::create_dir_all(&guard.dir).await?;
            backend
                .init(&guard.dir, &key.url)
                .await
                .map_err(|e| WorkingTreeError::Vcs(e.to_string()))?;
            guard.initialized = true;
        }

        let dir = guard.dir.clone();
        // Drop the lock while running the action? No — mutual exclusion for
        // this key must hold for the whole action, so the guard stays live.
        let result = action(dir).await;
        drop(guard);
        result
    }

    /// Waits for all in-flight actions to release their keys, then deletes
    /// every working directory and marks the cache terminated. Any
    /// subsequent call fails with [`FatalError::CacheShutDown`].
    pub async fn shutdown(&self) -> Result<(), WorkingTreeError> {
        self.terminated.store(true, Ordering::SeqCst);
        let entries: Vec<_> = self.trees.lock().unwrap().drain().collect();
        for (_, state) in entries {
            // Acquiring the lock waits for whatever action currently holds
            // this key to finish before we remove its directory.
            let guard = state.lock().await;
            if guard.dir.exists() {
                let dir = guard.dir.clone();
                tokio::task::spawn_blocking(move || std::fs::remove_dir_all(dir))
                    .await
                    .map_err(|e| WorkingTreeError::Vcs(e.to_string()))??;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::fake::FakeVcsBackend;

    #[tokio::test]
    async fn initializes_once_and_persists_state_across_actions() {
        let dir = tempfile::tempdir().unwrap();
        let cache = WorkingTreeCache::new(dir.path());
        let mut registry = VcsRegistry::new();
        registry.register(FakeVcsBackend::new("git"));
        let key = WorkingTreeKey::new("git", "https://example/repo", "");

        let inits_before = FakeVcsBackend::init_count();
        cache
            .with_working_tree(key.clone(), &registry, |path| async move {
                tokio::fs::write(path.join("marker"), b"1").await?;
                Ok(())
            })
            .await
            .unwrap();
        cache
            .with_working_tree(key.clone(), &registry, |path| async move {
                let contents = tokio::fs::read(path.join("marker")).await?;
                assert_eq!(contents, b"1");
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(FakeVcsBackend::init_count() - inits_before, 1);
    }

    #[tokio::test]
    async fn unsupported_vcs_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cache = WorkingTreeCache::new(dir.path());
        let registry = VcsRegistry::new();
        let key = WorkingTreeKey::new("svn", "https://example/repo", "");
        let result = cache.with_working_tree(key, &registry, |_| async { Ok(()) }).await;
        assert!(matches!(result, Err(WorkingTreeError::Fatal(FatalError::UnsupportedVcs(_)))));
    }

    #[tokio::test]
    async fn shutdown_removes_directories_and_blocks_new_use() {
        let dir = tempfile::tempdir().unwrap();
        let cache = WorkingTreeCache::new(dir.path());
        let mut registry = VcsRegistry::new();
        registry.register(FakeVcsBackend::new("git"));
        let key = WorkingTreeKey::new("git", "https://example/repo", "");

        let working_dir = cache
            .with_working_tree(key.clone(), &registry, |path| async move { Ok(path) })
            .await
            .unwrap();
        assert!(working_dir.exists());

        cache.shutdown().await.unwrap();
        assert!(!working_dir.exists());

        let result = cache.with_working_tree(key, &registry, |_| async { Ok(()) }).await;
        assert!(matches!(result, Err(WorkingTreeError::Fatal(FatalError::CacheShutDown))));
    }
}
