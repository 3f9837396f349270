//! C4: the nested-provenance resolver.
//!
//! For a repository root, discovers embedded sub-repositories (submodules)
//! by updating the working tree *recursively* and asking the VCS backend
//! what it found, then persists the result with an intentional
//! over-approximation flag (`has_only_fixed_revisions = true`) so later
//! runs can skip revalidation entirely — the same cache-effectiveness
//! trade-off the teacher makes when it treats a `SolFilesCache` hit as
//! sufficient without re-hashing every import.

use crate::error::ScanError;
use crate::model::{KnownProvenance, NestedProvenance, RepositoryProvenance};
use crate::store::{NestedProvenanceStore, StoredNestedProvenance};
use crate::vcs::VcsRegistry;
use crate::worktree::{WorkingTreeCache, WorkingTreeKey};
use std::collections::BTreeMap;

pub struct NestedProvenanceResolver<'a> {
    pub vcs: &'a VcsRegistry,
    pub working_trees: &'a WorkingTreeCache,
    pub store: &'a dyn NestedProvenanceStore,
}

impl<'a> NestedProvenanceResolver<'a> {
    pub fn new(
        vcs: &'a VcsRegistry,
        working_trees: &'a WorkingTreeCache,
        store: &'a dyn NestedProvenanceStore,
    ) -> Self {
        Self { vcs, working_trees, store }
    }

    /// `provenance` must already have its VCS `path` stripped (the caller,
    /// the controller, resolves nested trees once per *root* checkout, not
    /// per package sub-path).
    pub async fn resolve(&self, provenance: &KnownProvenance) -> Result<NestedProvenance, ScanError> {
        let repo = match provenance {
            KnownProvenance::Artifact(_) => return Ok(NestedProvenance::trivial(provenance.clone())),
            KnownProvenance::Repository(repo) => repo,
        };
        debug_assert!(repo.is_root(), "nested-provenance resolution expects a path-stripped provenance");

        if let Some(stored) = self
            .store
            .read(&repo.vcs_type, &repo.url, &repo.resolved_revision)
            .await
            .unwrap_or(None)
        {
            if stored.has_only_fixed_revisions {
                return Ok(stored.nested_provenance);
            }
        }

        let nested = self.resolve_fresh(repo).await.map_err(|message| {
            ScanError::NestedProvenanceUnresolvable { message }
        })?;

        let stored = StoredNestedProvenance { nested_provenance: nested.clone(), has_only_fixed_revisions: true };
        let _ = self.store.write(&repo.vcs_type, &repo.url, &repo.resolved_revision, &stored).await;

        Ok(nested)
    }

    async fn resolve_fresh(&self, repo: &RepositoryProvenance) -> Result<NestedProvenance, String> {
        let key = WorkingTreeKey::new(repo.vcs_type.clone(), repo.url.clone(), "");
        let vcs = self.vcs;
        let resolved_revision = repo.resolved_revision.clone();

        let sub_repositories = self
            .working_trees
            .with_working_tree(key, vcs, move |dir| {
                let backend = vcs.resolve(&repo.vcs_type, &repo.url);
                async move {
                    let backend = backend.ok_or_else(|| {
                        crate::error::WorkingTreeError::Vcs("no backend for this VCS type".into())
                    })?;
                    backend
                        .update(&dir, &resolved_revision, true)
                        .await
                        .map_err(|e| crate::error::WorkingTreeError::Vcs(e.to_string()))?;
                    let nested = backend
                        .nested_working_trees(&dir)
                        .await
                        .map_err(|e| crate::error::WorkingTreeError::Vcs(e.to_string()))?;
                    let mut sub_repositories = BTreeMap::new();
                    for entry in nested {
                        sub_repositories.insert(
                            entry.path.clone(),
                            RepositoryProvenance {
                                vcs_type: backend.vcs_type().to_string(),
                                url: entry.url,
                                requested_revision: entry.revision.clone(),
                                resolved_revision: entry.revision,
                                path: entry.path,
                            },
                        );
                    }
                    Ok(sub_repositories)
                }
            })
            .await
            .map_err(|e| e.to_string())?;

        NestedProvenance::new(KnownProvenance::Repository(repo.clone()), sub_repositories)
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ArtifactProvenance;
    use crate::store::memory::MemoryNestedProvenanceStore;
    use crate::vcs::fake::{FakeRepo, FakeVcsBackend};
    use crate::vcs::NestedWorkingTree;

    #[tokio::test]
    async fn artifact_provenance_is_trivially_resolved() {
        let vcs = VcsRegistry::new();
        let working_trees = WorkingTreeCache::new(tempfile::tempdir().unwrap().into_path());
        let store = MemoryNestedProvenanceStore::new();
        let resolver = NestedProvenanceResolver::new(&vcs, &working_trees, &store);

        let provenance = KnownProvenance::Artifact(ArtifactProvenance {
            url: "https://example/a.tar.gz".into(),
            hash: "md5:0".into(),
        });
        let nested = resolver.resolve(&provenance).await.unwrap();
        assert!(nested.sub_repositories.is_empty());
    }

    #[tokio::test]
    async fn discovers_submodules_and_caches_with_fixed_flag() {
        let mut vcs = VcsRegistry::new();
        vcs.register(FakeVcsBackend::new("git").with_repo(
            "https://example/repo",
            FakeRepo {
                submodules: vec![NestedWorkingTree {
                    path: "vendor/x".into(),
                    url: "https://example/vendor-x".into(),
                    revision: "cafebabe".into(),
                }],
                ..Default::default()
            },
        ));
        let working_trees = WorkingTreeCache::new(tempfile::tempdir().unwrap().into_path());
        let store = MemoryNestedProvenanceStore::new();
        let resolver = NestedProvenanceResolver::new(&vcs, &working_trees, &store);

        let provenance = KnownProvenance::Repository(RepositoryProvenance {
            vcs_type: "git".into(),
            url: "https://example/repo".into(),
            requested_revision: "main".into(),
            resolved_revision: "deadbeef".into(),
            path: String::new(),
        });
        let nested = resolver.resolve(&provenance).await.unwrap();
        assert_eq!(nested.sub_repositories.len(), 1);
        assert!(nested.sub_repositories.contains_key("vendor/x"));

        let stored = store.read("git", "https://example/repo", "deadbeef").await.unwrap().unwrap();
        assert!(stored.has_only_fixed_revisions);
    }
}
