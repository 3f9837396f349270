//! C3: the package-provenance resolver.
//!
//! Walks a package's configured source-code origins in priority order,
//! validating each candidate against the real world (an HTTP HEAD, or a
//! VCS checkout) rather than trusting declared metadata, and caches both
//! successful and failed outcomes so re-runs don't repeat expensive network
//! work. The origin walk itself mirrors the teacher's `MultiCompiler`
//! picking the first compiler in its configured list that accepts a given
//! source file — generalized here from "which compiler" to "which
//! source-code origin".

use crate::download::ArtifactFetcher;
use crate::error::ScanError;
use crate::model::{
    ArtifactProvenance, Identifier, KnownProvenance, Origin, Package, RepositoryProvenance,
};
use crate::store::{PackageProvenanceResolutionResult, PackageProvenanceStore};
use crate::vcs::VcsRegistry;
use crate::worktree::{WorkingTreeCache, WorkingTreeKey};

pub struct PackageProvenanceResolver<'a> {
    pub fetcher: &'a dyn ArtifactFetcher,
    pub vcs: &'a VcsRegistry,
    pub working_trees: &'a WorkingTreeCache,
    pub store: &'a dyn PackageProvenanceStore,
}

impl<'a> PackageProvenanceResolver<'a> {
    pub fn new(
        fetcher: &'a dyn ArtifactFetcher,
        vcs: &'a VcsRegistry,
        working_trees: &'a WorkingTreeCache,
        store: &'a dyn PackageProvenanceStore,
    ) -> Self {
        Self { fetcher, vcs, working_trees, store }
    }

    pub async fn resolve(
        &self,
        pkg: &Package,
        origin_priority: &[Origin],
    ) -> Result<KnownProvenance, ScanError> {
        let mut last_message = "no source-code origin configured".to_string();

        for origin in origin_priority {
            let outcome = match origin {
                Origin::Artifact => self.try_artifact(&pkg.id, pkg).await,
                Origin::Vcs => self.try_vcs(&pkg.id, pkg).await,
            };
            match outcome {
                Some(Ok(provenance)) => return Ok(provenance),
                Some(Err(message)) => last_message = message,
                None => {}
            }
        }

        Err(ScanError::provenance_unresolvable(pkg.id.clone(), last_message))
    }

    /// `None` if this origin has no declared metadata to try; `Some(Err)`
    /// carries the diagnostic that should surface if every origin fails.
    async fn try_artifact(&self, id: &Identifier, pkg: &Package) -> Option<Result<KnownProvenance, String>> {
        if pkg.source_artifact.is_empty() {
            return None;
        }
        let key = artifact_key(&pkg.source_artifact);

        if let Ok(Some(cached)) = self.store.read(id, &key).await {
            match cached {
                PackageProvenanceResolutionResult::Resolved { provenance, .. } => {
                    return Some(Ok(provenance));
                }
                PackageProvenanceResolutionResult::Unresolved { message } => return Some(Err(message)),
            }
        }

        let result = self.fetcher.head_ok(&pkg.source_artifact.url).await;
        let outcome = match result {
            Ok(true) => {
                let provenance = KnownProvenance::Artifact(ArtifactProvenance {
                    url: pkg.source_artifact.url.clone(),
                    hash: pkg.source_artifact.hash.clone(),
                });
                Ok(provenance)
            }
            Ok(false) => Err(format!("HEAD request for {} did not return 200", pkg.source_artifact.url)),
            Err(e) => Err(e.to_string()),
        };

        let stored = match &outcome {
            Ok(provenance) => {
                PackageProvenanceResolutionResult::Resolved { provenance: provenance.clone(), fixed: true }
            }
            Err(message) => PackageProvenanceResolutionResult::Unresolved { message: message.clone() },
        };
        let _ = self.store.write(id, &key, &stored).await;

        Some(outcome)
    }

    async fn try_vcs(&self, id: &Identifier, pkg: &Package) -> Option<Result<KnownProvenance, String>> {
        if pkg.vcs_info.is_empty() {
            return None;
        }
        let key = vcs_key(&pkg.vcs_info);

        if let Ok(Some(cached)) = self.store.read(id, &key).await {
            match cached {
                PackageProvenanceResolutionResult::Resolved { provenance, fixed: true } => {
                    return Some(Ok(provenance));
                }
                PackageProvenanceResolutionResult::Unresolved { message } => return Some(Err(message)),
                // A moving-ref result must be revalidated, not replayed.
                PackageProvenanceResolutionResult::Resolved { fixed: false, .. } => {}
            }
        }

        let vcs_info = pkg.vcs_info.clone();
        let working_tree_key =
            WorkingTreeKey::new(vcs_info.vcs_type.clone(), vcs_info.url.clone(), "");
        let vcs = self.vcs;
        let outcome: Result<(String, bool), String> = self
            .working_trees
            .with_working_tree(working_tree_key, vcs, move |dir| {
                let backend = vcs.resolve(&vcs_info.vcs_type, &vcs_info.url);
                async move {
                    let backend = backend.ok_or_else(|| {
                        crate::error::WorkingTreeError::Vcs("no backend for this VCS type".into())
                    })?;
                    let candidates = backend
                        .revision_candidates(&dir, &vcs_info.revision)
                        .await
                        .map_err(|e| crate::error::WorkingTreeError::Vcs(e.to_string()))?;

                    for candidate in candidates {
                        if backend.update(&dir, &candidate.revision, false).await.is_err() {
                            continue;
                        }
                        let resolved = backend
                            .current_revision(&dir)
                            .await
                            .map_err(|e| crate::error::WorkingTreeError::Vcs(e.to_string()))?;
                        return Ok((resolved, candidate.fixed));
                    }
                    Err(crate::error::WorkingTreeError::Vcs(
                        "no revision candidate could be checked out".into(),
                    ))
                }
            })
            .await
            .map_err(|e| e.to_string());

        let outcome = outcome.map(|(resolved_revision, fixed)| {
            let provenance = KnownProvenance::Repository(RepositoryProvenance {
                vcs_type: pkg.vcs_info.vcs_type.clone(),
                url: pkg.vcs_info.url.clone(),
                requested_revision: pkg.vcs_info.revision.clone(),
                resolved_revision,
                path: pkg.vcs_info.path.clone(),
            });
            (provenance, fixed)
        });

        let stored = match &outcome {
            Ok((provenance, fixed)) => {
                PackageProvenanceResolutionResult::Resolved { provenance: provenance.clone(), fixed: *fixed }
            }
            Err(message) => PackageProvenanceResolutionResult::Unresolved { message: message.clone() },
        };
        let _ = self.store.write(id, &key, &stored).await;

        Some(outcome.map(|(provenance, _)| provenance))
    }
}

fn artifact_key(artifact: &crate::model::SourceArtifact) -> String {
    format!("{}#{}", artifact.url, artifact.hash)
}

fn vcs_key(vcs_info: &crate::model::VcsInfo) -> String {
    format!("{}+{}#{}#{}", vcs_info.vcs_type, vcs_info.url, vcs_info.revision, vcs_info.path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::ReqwestArtifactFetcher;
    use crate::model::{Identifier, Package, SourceArtifact, VcsInfo};
    use crate::store::memory::MemoryPackageProvenanceStore;
    use crate::vcs::fake::{FakeRepo, FakeVcsBackend};

    fn pkg_with_vcs(path: &str) -> Package {
        Package {
            id: Identifier::new("npm", "", "left-pad", "1.0.0"),
            vcs_info: VcsInfo {
                vcs_type: "git".into(),
                url: "https://example/repo".into(),
                revision: "v1.0.0".into(),
                path: path.into(),
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn resolves_via_vcs_and_caches_fixed_result() {
        let fetcher = ReqwestArtifactFetcher::new();
        let mut vcs = VcsRegistry::new();
        vcs.register(FakeVcsBackend::new("git").with_repo(
            "https://example/repo",
            FakeRepo {
                candidates: vec![crate::vcs::RevisionCandidate { revision: "deadbeef".into(), fixed: true }],
                ..Default::default()
            },
        ));
        let working_trees = WorkingTreeCache::new(tempfile::tempdir().unwrap().into_path());
        let store = MemoryPackageProvenanceStore::new();
        let resolver = PackageProvenanceResolver::new(&fetcher, &vcs, &working_trees, &store);

        let pkg = pkg_with_vcs("");
        let provenance = resolver.resolve(&pkg, &[Origin::Vcs]).await.unwrap();
        assert!(matches!(provenance, KnownProvenance::Repository(r) if r.resolved_revision == "deadbeef"));

        let key = vcs_key(&pkg.vcs_info);
        let cached = store.read(&pkg.id, &key).await.unwrap().unwrap();
        assert!(matches!(
            cached,
            PackageProvenanceResolutionResult::Resolved { fixed: true, .. }
        ));
    }

    #[tokio::test]
    async fn unresolvable_package_reports_diagnostic() {
        let fetcher = ReqwestArtifactFetcher::new();
        let vcs = VcsRegistry::new();
        let working_trees = WorkingTreeCache::new(tempfile::tempdir().unwrap().into_path());
        let store = MemoryPackageProvenanceStore::new();
        let resolver = PackageProvenanceResolver::new(&fetcher, &vcs, &working_trees, &store);

        let pkg = Package {
            id: Identifier::new("npm", "", "nothing", "1.0.0"),
            source_artifact: SourceArtifact::default(),
            vcs_info: VcsInfo::default(),
            ..Default::default()
        };
        let result = resolver.resolve(&pkg, &[Origin::Vcs, Origin::Artifact]).await;
        assert!(matches!(result, Err(ScanError::ProvenanceUnresolvable { .. })));
    }
}
