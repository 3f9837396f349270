use super::provenance::{KnownProvenance, RepositoryProvenance};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A provenance plus a map from sub-tree paths to the provenances of
/// embedded repositories (submodules / subrepos).
///
/// Path keys are forward-slash, carry no trailing slash, are non-overlapping
/// prefixes, and are never empty (the root occupies `""` implicitly via
/// [`NestedProvenance::root`]). An [`ArtifactProvenance`](super::provenance::ArtifactProvenance)
/// root always has an empty `sub_repositories` map; both invariants are
/// enforced in [`NestedProvenance::new`] rather than left to callers.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedProvenance {
    pub root: KnownProvenance,
    pub sub_repositories: BTreeMap<String, RepositoryProvenance>,
}

#[derive(Debug, thiserror::Error)]
pub enum NestedProvenanceError {
    #[error("sub-repository path must not be empty")]
    EmptyPath,
    #[error("sub-repository path must not have a trailing slash: {0:?}")]
    TrailingSlash(String),
    #[error("an artifact root cannot have sub-repositories")]
    ArtifactWithSubRepositories,
    #[error("sub-repository paths overlap: {0:?} is a prefix of {1:?}")]
    OverlappingPaths(String, String),
}

impl NestedProvenance {
    pub fn new(
        root: KnownProvenance,
        sub_repositories: BTreeMap<String, RepositoryProvenance>,
    ) -> Result<Self, NestedProvenanceError> {
        if matches!(root, KnownProvenance::Artifact(_)) && !sub_repositories.is_empty() {
            return Err(NestedProvenanceError::ArtifactWithSubRepositories);
        }
        for path in sub_repositories.keys() {
            if path.is_empty() {
                return Err(NestedProvenanceError::EmptyPath);
            }
            if path.ends_with('/') {
                return Err(NestedProvenanceError::TrailingSlash(path.clone()));
            }
        }
        let paths: Vec<&String> = sub_repositories.keys().collect();
        for (i, a) in paths.iter().enumerate() {
            for b in &paths[i + 1..] {
                if is_prefix_of(a, b) || is_prefix_of(b, a) {
                    return Err(NestedProvenanceError::OverlappingPaths(
                        (*a).clone(),
                        (*b).clone(),
                    ));
                }
            }
        }
        Ok(Self { root, sub_repositories })
    }

    pub fn trivial(root: KnownProvenance) -> Self {
        Self { root, sub_repositories: BTreeMap::new() }
    }

    /// All provenances in the tree, root first, sub-repositories in path
    /// order.
    pub fn all_provenances(&self) -> impl Iterator<Item = KnownProvenance> + '_ {
        std::iter::once(self.root.clone())
            .chain(self.sub_repositories.values().map(|r| KnownProvenance::Repository(r.clone())))
    }

    /// Finds the sub-repository path whose prefix matches `file_path` most
    /// specifically, or `None` if `file_path` belongs to the root.
    pub fn longest_prefix_match(&self, file_path: &str) -> Option<&str> {
        crate::utils::longest_prefix(file_path, self.sub_repositories.keys().map(String::as_str))
    }
}

fn is_prefix_of(a: &str, b: &str) -> bool {
    a == b || b.starts_with(&format!("{a}/")) || a.starts_with(&format!("{b}/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::provenance::ArtifactProvenance;

    fn repo(path: &str) -> RepositoryProvenance {
        RepositoryProvenance {
            vcs_type: "git".into(),
            url: "https://example/repo".into(),
            requested_revision: "main".into(),
            resolved_revision: "deadbeef".into(),
            path: path.into(),
        }
    }

    #[test]
    fn rejects_overlapping_paths() {
        let root = KnownProvenance::Repository(repo(""));
        let mut subs = BTreeMap::new();
        subs.insert("vendor".to_string(), repo("vendor"));
        subs.insert("vendor/x".to_string(), repo("vendor/x"));
        assert!(matches!(
            NestedProvenance::new(root, subs),
            Err(NestedProvenanceError::OverlappingPaths(..))
        ));
    }

    #[test]
    fn rejects_artifact_with_subs() {
        let root = KnownProvenance::Artifact(ArtifactProvenance {
            url: "https://example/a.tar.gz".into(),
            hash: "md5:0".into(),
        });
        let mut subs = BTreeMap::new();
        subs.insert("vendor".to_string(), repo("vendor"));
        assert!(matches!(
            NestedProvenance::new(root, subs),
            Err(NestedProvenanceError::ArtifactWithSubRepositories)
        ));
    }

    #[test]
    fn longest_prefix_match_picks_most_specific() {
        let root = KnownProvenance::Repository(repo(""));
        let mut subs = BTreeMap::new();
        subs.insert("vendor".to_string(), repo("vendor"));
        subs.insert("vendor/x".to_string(), repo("vendor/x"));
        let nested = NestedProvenance::new(root, subs).unwrap();
        assert_eq!(nested.longest_prefix_match("vendor/x/src/main.rs"), Some("vendor/x"));
        assert_eq!(nested.longest_prefix_match("vendor/README"), Some("vendor"));
        assert_eq!(nested.longest_prefix_match("LICENSE"), None);
    }
}
