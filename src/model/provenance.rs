use serde::{Deserialize, Serialize};
use std::fmt;

/// A downloadable source archive, identified by its URL and a content hash.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactProvenance {
    pub url: String,
    /// `"<algorithm>:<hex digest>"`, e.g. `"sha1:abc123"`.
    pub hash: String,
}

/// A single VCS checkout, optionally restricted to a sub-tree via `path`.
///
/// `path` is forward-slash, has no trailing slash, and is empty for a root
/// checkout. It is never re-validated here; callers that split it off a
/// provenance (§4.3 "path-stripped provenance") do so explicitly with
/// [`RepositoryProvenance::without_path`].
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryProvenance {
    pub vcs_type: String,
    pub url: String,
    pub requested_revision: String,
    pub resolved_revision: String,
    pub path: String,
}

impl RepositoryProvenance {
    /// The key under which the *whole-repository* working tree is cached and
    /// stored: `path` is irrelevant to where the revision actually lives.
    pub fn without_path(&self) -> Self {
        Self { path: String::new(), ..self.clone() }
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }
}

impl fmt::Display for RepositoryProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}@{}", self.vcs_type, self.url, self.resolved_revision)?;
        if !self.path.is_empty() {
            write!(f, "#{}", self.path)?;
        }
        Ok(())
    }
}

/// A provenance that is known to point at real, scannable bytes.
///
/// Keeping this as its own type (rather than matching `Provenance` and
/// bailing on `Unknown` at every call site) makes "only Known provenance
/// ever reaches the scan pipeline" a type-level invariant instead of a
/// runtime check repeated throughout the controller.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum KnownProvenance {
    Artifact(ArtifactProvenance),
    Repository(RepositoryProvenance),
}

impl KnownProvenance {
    pub fn vcs_path(&self) -> &str {
        match self {
            Self::Artifact(_) => "",
            Self::Repository(repo) => &repo.path,
        }
    }

    /// The provenance with `path` cleared, i.e. the key under which the
    /// whole checkout (not a sub-tree of it) is cached and stored.
    pub fn without_path(&self) -> Self {
        match self {
            Self::Artifact(a) => Self::Artifact(a.clone()),
            Self::Repository(r) => Self::Repository(r.without_path()),
        }
    }

    pub fn as_repository(&self) -> Option<&RepositoryProvenance> {
        match self {
            Self::Repository(r) => Some(r),
            Self::Artifact(_) => None,
        }
    }
}

impl From<ArtifactProvenance> for KnownProvenance {
    fn from(a: ArtifactProvenance) -> Self {
        Self::Artifact(a)
    }
}

impl From<RepositoryProvenance> for KnownProvenance {
    fn from(r: RepositoryProvenance) -> Self {
        Self::Repository(r)
    }
}

impl fmt::Display for KnownProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Artifact(a) => write!(f, "{}@{}", a.url, a.hash),
            Self::Repository(r) => write!(f, "{r}"),
        }
    }
}

/// The sum type from §3: `Unknown` is the sentinel for a failed resolution
/// and must never be passed to a scanner adapter.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Provenance {
    Artifact(ArtifactProvenance),
    Repository(RepositoryProvenance),
    Unknown,
}

impl Provenance {
    pub fn known(self) -> Option<KnownProvenance> {
        match self {
            Self::Artifact(a) => Some(KnownProvenance::Artifact(a)),
            Self::Repository(r) => Some(KnownProvenance::Repository(r)),
            Self::Unknown => None,
        }
    }
}

impl From<KnownProvenance> for Provenance {
    fn from(known: KnownProvenance) -> Self {
        match known {
            KnownProvenance::Artifact(a) => Self::Artifact(a),
            KnownProvenance::Repository(r) => Self::Repository(r),
        }
    }
}
