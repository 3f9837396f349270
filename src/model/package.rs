use super::identifier::Identifier;
use serde::{Deserialize, Serialize};

/// A downloadable source artifact as declared by a package's metadata
/// (e.g. an npm tarball URL), before any resolution has taken place.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceArtifact {
    pub url: String,
    pub hash: String,
}

impl SourceArtifact {
    pub fn is_empty(&self) -> bool {
        self.url.is_empty()
    }
}

/// A package's declared VCS metadata, before any resolution has taken place.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VcsInfo {
    pub vcs_type: String,
    pub url: String,
    pub revision: String,
    /// Restricts attention to a sub-tree of the repository, e.g. for
    /// monorepo packages.
    pub path: String,
}

impl VcsInfo {
    pub fn is_empty(&self) -> bool {
        self.url.is_empty()
    }
}

/// The subset of a package record the controller reads. The base spec
/// treats `Package` as an external collaborator type defined by the
/// enclosing tool; this struct carries exactly the fields named in §3 so
/// the crate is self-contained and testable.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: Identifier,
    pub source_artifact: SourceArtifact,
    pub vcs_info: VcsInfo,
    pub concluded_license: Option<String>,
    pub authors: Vec<String>,
    pub metadata_only: bool,
    pub labels: std::collections::BTreeMap<String, String>,
}

/// A source-code origin to try during provenance resolution (§4.3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Origin {
    Vcs,
    Artifact,
}
