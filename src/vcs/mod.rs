//! The VCS backend seam the working-tree cache (C1), downloader (C2) and
//! the two provenance resolvers (C3, C4) all dispatch through.
//!
//! Closed set of capabilities, one trait, a small registry mapping
//! `vcs_type` to an implementation — the same shape as the teacher's
//! `compilers::Compiler` trait plus its registry-by-name dispatch in
//! `compilers::multi::MultiCompiler`, generalized from "which compiler
//! binary" to "which VCS".

#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod git;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum VcsBackendError {
    #[error("{0}")]
    Message(String),
}

impl VcsBackendError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// A candidate revision to try updating to, in resolution order. `fixed`
/// is `false` for moving refs (branches, `HEAD`); the package-provenance
/// resolver (C3) disallows moving refs entirely, the nested-provenance
/// resolver (C4) only cares once a revision is already resolved.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RevisionCandidate {
    pub revision: String,
    pub fixed: bool,
}

/// A nested working tree discovered inside a checkout (git submodule, hg
/// subrepo, ...).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NestedWorkingTree {
    pub path: String,
    pub url: String,
    pub revision: String,
}

#[async_trait]
pub trait VcsBackend: Send + Sync {
    fn vcs_type(&self) -> &str;

    /// Returns `true` if this backend can handle `url` (e.g. a URL scheme
    /// or host check); the registry only offers a backend whose
    /// `vcs_type` matches *and* that accepts the URL.
    fn accepts(&self, _url: &str) -> bool {
        true
    }

    /// Initializes a fresh working directory for `url`. No revision is
    /// checked out yet.
    async fn init(&self, dir: &Path, url: &str) -> Result<(), VcsBackendError>;

    /// Updates the working tree to `revision`. Non-recursive unless
    /// `recursive` is set, in which case nested working trees are also
    /// updated to whatever revision they are pinned at.
    async fn update(&self, dir: &Path, revision: &str, recursive: bool) -> Result<(), VcsBackendError>;

    /// The commit the working tree is currently checked out at.
    async fn current_revision(&self, dir: &Path) -> Result<String, VcsBackendError>;

    /// Given a package's requested revision (branch, tag, commit, or
    /// empty), returns an ordered list of candidates to try updating to.
    async fn revision_candidates(
        &self,
        dir: &Path,
        requested_revision: &str,
    ) -> Result<Vec<RevisionCandidate>, VcsBackendError>;

    /// Nested working trees (submodules) the checkout declares, each
    /// already updated to the revision it's pinned at (valid only after a
    /// recursive [`VcsBackend::update`]).
    async fn nested_working_trees(&self, dir: &Path) -> Result<Vec<NestedWorkingTree>, VcsBackendError>;
}

/// Maps a `(vcs_type, url)` pair to the backend that should handle it.
#[derive(Default)]
pub struct VcsRegistry {
    backends: Vec<Arc<dyn VcsBackend>>,
}

impl VcsRegistry {
    pub fn new() -> Self {
        Self { backends: Vec::new() }
    }

    pub fn register(&mut self, backend: impl VcsBackend + 'static) -> &mut Self {
        self.backends.push(Arc::new(backend));
        self
    }

    pub fn resolve(&self, vcs_type: &str, url: &str) -> Option<Arc<dyn VcsBackend>> {
        self.backends
            .iter()
            .find(|b| b.vcs_type() == vcs_type && b.accepts(url))
            .cloned()
    }
}
