//! C5 and C6: provenance and scan-result stores.
//!
//! Four independent trait hierarchies rather than one union type — the
//! teacher's own split between `FileFilter`/`SparseOutputFileFilter`
//! (compile-time-selected behaviour over a shared concept) is the model:
//! the controller dispatches over whichever trait a given backend
//! implements instead of introspecting a dynamic type.
//!
//! Concrete backends vary only in I/O (local filesystem, relational
//! database with JSON columns, remote HTTP service — see spec §4.5/§6); the
//! behavioural contract captured in these traits is identical across all of
//! them. Only an in-memory backend and a YAML-file-per-key backend are
//! implemented here; a conforming SQL or HTTP backend implements the same
//! traits and is out of scope (spec §1: storage schema/layout is opaque
//! key-value behaviour).

pub mod fs;
pub mod memory;

use crate::model::{
    Identifier, KnownProvenance, NestedProvenance, Package, ScanResult, ScannerMatcher,
};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Message(String),
}

impl StoreError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Outcome of package-provenance resolution (C3), persisted so re-runs
/// don't repeat expensive clones or HEAD requests.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PackageProvenanceResolutionResult {
    Resolved {
        provenance: KnownProvenance,
        /// `true` only for a `Repository` result whose revision was not a
        /// moving ref; only fixed outcomes may be replayed without
        /// revalidation (§4.3).
        fixed: bool,
    },
    Unresolved {
        message: String,
    },
}

/// C5 (half 1): caches C3's output, keyed by `(id, artifact)` or
/// `(id, vcs_info)` as the caller chooses via `key`.
#[async_trait]
pub trait PackageProvenanceStore: Send + Sync {
    async fn read(&self, id: &Identifier, key: &str) -> Result<Option<PackageProvenanceResolutionResult>, StoreError>;
    async fn write(
        &self,
        id: &Identifier,
        key: &str,
        result: &PackageProvenanceResolutionResult,
    ) -> Result<(), StoreError>;
}

/// C5 (half 2): caches C4's output, keyed by `(vcs_type, url,
/// resolved_revision)`.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredNestedProvenance {
    pub nested_provenance: NestedProvenance,
    pub has_only_fixed_revisions: bool,
}

#[async_trait]
pub trait NestedProvenanceStore: Send + Sync {
    async fn read(
        &self,
        vcs_type: &str,
        url: &str,
        resolved_revision: &str,
    ) -> Result<Option<StoredNestedProvenance>, StoreError>;

    async fn write(
        &self,
        vcs_type: &str,
        url: &str,
        resolved_revision: &str,
        result: &StoredNestedProvenance,
    ) -> Result<(), StoreError>;
}

/// C6 (half 1): package-keyed scan cache. Can deliver results for a whole
/// nested tree in one lookup.
#[async_trait]
pub trait PackageScanStore: Send + Sync {
    /// Reads stored results for `pkg`. Rejects (by omission, not by error)
    /// results whose root provenance does not equal
    /// `nested_provenance.root`, and drops individual [`ScanResult`]s whose
    /// [`crate::model::ScannerDetails`] don't satisfy `matcher`.
    async fn read(
        &self,
        pkg: &Package,
        nested_provenance: &NestedProvenance,
        matcher: Option<&ScannerMatcher>,
    ) -> Result<Vec<crate::model::NestedProvenanceScanResult>, StoreError>;

    async fn write(
        &self,
        pkg: &Package,
        result: &crate::model::NestedProvenanceScanResult,
    ) -> Result<(), StoreError>;
}

/// C6 (half 2): scanner-agnostic, provenance-keyed scan cache. Holds only
/// whole-repository results — both methods reject any provenance with a
/// non-empty VCS `path`.
#[async_trait]
pub trait ProvenanceScanStore: Send + Sync {
    async fn read(
        &self,
        provenance: &KnownProvenance,
        matcher: Option<&ScannerMatcher>,
    ) -> Result<Vec<ScanResult>, StoreError>;

    /// Idempotent: returns `false` if a row for
    /// `(provenance, scanner_name, scanner_version, scanner_configuration)`
    /// already exists, `true` on insert.
    async fn write(&self, result: &ScanResult) -> Result<bool, StoreError>;
}

pub(crate) fn has_vcs_path(provenance: &KnownProvenance) -> bool {
    matches!(provenance, KnownProvenance::Repository(r) if !r.path.is_empty())
}
