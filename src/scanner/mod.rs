//! C7: the scanner adapter seam. Three capabilities, each a separate trait
//! so the controller can dispatch on "does this adapter implement
//! PackageScanner" rather than introspect a dynamic type — the same
//! closed-capability-set shape as the teacher's `Compiler` trait, just
//! split three ways instead of one because a real engine only ever
//! implements the interaction mode its CLI/API actually supports.

#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod process;

use crate::config::ScanContext;
use crate::error::ScanError;
use crate::model::{KnownProvenance, Package, ScanResult, ScanSummary, ScannerDetails, ScannerMatcher};
use async_trait::async_trait;
use std::path::Path;

/// Shared identity surface every adapter exposes, regardless of capability.
pub trait ScannerIdentity: Send + Sync {
    fn name(&self) -> &str;
    fn details(&self) -> ScannerDetails;

    /// `None` means this adapter's outputs must never be persisted — they
    /// cannot be re-identified as equivalent to a later run's (§4.6).
    fn matcher(&self) -> Option<ScannerMatcher> {
        Some(ScannerMatcher::exact(self.details()))
    }

    /// Redacts credential-shaped values from `options` before they are
    /// embedded in the run record (§6).
    fn filter_secret_options(&self, options: &crate::model::ScannerOptions) -> crate::model::ScannerOptions {
        options
            .iter()
            .map(|(k, v)| {
                if self.secret_keys().iter().any(|s| k.to_lowercase().contains(&s.to_lowercase())) {
                    (k.clone(), "<redacted>".to_string())
                } else {
                    (k.clone(), v.clone())
                }
            })
            .collect()
    }

    /// Substrings identifying option keys that hold credentials. Empty by
    /// default; concrete adapters override with their engine's secret list.
    fn secret_keys(&self) -> &[&str] {
        &[]
    }
}

/// Engine downloads its own source; the adapter is handed the package.
#[async_trait]
pub trait PackageScanner: ScannerIdentity {
    async fn scan_package(&self, pkg: &Package, ctx: &ScanContext) -> Result<ScanResult, ScanError>;
}

/// Engine downloads given an already-resolved, known provenance.
#[async_trait]
pub trait ProvenanceScanner: ScannerIdentity {
    async fn scan_provenance(
        &self,
        provenance: &KnownProvenance,
        ctx: &ScanContext,
    ) -> Result<ScanResult, ScanError>;
}

/// Engine reads a pre-fetched local directory; the controller materializes
/// source for it via C2.
#[async_trait]
pub trait PathScanner: ScannerIdentity {
    async fn scan_path(&self, local_dir: &Path, ctx: &ScanContext) -> Result<ScanSummary, ScanError>;
}
