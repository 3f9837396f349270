//! Ambient configuration carried into a run: origin priority, filtering
//! policy, ignore/license-file patterns and free-form labels (§4.7, §6).

use crate::model::Origin;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Selects which scanner set the controller runs, forwarded as part of
/// [`ScanContext`] (§4.7).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContextKind {
    Project,
    Package,
}

/// Free-form labels and the context discriminator forwarded to scanners.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ScanContext {
    pub kind: Option<ContextKind>,
    pub labels: BTreeMap<String, String>,
}

impl ScanContext {
    pub fn new(kind: ContextKind) -> Self {
        Self { kind: Some(kind), labels: BTreeMap::new() }
    }

    pub fn kind(&self) -> ContextKind {
        self.kind.unwrap_or(ContextKind::Package)
    }
}

/// Run-wide policy that drives step 1 (filtering) and step 10 (assembly) of
/// the controller pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    /// Origin priority used by the package-provenance resolver (C3), e.g.
    /// `[Vcs, Artifact]`.
    pub origin_priority: Vec<Origin>,
    /// Skip packages that already have a concluded license *and* declared
    /// authors (§4.7 step 1).
    pub skip_concluded: bool,
    /// Findings whose `path` matches one of these glob patterns survive
    /// `filter_by_vcs_path` even outside the package's VCS path (§4.8),
    /// e.g. `["LICENSE*", "COPYING*"]`.
    pub license_file_patterns: Vec<String>,
    /// Global ignore globs applied after the VCS-path filter (§4.8).
    pub ignore_patterns: Vec<String>,
    /// Per-scanner opaque configuration, keyed by scanner name.
    pub scanner_options: BTreeMap<String, crate::model::ScannerOptions>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            origin_priority: vec![Origin::Vcs, Origin::Artifact],
            skip_concluded: true,
            license_file_patterns: vec!["LICENSE*".into(), "COPYING*".into(), "NOTICE*".into()],
            ignore_patterns: Vec::new(),
            scanner_options: BTreeMap::new(),
        }
    }
}

impl ScanConfig {
    pub fn is_license_file(&self, path: &str) -> bool {
        self.license_file_patterns.iter().any(|pattern| glob_match(pattern, path))
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        self.ignore_patterns.iter().any(|pattern| glob_match(pattern, path))
    }
}

fn glob_match(pattern: &str, path: &str) -> bool {
    glob::Pattern::new(pattern).map(|p| p.matches(path)).unwrap_or(false)
}
