use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Identifies a scanner engine invocation: name, version, and the effective
/// configuration it ran with. Two `ScannerDetails` are "equivalent for
/// caching" exactly when a [`ScannerMatcher`] accepts them — equality alone
/// is usually too strict (e.g. a scanner may accept any configuration that
/// is a superset of what produced the cached result).
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerDetails {
    pub name: String,
    pub version: String,
    pub configuration: String,
}

/// A predicate over [`ScannerDetails`] indicating which stored results are
/// acceptable substitutes for a fresh scan. Kept as a boxed `Fn` rather than
/// a trait object hierarchy, the same shape as the teacher's
/// `FileFilter`/`SparseOutputFileFilter` predicate traits over a pluggable
/// compilation surface.
#[derive(Clone)]
pub struct ScannerMatcher(Arc<dyn Fn(&ScannerDetails) -> bool + Send + Sync>);

impl ScannerMatcher {
    pub fn new(f: impl Fn(&ScannerDetails) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// A matcher that accepts only byte-identical details.
    pub fn exact(expected: ScannerDetails) -> Self {
        Self::new(move |details| *details == expected)
    }

    pub fn matches(&self, details: &ScannerDetails) -> bool {
        (self.0)(details)
    }
}

impl std::fmt::Debug for ScannerMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ScannerMatcher(..)")
    }
}

/// Opaque, free-form scanner configuration as supplied by the caller, before
/// secret redaction (§6).
pub type ScannerOptions = BTreeMap<String, String>;
