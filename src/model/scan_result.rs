use super::{
    finding::ScanSummary,
    nested::NestedProvenance,
    provenance::KnownProvenance,
    scanner_details::ScannerDetails,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub provenance: KnownProvenance,
    pub scanner: ScannerDetails,
    pub summary: ScanSummary,
}

/// Bundles one [`NestedProvenance`] with the results found for every
/// provenance in its tree.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedProvenanceScanResult {
    pub nested_provenance: NestedProvenance,
    pub scan_results: BTreeMap<KnownProvenance, Vec<ScanResult>>,
}

impl NestedProvenanceScanResult {
    pub fn new(nested_provenance: NestedProvenance) -> Self {
        Self { nested_provenance, scan_results: BTreeMap::new() }
    }

    /// A nested result is complete iff every provenance in the tree has at
    /// least one scan result.
    pub fn is_complete(&self) -> bool {
        self.nested_provenance
            .all_provenances()
            .all(|p| self.scan_results.get(&p).is_some_and(|r| !r.is_empty()))
    }

    /// Is complete with respect to a single scanner: every provenance in the
    /// tree has at least one result from that specific scanner.
    pub fn is_complete_for_scanner(&self, scanner_name: &str) -> bool {
        self.nested_provenance.all_provenances().all(|p| {
            self.scan_results
                .get(&p)
                .is_some_and(|results| results.iter().any(|r| r.scanner.name == scanner_name))
        })
    }

    pub fn insert(&mut self, provenance: KnownProvenance, result: ScanResult) {
        self.scan_results.entry(provenance).or_default().push(result);
    }
}

// `KnownProvenance` needs `Ord` to be a `BTreeMap` key; derived in
// `provenance.rs`.
