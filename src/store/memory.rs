//! Process-local store backends: used for single-run dedup and across the
//! test suite, in the same register as the teacher's in-memory
//! `project_util` fixtures standing in for a real `ArtifactsCache`.

use super::{
    has_vcs_path, NestedProvenanceStore, PackageProvenanceResolutionResult, PackageProvenanceStore,
    PackageScanStore, ProvenanceScanStore, StoreError, StoredNestedProvenance,
};
use crate::model::{
    Identifier, KnownProvenance, NestedProvenance, NestedProvenanceScanResult, Package, ScanResult,
    ScannerMatcher,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryPackageProvenanceStore {
    rows: Mutex<BTreeMap<(Identifier, String), PackageProvenanceResolutionResult>>,
}

impl MemoryPackageProvenanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PackageProvenanceStore for MemoryPackageProvenanceStore {
    async fn read(
        &self,
        id: &Identifier,
        key: &str,
    ) -> Result<Option<PackageProvenanceResolutionResult>, StoreError> {
        Ok(self.rows.lock().unwrap().get(&(id.clone(), key.to_string())).cloned())
    }

    async fn write(
        &self,
        id: &Identifier,
        key: &str,
        result: &PackageProvenanceResolutionResult,
    ) -> Result<(), StoreError> {
        self.rows.lock().unwrap().insert((id.clone(), key.to_string()), result.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryNestedProvenanceStore {
    rows: Mutex<BTreeMap<(String, String, String), StoredNestedProvenance>>,
}

impl MemoryNestedProvenanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NestedProvenanceStore for MemoryNestedProvenanceStore {
    async fn read(
        &self,
        vcs_type: &str,
        url: &str,
        resolved_revision: &str,
    ) -> Result<Option<StoredNestedProvenance>, StoreError> {
        let key = (vcs_type.to_string(), url.to_string(), resolved_revision.to_string());
        Ok(self.rows.lock().unwrap().get(&key).cloned())
    }

    async fn write(
        &self,
        vcs_type: &str,
        url: &str,
        resolved_revision: &str,
        result: &StoredNestedProvenance,
    ) -> Result<(), StoreError> {
        let key = (vcs_type.to_string(), url.to_string(), resolved_revision.to_string());
        self.rows.lock().unwrap().insert(key, result.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPackageScanStore {
    rows: Mutex<BTreeMap<Identifier, Vec<NestedProvenanceScanResult>>>,
}

impl MemoryPackageScanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PackageScanStore for MemoryPackageScanStore {
    async fn read(
        &self,
        pkg: &Package,
        nested_provenance: &NestedProvenance,
        matcher: Option<&ScannerMatcher>,
    ) -> Result<Vec<NestedProvenanceScanResult>, StoreError> {
        let rows = self.rows.lock().unwrap();
        let Some(stored) = rows.get(&pkg.id) else { return Ok(Vec::new()) };
        let mut out = Vec::new();
        for result in stored {
            if result.nested_provenance.root != nested_provenance.root {
                continue;
            }
            let mut filtered = result.clone();
            if let Some(matcher) = matcher {
                for results in filtered.scan_results.values_mut() {
                    results.retain(|r| matcher.matches(&r.scanner));
                }
            }
            out.push(filtered);
        }
        Ok(out)
    }

    async fn write(&self, pkg: &Package, result: &NestedProvenanceScanResult) -> Result<(), StoreError> {
        self.rows.lock().unwrap().entry(pkg.id.clone()).or_default().push(result.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryProvenanceScanStore {
    rows: Mutex<BTreeMap<KnownProvenance, Vec<ScanResult>>>,
}

impl MemoryProvenanceScanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProvenanceScanStore for MemoryProvenanceScanStore {
    async fn read(
        &self,
        provenance: &KnownProvenance,
        matcher: Option<&ScannerMatcher>,
    ) -> Result<Vec<ScanResult>, StoreError> {
        if has_vcs_path(provenance) {
            return Ok(Vec::new());
        }
        let rows = self.rows.lock().unwrap();
        let Some(results) = rows.get(provenance) else { return Ok(Vec::new()) };
        Ok(results
            .iter()
            .filter(|r| matcher.map_or(true, |m| m.matches(&r.scanner)))
            .cloned()
            .collect())
    }

    async fn write(&self, result: &ScanResult) -> Result<bool, StoreError> {
        if has_vcs_path(&result.provenance) {
            return Err(StoreError::msg("provenance-based store only holds whole-repository results"));
        }
        let mut rows = self.rows.lock().unwrap();
        let entry = rows.entry(result.provenance.clone()).or_default();
        let exists = entry.iter().any(|r| r.scanner == result.scanner);
        if exists {
            return Ok(false);
        }
        entry.push(result.clone());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ScanSummary, ScannerDetails};

    fn details() -> ScannerDetails {
        ScannerDetails { name: "fake".into(), version: "1.0.0".into(), configuration: "c".into() }
    }

    fn provenance() -> KnownProvenance {
        KnownProvenance::Artifact(crate::model::ArtifactProvenance {
            url: "https://example/a.tar.gz".into(),
            hash: "md5:0".into(),
        })
    }

    #[tokio::test]
    async fn provenance_store_write_is_idempotent() {
        let store = MemoryProvenanceScanStore::new();
        let result =
            ScanResult { provenance: provenance(), scanner: details(), summary: ScanSummary::empty(0, 0) };
        assert!(store.write(&result).await.unwrap());
        assert!(!store.write(&result).await.unwrap());
    }

    #[tokio::test]
    async fn provenance_store_rejects_path_scoped_provenance() {
        let store = MemoryProvenanceScanStore::new();
        let repo = crate::model::RepositoryProvenance {
            vcs_type: "git".into(),
            url: "https://example/repo".into(),
            requested_revision: "main".into(),
            resolved_revision: "deadbeef".into(),
            path: "sub".into(),
        };
        let result = ScanResult {
            provenance: KnownProvenance::Repository(repo),
            scanner: details(),
            summary: ScanSummary::empty(0, 0),
        };
        assert!(store.write(&result).await.is_err());
    }
}
