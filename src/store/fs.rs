//! File-based store backends, matching the path scheme of §6 byte-exactly:
//! `artifact/<url-encoded>/scan-results.yml` and
//! `repository/<vcs-type>/<url-encoded>/<resolved-revision>/scan-results.yml`.
//! Each file holds a YAML sequence of the row type, the same shape as the
//! teacher's `SolFilesCache` reading/writing JSON under a deterministic
//! path, generalized to YAML since the scan-result row is the crate's own
//! shape rather than a third-party compiler artifact format.

use super::{
    has_vcs_path, NestedProvenanceStore, PackageProvenanceResolutionResult, PackageProvenanceStore,
    PackageScanStore, ProvenanceScanStore, StoreError, StoredNestedProvenance,
};
use crate::model::{
    Identifier, KnownProvenance, NestedProvenance, NestedProvenanceScanResult, Package, ScanResult,
    ScannerMatcher,
};
use crate::utils::url_encode_path_segment;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

async fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            serde_yaml::from_str(&contents).map(Some).map_err(|e| StoreError::msg(e.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::msg(e.to_string())),
    }
}

async fn write_yaml<T: serde::Serialize + Sync>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| StoreError::msg(e.to_string()))?;
    }
    let contents = serde_yaml::to_string(value).map_err(|e| StoreError::msg(e.to_string()))?;
    tokio::fs::write(path, contents).await.map_err(|e| StoreError::msg(e.to_string()))
}

fn artifact_dir(root: &Path, key: &str) -> PathBuf {
    root.join("artifact").join(url_encode_path_segment(key))
}

fn repository_dir(root: &Path, vcs_type: &str, url: &str, resolved_revision: &str) -> PathBuf {
    root.join("repository")
        .join(vcs_type)
        .join(url_encode_path_segment(url))
        .join(url_encode_path_segment(resolved_revision))
}

pub struct FsPackageProvenanceStore {
    root: PathBuf,
}

impl FsPackageProvenanceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, id: &Identifier, key: &str) -> PathBuf {
        self.root
            .join("package-provenance")
            .join(url_encode_path_segment(&id.to_string()))
            .join(format!("{}.yml", url_encode_path_segment(key)))
    }
}

#[async_trait]
impl PackageProvenanceStore for FsPackageProvenanceStore {
    async fn read(
        &self,
        id: &Identifier,
        key: &str,
    ) -> Result<Option<PackageProvenanceResolutionResult>, StoreError> {
        read_yaml(&self.path(id, key)).await
    }

    async fn write(
        &self,
        id: &Identifier,
        key: &str,
        result: &PackageProvenanceResolutionResult,
    ) -> Result<(), StoreError> {
        write_yaml(&self.path(id, key), result).await
    }
}

pub struct FsNestedProvenanceStore {
    root: PathBuf,
}

impl FsNestedProvenanceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, vcs_type: &str, url: &str, resolved_revision: &str) -> PathBuf {
        repository_dir(&self.root, vcs_type, url, resolved_revision).join("nested-provenance.yml")
    }
}

#[async_trait]
impl NestedProvenanceStore for FsNestedProvenanceStore {
    async fn read(
        &self,
        vcs_type: &str,
        url: &str,
        resolved_revision: &str,
    ) -> Result<Option<StoredNestedProvenance>, StoreError> {
        read_yaml(&self.path(vcs_type, url, resolved_revision)).await
    }

    async fn write(
        &self,
        vcs_type: &str,
        url: &str,
        resolved_revision: &str,
        result: &StoredNestedProvenance,
    ) -> Result<(), StoreError> {
        write_yaml(&self.path(vcs_type, url, resolved_revision), result).await
    }
}

/// Package-keyed scan store. Each package gets its own
/// `package/<id>/scan-results.yml` holding a YAML sequence of
/// [`NestedProvenanceScanResult`] — outside §6's two named layouts (those
/// only cover the provenance-keyed store) but in the same one-file-per-key
/// idiom.
pub struct FsPackageScanStore {
    root: PathBuf,
}

impl FsPackageScanStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, id: &Identifier) -> PathBuf {
        self.root.join("package").join(url_encode_path_segment(&id.to_string())).join("scan-results.yml")
    }
}

#[async_trait]
impl PackageScanStore for FsPackageScanStore {
    async fn read(
        &self,
        pkg: &Package,
        nested_provenance: &NestedProvenance,
        matcher: Option<&ScannerMatcher>,
    ) -> Result<Vec<NestedProvenanceScanResult>, StoreError> {
        let stored: Vec<NestedProvenanceScanResult> =
            read_yaml(&self.path(&pkg.id)).await?.unwrap_or_default();
        let mut out = Vec::new();
        for mut result in stored {
            if result.nested_provenance.root != nested_provenance.root {
                continue;
            }
            if let Some(matcher) = matcher {
                for results in result.scan_results.values_mut() {
                    results.retain(|r| matcher.matches(&r.scanner));
                }
            }
            out.push(result);
        }
        Ok(out)
    }

    async fn write(&self, pkg: &Package, result: &NestedProvenanceScanResult) -> Result<(), StoreError> {
        let path = self.path(&pkg.id);
        let mut stored: Vec<NestedProvenanceScanResult> = read_yaml(&path).await?.unwrap_or_default();
        stored.push(result.clone());
        write_yaml(&path, &stored).await
    }
}

/// Provenance-keyed scan store, at the exact §6 path scheme.
pub struct FsProvenanceScanStore {
    root: PathBuf,
}

impl FsProvenanceScanStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, provenance: &KnownProvenance) -> PathBuf {
        match provenance {
            KnownProvenance::Artifact(a) => {
                artifact_dir(&self.root, &format!("{}#{}", a.url, a.hash)).join("scan-results.yml")
            }
            KnownProvenance::Repository(r) => {
                repository_dir(&self.root, &r.vcs_type, &r.url, &r.resolved_revision).join("scan-results.yml")
            }
        }
    }
}

#[async_trait]
impl ProvenanceScanStore for FsProvenanceScanStore {
    async fn read(
        &self,
        provenance: &KnownProvenance,
        matcher: Option<&ScannerMatcher>,
    ) -> Result<Vec<ScanResult>, StoreError> {
        if has_vcs_path(provenance) {
            return Ok(Vec::new());
        }
        let stored: Vec<ScanResult> = read_yaml(&self.path(provenance)).await?.unwrap_or_default();
        Ok(stored.into_iter().filter(|r| matcher.map_or(true, |m| m.matches(&r.scanner))).collect())
    }

    async fn write(&self, result: &ScanResult) -> Result<bool, StoreError> {
        if has_vcs_path(&result.provenance) {
            return Err(StoreError::msg("provenance-based store only holds whole-repository results"));
        }
        let path = self.path(&result.provenance);
        let mut stored: Vec<ScanResult> = read_yaml(&path).await?.unwrap_or_default();
        if stored.iter().any(|r| r.scanner == result.scanner) {
            return Ok(false);
        }
        stored.push(result.clone());
        write_yaml(&path, &stored).await?;
        Ok(true)
    }
}
