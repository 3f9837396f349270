//! Deterministic in-memory scanner adapters for unit and integration
//! tests, in the same register as `vcs::fake` and the teacher's
//! `project_util`/`tests/mocked.rs` fakes.

use super::{PackageScanner, PathScanner, ProvenanceScanner, ScannerIdentity};
use crate::config::ScanContext;
use crate::error::ScanError;
use crate::model::{
    Finding, Identifier, KnownProvenance, Location, Package, ScanResult, ScanSummary, ScannerDetails,
    ScannerMatcher,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

fn identity_matcher(details: &ScannerDetails, has_matcher: bool) -> Option<ScannerMatcher> {
    has_matcher.then(|| ScannerMatcher::exact(details.clone()))
}

pub struct FakePackageScanner {
    details: ScannerDetails,
    has_matcher: bool,
    registrations: Mutex<BTreeMap<Identifier, (KnownProvenance, ScanSummary)>>,
    calls: AtomicUsize,
}

impl FakePackageScanner {
    pub fn new(details: ScannerDetails, has_matcher: bool) -> Self {
        Self { details, has_matcher, registrations: Mutex::new(BTreeMap::new()), calls: AtomicUsize::new(0) }
    }

    pub fn register(&self, id: Identifier, provenance: KnownProvenance, summary: ScanSummary) {
        self.registrations.lock().unwrap().insert(id, (provenance, summary));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ScannerIdentity for FakePackageScanner {
    fn name(&self) -> &str {
        &self.details.name
    }

    fn details(&self) -> ScannerDetails {
        self.details.clone()
    }

    fn matcher(&self) -> Option<ScannerMatcher> {
        identity_matcher(&self.details, self.has_matcher)
    }
}

#[async_trait]
impl PackageScanner for FakePackageScanner {
    async fn scan_package(&self, pkg: &Package, _ctx: &ScanContext) -> Result<ScanResult, ScanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (provenance, summary) = self
            .registrations
            .lock()
            .unwrap()
            .get(&pkg.id)
            .cloned()
            .ok_or_else(|| ScanError::ScannerFailure {
                scanner: self.details.name.clone(),
                message: format!("no fake registration for package {}", pkg.id),
            })?;
        Ok(ScanResult { provenance, scanner: self.details.clone(), summary })
    }
}

pub struct FakeProvenanceScanner {
    details: ScannerDetails,
    has_matcher: bool,
    registrations: Mutex<BTreeMap<KnownProvenance, ScanSummary>>,
    calls: AtomicUsize,
}

impl FakeProvenanceScanner {
    pub fn new(details: ScannerDetails, has_matcher: bool) -> Self {
        Self { details, has_matcher, registrations: Mutex::new(BTreeMap::new()), calls: AtomicUsize::new(0) }
    }

    pub fn register(&self, provenance: KnownProvenance, summary: ScanSummary) {
        self.registrations.lock().unwrap().insert(provenance, summary);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ScannerIdentity for FakeProvenanceScanner {
    fn name(&self) -> &str {
        &self.details.name
    }

    fn details(&self) -> ScannerDetails {
        self.details.clone()
    }

    fn matcher(&self) -> Option<ScannerMatcher> {
        identity_matcher(&self.details, self.has_matcher)
    }
}

#[async_trait]
impl ProvenanceScanner for FakeProvenanceScanner {
    async fn scan_provenance(
        &self,
        provenance: &KnownProvenance,
        _ctx: &ScanContext,
    ) -> Result<ScanResult, ScanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let summary = self
            .registrations
            .lock()
            .unwrap()
            .get(provenance)
            .cloned()
            .unwrap_or_else(|| ScanSummary::empty(0, 0));
        Ok(ScanResult { provenance: provenance.clone(), scanner: self.details.clone(), summary })
    }
}

/// Reads whichever files are actually present under `local_dir` rather than
/// a canned map, so it exercises C2's real copy-out (and the license-file
/// pattern match in C9) end to end: any top-level file named `LICENSE*`
/// becomes one license finding.
pub struct FakePathScanner {
    details: ScannerDetails,
    has_matcher: bool,
    invocations: Mutex<Vec<PathBuf>>,
}

impl FakePathScanner {
    pub fn new(details: ScannerDetails, has_matcher: bool) -> Self {
        Self { details, has_matcher, invocations: Mutex::new(Vec::new()) }
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    pub fn invocations(&self) -> Vec<PathBuf> {
        self.invocations.lock().unwrap().clone()
    }
}

impl ScannerIdentity for FakePathScanner {
    fn name(&self) -> &str {
        &self.details.name
    }

    fn details(&self) -> ScannerDetails {
        self.details.clone()
    }

    fn matcher(&self) -> Option<ScannerMatcher> {
        identity_matcher(&self.details, self.has_matcher)
    }
}

#[async_trait]
impl PathScanner for FakePathScanner {
    async fn scan_path(&self, local_dir: &Path, _ctx: &ScanContext) -> Result<ScanSummary, ScanError> {
        self.invocations.lock().unwrap().push(local_dir.to_path_buf());
        let start_time = crate::utils::now_unix_millis();
        let mut license_findings = Vec::new();

        if let Ok(mut entries) = tokio::fs::read_dir(local_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
                if !is_file {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with("LICENSE") {
                    license_findings.push(Finding {
                        location: Location { path: name, start_line: 1, end_line: 1 },
                        value: "MIT".to_string(),
                        score: Some(1.0),
                    });
                }
            }
        }

        Ok(ScanSummary {
            start_time,
            end_time: crate::utils::now_unix_millis(),
            license_findings,
            copyright_findings: Vec::new(),
            issues: Vec::new(),
            package_verification_code: None,
        })
    }
}
