//! C8: the scan controller.
//!
//! This is where concurrency, caching, deduplication, provenance reasoning
//! and failure handling all interact, so the pipeline is documented here
//! step by step the same way the teacher documents its own build pipeline
//! in `compile/project.rs` — read this header before reading the code.
//!
//! A scan is ten steps:
//!
//! 1. **Filtering.** Packages with a concluded license and declared
//!    authors are skipped if configured to (`ScanConfig::skip_concluded`).
//!    Metadata-only packages are always skipped.
//! 2. **Package-provenance resolution (C3).** Each surviving package is
//!    resolved to a [`KnownProvenance`] or a resolution issue tagged to
//!    its [`Identifier`].
//! 3. **Nested-provenance resolution (C4).** Run once per *distinct*
//!    path-stripped provenance; issues propagate to every package that
//!    maps to that provenance.
//! 4. **Read-through caches.** For every `(scanner with a matcher) ×
//!    (package, provenance)` pair, package-keyed stores are consulted
//!    first (one lookup can deliver a whole nested tree), then
//!    provenance-keyed stores per provenance. Results accumulate into the
//!    in-memory `scan_results[scanner][provenance]` table.
//! 5. **Package-scanner dispatch.** Packages are grouped by path-stripped
//!    provenance. For each group and each `PackageScanner` for which some
//!    member still lacks a complete nested result, one reference package
//!    is scanned, the result is split across the nested tree by path
//!    prefix, and applied to every group member missing that scanner's
//!    entry.
//! 6. **Provenance-scanner dispatch.** Any provenance still missing a
//!    `ProvenanceScanner`'s result gets one call; write-through.
//! 7. **Path-scanner dispatch.** Any provenance still missing results for
//!    one or more `PathScanner`s gets materialized once (C2) and every
//!    missing path scanner runs against that single directory before it
//!    is deleted. A download failure synthesizes an error-issue result
//!    for every path scanner still pending on that provenance and the run
//!    continues.
//! 8. **Write-through.** After each scanner completes for a provenance,
//!    packages whose nested tree is now complete for that scanner get a
//!    package-keyed write; the provenance-keyed write happens
//!    unconditionally after each scanner completion — for every scanner
//!    kind, not just `PackageScanner`s. Either write is skipped entirely
//!    when the scanner has no matcher (its results cannot be re-identified
//!    as equivalent to a later run's, so persisting them would be useless).
//! 9. **Archiving.** Out of scope for this crate's library surface (no
//!    file archiver adapter is specified) — left as a configuration hook
//!    callers can add behind the same store traits.
//! 10. **Assembly (C9).** Each package's `NestedProvenanceScanResult` is
//!     filtered by its VCS path (license files always pass), globally
//!     ignore-filtered, then merged into one `ScanResult` per scanner.
//!     Unresolvable packages get an empty-summary result per configured
//!     scanner carrying the resolution issue.
//!
//! **Ownership.** One [`ScanController`] per call to [`ScanController::scan`];
//! it owns the working-tree cache for the run and tears it down on every
//! exit path, matching §5's "never process-global" rule and the spec's own
//! rationale about avoiding cross-run teardown bugs.

use crate::assemble;
use crate::config::{ScanConfig, ScanContext};
use crate::download::Downloader;
use crate::error::{FatalError, ScanError};
use crate::model::{
    Identifier, Issue, KnownProvenance, NestedProvenance, NestedProvenanceScanResult, Package, ScanResult,
    ScanSummary, Severity,
};
use crate::resolve::{NestedProvenanceResolver, PackageProvenanceResolver};
use crate::scanner::{PackageScanner, PathScanner, ProvenanceScanner, ScannerIdentity};
use crate::store::{NestedProvenanceStore, PackageProvenanceStore, PackageScanStore, ProvenanceScanStore};
use crate::worktree::WorkingTreeCache;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Everything the controller composes, borrowed for the lifetime of one
/// [`ScanController::scan`] call. Mirrors the teacher's `Project` struct
/// bundling compiler, cache and paths behind one owning handle.
pub struct ScanController<'a> {
    pub package_provenance_resolver: PackageProvenanceResolver<'a>,
    pub nested_provenance_resolver: NestedProvenanceResolver<'a>,
    pub downloader: &'a dyn Downloader,
    pub working_trees: &'a WorkingTreeCache,
    pub package_provenance_store: &'a dyn PackageProvenanceStore,
    pub nested_provenance_store: &'a dyn NestedProvenanceStore,
    pub package_scan_store: Option<&'a dyn PackageScanStore>,
    pub provenance_scan_store: Option<&'a dyn ProvenanceScanStore>,
    pub package_scanners: Vec<&'a dyn PackageScanner>,
    pub provenance_scanners: Vec<&'a dyn ProvenanceScanner>,
    pub path_scanners: Vec<&'a dyn PathScanner>,
    pub config: ScanConfig,
    pub cancellation: CancellationToken,
}

/// The three append-only, run-scoped tables from §5. `Mutex`es are never
/// held across an `.await` — every critical section here is synchronous
/// map mutation, the lock dropped before the next suspension point.
#[derive(Default)]
struct Tables {
    package_provenance: Mutex<BTreeMap<Identifier, Result<KnownProvenance, String>>>,
    nested_provenance: Mutex<BTreeMap<KnownProvenance, Result<NestedProvenance, String>>>,
    scan_results: Mutex<BTreeMap<(String, KnownProvenance), Vec<ScanResult>>>,
    in_flight: Mutex<BTreeSet<(String, KnownProvenance)>>,
}

impl Tables {
    fn has_result(&self, scanner: &str, provenance: &KnownProvenance) -> bool {
        self.scan_results.lock().unwrap().contains_key(&(scanner.to_string(), provenance.clone()))
    }

    /// Returns `true` if this call claimed the right to scan
    /// `(scanner, provenance)`; `false` means another caller already has.
    fn claim(&self, scanner: &str, provenance: &KnownProvenance) -> bool {
        self.in_flight.lock().unwrap().insert((scanner.to_string(), provenance.clone()))
    }

    fn record(&self, scanner: &str, provenance: &KnownProvenance, result: ScanResult) {
        self.scan_results
            .lock()
            .unwrap()
            .entry((scanner.to_string(), provenance.clone()))
            .or_default()
            .push(result);
    }

    fn results_for(&self, scanner: &str, provenance: &KnownProvenance) -> Vec<ScanResult> {
        self.scan_results
            .lock()
            .unwrap()
            .get(&(scanner.to_string(), provenance.clone()))
            .cloned()
            .unwrap_or_default()
    }
}

impl<'a> ScanController<'a> {
    /// The sole public entry point (§6). Only [`FatalError`] can escape;
    /// every other failure is folded into an [`Issue`] inside the result
    /// tree.
    pub async fn scan(
        &self,
        packages: Vec<Package>,
        context: ScanContext,
    ) -> Result<BTreeMap<Identifier, Vec<ScanResult>>, FatalError> {
        let tables = Tables::default();

        // Step 1: filtering.
        let candidates: Vec<Package> = packages
            .into_iter()
            .filter(|pkg| !self.should_skip(pkg))
            .collect();

        // Step 2: package-provenance resolution.
        for pkg in &candidates {
            if self.cancellation.is_cancelled() {
                break;
            }
            crate::report::resolving_provenance(&pkg.id);
            let outcome = self.package_provenance_resolver.resolve(pkg, &self.config.origin_priority).await;
            let recorded = match outcome {
                Ok(provenance) => {
                    crate::report::provenance_resolved(&pkg.id, &provenance);
                    Ok(provenance)
                }
                Err(ScanError::ProvenanceUnresolvable { message, .. }) => {
                    crate::report::provenance_unresolvable(&pkg.id, &message);
                    Err(message)
                }
                Err(other) => Err(other.to_string()),
            };
            tables.package_provenance.lock().unwrap().insert(pkg.id.clone(), recorded);
        }

        // Step 3: nested-provenance resolution, once per distinct root.
        let mut distinct_roots: BTreeSet<KnownProvenance> = BTreeSet::new();
        for result in tables.package_provenance.lock().unwrap().values() {
            if let Ok(provenance) = result {
                distinct_roots.insert(provenance.without_path());
            }
        }
        for root in &distinct_roots {
            if self.cancellation.is_cancelled() {
                break;
            }
            let outcome = self.nested_provenance_resolver.resolve(root).await;
            let recorded = outcome.map_err(|e| e.to_string());
            tables.nested_provenance.lock().unwrap().insert(root.clone(), recorded);
        }

        // Group packages by path-stripped provenance; used by the
        // package-keyed half of step 4 and by steps 5-8.
        let mut groups: BTreeMap<KnownProvenance, Vec<&Package>> = BTreeMap::new();
        for pkg in &candidates {
            if let Some(Ok(provenance)) = tables.package_provenance.lock().unwrap().get(&pkg.id) {
                groups.entry(provenance.without_path()).or_default().push(pkg);
            }
        }

        // Step 4: read-through caches.
        for (root, members) in &groups {
            self.read_through(root, members, &tables).await;
        }

        // Step 5: package-scanner dispatch.
        for (root, members) in &groups {
            if self.cancellation.is_cancelled() {
                break;
            }
            self.dispatch_package_scanners(root, members, &tables, &context).await;
        }

        // Step 6: provenance-scanner dispatch.
        for (root, members) in &groups {
            if self.cancellation.is_cancelled() {
                break;
            }
            self.dispatch_provenance_scanners(root, members, &tables, &context).await;
        }

        // Step 7: path-scanner dispatch.
        for (root, members) in &groups {
            if self.cancellation.is_cancelled() {
                break;
            }
            self.dispatch_path_scanners(root, members, &tables, &context).await;
        }

        // Step 8 (write-through) happens inline in each dispatch_* above,
        // immediately after a scanner completes for a provenance.

        // Steps 9 (archiving) is a configuration hook with no adapter
        // shipped in this crate; intentionally a no-op here.

        // Cooperative cancellation drains in-flight work above, then tears
        // down the working-tree cache before returning (§5).
        let _ = self.working_trees.shutdown().await;

        // Step 10: assembly.
        let mut output = BTreeMap::new();
        for pkg in &candidates {
            output.insert(pkg.id.clone(), self.assemble_package(pkg, &tables, &context).await);
        }
        Ok(output)
    }

    fn should_skip(&self, pkg: &Package) -> bool {
        if pkg.metadata_only {
            return true;
        }
        if self.config.skip_concluded && pkg.concluded_license.is_some() && !pkg.authors.is_empty() {
            return true;
        }
        false
    }

    async fn read_through(&self, root: &KnownProvenance, members: &[&Package], tables: &Tables) {
        let nested = match tables.nested_provenance.lock().unwrap().get(root) {
            Some(Ok(nested)) => nested.clone(),
            _ => return,
        };

        for scanner in self.all_scanner_identities() {
            let Some(matcher) = scanner.matcher() else { continue };

            if let Some(store) = self.package_scan_store {
                for pkg in members {
                    if let Ok(results) = store.read(pkg, &nested, Some(&matcher)).await {
                        for nested_result in results {
                            for (provenance, scan_results) in nested_result.scan_results {
                                for result in scan_results {
                                    tables.record(&scanner.name().to_string(), &provenance, result);
                                }
                            }
                        }
                    }
                }
            }

            if let Some(store) = self.provenance_scan_store {
                for provenance in nested.all_provenances() {
                    if tables.has_result(scanner.name(), &provenance) {
                        crate::report::cache_hit(scanner.name(), &provenance);
                        continue;
                    }
                    if let Ok(results) = store.read(&provenance, Some(&matcher)).await {
                        if results.is_empty() {
                            crate::report::cache_miss(scanner.name(), &provenance);
                        }
                        for result in results {
                            tables.record(scanner.name(), &provenance, result);
                        }
                    }
                }
            }
        }
    }

    fn all_scanner_identities(&self) -> Vec<&dyn ScannerIdentity> {
        let mut out: Vec<&dyn ScannerIdentity> = Vec::new();
        out.extend(self.package_scanners.iter().map(|s| *s as &dyn ScannerIdentity));
        out.extend(self.provenance_scanners.iter().map(|s| *s as &dyn ScannerIdentity));
        out.extend(self.path_scanners.iter().map(|s| *s as &dyn ScannerIdentity));
        out
    }

    async fn dispatch_package_scanners(
        &self,
        root: &KnownProvenance,
        members: &[&Package],
        tables: &Tables,
        context: &ScanContext,
    ) {
        let nested = match tables.nested_provenance.lock().unwrap().get(root) {
            Some(Ok(nested)) => nested.clone(),
            _ => return,
        };

        for scanner in &self.package_scanners {
            if self.nested_result_complete(&nested, scanner.name(), tables) {
                continue;
            }
            if !tables.claim(scanner.name(), root) {
                continue;
            }

            let reference = members[0];
            let mut reference_clone = (*reference).clone();
            reference_clone.vcs_info.path.clear();

            crate::report::dispatching_scanner(scanner.name(), root);
            match scanner.scan_package(&reference_clone, context).await {
                Ok(result) => {
                    let split_result = assemble::split(&result, &nested);
                    for (provenance, results) in split_result.scan_results {
                        for r in results {
                            tables.record(scanner.name(), &provenance, r);
                        }
                    }
                }
                Err(e) => {
                    let issue = Issue::new("PackageScanner", Severity::Error, e.to_string());
                    let empty = ScanSummary::empty(crate::utils::now_unix_millis(), crate::utils::now_unix_millis())
                        .with_issue(issue);
                    tables.record(
                        scanner.name(),
                        root,
                        ScanResult { provenance: root.clone(), scanner: scanner.details(), summary: empty },
                    );
                }
            }

            self.write_through(scanner.name(), scanner.matcher().is_some(), &nested, tables, members).await;
        }
    }

    async fn dispatch_provenance_scanners(
        &self,
        root: &KnownProvenance,
        members: &[&Package],
        tables: &Tables,
        context: &ScanContext,
    ) {
        let nested = match tables.nested_provenance.lock().unwrap().get(root) {
            Some(Ok(nested)) => nested.clone(),
            _ => return,
        };
        for provenance in nested.all_provenances() {
            for scanner in &self.provenance_scanners {
                if tables.has_result(scanner.name(), &provenance) {
                    continue;
                }
                if !tables.claim(scanner.name(), &provenance) {
                    continue;
                }
                crate::report::dispatching_scanner(scanner.name(), &provenance);
                let result = match scanner.scan_provenance(&provenance, context).await {
                    Ok(result) => result,
                    Err(e) => {
                        let issue = Issue::new("ProvenanceScanner", Severity::Error, e.to_string());
                        let empty = ScanSummary::empty(
                            crate::utils::now_unix_millis(),
                            crate::utils::now_unix_millis(),
                        )
                        .with_issue(issue);
                        ScanResult { provenance: provenance.clone(), scanner: scanner.details(), summary: empty }
                    }
                };
                tables.record(scanner.name(), &provenance, result.clone());
                let has_matcher = scanner.matcher().is_some();
                self.write_through_provenance(has_matcher, &provenance, &result).await;
                self.write_through(scanner.name(), has_matcher, &nested, tables, members).await;
            }
        }
    }

    async fn dispatch_path_scanners(
        &self,
        root: &KnownProvenance,
        members: &[&Package],
        tables: &Tables,
        context: &ScanContext,
    ) {
        let nested = match tables.nested_provenance.lock().unwrap().get(root) {
            Some(Ok(nested)) => nested.clone(),
            _ => return,
        };
        for provenance in nested.all_provenances() {
            let pending: Vec<&&dyn PathScanner> = self
                .path_scanners
                .iter()
                .filter(|s| !tables.has_result(s.name(), &provenance))
                .collect();
            if pending.is_empty() {
                continue;
            }
            if !tables.claim("__path_download__", &provenance) {
                continue;
            }

            match self.downloader.download(&provenance).await {
                Ok(dir) => {
                    for scanner in &pending {
                        crate::report::dispatching_scanner(scanner.name(), &provenance);
                        let result = match scanner.scan_path(&dir, context).await {
                            Ok(summary) => ScanResult {
                                provenance: provenance.clone(),
                                scanner: scanner.details(),
                                summary,
                            },
                            Err(e) => {
                                let issue = Issue::new("PathScanner", Severity::Error, e.to_string());
                                let empty = ScanSummary::empty(
                                    crate::utils::now_unix_millis(),
                                    crate::utils::now_unix_millis(),
                                )
                                .with_issue(issue);
                                ScanResult { provenance: provenance.clone(), scanner: scanner.details(), summary: empty }
                            }
                        };
                        tables.record(scanner.name(), &provenance, result.clone());
                        let has_matcher = scanner.matcher().is_some();
                        self.write_through_provenance(has_matcher, &provenance, &result).await;
                        self.write_through(scanner.name(), has_matcher, &nested, tables, members).await;
                    }
                    let _ = tokio::fs::remove_dir_all(&dir).await;
                }
                Err(e) => {
                    crate::report::download_failed(&provenance, &e.to_string());
                    for scanner in &pending {
                        let issue = Issue::new(
                            "Downloader",
                            Severity::Error,
                            format!("Could not download provenance: {e}"),
                        );
                        let empty = ScanSummary::empty(
                            crate::utils::now_unix_millis(),
                            crate::utils::now_unix_millis(),
                        )
                        .with_issue(issue);
                        let result =
                            ScanResult { provenance: provenance.clone(), scanner: scanner.details(), summary: empty };
                        tables.record(scanner.name(), &provenance, result);
                        // Per §7: download failures are not written to scan storage.
                    }
                }
            }
        }
    }

    fn nested_result_complete(&self, nested: &NestedProvenance, scanner_name: &str, tables: &Tables) -> bool {
        nested.all_provenances().all(|p| {
            tables
                .scan_results
                .lock()
                .unwrap()
                .get(&(scanner_name.to_string(), p))
                .is_some_and(|r| !r.is_empty())
        })
    }

    async fn write_through(
        &self,
        scanner_name: &str,
        has_matcher: bool,
        nested: &NestedProvenance,
        tables: &Tables,
        members: &[&Package],
    ) {
        if !has_matcher {
            return;
        }
        if !self.nested_result_complete(nested, scanner_name, tables) {
            return;
        }
        let Some(store) = self.package_scan_store else { return };
        let mut nested_result = NestedProvenanceScanResult::new(nested.clone());
        for provenance in nested.all_provenances() {
            for result in tables.results_for(scanner_name, &provenance) {
                nested_result.insert(provenance.clone(), result);
            }
        }
        for pkg in members {
            if let Err(e) = store.write(pkg, &nested_result).await {
                crate::report::scan_storage_write_failed(&e.to_string());
            }
        }
    }

    async fn write_through_provenance(&self, has_matcher: bool, provenance: &KnownProvenance, result: &ScanResult) {
        if !has_matcher {
            return;
        }
        let Some(store) = self.provenance_scan_store else { return };
        if crate::store::has_vcs_path(provenance) {
            return;
        }
        if let Err(e) = store.write(result).await {
            crate::report::scan_storage_write_failed(&e.to_string());
        }
    }

    async fn assemble_package(&self, pkg: &Package, tables: &Tables, _context: &ScanContext) -> Vec<ScanResult> {
        let provenance = match tables.package_provenance.lock().unwrap().get(&pkg.id) {
            Some(Ok(provenance)) => Some(provenance.clone()),
            Some(Err(message)) => {
                let mut results = Vec::new();
                let sentinel = unresolved_sentinel_provenance(&pkg.id);
                for scanner in self.all_scanner_identities() {
                    let issue = Issue::new(
                        "PackageProvenanceResolver",
                        Severity::Error,
                        message.clone(),
                    );
                    let summary = ScanSummary::empty(
                        crate::utils::now_unix_millis(),
                        crate::utils::now_unix_millis(),
                    )
                    .with_issue(issue);
                    results.push(ScanResult { provenance: sentinel.clone(), scanner: scanner.details(), summary });
                }
                return results;
            }
            None => return Vec::new(),
        };
        let Some(root_provenance) = provenance else { return Vec::new() };
        let root = root_provenance.without_path();

        let nested = match tables.nested_provenance.lock().unwrap().get(&root) {
            Some(Ok(nested)) => nested.clone(),
            Some(Err(message)) => {
                let mut results = Vec::new();
                for scanner in self.all_scanner_identities() {
                    let issue = Issue::new("NestedProvenanceResolver", Severity::Error, message.clone());
                    let summary = ScanSummary::empty(
                        crate::utils::now_unix_millis(),
                        crate::utils::now_unix_millis(),
                    )
                    .with_issue(issue);
                    results.push(ScanResult { provenance: root.clone(), scanner: scanner.details(), summary });
                }
                return results;
            }
            _ => return Vec::new(),
        };

        let mut nested_result = NestedProvenanceScanResult::new(nested.clone());
        for scanner_provenance in nested.all_provenances() {
            for scanner in self.all_scanner_identities() {
                for result in tables.results_for(scanner.name(), &scanner_provenance) {
                    nested_result.insert(scanner_provenance.clone(), result);
                }
            }
        }

        for results in nested_result.scan_results.values_mut() {
            for result in results.iter_mut() {
                let vcs_path = root_provenance.as_repository().map(|r| r.path.as_str()).unwrap_or("");
                assemble::filter_by_vcs_path(&mut result.summary, vcs_path, &self.config);
                assemble::filter_by_ignore_patterns(&mut result.summary, &self.config);
            }
        }

        assemble::merge(&nested_result)
    }
}

/// A placeholder [`KnownProvenance`] for packages whose provenance could
/// not be resolved at all: [`ScanResult`] has no `Unknown` variant to put
/// there (only `Known` provenance ever flows into the scan pipeline), so
/// the sentinel result (§7) carries one keyed by the package identifier
/// instead, distinguishable across packages and never collided with a
/// real artifact URL.
fn unresolved_sentinel_provenance(id: &Identifier) -> KnownProvenance {
    KnownProvenance::Artifact(crate::model::ArtifactProvenance {
        url: format!("unresolved:{id}"),
        hash: String::new(),
    })
}
