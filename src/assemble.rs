//! C9: the result assembler.
//!
//! `split`/`merge` move findings between a single whole-repository
//! [`ScanResult`] and a [`NestedProvenanceScanResult`] distributed across a
//! tree, by longest-prefix match of each finding's `location.path` against
//! the tree's sub-repository paths — the same longest-prefix-wins rule
//! [`crate::model::NestedProvenance::longest_prefix_match`] uses, reused
//! here rather than reimplemented.

use crate::config::ScanConfig;
use crate::model::{
    Finding, Issue, KnownProvenance, Location, NestedProvenance, NestedProvenanceScanResult, ScanResult,
    ScanSummary,
};

/// Partitions `result`'s findings by longest-prefix match against
/// `nested_provenance`'s sub-repository paths, stripping the matched
/// prefix so each finding's path becomes relative to its own provenance.
/// `result.provenance` must equal `nested_provenance.root`.
pub fn split(result: &ScanResult, nested_provenance: &NestedProvenance) -> NestedProvenanceScanResult {
    let mut out = NestedProvenanceScanResult::new(nested_provenance.clone());

    let mut root_license = Vec::new();
    let mut root_copyright = Vec::new();
    let mut root_issues = Vec::new();
    let mut by_sub: std::collections::BTreeMap<String, (Vec<Finding>, Vec<Finding>)> =
        nested_provenance.sub_repositories.keys().map(|p| (p.clone(), (Vec::new(), Vec::new()))).collect();

    for finding in &result.summary.license_findings {
        route_finding(finding, nested_provenance, &mut root_license, &mut by_sub, true);
    }
    for finding in &result.summary.copyright_findings {
        route_finding(finding, nested_provenance, &mut root_copyright, &mut by_sub, false);
    }
    for issue in &result.summary.issues {
        root_issues.push(issue.clone());
    }

    let root_summary = ScanSummary {
        start_time: result.summary.start_time,
        end_time: result.summary.end_time,
        license_findings: root_license,
        copyright_findings: root_copyright,
        issues: root_issues,
        package_verification_code: result.summary.package_verification_code.clone(),
    };
    out.insert(
        nested_provenance.root.clone(),
        ScanResult { provenance: nested_provenance.root.clone(), scanner: result.scanner.clone(), summary: root_summary },
    );

    for (path, (license_findings, copyright_findings)) in by_sub {
        let Some(sub_repo) = nested_provenance.sub_repositories.get(&path) else { continue };
        let provenance = KnownProvenance::Repository(sub_repo.clone());
        let summary = ScanSummary {
            start_time: result.summary.start_time,
            end_time: result.summary.end_time,
            license_findings,
            copyright_findings,
            issues: Vec::new(),
            package_verification_code: None,
        };
        out.insert(provenance.clone(), ScanResult { provenance, scanner: result.scanner.clone(), summary });
    }

    out
}

fn route_finding(
    finding: &Finding,
    nested_provenance: &NestedProvenance,
    root_bucket: &mut Vec<Finding>,
    by_sub: &mut std::collections::BTreeMap<String, (Vec<Finding>, Vec<Finding>)>,
    is_license: bool,
) {
    match nested_provenance.longest_prefix_match(&finding.location.path) {
        None => root_bucket.push(finding.clone()),
        Some(prefix) => {
            let prefix = prefix.to_string();
            let mut relocated = finding.clone();
            relocated.location.path = strip_prefix(&finding.location.path, &prefix);
            let bucket = by_sub.entry(prefix).or_default();
            if is_license {
                bucket.0.push(relocated);
            } else {
                bucket.1.push(relocated);
            }
        }
    }
}

fn strip_prefix(path: &str, prefix: &str) -> String {
    path.strip_prefix(prefix).map(|rest| rest.trim_start_matches('/').to_string()).unwrap_or_else(|| path.to_string())
}

/// The inverse of [`split`]: re-prefixes each finding with its provenance's
/// path in the tree, unions findings per distinct scanner, takes the
/// min/max of contributing start/end times, and tags each issue with the
/// provenance it came from. `package_verification_code` is always left
/// empty (§9, known limitation: per-file hashes aren't retained once
/// findings have been distributed across the tree).
pub fn merge(nested_result: &NestedProvenanceScanResult) -> Vec<ScanResult> {
    let mut by_scanner: std::collections::BTreeMap<String, ScanResult> = std::collections::BTreeMap::new();

    for (provenance, results) in &nested_result.scan_results {
        let prefix = nested_result.nested_provenance.sub_repositories.iter().find_map(|(path, repo)| {
            (KnownProvenance::Repository(repo.clone()) == *provenance).then(|| path.clone())
        });

        for result in results {
            let entry = by_scanner.entry(result.scanner.name.clone()).or_insert_with(|| ScanResult {
                provenance: nested_result.nested_provenance.root.clone(),
                scanner: result.scanner.clone(),
                summary: ScanSummary::empty(result.summary.start_time, result.summary.end_time),
            });

            entry.summary.start_time = entry.summary.start_time.min(result.summary.start_time);
            entry.summary.end_time = entry.summary.end_time.max(result.summary.end_time);

            for finding in &result.summary.license_findings {
                entry.summary.license_findings.push(reprefix(finding, &prefix));
            }
            for finding in &result.summary.copyright_findings {
                entry.summary.copyright_findings.push(reprefix(finding, &prefix));
            }
            for issue in &result.summary.issues {
                entry.summary.issues.push(tag_issue(issue, provenance));
            }
        }
    }

    by_scanner.into_values().collect()
}

fn reprefix(finding: &Finding, prefix: &Option<String>) -> Finding {
    let Some(prefix) = prefix else { return finding.clone() };
    let mut relocated = finding.clone();
    relocated.location.path = if finding.location.path.is_empty() {
        prefix.clone()
    } else {
        format!("{prefix}/{}", finding.location.path)
    };
    relocated
}

fn tag_issue(issue: &Issue, provenance: &KnownProvenance) -> Issue {
    if issue.provenance.is_some() {
        issue.clone()
    } else {
        issue.clone().with_provenance(provenance.clone())
    }
}

/// Retains findings whose `path` starts with `vcs_path/` (or equals it), or
/// which match a configured license-file pattern — evaluated against
/// `config` so a package's VCS sub-path restriction never hides a
/// top-level LICENSE file (§4.8).
pub fn filter_by_vcs_path(summary: &mut ScanSummary, vcs_path: &str, config: &ScanConfig) {
    let keep = |path: &str| -> bool {
        if vcs_path.is_empty() {
            return true;
        }
        if path == vcs_path || path.starts_with(&format!("{vcs_path}/")) {
            return true;
        }
        config.is_license_file(path)
    };
    summary.license_findings.retain(|f| keep(&f.location.path));
    summary.copyright_findings.retain(|f| keep(&f.location.path));
}

/// Drops findings whose `path` matches any of `config`'s ignore globs.
pub fn filter_by_ignore_patterns(summary: &mut ScanSummary, config: &ScanConfig) {
    summary.license_findings.retain(|f| !config.is_ignored(&f.location.path));
    summary.copyright_findings.retain(|f| !config.is_ignored(&f.location.path));
}
