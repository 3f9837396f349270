use super::provenance::KnownProvenance;
use serde::{Deserialize, Serialize};

/// A source location a finding or issue is attributed to. `path` is
/// repository-relative (relative to whichever provenance the finding
/// currently belongs to — see [`crate::assemble`] for how that changes
/// across `split`/`merge`).
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
    Hint,
}

impl Severity {
    pub fn color(&self) -> yansi::Color {
        match self {
            Self::Error => yansi::Color::Red,
            Self::Warning => yansi::Color::Yellow,
            Self::Hint => yansi::Color::Blue,
        }
    }
}

/// A license or copyright detection.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub location: Location,
    /// SPDX expression or copyright statement text, depending on which list
    /// the finding belongs to.
    pub value: String,
    pub score: Option<f32>,
}

/// A recoverable condition surfaced during resolution or scanning (§7).
/// `provenance` is set by [`crate::assemble::merge`] to the sub-provenance
/// the issue arose from; it is `None` for issues that predate any
/// provenance (e.g. `ProvenanceUnresolvable`).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub source: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<KnownProvenance>,
}

impl Issue {
    pub fn new(source: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self { source: source.into(), severity, message: message.into(), provenance: None }
    }

    pub fn with_provenance(mut self, provenance: KnownProvenance) -> Self {
        self.provenance = Some(provenance);
        self
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub start_time: i64,
    pub end_time: i64,
    pub license_findings: Vec<Finding>,
    pub copyright_findings: Vec<Finding>,
    pub issues: Vec<Issue>,
    /// SPDX package verification code. Left empty when a summary results
    /// from merging a nested tree, since per-file hashes are not retained
    /// across the merge (§9, known limitation).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_verification_code: Option<String>,
}

impl ScanSummary {
    pub fn empty(start_time: i64, end_time: i64) -> Self {
        Self {
            start_time,
            end_time,
            license_findings: Vec::new(),
            copyright_findings: Vec::new(),
            issues: Vec::new(),
            package_verification_code: None,
        }
    }

    pub fn with_issue(mut self, issue: Issue) -> Self {
        self.issues.push(issue);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.license_findings.is_empty() && self.copyright_findings.is_empty()
    }
}
