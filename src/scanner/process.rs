//! A [`PathScanner`] that shells out to an external scanner executable,
//! the same idiom as the teacher's `compilers::solc::Solc` wrapping a
//! `std::process::Command` invocation of the `solc` binary — generalized
//! here to `tokio::process::Command` since the controller is async.
//!
//! The executable is expected to take a directory argument and print a
//! JSON-encoded [`ScanSummary`] on stdout; this is a minimal, made-up wire
//! contract (no real scanner CLI is in scope per spec §1) good enough to
//! exercise the controller against a real subprocess in integration tests.

use super::{PathScanner, ScannerIdentity};
use crate::config::ScanContext;
use crate::error::ScanError;
use crate::model::{ScanSummary, ScannerDetails};
use async_trait::async_trait;
use std::path::Path;

pub struct ProcessPathScanner {
    pub executable: std::path::PathBuf,
    pub args: Vec<String>,
    pub details: ScannerDetails,
    pub secret_keys: Vec<&'static str>,
}

impl ProcessPathScanner {
    pub fn new(executable: impl Into<std::path::PathBuf>, details: ScannerDetails) -> Self {
        Self { executable: executable.into(), args: Vec::new(), details, secret_keys: Vec::new() }
    }
}

impl ScannerIdentity for ProcessPathScanner {
    fn name(&self) -> &str {
        &self.details.name
    }

    fn details(&self) -> ScannerDetails {
        self.details.clone()
    }

    fn secret_keys(&self) -> &[&str] {
        &self.secret_keys
    }
}

#[async_trait]
impl PathScanner for ProcessPathScanner {
    async fn scan_path(&self, local_dir: &Path, _ctx: &ScanContext) -> Result<ScanSummary, ScanError> {
        let start_time = crate::utils::now_unix_millis();
        let output = tokio::process::Command::new(&self.executable)
            .args(&self.args)
            .arg(local_dir)
            .output()
            .await
            .map_err(|e| ScanError::ScannerFailure {
                scanner: self.details.name.clone(),
                message: format!("failed to launch: {e}"),
            })?;

        if !output.status.success() {
            return Err(ScanError::ScannerFailure {
                scanner: self.details.name.clone(),
                message: format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }

        let mut summary: ScanSummary =
            serde_json::from_slice(&output.stdout).map_err(|e| ScanError::ScannerFailure {
                scanner: self.details.name.clone(),
                message: format!("could not parse output: {e}"),
            })?;
        summary.start_time = start_time;
        summary.end_time = crate::utils::now_unix_millis();
        Ok(summary)
    }
}
