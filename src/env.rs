//! A read-only snapshot of the environment the scan ran in (§6), embedded
//! in the run record so results remain reproducible-by-inspection later.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub os: String,
    pub runtime_version: String,
    pub tool_version: String,
}

impl Environment {
    pub fn capture(tool_version: impl Into<String>) -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            runtime_version: rustc_runtime_version(),
            tool_version: tool_version.into(),
        }
    }
}

fn rustc_runtime_version() -> String {
    option_env!("CARGO_PKG_RUST_VERSION").unwrap_or("unknown").to_string()
}
