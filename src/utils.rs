//! Small helpers shared across modules: path normalization, URL-safe key
//! encoding for the file-based stores (§6), and content hashing.

use sha2::{Digest, Sha256};
use std::path::Path;

/// Normalizes a path to the forward-slash, no-trailing-slash form every
/// `Location::path` and sub-repository path key uses.
pub fn to_forward_slash(path: &Path) -> String {
    path_slash::PathExt::to_slash_lossy(path).trim_end_matches('/').to_string()
}

/// URL-encodes a string for use as a path segment, e.g. turning
/// `https://github.com/a/b` into a safe directory name for the file-based
/// store (§6: `artifact/<url-encoded>/scan-results.yml`).
pub fn url_encode_path_segment(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Returns the longest-prefix match among `candidates` for `path`, if any,
/// treating each candidate as a directory prefix (`candidate` or
/// `candidate/...`).
pub fn longest_prefix<'a>(path: &str, candidates: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    candidates
        .filter(|c| path == *c || path.starts_with(&format!("{c}/")))
        .max_by_key(|c| c.len())
}

pub fn now_unix_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
