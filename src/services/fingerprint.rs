//! Deterministic finding fingerprints for the SARIF `partialFingerprints` map.
//!
//! Hashes identifying fields that remain stable across re-scans, excluding
//! volatile fields like line numbers that shift with unrelated code edits.

use sha2::{Digest, Sha256};

/// Fingerprint scheme name placed as the `partialFingerprints` key.
pub const SCHEME: &str = "sastFingerprint/v1";

/// Compute a finding fingerprint from project, file path and rule id.
pub fn compute(project: &str, file_path: &str, rule_id: u64) -> String {
    hash(&format!("SAST:{project}:{file_path}:{rule_id}"))
}

/// SHA-256 hash a string and return hex-encoded digest.
fn hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
