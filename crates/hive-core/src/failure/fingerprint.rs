//! Stable fingerprinting for failure deduplication (spec.md §3, §4.3).

use sha2::{Digest, Sha256};

/// Normalize an error message before hashing: strip anything that would
/// otherwise make two occurrences of the "same" failure hash differently
/// (timestamps, uuids, pointer-ish hex runs).
pub fn normalize_message(message: &str) -> String {
    let uuid_re = regex_uuid();
    let hex_re = regex_hex_run();
    let digit_re = regex_digit_run();

    let normalized = uuid_re.replace_all(message, "<uuid>");
    let normalized = hex_re.replace_all(&normalized, "<hex>");
    let normalized = digit_re.replace_all(&normalized, "<n>");
    normalized.trim().to_lowercase()
}

fn regex_uuid() -> regex::Regex {
    regex::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .expect("static uuid regex")
}

fn regex_hex_run() -> regex::Regex {
    regex::Regex::new(r"\b0x[0-9a-fA-F]{4,}\b").expect("static hex regex")
}

fn regex_digit_run() -> regex::Regex {
    regex::Regex::new(r"\b\d{2,}\b").expect("static digit regex")
}

/// `fingerprint = sha256(node_id + error_kind + normalized_message)`,
/// stable across runs (spec.md §3).
pub fn fingerprint(node_id: &str, error_kind: &str, message: &str) -> String {
    let normalized = normalize_message(message);
    let mut hasher = Sha256::new();
    hasher.update(node_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(error_kind.as_bytes());
    hasher.update(b"\0");
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}
