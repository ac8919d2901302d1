//! Privacy filter applied before any failure data is written (spec.md §4.3).
//!
//! Masking is irreversible: the original value is never logged once this
//! filter has run.

use regex::Regex;
use serde_json::Value;

pub const MASK: &str = "********";

/// Recursively walk a JSON value, masking:
/// - values whose key matches a configured sensitive-key pattern, and
/// - string values that match a vendor-key shape regardless of key name.
pub fn sanitize(value: &Value, sensitive_key_patterns: &[String]) -> Value {
    sanitize_inner(value, None, sensitive_key_patterns)
}

fn sanitize_inner(value: &Value, key: Option<&str>, patterns: &[String]) -> Value {
    if let Some(k) = key {
        if key_is_sensitive(k, patterns) {
            return Value::String(MASK.to_string());
        }
    }

    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.clone(), sanitize_inner(v, Some(k), patterns));
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| sanitize_inner(v, key, patterns)).collect())
        }
        Value::String(s) => {
            if looks_like_vendor_secret(s) {
                Value::String(MASK.to_string())
            } else {
                Value::String(s.clone())
            }
        }
        other => other.clone(),
    }
}

fn key_is_sensitive(key: &str, patterns: &[String]) -> bool {
    let key_lower = key.to_lowercase();
    patterns
        .iter()
        .any(|p| key_lower.contains(&p.to_lowercase()))
}

fn vendor_secret_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(sk-[A-Za-z0-9_\-]{10,}|glpat-[A-Za-z0-9_\-]{10,}|pat\.[A-Za-z0-9_\-]{10,}|ghp_[A-Za-z0-9]{20,}|xox[abp]-[A-Za-z0-9\-]{10,})$")
            .expect("static vendor secret regex")
    })
}

fn looks_like_vendor_secret(value: &str) -> bool {
    vendor_secret_regex().is_match(value.trim())
}
