//! Explicit configuration, threaded through constructors.
//!
//! No process-wide mutable singletons (spec.md §9 "re-architecting
//! patterns"): every component that needs configuration receives a
//! `HiveConfig` (or a narrower slice of it) at construction time.

use serde::{Deserialize, Serialize};

/// Drop policy applied by the event bus when a subscriber falls behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventDropPolicy {
    DropOldest,
    DropNewest,
}

impl Default for EventDropPolicy {
    fn default() -> Self {
        EventDropPolicy::DropOldest
    }
}

/// Recognized configuration options (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveConfig {
    pub drain_timeout_seconds: u64,
    pub default_max_retries_per_node: u32,
    pub default_tool_timeout_seconds: u64,
    pub failure_log_cap_per_fingerprint: usize,
    pub sensitive_key_patterns: Vec<String>,
    pub storage_base_path: std::path::PathBuf,
    pub health_port: u16,
    pub event_subscriber_drop_policy: EventDropPolicy,
    /// Identifies this process in the persisted `agents/{agent_id}/` tree
    /// (spec.md §6). Not part of the graph data model — it names the
    /// deployment, not a run.
    pub agent_id: String,
    /// Final fallback below `NodeSpec.model`/`GraphSpec.default_model`, for
    /// when neither is set (spec.md §3 names the two-level chain; this is
    /// the floor beneath it).
    pub default_model: String,
    pub default_max_tokens: u32,
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            drain_timeout_seconds: 30,
            default_max_retries_per_node: 3,
            default_tool_timeout_seconds: 30,
            failure_log_cap_per_fingerprint: 5,
            sensitive_key_patterns: default_sensitive_key_patterns(),
            storage_base_path: std::path::PathBuf::from("./hive-data"),
            health_port: 8080,
            event_subscriber_drop_policy: EventDropPolicy::DropOldest,
            agent_id: "default-agent".to_string(),
            default_model: "default-model".to_string(),
            default_max_tokens: 1024,
        }
    }
}

fn default_sensitive_key_patterns() -> Vec<String> {
    vec![
        "api_key".to_string(),
        "apikey".to_string(),
        "password".to_string(),
        "secret".to_string(),
        "token".to_string(),
        "authorization".to_string(),
        "email".to_string(),
    ]
}

impl HiveConfig {
    /// Load configuration overrides from environment variables prefixed
    /// `HIVE_`, falling back to defaults for anything unset.
    ///
    /// Mirrors the teacher's `config::loader` pattern of layering env vars
    /// over a struct default rather than a global config singleton.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("HIVE_DRAIN_TIMEOUT_SECONDS") {
            if let Ok(parsed) = v.parse() {
                config.drain_timeout_seconds = parsed;
            }
        }
        if let Ok(v) = std::env::var("HIVE_DEFAULT_MAX_RETRIES_PER_NODE") {
            if let Ok(parsed) = v.parse() {
                config.default_max_retries_per_node = parsed;
            }
        }
        if let Ok(v) = std::env::var("HIVE_DEFAULT_TOOL_TIMEOUT_SECONDS") {
            if let Ok(parsed) = v.parse() {
                config.default_tool_timeout_seconds = parsed;
            }
        }
        if let Ok(v) = std::env::var("HIVE_FAILURE_LOG_CAP_PER_FINGERPRINT") {
            if let Ok(parsed) = v.parse() {
                config.failure_log_cap_per_fingerprint = parsed;
            }
        }
        if let Ok(v) = std::env::var("HIVE_STORAGE_BASE_PATH") {
            config.storage_base_path = std::path::PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("HIVE_HEALTH_PORT") {
            if let Ok(parsed) = v.parse() {
                config.health_port = parsed;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = HiveConfig::default();
        assert_eq!(config.drain_timeout_seconds, 30);
        assert_eq!(config.default_max_retries_per_node, 3);
        assert_eq!(config.default_tool_timeout_seconds, 30);
        assert_eq!(config.failure_log_cap_per_fingerprint, 5);
        assert_eq!(config.event_subscriber_drop_policy, EventDropPolicy::DropOldest);
    }

    #[test]
    fn sensitive_patterns_cover_spec_examples() {
        let config = HiveConfig::default();
        for key in ["api_key", "password", "secret", "token", "authorization", "email"] {
            assert!(config.sensitive_key_patterns.iter().any(|p| p == key));
        }
    }
}
