//! Shared Memory & Context (C1, spec.md §4.1).
//!
//! Mutated only by the executor's main loop, single writer per run, never
//! shared across runs (spec.md §5) — so this type is intentionally not
//! `Sync`-shared; callers clone the `Arc` snapshot instead of locking.

use crate::error::{ErrorKind, HiveError, Result};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// Keyed store passed between nodes during one run.
///
/// Insertion order is preserved for logging only; lookups are unordered.
#[derive(Debug, Clone, Default)]
pub struct SharedMemory {
    values: IndexMap<String, Value>,
}

/// Cheap, immutable view produced by `SharedMemory::snapshot`.
#[derive(Debug, Clone)]
pub struct MemorySnapshot(Arc<IndexMap<String, Value>>);

impl MemorySnapshot {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn as_map(&self) -> &IndexMap<String, Value> {
        &self.0
    }
}

impl SharedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed memory wholesale from trigger input (spec.md §4.1). Unused
    /// trigger keys are preserved for downstream consumption.
    pub fn seed(payload: IndexMap<String, Value>) -> Self {
        Self { values: payload }
    }

    /// Return exactly the requested keys. A missing key is an error surfaced
    /// to the caller, not silently defaulted (spec.md §4.1).
    pub fn read(&self, keys: &[String]) -> Result<IndexMap<String, Value>> {
        let mut out = IndexMap::new();
        for key in keys {
            match self.values.get(key) {
                Some(v) => {
                    out.insert(key.clone(), v.clone());
                }
                None => {
                    return Err(HiveError::new(
                        ErrorKind::ContractMissingInput,
                        format!("missing required input key `{key}`"),
                    ));
                }
            }
        }
        Ok(out)
    }

    /// Merge `map` into memory; shadowed keys are overwritten.
    pub fn write(&mut self, map: IndexMap<String, Value>) {
        for (k, v) in map {
            self.values.insert(k, v);
        }
    }

    /// Validate a node's proposed write set against its declared
    /// `output_keys` *after* the node returns. Undeclared keys are stripped
    /// and the caller is told which ones were rejected (spec.md §4.1).
    pub fn validate_write_set(
        declared: &[String],
        proposed: &IndexMap<String, Value>,
    ) -> std::result::Result<IndexMap<String, Value>, Vec<String>> {
        let mut undeclared = Vec::new();
        let mut accepted = IndexMap::new();
        for (k, v) in proposed {
            if declared.iter().any(|d| d == k) {
                accepted.insert(k.clone(), v.clone());
            } else {
                undeclared.push(k.clone());
            }
        }
        if undeclared.is_empty() {
            Ok(accepted)
        } else {
            Err(undeclared)
        }
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot(Arc::new(self.values.clone()))
    }

    pub fn as_map(&self) -> &IndexMap<String, Value> {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn read_returns_requested_keys_only() {
        let mut mem = SharedMemory::new();
        mem.write(IndexMap::from([
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!(2)),
        ]));

        let read = mem.read(&["a".to_string()]).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read.get("a"), Some(&json!(1)));
    }

    #[test]
    fn read_missing_key_is_an_error() {
        let mem = SharedMemory::new();
        let err = mem.read(&["missing".to_string()]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ContractMissingInput);
    }

    #[test]
    fn write_overwrites_shadowed_keys() {
        let mut mem = SharedMemory::new();
        mem.write(IndexMap::from([("a".to_string(), json!(1))]));
        mem.write(IndexMap::from([("a".to_string(), json!(2))]));
        assert_eq!(mem.as_map().get("a"), Some(&json!(2)));
    }

    #[test]
    fn validate_write_set_strips_undeclared_keys() {
        let declared = vec!["x".to_string()];
        let proposed = IndexMap::from([
            ("x".to_string(), json!(1)),
            ("y".to_string(), json!(2)),
        ]);
        let err = SharedMemory::validate_write_set(&declared, &proposed).unwrap_err();
        assert_eq!(err, vec!["y".to_string()]);
    }

    #[test]
    fn validate_write_set_accepts_declared_subset() {
        let declared = vec!["x".to_string(), "y".to_string()];
        let proposed = IndexMap::from([("x".to_string(), json!(1))]);
        let accepted = SharedMemory::validate_write_set(&declared, &proposed).unwrap();
        assert_eq!(accepted.get("x"), Some(&json!(1)));
    }
}
