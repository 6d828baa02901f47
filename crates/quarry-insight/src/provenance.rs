//! Provenance fingerprints: a stable short hash of (template, params)
//! for audit linkage between insight atoms and the queries that produced
//! them.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};

/// Hex characters kept from the SHA-256 digest.
const HASH_LEN: usize = 16;

/// Deterministic 16-hex fingerprint of a template and its parameters.
///
/// Stable under whitespace normalization of the template and key order
/// of the params: runs of whitespace collapse to single spaces, and
/// `serde_json`'s object maps serialize with sorted keys.
pub fn provenance_hash(template: &str, params: &Value) -> String {
    let normalized = normalize_template(template);
    let canonical = canonical_json(params);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..HASH_LEN].to_string()
}

/// Collapse whitespace runs to single spaces and trim.
pub(crate) fn normalize_template(template: &str) -> String {
    template.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical JSON text: `serde_json::Value` objects are backed by a
/// sorted map, so serialization is already key-ordered at every level.
pub(crate) fn canonical_json(value: &Value) -> String {
    value.to_string()
}

/// One cached provenance record.
#[derive(Debug, Clone)]
pub struct ProvenanceRecord {
    pub hash: String,
    pub template: String,
    pub text: String,
    pub params_json: String,
    pub created_at: DateTime<Utc>,
}

/// Bounded insertion-ordered cache; overflowing evicts the oldest 20 %.
pub(crate) struct ProvenanceCache {
    capacity: usize,
    entries: HashMap<String, ProvenanceRecord>,
    order: VecDeque<String>,
}

impl ProvenanceCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub(crate) fn get(&self, hash: &str) -> Option<&ProvenanceRecord> {
        self.entries.get(hash)
    }

    pub(crate) fn insert(&mut self, record: ProvenanceRecord) {
        if self.entries.insert(record.hash.clone(), record.clone()).is_none() {
            self.order.push_back(record.hash);
        }
        if self.entries.len() > self.capacity {
            let evict = (self.capacity / 5).max(1);
            for _ in 0..evict {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_is_16_lowercase_hex() {
        let hash = provenance_hash("SELECT 1", &json!({}));
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn whitespace_normalization_is_stable() {
        let a = provenance_hash("SELECT a,  b\n\tFROM t", &json!({"x": 1}));
        let b = provenance_hash("SELECT a, b FROM t", &json!({"x": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn param_key_order_is_canonical() {
        let a: Value = serde_json::from_str(r#"{"b": 2, "a": 1, "nested": {"z": 1, "y": 2}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"nested": {"y": 2, "z": 1}, "a": 1, "b": 2}"#).unwrap();
        assert_eq!(
            provenance_hash("SELECT 1", &a),
            provenance_hash("SELECT 1", &b)
        );
    }

    #[test]
    fn different_inputs_differ() {
        let base = provenance_hash("SELECT 1", &json!({"x": 1}));
        assert_ne!(base, provenance_hash("SELECT 2", &json!({"x": 1})));
        assert_ne!(base, provenance_hash("SELECT 1", &json!({"x": 2})));
    }

    #[test]
    fn cache_evicts_oldest_fifth() {
        let mut cache = ProvenanceCache::new(10);
        for i in 0..11 {
            cache.insert(ProvenanceRecord {
                hash: format!("h{i}"),
                template: "T".into(),
                text: "SELECT 1".into(),
                params_json: "{}".into(),
                created_at: Utc::now(),
            });
        }
        // 11th insert overflows: the oldest 2 (20% of 10) are evicted.
        assert_eq!(cache.len(), 9);
        assert!(cache.get("h0").is_none());
        assert!(cache.get("h1").is_none());
        assert!(cache.get("h2").is_some());
        assert!(cache.get("h10").is_some());
    }

    #[test]
    fn reinsert_does_not_duplicate_order() {
        let mut cache = ProvenanceCache::new(4);
        for _ in 0..3 {
            cache.insert(ProvenanceRecord {
                hash: "same".into(),
                template: "T".into(),
                text: "SELECT 1".into(),
                params_json: "{}".into(),
                created_at: Utc::now(),
            });
        }
        assert_eq!(cache.len(), 1);
    }
}
