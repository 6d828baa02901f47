use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Typed value of an insight atom: a scalar or structured JSON.
///
/// Numeric aggregation coerces explicitly via
/// [`coerce_number`](InsightValue::coerce_number); nothing is silently
/// reinterpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InsightValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Structured(Value),
}

impl InsightValue {
    /// The value as a number, if it is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            InsightValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Explicit coercion for aggregation: non-numeric values count as 0.
    pub fn coerce_number(&self) -> f64 {
        self.as_number().unwrap_or(0.0)
    }
}

impl From<f64> for InsightValue {
    fn from(n: f64) -> Self {
        InsightValue::Number(n)
    }
}

impl From<i64> for InsightValue {
    fn from(n: i64) -> Self {
        InsightValue::Number(n as f64)
    }
}

impl From<bool> for InsightValue {
    fn from(b: bool) -> Self {
        InsightValue::Bool(b)
    }
}

impl From<&str> for InsightValue {
    fn from(s: &str) -> Self {
        InsightValue::Text(s.to_string())
    }
}

/// One subject/metric/value observation with provenance linkage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightAtom {
    pub atom_id: Uuid,
    pub customer_id: String,
    pub subject: String,
    pub metric: String,
    pub value: InsightValue,
    /// 16-hex fingerprint linking the atom to the query that produced it.
    pub provenance_hash: Option<String>,
    pub ts: DateTime<Utc>,
    pub ttl_seconds: Option<u64>,
}

impl InsightAtom {
    /// TTL is evaluated lazily on read and by the periodic sweep.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl_seconds {
            Some(ttl) => {
                let age = now.signed_duration_since(self.ts);
                age.num_seconds() >= 0 && age.num_seconds() as u64 >= ttl
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coercion_is_explicit_and_fails_to_zero() {
        assert_eq!(InsightValue::from(4.5).coerce_number(), 4.5);
        assert_eq!(InsightValue::from("not a number").coerce_number(), 0.0);
        assert_eq!(InsightValue::from(true).coerce_number(), 0.0);
        assert_eq!(
            InsightValue::Structured(json!({"p50": 12})).coerce_number(),
            0.0
        );
    }

    #[test]
    fn ttl_expiry() {
        let atom = InsightAtom {
            atom_id: Uuid::new_v4(),
            customer_id: "acme".into(),
            subject: "queries".into(),
            metric: "latency_p50".into(),
            value: InsightValue::from(10.0),
            provenance_hash: None,
            ts: Utc::now() - chrono::Duration::seconds(120),
            ttl_seconds: Some(60),
        };
        assert!(atom.is_expired(Utc::now()));

        let fresh = InsightAtom {
            ttl_seconds: Some(600),
            ..atom.clone()
        };
        assert!(!fresh.is_expired(Utc::now()));

        let immortal = InsightAtom {
            ttl_seconds: None,
            ..atom
        };
        assert!(!immortal.is_expired(Utc::now()));
    }

    #[test]
    fn value_deserializes_untagged() {
        let v: InsightValue = serde_json::from_str("3.5").unwrap();
        assert_eq!(v, InsightValue::Number(3.5));
        let v: InsightValue = serde_json::from_str("\"fast\"").unwrap();
        assert_eq!(v, InsightValue::Text("fast".into()));
        let v: InsightValue = serde_json::from_str("{\"p\":1}").unwrap();
        assert!(matches!(v, InsightValue::Structured(_)));
    }
}
