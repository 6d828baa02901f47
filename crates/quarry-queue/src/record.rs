use crate::error::QueueError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Field names the queue owns. Payloads that redefine any of these are
/// rejected rather than silently overwritten.
pub const RESERVED_FIELDS: [&str; 4] = ["activity_id", "ts", "_queued_at", "_queue_sequence"];

/// One event as the caller hands it in: an arbitrary JSON-object payload
/// plus optional identity and timestamp overrides. The queue fills in
/// whatever is absent.
#[derive(Debug, Clone, Default)]
pub struct EventRecord {
    /// Dedup identity. Generated when absent.
    pub activity_id: Option<Uuid>,
    /// Event time. Generation time when absent.
    pub ts: Option<DateTime<Utc>>,
    pub payload: Map<String, Value>,
}

impl EventRecord {
    pub fn new(payload: Map<String, Value>) -> Self {
        Self {
            activity_id: None,
            ts: None,
            payload,
        }
    }

    pub fn with_activity_id(mut self, id: Uuid) -> Self {
        self.activity_id = Some(id);
        self
    }

    pub fn with_ts(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = Some(ts);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), QueueError> {
        for field in RESERVED_FIELDS {
            if self.payload.contains_key(field) {
                return Err(QueueError::ReservedField(field.to_string()));
            }
        }
        Ok(())
    }

    /// The canonical NDJSON line: payload fields plus the four reserved
    /// enrichment fields, newline-terminated.
    pub(crate) fn encode(
        &self,
        activity_id: Uuid,
        queued_at: DateTime<Utc>,
        sequence: u64,
    ) -> Result<String, QueueError> {
        let mut object = self.payload.clone();
        object.insert(
            "activity_id".to_string(),
            Value::String(activity_id.to_string()),
        );
        let ts = self.ts.unwrap_or(queued_at);
        object.insert(
            "ts".to_string(),
            Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        object.insert(
            "_queued_at".to_string(),
            Value::String(queued_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        object.insert("_queue_sequence".to_string(), Value::from(sequence));

        let mut line = serde_json::to_string(&Value::Object(object))?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn encode_carries_payload_and_reserved_fields() {
        let record = EventRecord::new(payload(&[("action", json!("query_started"))]));
        let id = Uuid::new_v4();
        let line = record.encode(id, Utc::now(), 7).unwrap();

        assert!(line.ends_with('\n'));
        let decoded: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(decoded["action"], "query_started");
        assert_eq!(decoded["activity_id"], id.to_string());
        assert_eq!(decoded["_queue_sequence"], 7);
        assert!(decoded["ts"].is_string());
        assert!(decoded["_queued_at"].is_string());
    }

    #[test]
    fn caller_timestamp_is_kept() {
        let ts = "2026-03-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let record = EventRecord::new(Map::new()).with_ts(ts);
        let line = record.encode(Uuid::new_v4(), Utc::now(), 1).unwrap();
        let decoded: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(decoded["ts"], "2026-03-01T12:00:00.000Z");
    }

    #[test]
    fn reserved_keys_are_rejected() {
        for field in RESERVED_FIELDS {
            let record = EventRecord::new(payload(&[(field, json!("x"))]));
            let err = record.validate().unwrap_err();
            assert!(matches!(err, QueueError::ReservedField(name) if name == field));
        }
    }
}
