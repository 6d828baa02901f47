use crate::atom::{InsightAtom, InsightValue};
use crate::config::InsightConfig;
use crate::provenance::{
    canonical_json, normalize_template, provenance_hash, ProvenanceCache, ProvenanceRecord,
};
use chrono::{DateTime, NaiveDate, Utc};
use quarry_core::{names, AccessError, ExecuteOptions, TemplateExecutor};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Numeric aggregations over query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// One day of a metric trend.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub count: usize,
    pub avg: f64,
}

/// Remote row shape for insight queries. Parsed leniently: rows missing
/// fields get defaults, unparseable rows are skipped.
#[derive(Debug, Deserialize)]
struct RowAtom {
    atom_id: Option<Uuid>,
    subject: Option<String>,
    metric: Option<String>,
    value: Option<Value>,
    provenance_hash: Option<String>,
    ts: Option<DateTime<Utc>>,
    ttl_seconds: Option<u64>,
}

/// Subject/metric/value store with a bounded per-customer memory ring
/// and write-through persistence over the dispatch path.
///
/// Reads prefer the ring; misses fall back to the named insight
/// templates and repopulate it. TTLs are honored lazily on read and by a
/// periodic sweep.
pub struct InsightStore {
    executor: Arc<dyn TemplateExecutor>,
    config: InsightConfig,
    rings: Mutex<HashMap<String, VecDeque<InsightAtom>>>,
    provenance: Mutex<ProvenanceCache>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl InsightStore {
    pub fn new(executor: Arc<dyn TemplateExecutor>, config: InsightConfig) -> Self {
        let provenance_capacity = config.provenance_capacity;
        Self {
            executor,
            config,
            rings: Mutex::new(HashMap::new()),
            provenance: Mutex::new(ProvenanceCache::new(provenance_capacity)),
            sweeper: Mutex::new(None),
        }
    }

    /// Start the periodic TTL sweep.
    pub fn start(self: &Arc<Self>) {
        let store = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(store.config.ttl_sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                store.sweep_once();
            }
        });
        *self.sweeper.lock().expect("insight mutex poisoned") = Some(handle);
    }

    pub fn stop(&self) {
        if let Some(handle) = self.sweeper.lock().expect("insight mutex poisoned").take() {
            handle.abort();
        }
    }

    /// Record one atom: append to the customer's ring and write through
    /// via `LOG_INSIGHT`. The atom id is returned even when the remote
    /// write fails — the ring keeps it and the error surfaces.
    pub async fn record(
        &self,
        customer: &str,
        subject: &str,
        metric: &str,
        value: InsightValue,
        provenance_hash: Option<String>,
        ttl_seconds: Option<u64>,
    ) -> Result<Uuid, AccessError> {
        let atom = InsightAtom {
            atom_id: Uuid::new_v4(),
            customer_id: customer.to_string(),
            subject: subject.to_string(),
            metric: metric.to_string(),
            value,
            provenance_hash,
            ts: Utc::now(),
            ttl_seconds,
        };
        let atom_id = atom.atom_id;
        let params = vec![
            json!(atom.atom_id),
            json!(atom.customer_id),
            json!(atom.subject),
            json!(atom.metric),
            serde_json::to_value(&atom.value).unwrap_or(Value::Null),
        ];
        self.push_ring(atom);

        self.executor
            .execute_template(names::LOG_INSIGHT, &params, ExecuteOptions::default())
            .await?;
        Ok(atom_id)
    }

    /// Query atoms for a customer, optionally narrowed by subject and
    /// metric. Ring-first; a miss issues the narrowest matching template
    /// and repopulates the ring.
    pub async fn query(
        &self,
        customer: &str,
        subject: Option<&str>,
        metric: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<InsightAtom>, AccessError> {
        let limit = limit.unwrap_or(self.config.default_limit);

        let local = self.filter_ring(customer, subject, metric, limit);
        if local.len() >= limit {
            return Ok(local);
        }

        let (template, params) = match (subject, metric) {
            (Some(s), Some(m)) => (
                names::GET_INSIGHTS_BY_SUBJECT_METRIC,
                vec![json!(customer), json!(s), json!(m), json!(limit)],
            ),
            (Some(s), None) => (
                names::GET_INSIGHTS_BY_SUBJECT,
                vec![json!(customer), json!(s), json!(limit)],
            ),
            _ => (
                names::GET_INSIGHTS_BY_CUSTOMER,
                vec![json!(customer), json!(limit)],
            ),
        };
        let rows = self
            .executor
            .execute_template(template, &params, ExecuteOptions::default())
            .await?;

        let fetched: Vec<InsightAtom> = rows
            .rows
            .iter()
            .filter_map(|row| parse_row(customer, row))
            .collect();
        self.merge_ring(customer, fetched);

        Ok(self.filter_ring(customer, subject, metric, limit))
    }

    /// The most recent atom for a subject/metric pair.
    pub async fn get_latest(
        &self,
        customer: &str,
        subject: &str,
        metric: &str,
    ) -> Result<Option<InsightAtom>, AccessError> {
        let atoms = self
            .query(customer, Some(subject), Some(metric), Some(1))
            .await?;
        Ok(atoms.into_iter().next())
    }

    /// Daily buckets (count + average) over the last `days` days.
    pub async fn get_trend(
        &self,
        customer: &str,
        subject: &str,
        metric: &str,
        days: u32,
    ) -> Result<Vec<TrendPoint>, AccessError> {
        let atoms = self
            .query(customer, Some(subject), Some(metric), None)
            .await?;
        let cutoff = Utc::now() - chrono::Duration::days(days as i64);

        let mut buckets: HashMap<NaiveDate, (usize, f64)> = HashMap::new();
        for atom in atoms.iter().filter(|a| a.ts >= cutoff) {
            let bucket = buckets.entry(atom.ts.date_naive()).or_insert((0, 0.0));
            bucket.0 += 1;
            bucket.1 += atom.value.coerce_number();
        }

        let mut points: Vec<TrendPoint> = buckets
            .into_iter()
            .map(|(date, (count, sum))| TrendPoint {
                date,
                count,
                avg: if count > 0 { sum / count as f64 } else { 0.0 },
            })
            .collect();
        points.sort_by_key(|p| p.date);
        Ok(points)
    }

    /// Numeric aggregation over query results; non-numeric values coerce
    /// to 0.
    pub async fn aggregate(
        &self,
        customer: &str,
        subject: Option<&str>,
        metric: Option<&str>,
        aggregate: Aggregate,
    ) -> Result<f64, AccessError> {
        let atoms = self.query(customer, subject, metric, None).await?;
        let numbers: Vec<f64> = atoms.iter().map(|a| a.value.coerce_number()).collect();
        let result = match aggregate {
            Aggregate::Count => numbers.len() as f64,
            Aggregate::Sum => numbers.iter().sum(),
            Aggregate::Avg => {
                if numbers.is_empty() {
                    0.0
                } else {
                    numbers.iter().sum::<f64>() / numbers.len() as f64
                }
            }
            Aggregate::Min => numbers.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregate::Max => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        };
        if result.is_finite() {
            Ok(result)
        } else {
            // Min/Max over nothing.
            Ok(0.0)
        }
    }

    /// Fingerprint a template + params pair and persist it via
    /// `LOG_PROVENANCE`. Returns the 16-hex hash.
    pub async fn store_provenance(
        &self,
        template: &str,
        text: &str,
        params: &Value,
    ) -> Result<String, AccessError> {
        let normalized = normalize_template(text);
        let params_json = canonical_json(params);
        let hash = provenance_hash(text, params);

        let record = ProvenanceRecord {
            hash: hash.clone(),
            template: template.to_string(),
            text: normalized.clone(),
            params_json: params_json.clone(),
            created_at: Utc::now(),
        };
        self.provenance
            .lock()
            .expect("insight mutex poisoned")
            .insert(record);

        self.executor
            .execute_template(
                names::LOG_PROVENANCE,
                &[
                    json!(hash),
                    json!(template),
                    json!(normalized),
                    json!(params_json),
                    json!(self.config.created_by),
                ],
                ExecuteOptions::default(),
            )
            .await?;
        Ok(hash)
    }

    /// Look a provenance record up: cache first, then `GET_PROVENANCE`.
    pub async fn get_provenance(
        &self,
        hash: &str,
    ) -> Result<Option<ProvenanceRecord>, AccessError> {
        if let Some(record) = self
            .provenance
            .lock()
            .expect("insight mutex poisoned")
            .get(hash)
        {
            return Ok(Some(record.clone()));
        }

        let rows = self
            .executor
            .execute_template(
                names::GET_PROVENANCE,
                &[json!(hash)],
                ExecuteOptions::default(),
            )
            .await?;
        let Some(row) = rows.rows.first() else {
            return Ok(None);
        };
        let record = ProvenanceRecord {
            hash: hash.to_string(),
            template: row["template"].as_str().unwrap_or_default().to_string(),
            text: row["text"].as_str().unwrap_or_default().to_string(),
            params_json: row["params_json"].as_str().unwrap_or_default().to_string(),
            created_at: row["created_at"]
                .as_str()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(Utc::now),
        };
        self.provenance
            .lock()
            .expect("insight mutex poisoned")
            .insert(record.clone());
        Ok(Some(record))
    }

    /// Drop expired atoms from every ring. The sweep task calls this on
    /// its interval.
    pub fn sweep_once(&self) {
        let now = Utc::now();
        let mut rings = self.rings.lock().expect("insight mutex poisoned");
        for ring in rings.values_mut() {
            ring.retain(|atom| !atom.is_expired(now));
        }
        rings.retain(|_, ring| !ring.is_empty());
    }

    fn push_ring(&self, atom: InsightAtom) {
        let mut rings = self.rings.lock().expect("insight mutex poisoned");
        let ring = rings.entry(atom.customer_id.clone()).or_default();
        ring.push_back(atom);
        while ring.len() > self.config.ring_capacity {
            ring.pop_front();
        }
    }

    /// Merge fetched atoms into the ring without displacing local ones
    /// that the warehouse has not surfaced yet.
    fn merge_ring(&self, customer: &str, fetched: Vec<InsightAtom>) {
        if fetched.is_empty() {
            return;
        }
        let mut rings = self.rings.lock().expect("insight mutex poisoned");
        let ring = rings.entry(customer.to_string()).or_default();
        for atom in fetched {
            if ring.iter().all(|existing| existing.atom_id != atom.atom_id) {
                ring.push_back(atom);
            }
        }
        while ring.len() > self.config.ring_capacity {
            ring.pop_front();
        }
    }

    /// Newest-first ring view filtered by subject/metric, expired atoms
    /// skipped.
    fn filter_ring(
        &self,
        customer: &str,
        subject: Option<&str>,
        metric: Option<&str>,
        limit: usize,
    ) -> Vec<InsightAtom> {
        let now = Utc::now();
        let rings = self.rings.lock().expect("insight mutex poisoned");
        let Some(ring) = rings.get(customer) else {
            return Vec::new();
        };
        ring.iter()
            .rev()
            .filter(|atom| !atom.is_expired(now))
            .filter(|atom| subject.map_or(true, |s| atom.subject == s))
            .filter(|atom| metric.map_or(true, |m| atom.metric == m))
            .take(limit)
            .cloned()
            .collect()
    }
}

impl Drop for InsightStore {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.sweeper.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

fn parse_row(customer: &str, row: &Value) -> Option<InsightAtom> {
    let parsed: RowAtom = serde_json::from_value(row.clone())
        .map_err(|err| {
            tracing::debug!(error = %err, "skipping unparseable insight row");
            err
        })
        .ok()?;
    let value = parsed
        .value
        .map(|v| serde_json::from_value(v.clone()).unwrap_or(InsightValue::Structured(v)))
        .unwrap_or(InsightValue::Number(0.0));
    Some(InsightAtom {
        atom_id: parsed.atom_id.unwrap_or_else(Uuid::new_v4),
        customer_id: customer.to_string(),
        subject: parsed.subject.unwrap_or_default(),
        metric: parsed.metric.unwrap_or_default(),
        value,
        provenance_hash: parsed.provenance_hash,
        ts: parsed.ts.unwrap_or_else(Utc::now),
        ttl_seconds: parsed.ttl_seconds,
    })
}
