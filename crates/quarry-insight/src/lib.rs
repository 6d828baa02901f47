//! Insight atoms: subject/metric/value observations with provenance.
//!
//! The store keeps a small per-customer ring in memory, writes through to
//! the warehouse over the dispatch path (`LOG_INSIGHT`), and answers
//! reads ring-first with template fallback. Provenance hashes give every
//! atom a stable 16-hex fingerprint of the query that produced it.

pub use atom::{InsightAtom, InsightValue};
pub use config::{InsightConfig, InsightConfigBuilder};
pub use provenance::{provenance_hash, ProvenanceRecord};
pub use store::{Aggregate, InsightStore, TrendPoint};

mod atom;
mod config;
mod provenance;
mod store;
