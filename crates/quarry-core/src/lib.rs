//! Shared contracts for the Quarry warehouse access core.
//!
//! Quarry multiplexes client queries across a small pool of interchangeable
//! warehouse service accounts. This crate holds the pieces every other
//! quarry crate agrees on:
//!
//! - the [`Driver`]/[`Session`] contract the warehouse driver implements
//! - the error taxonomy ([`ErrorClass`], [`DriverError`], [`AccessError`])
//!   and the classification hook the dispatch path uses to decide between
//!   failover and surfacing an error unchanged
//! - the [`TemplateExecutor`] seam consumed by the ticket scheduler and
//!   the insight store
//! - the [`EventListeners`] fan-out pattern crates publish their events on
//! - the named [`TemplateCatalog`] and the [`tag`] helpers for correlating
//!   client-side events with warehouse-side query history
//!
//! The `test-util` feature adds [`mock::ScriptedDriver`], an in-memory
//! driver with per-account scripted outcomes, so every layer above can be
//! exercised without a warehouse.

pub use driver::{CallOptions, ConnectParams, Driver, ExecuteOptions, QueryRows, Session};
pub use error::{AccessError, DriverError, ErrorClass};
pub use events::{ComponentEvent, EventListener, EventListeners, FnListener};
pub use executor::TemplateExecutor;
pub use templates::{names, TemplateCatalog};

mod driver;
mod error;
mod events;
mod executor;
pub mod tag;
mod templates;

#[cfg(feature = "test-util")]
pub mod mock;
