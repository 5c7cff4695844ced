//! Ingestion, storage and analysis layer for CGM Trace.
//!
//! Normalizes uploaded CSV exports into ordered readings, stores them through
//! the [`store::GlucoseStore`] seam, and derives windowed summaries and trend
//! risk from stored readings.

pub mod aggregator;
pub mod columns;
pub mod jsonl_store;
pub mod normalizer;
pub mod store;
pub mod trend;

pub use cgm_core as core;
