//! Runtime layer for CGM Trace.
//!
//! Wires the normalizer, a store handle and the analysis engines into the
//! [`service::GlucoseService`] facade the outer layer calls.

pub mod service;

pub use cgm_core as core;
pub use cgm_data as data;
