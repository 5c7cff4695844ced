//! Domain types, errors and shared helpers for CGM Trace.
//!
//! Everything here is free of I/O apart from the persisted CLI settings:
//! the glucose record model, time windows, derived insight and risk types,
//! numeric accumulators and timestamp parsing.

pub mod calculations;
pub mod error;
pub mod models;
pub mod settings;
pub mod time_utils;

pub use error::{CgmError, Result};
