//! Validation engine module.
//!
//! Check selection and interpretation, result aggregation and exit codes.

pub mod orchestrator;
pub mod result;
