//! Integration tests for host-preflight.
//!
//! These tests drive complete runs against the mock host, a local HTTP
//! server and a stand-in ssh client.

pub mod full_run_tests;
pub mod transport_tests;
