//! Platform abstraction layer.
//!
//! Provides consistent interfaces for:
//! - Target resolution from overrides, environment and inventory
//! - Remote command execution over SSH
//! - Connection acquisition with bounded retries
//! - Concurrent HTTP probing
//! - Time (sleeping) so retry logic can be driven by a fake clock

pub mod clock;
pub mod connection;
pub mod http;
pub mod inventory;
pub mod ssh;
