//! Network access for the vowkeep coordinator.
//!
//! This crate provides:
//! - The `Network` trait, the seam between strategies and the wire
//! - `OriginClient`, the reqwest-backed implementation
//! - URL resolution and canonicalization
//! - A scripted `FakeNetwork` for tests

pub mod net;
pub mod testing;

pub use net::{Network, NetworkConfig, OriginClient};
