//! Core types and durable state for vowkeep.
//!
//! This crate provides:
//! - Cache tier and mutation queue storage with a SQLite backend
//! - Concrete request/response value types and request identity
//! - Unified error types
//! - Configuration structures

pub mod config;
pub mod error;
pub mod exchange;
pub mod store;

pub use config::AppConfig;
pub use error::Error;
pub use exchange::{HttpRequest, HttpResponse};
pub use store::{CacheDb, CachedEntry, DeadLetter, QueuedMutation, TierKind};
