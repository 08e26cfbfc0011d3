//! SQLite-backed durable state: cache tiers and the mutation queue.
//!
//! This module provides the persistent half of the coordinator using
//! SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Versioned cache tier namespaces with stale-version purge
//! - A FIFO mutation queue with retry accounting
//! - A capped dead-letter log for abandoned mutations
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//!
//! Every mutation of durable state is a single atomic statement (or one
//! transaction for the queue-to-dead-letter move), so the host killing
//! the worker mid-event can never leave a record half-written.

pub mod connection;
pub mod migrations;
pub mod queue;
pub mod tiers;

pub use crate::Error;

pub use connection::CacheDb;
pub use queue::{DeadLetter, QueuedMutation};
pub use tiers::{CachedEntry, TierKind};
