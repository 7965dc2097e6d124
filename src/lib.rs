//! A log-structured, single-node key-value storage engine.
//!
//! kvlog persists writes to an append-only record log and serves point
//! lookups through an in-memory hash index. Overwritten values stay in the
//! log until compaction rewrites it keeping only the latest record per key,
//! either on demand ([`Store::compact`]) or on a schedule
//! ([`daemon::CompactionDaemon`]).

pub mod applog;
pub mod command;
pub mod compaction;
pub mod daemon;
pub mod error;
pub mod index;
pub mod record;
pub mod store;

pub use error::{Error, Result};
pub use store::Store;
