//! Error types for kvlog.

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes at `offset` do not form a well-formed record.
    ///
    /// Never downgraded to an empty value; scans stop and surface this.
    #[error("Corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    /// A read was issued past end-of-file. Indicates the index and the log
    /// are out of sync; the store reacts by rebuilding the index.
    #[error("Offset {offset} out of range for log of {len} bytes")]
    OffsetOutOfRange { offset: u64, len: u64 },

    /// Writing or durably flushing the compaction side file failed, or the
    /// atomic replace did. The original log is left authoritative.
    #[error("Compaction IO error: {0}")]
    Compaction(#[source] std::io::Error),

    #[error("Only one writer allowed at a time")]
    WriterLock,

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("Key size must be greater than 0")]
    InvalidEmptyKey,
}
