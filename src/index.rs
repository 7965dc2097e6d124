//! In-memory hash index mapping keys to log offsets.

use std::collections::HashMap;

use crate::error::Result;

/// Readiness of the index.
///
/// Lookups are only authoritative in `Ready`; in any other state the store
/// answers reads from a full log scan instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexState {
    #[default]
    Empty,
    Building,
    Ready,
}

/// Mapping from key to the offset of that key's latest record.
///
/// The index never touches the log file itself; it is fed by scans and by
/// `remember` calls after each append. All mutation happens under the
/// store's writer section.
#[derive(Debug, Default)]
pub struct HashIndex {
    offsets: HashMap<String, u64>,
    state: IndexState,
}

impl HashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> IndexState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == IndexState::Ready
    }

    /// Rebuilds the mapping from a full log scan, last write wins.
    ///
    /// The scan is consumed into a fresh mapping which is swapped in only
    /// once the scan completes; on error the previous mapping and state are
    /// kept untouched. Safe to call repeatedly, including from `Ready`.
    pub fn build<I>(&mut self, scan: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<(u64, String, Vec<u8>)>>,
    {
        let previous = self.state;
        self.state = IndexState::Building;

        let mut fresh = HashMap::new();
        for entry in scan {
            match entry {
                Ok((offset, key, _value)) => {
                    fresh.insert(key, offset);
                }
                Err(e) => {
                    self.state = previous;
                    return Err(e);
                }
            }
        }

        self.offsets = fresh;
        self.state = IndexState::Ready;
        Ok(())
    }

    /// Returns the offset of the latest record for `key`, if indexed.
    ///
    /// Only meaningful when `is_ready()`; the store owns that decision.
    pub fn lookup(&self, key: &str) -> Option<u64> {
        self.offsets.get(key).copied()
    }

    /// Upserts the offset for `key`. Legal in every state, so writes issued
    /// while a build is in flight are not lost.
    pub fn remember(&mut self, key: String, offset: u64) {
        self.offsets.insert(key, offset);
    }

    /// Removes `key` from the mapping. Reserved for future delete support;
    /// nothing in the engine emits it today.
    pub fn forget(&mut self, key: &str) {
        self.offsets.remove(key);
    }

    /// Replaces the whole mapping and marks the index ready.
    ///
    /// Used by compaction, which knows every surviving key's offset from
    /// the order it wrote the new file in.
    pub(crate) fn repoint(&mut self, offsets: HashMap<String, u64>) {
        self.offsets = offsets;
        self.state = IndexState::Ready;
    }
}
