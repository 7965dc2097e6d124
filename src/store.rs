//! The storage engine façade.
//!
//! `Store` composes the append log and the hash index and exposes the
//! engine API (`set`, `get`, `items`, `compact`). A single mutex guards
//! both; it is the writer's exclusive section, so offset assignment and the
//! matching index update are always observed together.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use fs2::FileExt;

use crate::applog::AppendLog;
use crate::compaction;
use crate::error::{Error, Result};
use crate::index::HashIndex;

/// A log-structured key-value store.
///
/// Opens against a single log file and maintains an in-memory index of the
/// latest offset per key. Safe to share across threads (`set`/`get`/`items`
/// take `&self`); a background compaction daemon can hold the same `Store`
/// behind an `Arc`.
///
/// # Examples
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = kvlog::Store::open("my.db")?;
///
/// store.set("key", b"value")?;
/// assert_eq!(store.get("key")?, Some(b"value".to_vec()));
///
/// let reclaimed = store.compact()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    _file_lock: File,
    inner: Mutex<Inner>,
}

/// Engine state behind the writer lock: the log and its canonical index.
#[derive(Debug)]
pub(crate) struct Inner {
    pub(crate) log: AppendLog,
    pub(crate) index: HashIndex,
}

impl Store {
    /// Opens the store against the log file at `path`, creating the file
    /// (and parent directories) if needed, and builds the index from a
    /// full scan.
    ///
    /// A sibling `<path>.lock` file is locked exclusively for the lifetime
    /// of the store; a second open of the same path fails with
    /// `Error::WriterLock`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(lock_file_path(&path))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| Error::WriterLock)?;

        let log = AppendLog::open(&path)?;
        let size = log.size()?;
        let mut index = HashIndex::new();
        index.build(log.scan()?)?;

        log::debug!("opened store at {} ({} bytes)", path.display(), size);

        Ok(Self {
            path,
            _file_lock: lock_file,
            inner: Mutex::new(Inner { log, index }),
        })
    }

    /// Path of the log file this store owns.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stores a key/value pair.
    ///
    /// Appends to the log, then updates the index, in one exclusive
    /// section; the write is visible to subsequent `get` calls as soon as
    /// this returns.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidEmptyKey` for an empty key; IO failures
    /// propagate as `Error::Io`.
    pub fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::InvalidEmptyKey);
        }

        let mut inner = self.lock_inner()?;
        let offset = inner.log.append(key, value)?;
        inner.index.remember(key.to_string(), offset);
        Ok(())
    }

    /// Returns the most recent value written for `key`, or `None` if the
    /// key was never written.
    ///
    /// Uses the index when it is ready; otherwise falls back to a full
    /// scan keeping the last value seen for `key`. A stale index entry
    /// (pointing past end-of-file) triggers a rebuild and one retry.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if key.is_empty() {
            return Err(Error::InvalidEmptyKey);
        }

        let mut inner = self.lock_inner()?;
        inner.get(key)
    }

    /// Returns the latest value for every key ever written, one entry per
    /// distinct key, computed from a full scan of the log.
    ///
    /// This is the logical snapshot compaction reproduces.
    pub fn items(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        let inner = self.lock_inner()?;
        inner.items()
    }

    /// Rewrites the log so only the latest record per key remains.
    /// Returns the number of bytes reclaimed.
    pub fn compact(&self) -> Result<u64> {
        compaction::perform_compaction(self, None)
    }

    pub(crate) fn lock_inner(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| Error::LockPoisoned(e.to_string()))
    }
}

impl Inner {
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        if !self.index.is_ready() {
            return self.scan_for(key);
        }

        let Some(offset) = self.index.lookup(key) else {
            return Ok(None);
        };

        match self.log.read_at(offset) {
            Ok((_, value)) => Ok(Some(value)),
            Err(Error::OffsetOutOfRange { offset, len }) => {
                // Index and log are out of sync. Fatal to the current
                // index: rebuild it, then answer from the fresh mapping.
                log::warn!(
                    "index entry at offset {offset} past end of log ({len} bytes), rebuilding"
                );
                self.index.build(self.log.scan()?)?;
                match self.index.lookup(key) {
                    Some(offset) => {
                        let (_, value) = self.log.read_at(offset)?;
                        Ok(Some(value))
                    }
                    None => Ok(None),
                }
            }
            Err(e) => Err(e),
        }
    }

    fn scan_for(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut last = None;
        for entry in self.log.scan()? {
            let (_, entry_key, value) = entry?;
            if entry_key == key {
                last = Some(value);
            }
        }
        Ok(last)
    }

    pub(crate) fn items(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut latest = BTreeMap::new();
        for entry in self.log.scan()? {
            let (_, key, value) = entry?;
            latest.insert(key, value);
        }
        Ok(latest)
    }
}

/// Constructs the path of the advisory lock file guarding a log file.
fn lock_file_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unindexed_inner(dir: &tempfile::TempDir) -> Inner {
        Inner {
            log: AppendLog::open(dir.path().join("kvlog.db")).unwrap(),
            index: HashIndex::new(),
        }
    }

    #[test]
    fn test_scan_fallback_agrees_with_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut inner = unindexed_inner(&dir);

        inner.log.append("a", b"1").unwrap();
        inner.log.append("b", b"2").unwrap();
        inner.log.append("a", b"3").unwrap();

        // Index not ready: answers come from the fallback scan.
        assert!(!inner.index.is_ready());
        assert_eq!(inner.get("a").unwrap(), Some(b"3".to_vec()));
        assert_eq!(inner.get("b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(inner.get("missing").unwrap(), None);

        // Build the index; answers must not change.
        let scan = inner.log.scan().unwrap();
        inner.index.build(scan).unwrap();
        assert!(inner.index.is_ready());
        assert_eq!(inner.get("a").unwrap(), Some(b"3".to_vec()));
        assert_eq!(inner.get("b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(inner.get("missing").unwrap(), None);
    }

    #[test]
    fn test_stale_index_entry_triggers_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let mut inner = unindexed_inner(&dir);

        let offset = inner.log.append("a", b"1").unwrap();
        let scan = inner.log.scan().unwrap();
        inner.index.build(scan).unwrap();

        // Poison the index with an offset past end-of-file.
        inner.index.remember("a".to_string(), offset + 10_000);

        assert_eq!(inner.get("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(inner.index.lookup("a"), Some(offset));
    }

    #[test]
    fn test_lock_file_path_appends_suffix() {
        assert_eq!(
            lock_file_path(Path::new("/tmp/data/kvlog.db")),
            Path::new("/tmp/data/kvlog.db.lock")
        );
    }
}
