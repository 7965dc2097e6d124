//! Log compaction.
//!
//! Rewrites the log so only the latest record per key remains. The new file
//! is fully written and synced to a side path first; promoting it is a
//! single atomic rename. Until the rename the original log stays
//! authoritative, so a failure at any earlier point leaves state untouched.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::record;
use crate::store::Store;

/// Compacts the store's log and returns the number of bytes reclaimed.
///
/// The latest-value view is computed from a full scan of the current log
/// (never from the index alone) and written to `temp_path`, or to a sibling
/// `<log>.compact` file when `temp_path` is `None`, one record per key in
/// sorted-key order. After the side file is durably written the log is
/// atomically replaced and the index repointed at the surviving records.
///
/// The store's writer lock is held for the whole run, so no write can land
/// between the snapshot and the replace.
///
/// # Errors
///
/// Returns `Error::Compaction` if the side file cannot be fully written,
/// synced, or renamed over the log; the side file is discarded and the
/// original log is left untouched.
pub fn perform_compaction(store: &Store, temp_path: Option<&Path>) -> Result<u64> {
    let mut inner = store.lock_inner()?;

    let size_before = inner.log.size()?;
    let view = inner.items()?;

    let side_path = temp_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| side_file_path(inner.log.path()));

    let offsets = match write_side_file(&side_path, &view) {
        Ok(offsets) => offsets,
        Err(e) => {
            let _ = fs::remove_file(&side_path);
            return Err(Error::Compaction(e));
        }
    };

    // The sole irreversible step.
    inner.log.replace(&side_path).map_err(|e| match e {
        Error::Io(io_err) => Error::Compaction(io_err),
        other => other,
    })?;

    // Every surviving key has exactly one record, at the offset recorded
    // while writing the side file. No rescan needed.
    inner.index.repoint(offsets);

    let size_after = inner.log.size()?;
    let reclaimed = size_before.saturating_sub(size_after);
    log::info!(
        "compaction reclaimed {reclaimed} bytes ({size_before} -> {size_after}, {} keys)",
        view.len()
    );
    Ok(reclaimed)
}

/// Writes one record per key to `path`, syncs it, and returns each key's
/// offset in the new file.
fn write_side_file(
    path: &Path,
    view: &BTreeMap<String, Vec<u8>>,
) -> io::Result<HashMap<String, u64>> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    let mut writer = BufWriter::new(file);

    let mut offsets = HashMap::with_capacity(view.len());
    let mut position = 0u64;
    let mut buffer = Vec::new();
    for (key, value) in view {
        buffer.clear();
        record::encode(key, value, &mut buffer);
        writer.write_all(&buffer)?;
        offsets.insert(key.clone(), position);
        position += buffer.len() as u64;
    }

    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(offsets)
}

/// Constructs the default side file path for a log file.
fn side_file_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".compact");
    path.with_file_name(name)
}
