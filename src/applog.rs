//! The append-only log file.
//!
//! Records are only ever appended; the single mutation of the file as a
//! whole is `replace`, the rename-over-original step compaction ends with.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::record;

/// An append-only file of records.
///
/// Read front-to-back, the file reconstructs every write ever issued, in
/// issue order. Offsets strictly increase with each successive append.
#[derive(Debug)]
pub struct AppendLog {
    path: PathBuf,
    writer: BufWriter<File>,
    reader: BufReader<File>,
}

impl AppendLog {
    /// Opens the log file at `path`, creating it if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (writer, reader) = Self::open_handles(&path)?;
        Ok(Self {
            path,
            writer,
            reader,
        })
    }

    fn open_handles(path: &Path) -> Result<(BufWriter<File>, BufReader<File>)> {
        let writer_file = OpenOptions::new()
            .create(true)
            .read(true)
            .truncate(false)
            .append(true)
            .open(path)?;
        let reader_file = OpenOptions::new().read(true).open(path)?;
        Ok((BufWriter::new(writer_file), BufReader::new(reader_file)))
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record, flushes it to durable storage, and returns the
    /// byte offset it was written at.
    pub fn append(&mut self, key: &str, value: &[u8]) -> Result<u64> {
        let mut buffer = Vec::with_capacity(record::encoded_len(key, value) as usize);
        record::encode(key, value, &mut buffer);

        let offset = self.writer.seek(SeekFrom::End(0))?;
        self.writer.write_all(&buffer)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(offset)
    }

    /// Reads the record starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `Error::OffsetOutOfRange` if `offset` is at or past
    /// end-of-file, `Error::CorruptRecord` if decoding fails.
    pub fn read_at(&mut self, offset: u64) -> Result<(String, Vec<u8>)> {
        let len = self.size()?;
        if offset >= len {
            return Err(Error::OffsetOutOfRange { offset, len });
        }

        self.reader.seek(SeekFrom::Start(offset))?;
        match record::decode_from(&mut self.reader, offset)? {
            Some((key, value)) => Ok((key, value)),
            None => Err(Error::OffsetOutOfRange { offset, len }),
        }
    }

    /// Returns an iterator over all records in file order.
    ///
    /// Each call yields a fresh pass over the file from a dedicated read
    /// handle. On a corrupt record the iterator yields the error once and
    /// stops; it never skips bytes it cannot decode.
    pub fn scan(&self) -> Result<Scan> {
        let file = OpenOptions::new().read(true).open(&self.path)?;
        Ok(Scan {
            reader: BufReader::new(file),
            position: 0,
            done: false,
        })
    }

    /// Current file length in bytes.
    pub fn size(&self) -> Result<u64> {
        Ok(self.writer.get_ref().metadata()?.len())
    }

    /// Atomically swaps the file at `new_path` over this log's path and
    /// reopens the log's handles on the new contents.
    ///
    /// Rename semantics guarantee no reader ever observes a partially
    /// written file: the old bytes are fully visible until the swap, the
    /// new bytes fully visible after.
    pub fn replace(&mut self, new_path: &Path) -> Result<()> {
        fs::rename(new_path, &self.path)?;
        let (writer, reader) = Self::open_handles(&self.path)?;
        self.writer = writer;
        self.reader = reader;
        log::debug!("log file replaced: {}", self.path.display());
        Ok(())
    }
}

/// One front-to-back pass over a log file.
#[derive(Debug)]
pub struct Scan {
    reader: BufReader<File>,
    position: u64,
    done: bool,
}

impl Iterator for Scan {
    type Item = Result<(u64, String, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match record::decode_from(&mut self.reader, self.position) {
            Ok(Some((key, value))) => {
                let offset = self.position;
                self.position += record::encoded_len(&key, &value);
                Some(Ok((offset, key, value)))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
