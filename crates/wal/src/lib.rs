//! Write-ahead log for the SiltKV storage engine.
//!
//! The log is line-oriented UTF-8 text, one record per mutation:
//!
//! ```text
//! <seq>|PUT|<key>|<value>
//! <seq>|DEL|<key>|
//! ```
//!
//! Records are appended before the corresponding in-memory apply, so any
//! operation visible in the memtable is already in the log. Durability is
//! batched: the file is fsynced every [`SYNC_THRESHOLD`] appends, trading a
//! bounded window of possible loss for write throughput. After a flush to
//! SSTables the engine truncates the log via [`Wal::reset`].

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memtable::SkipList;
use thiserror::Error;
use tracing::warn;

/// Number of appended records between fsyncs.
pub const SYNC_THRESHOLD: usize = 50;

/// Mutation kind recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalOp {
    Put,
    Del,
}

impl WalOp {
    fn as_str(self) -> &'static str {
        match self {
            WalOp::Put => "PUT",
            WalOp::Del => "DEL",
        }
    }
}

#[derive(Debug, Error)]
pub enum WalError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Append-only log bound to a single file for the life of the engine.
pub struct Wal {
    file: File,
    path: PathBuf,
    pending_writes: usize,
    sync_threshold: usize,
}

impl Wal {
    /// Opens the log at `path`, creating it if missing. Existing records are
    /// preserved; new records are appended.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WalError> {
        Self::with_sync_threshold(path, SYNC_THRESHOLD)
    }

    /// Like [`open`](Wal::open) with a custom fsync batch size.
    pub fn with_sync_threshold<P: AsRef<Path>>(
        path: P,
        sync_threshold: usize,
    ) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = Self::open_file(&path)?;
        Ok(Self {
            file,
            path,
            pending_writes: 0,
            sync_threshold: sync_threshold.max(1),
        })
    }

    fn open_file(path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record. Keys and values must not contain `|` or newline;
    /// the engine rejects such inputs before they reach the log.
    ///
    /// Every [`sync_threshold`](Wal::with_sync_threshold) appends the OS
    /// buffers are forced to disk.
    pub fn append(&mut self, op: WalOp, key: &str, value: &str, seq: u64) -> Result<(), WalError> {
        writeln!(self.file, "{}|{}|{}|{}", seq, op.as_str(), key, value)?;
        self.pending_writes += 1;
        if self.pending_writes >= self.sync_threshold {
            self.file.sync_data()?;
            self.pending_writes = 0;
        }
        Ok(())
    }

    /// Replays the log into `mem` and returns the highest sequence number
    /// seen (0 for an empty log).
    ///
    /// Malformed lines — fewer than four fields, an unparseable sequence
    /// number or an unknown op — are skipped, which tolerates a torn tail
    /// record from a crash mid-append.
    pub fn load(&mut self, mem: &mut SkipList) -> Result<u64, WalError> {
        self.file.seek(SeekFrom::Start(0))?;
        let reader = BufReader::new(&self.file);

        let mut max_seq = 0u64;
        for line in reader.lines() {
            let line = line?;
            let mut parts = line.splitn(4, '|');
            let (seq, op, key, value) = match (parts.next(), parts.next(), parts.next(), parts.next())
            {
                (Some(seq), Some(op), Some(key), Some(value)) => (seq, op, key, value),
                _ => {
                    warn!(line = %line, "skipping short wal record");
                    continue;
                }
            };
            let seq: u64 = match seq.parse() {
                Ok(n) => n,
                Err(_) => {
                    warn!(line = %line, "skipping wal record with bad sequence number");
                    continue;
                }
            };
            match op {
                "PUT" => mem.insert(key.to_owned(), value.to_owned()),
                "DEL" => {
                    mem.delete(key);
                }
                other => {
                    warn!(op = %other, "skipping wal record with unknown op");
                    continue;
                }
            }
            max_seq = max_seq.max(seq);
        }
        Ok(max_seq)
    }

    /// Truncates the log: the file is removed and recreated empty at the
    /// same path, and the pending-write counter is zeroed.
    pub fn reset(&mut self) -> Result<(), WalError> {
        fs::remove_file(&self.path)?;
        self.file = Self::open_file(&self.path)?;
        self.pending_writes = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_writes_exact_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");

        let mut w = Wal::open(&path).unwrap();
        w.append(WalOp::Put, "apple", "fruit", 1).unwrap();
        w.append(WalOp::Put, "zebra", "animal", 2).unwrap();
        w.append(WalOp::Del, "zebra", "", 3).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "1|PUT|apple|fruit\n2|PUT|zebra|animal\n3|DEL|zebra|\n");
    }

    #[test]
    fn load_replays_into_memtable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");

        let mut w = Wal::open(&path).unwrap();
        w.append(WalOp::Put, "k1", "v1", 1).unwrap();
        w.append(WalOp::Put, "k2", "v2", 2).unwrap();
        w.append(WalOp::Del, "k1", "", 3).unwrap();

        let mut mem = SkipList::new();
        let max_seq = w.load(&mut mem).unwrap();

        assert_eq!(max_seq, 3);
        assert!(mem.search("k1").is_none());
        assert_eq!(mem.search("k2"), Some("v2"));
        assert_eq!(mem.len(), 1);
    }

    #[test]
    fn load_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");

        {
            let mut w = Wal::open(&path).unwrap();
            w.append(WalOp::Put, "persist", "yes", 7).unwrap();
        }

        let mut w = Wal::open(&path).unwrap();
        let mut mem = SkipList::new();
        let max_seq = w.load(&mut mem).unwrap();
        assert_eq!(max_seq, 7);
        assert_eq!(mem.search("persist"), Some("yes"));
    }

    #[test]
    fn load_skips_torn_tail_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");

        {
            let mut w = Wal::open(&path).unwrap();
            w.append(WalOp::Put, "good", "record", 1).unwrap();
        }
        // Simulate a crash mid-append: a record cut off before its value.
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            write!(f, "2|PUT|torn").unwrap();
        }

        let mut w = Wal::open(&path).unwrap();
        let mut mem = SkipList::new();
        let max_seq = w.load(&mut mem).unwrap();

        assert_eq!(max_seq, 1);
        assert_eq!(mem.len(), 1);
        assert_eq!(mem.search("good"), Some("record"));
        assert!(mem.search("torn").is_none());
    }

    #[test]
    fn load_skips_unknown_op_and_bad_seq() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");
        fs::write(&path, "1|PUT|a|1\nx|PUT|b|2\n3|MERGE|c|3\n4|PUT|d|4\n").unwrap();

        let mut w = Wal::open(&path).unwrap();
        let mut mem = SkipList::new();
        let max_seq = w.load(&mut mem).unwrap();

        assert_eq!(max_seq, 4);
        assert_eq!(mem.len(), 2);
        assert_eq!(mem.search("a"), Some("1"));
        assert_eq!(mem.search("d"), Some("4"));
        assert!(mem.search("b").is_none());
        assert!(mem.search("c").is_none());
    }

    #[test]
    fn empty_value_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");

        let mut w = Wal::open(&path).unwrap();
        w.append(WalOp::Put, "k", "", 1).unwrap();

        let mut mem = SkipList::new();
        w.load(&mut mem).unwrap();
        assert_eq!(mem.search("k"), Some(""));
    }

    #[test]
    fn load_of_empty_log_returns_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");

        let mut w = Wal::open(&path).unwrap();
        let mut mem = SkipList::new();
        assert_eq!(w.load(&mut mem).unwrap(), 0);
        assert!(mem.is_empty());
    }

    #[test]
    fn reset_truncates_and_allows_reuse() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");

        let mut w = Wal::open(&path).unwrap();
        w.append(WalOp::Put, "old", "data", 1).unwrap();
        w.reset().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "");

        w.append(WalOp::Put, "new", "data", 2).unwrap();
        let mut mem = SkipList::new();
        let max_seq = w.load(&mut mem).unwrap();
        assert_eq!(max_seq, 2);
        assert_eq!(mem.len(), 1);
        assert!(mem.search("old").is_none());
        assert_eq!(mem.search("new"), Some("data"));
    }

    #[test]
    fn sync_threshold_fires_without_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");

        let mut w = Wal::with_sync_threshold(&path, 2).unwrap();
        for i in 1..=5u64 {
            w.append(WalOp::Put, &format!("k{}", i), "v", i).unwrap();
        }

        let mut mem = SkipList::new();
        assert_eq!(w.load(&mut mem).unwrap(), 5);
        assert_eq!(mem.len(), 5);
    }
}
