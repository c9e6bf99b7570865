use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use memtable::SkipList;
use sstable::Entry;
use tracing::info;
use wal::{Wal, WalOp};

use crate::error::{EngineError, EngineResult};
use crate::snapshot::Snapshot;

/// Base name of the store's SSTable family.
pub const SSTABLE_BASE: &str = "sstable";

/// Records per data block when flushing.
pub const BLOCK_SIZE: usize = 10;

/// Records per SSTable file when flushing.
pub const ENTRIES_PER_TABLE: usize = 50;

/// The storage engine. Owns the memtable and the WAL exclusively; flushed
/// entry groups are shared with any snapshot taken before the next flush.
///
/// Not safe for concurrent mutation — all operations are synchronous and
/// single-writer.
pub struct Db {
    memtable: SkipList,
    wal: Wal,
    seq: u64,
    sstables: Vec<Vec<Entry>>,
    dir: PathBuf,
    base: String,
}

impl Db {
    /// Opens (or creates) a store whose WAL lives at `wal_path`. SSTable
    /// files are kept in the WAL's directory under the
    /// [`SSTABLE_BASE`] family.
    ///
    /// Any records left in the WAL by a previous run are replayed into the
    /// memtable, and the sequence counter resumes from the highest number
    /// found in either the WAL or the on-disk family, so sequence numbers
    /// are never reused after a crash.
    pub fn open<P: AsRef<Path>>(wal_path: P) -> EngineResult<Db> {
        let wal_path = wal_path.as_ref();
        let dir = match wal_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut wal = Wal::open(wal_path)?;
        let mut memtable = SkipList::new();
        let wal_seq = wal.load(&mut memtable)?;
        let table_seq = sstable::max_sequence(&dir, SSTABLE_BASE)?;
        let seq = wal_seq.max(table_seq);

        if seq > 0 {
            info!(seq, replayed = memtable.len(), "recovered engine state");
        }

        Ok(Db {
            memtable,
            wal,
            seq,
            sstables: Vec::new(),
            dir,
            base: SSTABLE_BASE.to_string(),
        })
    }

    /// Inserts or overwrites a key. The record is logged before the
    /// in-memory apply; a full memtable is flushed before returning.
    pub fn put(&mut self, key: &str, value: &str) -> EngineResult<()> {
        check_key(key)?;
        check_text("value", value)?;

        self.seq += 1;
        self.wal.append(WalOp::Put, key, value, self.seq)?;
        self.memtable.insert(key.to_owned(), value.to_owned());

        if self.memtable.is_full() {
            self.flush()?;
        }
        Ok(())
    }

    /// Looks a key up in the memtable only. Keys that were flushed to disk
    /// are not visible here; use [`lookup`](Db::lookup) for those.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.memtable.search(key)
    }

    /// Looks a key up in the memtable first, then across the on-disk
    /// family (newest table first).
    pub fn lookup(&self, key: &str) -> EngineResult<Option<String>> {
        if let Some(v) = self.memtable.search(key) {
            return Ok(Some(v.to_owned()));
        }
        Ok(sstable::point_lookup(&self.dir, &self.base, key)?.map(|e| e.value))
    }

    /// Deletes a key. The deletion is logged even when the key is absent;
    /// an absent key is reported as [`EngineError::NotFound`].
    pub fn delete(&mut self, key: &str) -> EngineResult<()> {
        check_key(key)?;

        self.seq += 1;
        self.wal.append(WalOp::Del, key, "", self.seq)?;
        if self.memtable.delete(key) {
            Ok(())
        } else {
            Err(EngineError::NotFound)
        }
    }

    /// Moves the memtable's contents into new SSTable files, then clears
    /// the memtable and truncates the WAL. No-op when the memtable is
    /// empty.
    ///
    /// The flushed entries are stamped with the sequence numbers of the
    /// mutations that produced them: the range ends at the current counter,
    /// so the counter itself does not move. On any write failure the
    /// memtable and WAL are left intact and the next open replays them.
    pub fn flush(&mut self) -> EngineResult<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        let entries: Vec<Entry> = self
            .memtable
            .iter()
            .map(|(k, v)| Entry::new(k, v, 0))
            .collect();
        let n = entries.len() as u64;
        let start_seq = self.seq.saturating_sub(n - 1);

        let (groups, next_seq) = sstable::write_tables(
            &self.dir,
            &self.base,
            entries,
            BLOCK_SIZE,
            ENTRIES_PER_TABLE,
            start_seq,
        )?;

        info!(
            entries = n,
            files = groups.len(),
            start_seq,
            end_seq = next_seq - 1,
            "flushed memtable"
        );

        self.sstables.extend(groups);
        self.seq = next_seq - 1;
        self.memtable.reset();
        self.wal.reset()?;
        Ok(())
    }

    /// The memtable's contents as a sorted map (introspection).
    pub fn memtable_snapshot_as_map(&self) -> BTreeMap<String, String> {
        self.memtable.get_all()
    }

    /// Captures a consistent logical view of the committed state: the
    /// current sequence counter, an independent copy of the memtable, and
    /// the entry groups flushed so far.
    pub fn create_snapshot(&self) -> Snapshot {
        Snapshot::new(self.seq, self.memtable.clone(), self.sstables.clone())
    }

    /// Sequence number of the most recent mutation.
    pub fn sequence(&self) -> u64 {
        self.seq
    }
}

fn check_key(key: &str) -> EngineResult<()> {
    if key.is_empty() {
        return Err(EngineError::InvalidArgument("empty key".into()));
    }
    check_text("key", key)
}

/// The WAL and snapshot formats are line-oriented with `|` separators and
/// define no escaping, so those characters are rejected at the boundary.
fn check_text(what: &str, s: &str) -> EngineResult<()> {
    if s.contains('|') || s.contains('\n') {
        return Err(EngineError::InvalidArgument(format!(
            "{} must not contain '|' or newline",
            what
        )));
    }
    Ok(())
}
