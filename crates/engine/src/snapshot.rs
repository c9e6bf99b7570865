use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use memtable::SkipList;
use sstable::Entry;
use tracing::warn;

use crate::error::{EngineError, EngineResult};

/// A logical point-in-time view of the store.
///
/// Holds the sequence counter at capture time, an independent clone of the
/// memtable, and the entry groups flushed before the capture. Mutating the
/// engine afterwards never changes what the snapshot observes.
#[derive(Debug)]
pub struct Snapshot {
    sequence: u64,
    memtable: SkipList,
    sstables: Vec<Vec<Entry>>,
    released: bool,
}

impl Snapshot {
    pub(crate) fn new(sequence: u64, memtable: SkipList, sstables: Vec<Vec<Entry>>) -> Self {
        Self {
            sequence,
            memtable,
            sstables,
            released: false,
        }
    }

    /// Sequence number of the last mutation visible in this snapshot.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The captured memtable.
    pub fn memtable(&self) -> &SkipList {
        &self.memtable
    }

    /// The captured SSTable entry groups, oldest first.
    pub fn sstables(&self) -> &[Vec<Entry>] {
        &self.sstables
    }

    /// Looks a key up in the captured view: memtable first, then the entry
    /// groups from newest to oldest. Only entries stamped at or before the
    /// snapshot's sequence are visible. A released snapshot always misses.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.released {
            return None;
        }
        if let Some(v) = self.memtable.search(key) {
            return Some(v);
        }
        for group in self.sstables.iter().rev() {
            for e in group {
                if e.key == key && e.seq <= self.sequence {
                    return Some(&e.value);
                }
            }
        }
        None
    }

    /// Drops the captured state. Subsequent [`get`](Snapshot::get) calls
    /// miss on every key.
    pub fn release(&mut self) {
        self.memtable.reset();
        self.sstables.clear();
        self.released = true;
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Persists the snapshot as a line-oriented text file:
    ///
    /// ```text
    /// SEQ|<sequence>
    /// PUT|<key>|<value>        one per memtable entry, ascending keys
    /// SST_BEGIN
    /// SST|<key>|<value>        one per entry of the group
    /// SST_END
    /// ```
    ///
    /// Sequence numbers of individual entries are not persisted; a restored
    /// snapshot is a logical view for inspection.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> EngineResult<()> {
        let mut w = BufWriter::new(File::create(path)?);
        writeln!(w, "SEQ|{}", self.sequence)?;
        for (k, v) in self.memtable.iter() {
            writeln!(w, "PUT|{}|{}", k, v)?;
        }
        for group in &self.sstables {
            writeln!(w, "SST_BEGIN")?;
            for e in group {
                writeln!(w, "SST|{}|{}", e.key, e.value)?;
            }
            writeln!(w, "SST_END")?;
        }
        w.flush()?;
        Ok(())
    }
}

/// Rebuilds a snapshot from a file written by [`Snapshot::save_to_file`].
///
/// A missing file is reported as [`EngineError::NotFound`]. Malformed lines
/// are skipped. A bare `SST` line outside explicit framing opens a group
/// implicitly, and an unterminated group is closed at end of file. Restored
/// SSTable entries carry sequence number 0.
pub fn restore_snapshot<P: AsRef<Path>>(path: P) -> EngineResult<Snapshot> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            EngineError::NotFound
        } else {
            EngineError::Io(e)
        }
    })?;
    let reader = BufReader::new(file);

    let mut sequence = 0u64;
    let mut memtable = SkipList::new();
    let mut sstables: Vec<Vec<Entry>> = Vec::new();
    let mut current: Option<Vec<Entry>> = None;

    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        match line.as_str() {
            "SST_BEGIN" => {
                if let Some(group) = current.take() {
                    warn!("unterminated snapshot group before SST_BEGIN");
                    sstables.push(group);
                }
                current = Some(Vec::new());
                continue;
            }
            "SST_END" => {
                match current.take() {
                    Some(group) => sstables.push(group),
                    None => warn!("SST_END without matching SST_BEGIN"),
                }
                continue;
            }
            _ => {}
        }

        let mut parts = line.splitn(3, '|');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("SEQ"), Some(n), None) => match n.parse() {
                Ok(n) => sequence = n,
                Err(_) => warn!(line = %line, "skipping snapshot line with bad sequence"),
            },
            (Some("PUT"), Some(key), Some(value)) => {
                memtable.insert(key.to_owned(), value.to_owned());
            }
            (Some("SST"), Some(key), Some(value)) => {
                current
                    .get_or_insert_with(Vec::new)
                    .push(Entry::new(key, value, 0));
            }
            _ => warn!(line = %line, "skipping malformed snapshot line"),
        }
    }

    if let Some(group) = current.take() {
        sstables.push(group);
    }

    Ok(Snapshot {
        sequence,
        memtable,
        sstables,
        released: false,
    })
}
