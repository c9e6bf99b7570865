//! # Engine
//!
//! Binds the write-ahead log, the skip-list memtable and the SSTable family
//! into a single-writer embedded store.
//!
//! Write path: a mutation is assigned the next sequence number, appended to
//! the WAL, then applied to the memtable; once the memtable reaches its
//! entry limit it is flushed to new SSTable files and both the memtable and
//! the WAL are cleared. Recovery replays the WAL into a fresh memtable and
//! re-derives the sequence counter from the log and the on-disk family.
//!
//! [`Snapshot`] captures a consistent logical view (sequence counter,
//! memtable clone, flushed entry groups) that is unaffected by later
//! mutations and can be persisted to a text file and restored.

mod db;
mod error;
mod snapshot;

pub use db::{Db, BLOCK_SIZE, ENTRIES_PER_TABLE, SSTABLE_BASE};
pub use error::{EngineError, EngineResult};
pub use snapshot::{restore_snapshot, Snapshot};

pub use sstable::Entry;
