//! # SSTable — Sorted String Table
//!
//! Immutable, on-disk storage files for the SiltKV storage engine.
//!
//! When the in-memory memtable reaches its entry limit the engine flushes it
//! to disk as one or more SSTables. SSTables are **write-once, read-many** —
//! once renamed into place they are never modified.
//!
//! ## File layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │ DATA BLOCKS (up to block_size records each)         │
//! │                                                     │
//! │ record: key_len (i32) | key | val_len (i32) | val   │
//! │         | seq (u64)                                 │
//! │ each block is followed by its CRC-32 (u32)          │
//! ├─────────────────────────────────────────────────────┤
//! │ INDEX (one entry per block)                         │
//! │                                                     │
//! │ key_len (i32) | first key of block | offset (i64)   │
//! ├─────────────────────────────────────────────────────┤
//! │ FOOTER (always last 8 bytes)                        │
//! │                                                     │
//! │ index_offset (u64)                                  │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Block offsets are absolute file
//! positions; a block's extent runs to the next block's offset (or to the
//! index for the last block), minus the 4-byte CRC trailer.
//!
//! Files belonging to one logical family are named `<base>_<N>.sst` with
//! strictly increasing `N`; the family is discovered by a directory scan
//! (see [`family`]).

use std::io;

use thiserror::Error;

pub mod family;
pub mod format;
mod reader;
mod writer;

pub use format::FOOTER_BYTES;
pub use reader::{max_sequence, point_lookup, read_all};
pub use writer::write_tables;

/// A single key-value record, stamped with the sequence number it was
/// persisted under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
    pub seq: u64,
}

impl Entry {
    pub fn new(key: impl Into<String>, value: impl Into<String>, seq: u64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            seq,
        }
    }
}

#[derive(Debug, Error)]
pub enum SstError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("corruption: {0}")]
    Corruption(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
