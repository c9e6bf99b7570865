//! Binary encode/decode helpers for the SSTable on-disk format.
//!
//! Everything here operates on in-memory byte slices; file traffic lives in
//! the writer and reader modules. All integers are little-endian.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;

use crate::{Entry, SstError};

/// Size of the footer: a single `u64` index offset.
pub const FOOTER_BYTES: usize = 8;

/// Size of the CRC-32 trailer following each data block.
pub const BLOCK_TRAILER_BYTES: usize = 4;

/// One index record: the first key of a block and the absolute file offset
/// of the block's first byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: String,
    pub offset: u64,
}

/// IEEE CRC-32 of a block's payload bytes.
pub fn block_crc(block: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(block);
    hasher.finalize()
}

/// Serializes a run of records into one data block (without the CRC
/// trailer).
pub fn encode_block(entries: &[Entry]) -> Vec<u8> {
    let mut buf = Vec::new();
    for e in entries {
        buf.extend_from_slice(&(e.key.len() as i32).to_le_bytes());
        buf.extend_from_slice(e.key.as_bytes());
        buf.extend_from_slice(&(e.value.len() as i32).to_le_bytes());
        buf.extend_from_slice(e.value.as_bytes());
        buf.extend_from_slice(&e.seq.to_le_bytes());
    }
    buf
}

/// Decodes one data block payload back into records.
///
/// The payload must consist of exactly whole records; a short read anywhere
/// is surfaced as [`SstError::Corruption`].
pub fn decode_block(data: &[u8]) -> Result<Vec<Entry>, SstError> {
    let mut rdr = data;
    let mut entries = Vec::new();
    while !rdr.is_empty() {
        let key = take_string(&mut rdr, "record key")?;
        let value = take_string(&mut rdr, "record value")?;
        let seq = rdr
            .read_u64::<LittleEndian>()
            .map_err(|_| corrupt("record truncated before sequence number"))?;
        entries.push(Entry { key, value, seq });
    }
    Ok(entries)
}

/// Serializes the index region: one [`IndexEntry`] per block, in block
/// order. Offsets are written as `i64`.
pub fn encode_index(index: &[IndexEntry]) -> Vec<u8> {
    let mut buf = Vec::new();
    for ie in index {
        buf.extend_from_slice(&(ie.key.len() as i32).to_le_bytes());
        buf.extend_from_slice(ie.key.as_bytes());
        buf.extend_from_slice(&(ie.offset as i64).to_le_bytes());
    }
    buf
}

/// Parses the full index region. The region must consist of exactly whole
/// index records.
pub fn decode_index(data: &[u8]) -> Result<Vec<IndexEntry>, SstError> {
    let mut rdr = data;
    let mut index = Vec::new();
    while !rdr.is_empty() {
        let key = take_string(&mut rdr, "index key")?;
        let offset = rdr
            .read_i64::<LittleEndian>()
            .map_err(|_| corrupt("index record truncated before offset"))?;
        if offset < 0 {
            return Err(corrupt("negative block offset in index"));
        }
        index.push(IndexEntry {
            key,
            offset: offset as u64,
        });
    }
    Ok(index)
}

/// Reads the footer from a whole-file byte slice, returning the index
/// offset. Fails if the file cannot even hold a footer or the offset points
/// past the index region's end.
pub fn read_index_offset(data: &[u8]) -> Result<u64, SstError> {
    if data.len() < FOOTER_BYTES {
        return Err(corrupt("file shorter than footer"));
    }
    let index_offset = LittleEndian::read_u64(&data[data.len() - FOOTER_BYTES..]);
    if index_offset > (data.len() - FOOTER_BYTES) as u64 {
        return Err(corrupt("index offset out of range"));
    }
    Ok(index_offset)
}

fn take_string(rdr: &mut &[u8], what: &str) -> Result<String, SstError> {
    let len = rdr
        .read_i32::<LittleEndian>()
        .map_err(|_| corrupt(format!("{} truncated before length", what)))?;
    if len < 0 {
        return Err(corrupt(format!("negative {} length", what)));
    }
    let len = len as usize;
    if rdr.len() < len {
        return Err(corrupt(format!("{} truncated", what)));
    }
    let (bytes, rest) = rdr.split_at(len);
    *rdr = rest;
    String::from_utf8(bytes.to_vec()).map_err(|_| corrupt(format!("{} is not utf-8", what)))
}

fn corrupt(msg: impl Into<String>) -> SstError {
    SstError::Corruption(msg.into())
}
