use std::fs;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};

use crate::format::{
    block_crc, decode_block, decode_index, read_index_offset, IndexEntry, BLOCK_TRAILER_BYTES,
    FOOTER_BYTES,
};
use crate::{family, Entry, SstError};

/// A fully-loaded table: raw bytes plus the parsed index.
///
/// Tables are small enough to read whole; each call opens, reads and closes
/// the file, so no long-lived handles are held.
struct Table {
    data: Vec<u8>,
    index: Vec<IndexEntry>,
    index_offset: u64,
}

impl Table {
    fn load(path: &Path) -> Result<Table, SstError> {
        let data = fs::read(path)?;
        let index_offset = read_index_offset(&data)?;
        let index = decode_index(&data[index_offset as usize..data.len() - FOOTER_BYTES])?;
        Ok(Table {
            data,
            index,
            index_offset,
        })
    }

    /// Decodes block `i`, verifying its CRC trailer first.
    ///
    /// The block's extent is implied by consecutive index offsets; the last
    /// block runs up to the index region. The final 4 bytes of the extent
    /// are the stored checksum, not payload.
    fn block(&self, i: usize) -> Result<Vec<Entry>, SstError> {
        let start = self.index[i].offset;
        let end = if i + 1 < self.index.len() {
            self.index[i + 1].offset
        } else {
            self.index_offset
        };
        if start >= end || end > self.index_offset || end - start <= BLOCK_TRAILER_BYTES as u64 {
            return Err(SstError::Corruption(format!(
                "bad block extent [{}, {})",
                start, end
            )));
        }

        let payload = &self.data[start as usize..end as usize - BLOCK_TRAILER_BYTES];
        let stored = LittleEndian::read_u32(&self.data[end as usize - BLOCK_TRAILER_BYTES..end as usize]);
        if block_crc(payload) != stored {
            return Err(SstError::Corruption(format!(
                "block checksum mismatch at offset {}",
                start
            )));
        }

        decode_block(payload)
    }

    fn block_count(&self) -> usize {
        self.index.len()
    }
}

/// Reads every entry of the family, file by file in ascending index order,
/// blocks in index order within each file.
///
/// Every block's CRC is verified; any mismatch or structural damage is
/// surfaced as [`SstError::Corruption`].
pub fn read_all(dir: &Path, base: &str) -> Result<Vec<Entry>, SstError> {
    let mut all = Vec::new();
    for file in family::scan(dir, base)? {
        let table = Table::load(&file.path)?;
        for i in 0..table.block_count() {
            all.extend(table.block(i)?);
        }
    }
    Ok(all)
}

/// Point lookup across the family, newest table first.
///
/// Files are scanned from the highest numeric index to the lowest so that
/// the most recently flushed version of a key wins. Within one file keys
/// are unique, and the sorted index narrows the search to the single block
/// whose first key is the greatest one not exceeding the target.
pub fn point_lookup(dir: &Path, base: &str, key: &str) -> Result<Option<Entry>, SstError> {
    for file in family::scan(dir, base)?.iter().rev() {
        let table = Table::load(&file.path)?;
        let candidate = table
            .index
            .partition_point(|ie| ie.key.as_str() <= key)
            .checked_sub(1);
        let Some(i) = candidate else {
            continue;
        };
        for entry in table.block(i)? {
            if entry.key == key {
                return Ok(Some(entry));
            }
        }
    }
    Ok(None)
}

/// Highest sequence number stamped anywhere in the family (0 if the family
/// is empty). Used to re-derive the engine's counter on recovery.
pub fn max_sequence(dir: &Path, base: &str) -> Result<u64, SstError> {
    Ok(read_all(dir, base)?
        .iter()
        .map(|e| e.seq)
        .max()
        .unwrap_or(0))
}
