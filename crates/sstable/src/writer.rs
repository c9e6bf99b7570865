use std::fs::{rename, OpenOptions};
use std::io::Write;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

use crate::format::{block_crc, encode_block, encode_index, IndexEntry};
use crate::{family, Entry, SstError};

/// Writes a batch of entries as one or more new members of an SSTable
/// family.
///
/// The entries are sorted by key, split into files of up to
/// `entries_per_table` records, and stamped with consecutive sequence
/// numbers starting at `start_seq` in file order. File indices continue
/// from the highest existing member of the family.
///
/// Returns the groups actually written (with sequence numbers filled in)
/// and the next unused sequence number.
///
/// # Crash safety
///
/// Each file is written to `<name>.sst.tmp`, fsynced, and atomically
/// renamed into place; an interrupted flush leaves only `.tmp` files,
/// which the family scan ignores.
///
/// # Errors
///
/// `InvalidArgument` for an empty base name or zero `block_size` /
/// `entries_per_table`; otherwise I/O errors from the filesystem.
pub fn write_tables(
    dir: &Path,
    base: &str,
    mut entries: Vec<Entry>,
    block_size: usize,
    entries_per_table: usize,
    start_seq: u64,
) -> Result<(Vec<Vec<Entry>>, u64), SstError> {
    if base.is_empty() {
        return Err(SstError::InvalidArgument("empty family base name".into()));
    }
    if block_size == 0 {
        return Err(SstError::InvalidArgument("block_size must be > 0".into()));
    }
    if entries_per_table == 0 {
        return Err(SstError::InvalidArgument(
            "entries_per_table must be > 0".into(),
        ));
    }

    entries.sort_by(|a, b| a.key.cmp(&b.key));

    let mut groups: Vec<Vec<Entry>> = Vec::new();
    let mut current: Vec<Entry> = Vec::new();
    let mut seq = start_seq;
    for mut e in entries {
        e.seq = seq;
        seq += 1;
        current.push(e);
        if current.len() == entries_per_table {
            groups.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }

    let mut table_index = family::next_index(dir, base)?;
    for group in &groups {
        let path = family::table_path(dir, base, table_index);
        write_single_table(&path, group, block_size)?;
        debug!(path = %path.display(), entries = group.len(), "wrote sstable");
        table_index += 1;
    }

    Ok((groups, seq))
}

/// Writes one table: data blocks with CRC trailers, then the index, then
/// the footer.
fn write_single_table(path: &Path, entries: &[Entry], block_size: usize) -> Result<(), SstError> {
    let tmp_path = path.with_extension("sst.tmp");
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)?;

    let mut index: Vec<IndexEntry> = Vec::new();
    let mut offset = 0u64;

    for block in entries.chunks(block_size) {
        let data = encode_block(block);
        file.write_all(&data)?;
        file.write_u32::<LittleEndian>(block_crc(&data))?;
        index.push(IndexEntry {
            key: block[0].key.clone(),
            offset,
        });
        offset += data.len() as u64 + 4;
    }

    let index_offset = offset;
    file.write_all(&encode_index(&index))?;
    file.write_u64::<LittleEndian>(index_offset)?;

    file.flush()?;
    file.sync_all()?;

    rename(tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{decode_index, read_index_offset, FOOTER_BYTES};
    use tempfile::tempdir;

    fn entry(key: &str, value: &str) -> Entry {
        Entry::new(key, value, 0)
    }

    // -------------------- Basic write --------------------

    #[test]
    fn write_creates_family_file_zero() {
        let dir = tempdir().unwrap();
        let entries = vec![entry("b", "2"), entry("a", "1")];
        let (groups, next_seq) =
            write_tables(dir.path(), "sstable", entries, 10, 50, 1).unwrap();

        assert!(dir.path().join("sstable_0.sst").exists());
        assert_eq!(groups.len(), 1);
        assert_eq!(next_seq, 3);

        // Entries come back sorted and stamped.
        assert_eq!(groups[0][0].key, "a");
        assert_eq!(groups[0][0].seq, 1);
        assert_eq!(groups[0][1].key, "b");
        assert_eq!(groups[0][1].seq, 2);
    }

    #[test]
    fn footer_points_at_index() {
        let dir = tempdir().unwrap();
        let entries = (0..25u32)
            .map(|i| entry(&format!("key{:02}", i), "v"))
            .collect();
        write_tables(dir.path(), "sstable", entries, 10, 50, 1).unwrap();

        let data = std::fs::read(dir.path().join("sstable_0.sst")).unwrap();
        let index_offset = read_index_offset(&data).unwrap() as usize;

        // The index region parses exactly, consuming len - 8 - index_offset
        // bytes, and holds one entry per 10-record block.
        let index = decode_index(&data[index_offset..data.len() - FOOTER_BYTES]).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index[0].key, "key00");
        assert_eq!(index[0].offset, 0);
        assert_eq!(index[1].key, "key10");
        assert_eq!(index[2].key, "key20");
        assert!(index[1].offset < index[2].offset);
    }

    // -------------------- Partitioning --------------------

    #[test]
    fn partitions_into_multiple_files() {
        let dir = tempdir().unwrap();
        let entries = (0..120u32)
            .map(|i| entry(&format!("key{:03}", i), &format!("val{:03}", i)))
            .collect();
        let (groups, next_seq) =
            write_tables(dir.path(), "sstable", entries, 10, 50, 1).unwrap();

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].len(), 50);
        assert_eq!(groups[1].len(), 50);
        assert_eq!(groups[2].len(), 20);
        assert_eq!(next_seq, 121);

        assert!(dir.path().join("sstable_0.sst").exists());
        assert!(dir.path().join("sstable_1.sst").exists());
        assert!(dir.path().join("sstable_2.sst").exists());
        assert!(!dir.path().join("sstable_3.sst").exists());

        // Sequence numbers are contiguous across file boundaries.
        let mut expect = 1u64;
        for group in &groups {
            for e in group {
                assert_eq!(e.seq, expect);
                expect += 1;
            }
        }
    }

    #[test]
    fn family_indices_grow_across_batches() {
        let dir = tempdir().unwrap();
        write_tables(dir.path(), "sstable", vec![entry("a", "1")], 10, 50, 1).unwrap();
        write_tables(dir.path(), "sstable", vec![entry("b", "2")], 10, 50, 2).unwrap();
        write_tables(dir.path(), "sstable", vec![entry("c", "3")], 10, 50, 3).unwrap();

        assert!(dir.path().join("sstable_0.sst").exists());
        assert!(dir.path().join("sstable_1.sst").exists());
        assert!(dir.path().join("sstable_2.sst").exists());
    }

    #[test]
    fn no_tmp_files_left_behind() {
        let dir = tempdir().unwrap();
        let entries = (0..60u32).map(|i| entry(&format!("k{:02}", i), "v")).collect();
        write_tables(dir.path(), "sstable", entries, 10, 50, 1).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn empty_batch_writes_nothing() {
        let dir = tempdir().unwrap();
        let (groups, next_seq) = write_tables(dir.path(), "sstable", vec![], 10, 50, 9).unwrap();
        assert!(groups.is_empty());
        assert_eq!(next_seq, 9);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    // -------------------- Validation --------------------

    #[test]
    fn rejects_bad_arguments() {
        let dir = tempdir().unwrap();
        let entries = vec![entry("a", "1")];

        let err = write_tables(dir.path(), "", entries.clone(), 10, 50, 1).unwrap_err();
        assert!(matches!(err, SstError::InvalidArgument(_)));

        let err = write_tables(dir.path(), "sstable", entries.clone(), 0, 50, 1).unwrap_err();
        assert!(matches!(err, SstError::InvalidArgument(_)));

        let err = write_tables(dir.path(), "sstable", entries, 10, 0, 1).unwrap_err();
        assert!(matches!(err, SstError::InvalidArgument(_)));
    }
}
