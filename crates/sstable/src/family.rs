//! Discovery of SSTable families on disk.
//!
//! A family is the set of files named `<base>_<N>.sst` in one directory.
//! Filesystem enumeration order is not meaningful, so the catalog always
//! returns files sorted by their numeric suffix; readers and the engine
//! rely on that order for reproducible results.

use std::fs;
use std::path::{Path, PathBuf};

use crate::SstError;

/// One member of a family: its numeric suffix and full path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyFile {
    pub index: u64,
    pub path: PathBuf,
}

/// Path a table with the given index would occupy.
pub fn table_path(dir: &Path, base: &str, index: u64) -> PathBuf {
    dir.join(format!("{}_{}.sst", base, index))
}

/// Lists the family's files, sorted ascending by numeric index.
pub fn scan(dir: &Path, base: &str) -> Result<Vec<FamilyFile>, SstError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(index) = parse_index(name, base) {
            files.push(FamilyFile {
                index,
                path: entry.path(),
            });
        }
    }
    files.sort_by_key(|f| f.index);
    Ok(files)
}

/// Index the next flush should write: `max + 1`, or 0 for an empty family.
pub fn next_index(dir: &Path, base: &str) -> Result<u64, SstError> {
    Ok(scan(dir, base)?
        .last()
        .map(|f| f.index + 1)
        .unwrap_or(0))
}

/// Matches `<base>_<digits>.sst` exactly; anything else is not part of the
/// family (including `.sst.tmp` files left by an interrupted flush).
fn parse_index(name: &str, base: &str) -> Option<u64> {
    let digits = name
        .strip_prefix(base)?
        .strip_prefix('_')?
        .strip_suffix(".sst")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
