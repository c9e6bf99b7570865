//! # Memtable
//!
//! An in-memory, sorted, mutable write buffer for the SiltKV storage engine.
//!
//! The memtable is the first point of contact for every write operation. It
//! buffers recent `PUT` and `DELETE` operations in a probabilistic skip list
//! before they are flushed to immutable on-disk SSTables.
//!
//! ## Key properties
//! - **Sorted order**: the level-0 chain is always in strictly ascending key
//!   order (required for SSTable flush).
//! - **Probabilistic balancing**: each node draws a level with promotion
//!   probability 1/2, capped at [`MAX_LEVEL`]; expected O(log n) insert,
//!   search and delete.
//! - **In-place overwrite**: inserting an existing key replaces its value
//!   without any structural change.
//! - **Capacity hint**: [`SkipList::is_full`] reports when the entry count
//!   reaches [`MEMTABLE_LIMIT`] so the engine can flush.
//!
//! ## Example
//! ```rust
//! use memtable::SkipList;
//!
//! let mut m = SkipList::new();
//! m.insert("hello".to_string(), "world".to_string());
//! assert_eq!(m.search("hello"), Some("world"));
//!
//! m.delete("hello");
//! assert!(m.search("hello").is_none());
//! ```

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::ptr::NonNull;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Highest level a node may occupy (levels are numbered 0..=`MAX_LEVEL`).
pub const MAX_LEVEL: usize = 6;

/// Probability that a node is promoted one more level.
const P: f64 = 0.5;

/// Entry count at which [`SkipList::is_full`] starts returning `true`.
pub const MEMTABLE_LIMIT: usize = 50;

struct Node {
    key: String,
    value: String,
    /// One forward pointer per level this node participates in
    /// (length = node level + 1).
    forward: Vec<Option<NonNull<Node>>>,
}

impl Node {
    fn new(key: String, value: String, level: usize) -> Self {
        Self {
            key,
            value,
            forward: vec![None; level + 1],
        }
    }

    /// The header sentinel: empty key/value, full forward width.
    fn sentinel() -> Self {
        Self::new(String::new(), String::new(), MAX_LEVEL)
    }
}

/// An ordered map from `String` keys to `String` values, backed by a
/// randomized skip list.
///
/// The list owns every node; forward pointers only advance, so nodes form no
/// cycles and are freed by walking the level-0 chain. The random source is
/// owned by the list — use [`SkipList::with_seed`] when a test needs a
/// deterministic structure.
pub struct SkipList {
    head: Box<Node>,
    /// Highest level currently in use by any node.
    level: usize,
    len: usize,
    rng: StdRng,
}

impl SkipList {
    /// Creates an empty skip list with an entropy-seeded level generator.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Creates an empty skip list whose level draws are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            head: Box::new(Node::sentinel()),
            level: 0,
            len: 0,
            rng,
        }
    }

    fn random_level(&mut self) -> usize {
        let mut lvl = 0;
        while self.rng.gen::<f64>() < P && lvl < MAX_LEVEL {
            lvl += 1;
        }
        lvl
    }

    /// Inserts a key-value pair.
    ///
    /// If the key is already present its value is overwritten in place: no
    /// node is created or relinked and [`len`](SkipList::len) is unchanged.
    /// Otherwise a new node is linked into levels `0..=L` for a randomly
    /// drawn level `L`.
    pub fn insert(&mut self, key: String, value: String) {
        let mut update: [*mut Node; MAX_LEVEL + 1] = [std::ptr::null_mut(); MAX_LEVEL + 1];
        let mut current = self.head.as_mut() as *mut Node;

        unsafe {
            for i in (0..=self.level).rev() {
                while let Some(next) = (&(*current).forward)[i] {
                    if (*next.as_ptr()).key.as_str() < key.as_str() {
                        current = next.as_ptr();
                    } else {
                        break;
                    }
                }
                update[i] = current;
            }

            if let Some(next) = (&(*current).forward)[0] {
                if (*next.as_ptr()).key == key {
                    (*next.as_ptr()).value = value;
                    return;
                }
            }

            let lvl = self.random_level();
            if lvl > self.level {
                let head = self.head.as_mut() as *mut Node;
                for slot in update.iter_mut().take(lvl + 1).skip(self.level + 1) {
                    *slot = head;
                }
                self.level = lvl;
            }

            let node =
                NonNull::new_unchecked(Box::into_raw(Box::new(Node::new(key, value, lvl))));
            for i in 0..=lvl {
                (&mut (*node.as_ptr()).forward)[i] = (&(*update[i]).forward)[i];
                (&mut (*update[i]).forward)[i] = Some(node);
            }
        }

        self.len += 1;
    }

    /// Returns the value stored under `key`, or `None` if absent.
    pub fn search(&self, key: &str) -> Option<&str> {
        let mut current = self.head.as_ref() as *const Node;

        unsafe {
            for i in (0..=self.level).rev() {
                while let Some(next) = (&(*current).forward)[i] {
                    if (*next.as_ptr()).key.as_str() < key {
                        current = next.as_ptr();
                    } else {
                        break;
                    }
                }
            }

            match (&(*current).forward)[0] {
                Some(next) if (*next.as_ptr()).key == key => {
                    Some((*next.as_ptr()).value.as_str())
                }
                _ => None,
            }
        }
    }

    /// Removes `key` from the list. Returns `true` iff a node was removed.
    ///
    /// The node is unlinked from every level where a predecessor points at
    /// it; the scan stops at the first level that does not. The list level
    /// is not lowered on delete.
    pub fn delete(&mut self, key: &str) -> bool {
        let mut update: [*mut Node; MAX_LEVEL + 1] = [std::ptr::null_mut(); MAX_LEVEL + 1];
        let mut current = self.head.as_mut() as *mut Node;

        unsafe {
            for i in (0..=self.level).rev() {
                while let Some(next) = (&(*current).forward)[i] {
                    if (*next.as_ptr()).key.as_str() < key {
                        current = next.as_ptr();
                    } else {
                        break;
                    }
                }
                update[i] = current;
            }

            let target = match (&(*current).forward)[0] {
                Some(next) if (*next.as_ptr()).key == key => next,
                _ => return false,
            };

            for i in 0..=self.level {
                if (&(*update[i]).forward)[i] != Some(target) {
                    break;
                }
                (&mut (*update[i]).forward)[i] = (&(*target.as_ptr()).forward)[i];
            }

            drop(Box::from_raw(target.as_ptr()));
        }

        self.len -= 1;
        true
    }

    /// Empties the list: frees every node and resets the header sentinel,
    /// level and size.
    pub fn reset(&mut self) {
        self.free_nodes();
        for slot in self.head.forward.iter_mut() {
            *slot = None;
        }
        self.level = 0;
        self.len = 0;
    }

    /// Returns `true` once the entry count reaches [`MEMTABLE_LIMIT`].
    pub fn is_full(&self) -> bool {
        self.len >= MEMTABLE_LIMIT
    }

    /// Materializes the full contents as a sorted key → value map.
    pub fn get_all(&self) -> BTreeMap<String, String> {
        self.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the list contains zero entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates over all entries in ascending key order (level-0 walk).
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            next: self.head.forward[0],
            _marker: PhantomData,
        }
    }

    fn free_nodes(&mut self) {
        let mut current = self.head.forward[0];
        while let Some(node) = current {
            unsafe {
                let next = (&(*node.as_ptr()).forward)[0];
                drop(Box::from_raw(node.as_ptr()));
                current = next;
            }
        }
    }
}

/// Forward-only iterator over the level-0 chain.
pub struct Iter<'a> {
    next: Option<NonNull<Node>>,
    _marker: PhantomData<&'a SkipList>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        unsafe {
            self.next = (&(*node.as_ptr()).forward)[0];
            Some((
                (*node.as_ptr()).key.as_str(),
                (*node.as_ptr()).value.as_str(),
            ))
        }
    }
}

impl Clone for SkipList {
    /// Produces an independent copy holding the same (key, value) pairs.
    ///
    /// Node levels are redrawn, so the clone's internal shape may differ
    /// from the original; the level-0 order is identical. The clone shares
    /// no node storage with the original.
    fn clone(&self) -> Self {
        let mut copy = SkipList::new();
        for (k, v) in self.iter() {
            copy.insert(k.to_owned(), v.to_owned());
        }
        copy
    }
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SkipList {
    fn drop(&mut self) {
        self.free_nodes();
    }
}

impl std::fmt::Debug for SkipList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

// The list owns all of its nodes and hands out only shared references.
unsafe impl Send for SkipList {}
unsafe impl Sync for SkipList {}
