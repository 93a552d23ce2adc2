//! VM storage management and overlay abstractions.
//!
//! Provides traits and types for managing ledger storage during contract
//! execution. [`StateRead`] is the read side shared by snapshots and views,
//! [`State`] adds writes, and [`OverlayState`] enables transactional writes
//! that can be kept or discarded as a unit.

use crate::types::hash::Hash;
use std::collections::BTreeMap;

/// Ordered write set: `Some(value)` for insertions, `None` for deletions.
pub type WriteSet = Vec<(Hash, Option<Vec<u8>>)>;

/// Read access to key-value storage.
///
/// Keys are always hashes to ensure uniform distribution and fixed-size
/// indexing.
pub trait StateRead {
    /// Retrieves a value by key, returning `None` if the key does not exist.
    fn get(&self, key: Hash) -> Option<Vec<u8>>;
}

/// Key-value storage the VM writes to during execution.
pub trait State: StateRead {
    /// Stores a key-value pair, overwriting any existing value.
    fn push(&mut self, key: Hash, value: Vec<u8>);
    /// Removes a key from storage.
    fn delete(&mut self, key: Hash);
}

/// Write-through overlay on top of a base storage.
///
/// Buffers writes in memory while reading through to the base storage for keys
/// not yet written. Dropping the overlay discards every buffered write.
pub struct OverlayState<'a, B: StateRead + ?Sized> {
    /// Underlying storage for read-through on cache misses.
    base: &'a B,
    /// Pending writes: `Some(value)` for insertions, `None` for deletions.
    pub(crate) writes: BTreeMap<Hash, Option<Vec<u8>>>,
}

impl<'a, B: StateRead + ?Sized> OverlayState<'a, B> {
    /// Creates a new overlay backed by the given base storage.
    pub fn new(base: &'a B) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
        }
    }

    /// Replays a write set on top of the overlay, in order.
    pub fn apply(&mut self, writes: &[(Hash, Option<Vec<u8>>)]) {
        for (key, value) in writes {
            self.writes.insert(*key, value.clone());
        }
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Consumes the overlay and returns the pending writes in key order.
    pub fn into_writes(self) -> WriteSet {
        self.writes.into_iter().collect()
    }
}

impl<'a, B: StateRead + ?Sized> StateRead for OverlayState<'a, B> {
    fn get(&self, key: Hash) -> Option<Vec<u8>> {
        if let Some(v) = self.writes.get(&key) {
            return v.clone();
        }
        self.base.get(key)
    }
}

impl<'a, B: StateRead + ?Sized> State for OverlayState<'a, B> {
    fn push(&mut self, key: Hash, value: Vec<u8>) {
        self.writes.insert(key, Some(value));
    }

    fn delete(&mut self, key: Hash) {
        self.writes.insert(key, None);
    }
}
