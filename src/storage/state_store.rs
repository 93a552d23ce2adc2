//! Versioned ledger store: the committed snapshot plus the staged writes
//! of the block being assembled.

use crate::debug;
use crate::storage::state_view::Snapshot;
use crate::types::hash::Hash;
use crate::types::merkle_tree::MerkleTree;
use crate::virtual_machine::state::{OverlayState, StateRead, WriteSet};
use std::collections::BTreeMap;

/// Versioned ledger: committed state plus the staged writes of the open block.
///
/// Reads through [`StateRead`] see the pending view, i.e. staged writes
/// layered over the last commit. [`LedgerStore::snapshot`] only ever sees
/// committed state.
#[derive(Debug)]
pub struct LedgerStore {
    committed: Snapshot,
    /// Staged writes of the open block: `Some(value)` for insertions,
    /// `None` for deletions.
    pending: BTreeMap<Hash, Option<Vec<u8>>>,
}

impl LedgerStore {
    /// Creates an empty store whose first commit will be `start_height + 1`.
    pub fn new(start_height: u64) -> Self {
        Self {
            committed: Snapshot::new(Default::default(), start_height, Hash::zero()),
            pending: BTreeMap::new(),
        }
    }

    /// Immutable view pinned to the last commit.
    pub fn snapshot(&self) -> Snapshot {
        self.committed.clone()
    }

    /// Height of the last commit.
    pub fn height(&self) -> u64 {
        self.committed.height()
    }

    /// State root of the last commit.
    pub fn root(&self) -> Hash {
        self.committed.root()
    }

    /// Opens a write buffer over the pending view.
    ///
    /// Dropping the buffer discards it; [`OverlayState::into_writes`] yields
    /// the write set to [`stage`](Self::stage).
    pub fn begin_mutation(&self) -> OverlayState<'_, Self> {
        OverlayState::new(self)
    }

    /// Adds a write set to the open block.
    pub fn stage(&mut self, writes: &[(Hash, Option<Vec<u8>>)]) {
        for (key, value) in writes {
            self.pending.insert(*key, value.clone());
        }
        debug!(
            "Staged {} writes ({} keys pending)",
            writes.len(),
            self.pending.len()
        );
    }

    /// Drops every staged write.
    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }

    /// Staged writes of the open block, in key order.
    pub fn pending_writes(&self) -> WriteSet {
        self.pending
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Computes the root that committing `writes` on top of the last commit
    /// would produce, without changing the store.
    pub fn preview_root(&self, writes: &[(Hash, Option<Vec<u8>>)]) -> Hash {
        let mut view: BTreeMap<&Hash, &[u8]> = self.committed.iter().collect();
        for (key, value) in writes {
            match value {
                Some(value) => {
                    view.insert(key, value.as_slice());
                }
                None => {
                    view.remove(key);
                }
            }
        }
        MerkleTree::from_state(view)
    }

    /// Applies a block write set to committed state in order and advances
    /// the height by one. Staged writes are cleared.
    ///
    /// Snapshots taken before the commit keep their contents.
    pub fn commit(&mut self, writes: &[(Hash, Option<Vec<u8>>)]) -> u64 {
        self.apply(writes);
        // Block production rejects the block before the height can wrap.
        let height = self.committed.height().saturating_add(1);
        let root = MerkleTree::from_state(self.committed.iter());
        self.committed.set_tip(height, root);
        self.pending.clear();
        height
    }

    /// Writes the initial ledger contents without advancing the height.
    pub fn install_genesis(&mut self, writes: &[(Hash, Option<Vec<u8>>)]) -> Hash {
        self.apply(writes);
        let root = MerkleTree::from_state(self.committed.iter());
        let height = self.committed.height();
        self.committed.set_tip(height, root);
        self.pending.clear();
        root
    }

    fn apply(&mut self, writes: &[(Hash, Option<Vec<u8>>)]) {
        let entries = self.committed.entries_mut();
        for (key, value) in writes {
            match value {
                Some(value) => {
                    entries.insert(*key, value.clone());
                }
                None => {
                    entries.remove(key);
                }
            }
        }
    }
}

impl StateRead for LedgerStore {
    fn get(&self, key: Hash) -> Option<Vec<u8>> {
        match self.pending.get(&key) {
            Some(staged) => staged.clone(),
            None => self.committed.get(key),
        }
    }
}
