use crate::types::hash::Hash;
use crate::virtual_machine::state::StateRead;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Read-only view of the ledger pinned to one committed block.
///
/// Cloning is cheap: the entries are shared behind an [`Arc`]. A snapshot
/// never observes later commits, which replace the shared map copy-on-write.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    entries: Arc<BTreeMap<Hash, Vec<u8>>>,
    height: u64,
    root: Hash,
}

impl Snapshot {
    pub(crate) fn new(entries: Arc<BTreeMap<Hash, Vec<u8>>>, height: u64, root: Hash) -> Self {
        Self {
            entries,
            height,
            root,
        }
    }

    /// Height of the block this snapshot was taken at.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// State root of the block this snapshot was taken at.
    pub fn root(&self) -> Hash {
        self.root
    }

    /// Number of live ledger entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Hash, &[u8])> {
        self.entries.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub(crate) fn entries_mut(&mut self) -> &mut BTreeMap<Hash, Vec<u8>> {
        Arc::make_mut(&mut self.entries)
    }

    pub(crate) fn set_tip(&mut self, height: u64, root: Hash) {
        self.height = height;
        self.root = root;
    }
}

impl StateRead for Snapshot {
    fn get(&self, key: Hash) -> Option<Vec<u8>> {
        self.entries.get(&key).cloned()
    }
}
