//! Merkle tree helpers for producing deterministic roots for blocks and state.
//!
//! Behavior:
//! - An empty list of leaves yields the all-zero hash (`Hash::zero()`).
//! - Odd layers are padded by duplicating the last leaf before hashing the pair.
//! - Tree construction is performed in-place to minimize allocations.

use crate::core::transaction::Transaction;
use crate::types::hash::Hash;

const EMPTY_VEC_HASH: Hash = Hash::zero();
const MERKLE_NODE_SEPARATION: &[u8] = b"MERKLE_NODE";
const STATE_LEAF_SEPARATION: &[u8] = b"STATE_LEAF";
const STATE_VALUE_SEPARATION: &[u8] = b"STATE_VALUE";

/// Utility functions to build Merkle roots from hashes, transactions or state entries.
pub struct MerkleTree;

impl MerkleTree {
    fn hash_pair(left: Hash, right: Hash) -> Hash {
        let mut h = Hash::sha3();
        h.update(MERKLE_NODE_SEPARATION);
        h.update(left.as_slice());
        h.update(right.as_slice());
        h.finalize()
    }

    /// Computes a Merkle root from the provided leaf hashes.
    ///
    /// This performs an in-place reduction; when a level has an odd number
    /// of nodes the last node is duplicated for hashing that pair.
    /// Returns the zero hash when `nodes` is empty.
    pub fn from_raw(mut nodes: Vec<Hash>) -> Hash {
        if nodes.is_empty() {
            return EMPTY_VEC_HASH;
        }

        let mut len = nodes.len();

        while len > 1 {
            let mut write = 0;
            let mut read = 0;

            while read < len {
                let left = nodes[read];
                let right = if read + 1 < len {
                    nodes[read + 1]
                } else {
                    left
                };

                nodes[write] = Self::hash_pair(left, right);

                write += 1;
                read += 2;
            }

            len = write;
        }

        nodes[0]
    }

    /// Computes a Merkle root from transactions, using `tx.id` as leaves.
    pub fn from_transactions(txs: &[Transaction]) -> Hash {
        Self::from_raw(txs.iter().map(|tx| tx.id).collect())
    }

    /// Computes the state root over `(key, value)` entries.
    ///
    /// Each leaf commits to a key and the hash of its value. Callers must
    /// yield entries in ascending key order so the root does not depend on
    /// insertion history.
    pub fn from_state<'a, I>(entries: I) -> Hash
    where
        I: IntoIterator<Item = (&'a Hash, &'a [u8])>,
    {
        let leaves = entries
            .into_iter()
            .map(|(key, value)| {
                let value_hash = Hash::sha3()
                    .chain(STATE_VALUE_SEPARATION)
                    .chain(value)
                    .finalize();
                Hash::sha3()
                    .chain(STATE_LEAF_SEPARATION)
                    .chain(key.as_slice())
                    .chain(value_hash.as_slice())
                    .finalize()
            })
            .collect();
        Self::from_raw(leaves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_leaf(data: &[u8]) -> Hash {
        let mut h = Hash::sha3();
        h.update(data);
        h.finalize()
    }

    #[test]
    fn empty_returns_zero_hash() {
        assert_eq!(MerkleTree::from_raw(Vec::new()), Hash::zero());
        assert_eq!(MerkleTree::from_transactions(&[]), Hash::zero());
        assert_eq!(MerkleTree::from_state(std::iter::empty()), Hash::zero());
    }

    #[test]
    fn single_leaf_returns_leaf() {
        let leaf = hash_leaf(b"leaf");
        assert_eq!(MerkleTree::from_raw(vec![leaf]), leaf);
    }

    #[test]
    fn even_number_of_leaves_matches_manual_reduction() {
        let a = hash_leaf(b"a");
        let b = hash_leaf(b"b");
        let c = hash_leaf(b"c");
        let d = hash_leaf(b"d");

        let level1 = [MerkleTree::hash_pair(a, b), MerkleTree::hash_pair(c, d)];
        let expected_root = MerkleTree::hash_pair(level1[0], level1[1]);

        assert_eq!(MerkleTree::from_raw(vec![a, b, c, d]), expected_root);
    }

    #[test]
    fn odd_number_of_leaves_duplicates_last_for_padding() {
        let a = hash_leaf(b"a");
        let b = hash_leaf(b"b");
        let c = hash_leaf(b"c");

        let left = MerkleTree::hash_pair(a, b);
        let right = MerkleTree::hash_pair(c, c);
        let expected_root = MerkleTree::hash_pair(left, right);

        assert_eq!(MerkleTree::from_raw(vec![a, b, c]), expected_root);
    }

    #[test]
    fn state_root_commits_to_keys_and_values() {
        let k1 = hash_leaf(b"k1");
        let k2 = hash_leaf(b"k2");
        let base = MerkleTree::from_state([(&k1, &b"one"[..]), (&k2, &b"two"[..])]);

        let changed_value = MerkleTree::from_state([(&k1, &b"one"[..]), (&k2, &b"TWO"[..])]);
        assert_ne!(base, changed_value);

        let swapped_keys = MerkleTree::from_state([(&k2, &b"one"[..]), (&k1, &b"two"[..])]);
        assert_ne!(base, swapped_keys);

        let again = MerkleTree::from_state([(&k1, &b"one"[..]), (&k2, &b"two"[..])]);
        assert_eq!(base, again);
    }
}
