//! Block and header structures.

use crate::core::receipt::Receipt;
use crate::core::transaction::Transaction;
use crate::types::encoding::Encode;
use crate::types::hash::Hash;
use crate::types::merkle_tree::MerkleTree;
use simnet_derive::BinaryCodec;

/// Block header containing metadata and commitments.
#[derive(Clone, Debug, PartialEq, Eq, BinaryCodec)]
pub struct Header {
    /// Block index in the chain (genesis = configured start height)
    pub height: u64,
    /// Hash of parent block, zero for genesis
    pub parent: Hash,
    /// Root of the ledger after applying this block
    pub state_root: Hash,
    /// Root of merkle tree of transaction ids
    pub tx_root: Hash,
    /// Root of merkle tree of receipt hashes
    pub receipts_root: Hash,
    /// Total execution cost of the block's transactions
    pub cost_used: u64,
}

impl Header {
    /// Computes the chain-specific hash of this header.
    pub fn hash(&self, chain_id: u64) -> Hash {
        let mut h = Hash::sha3();
        h.update(b"BLOCK_HEADER");
        chain_id.encode(&mut h);
        self.encode(&mut h);
        h.finalize()
    }
}

/// Immutable committed block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    /// Header hash, computed once at construction.
    pub hash: Hash,
    pub transactions: Box<[Transaction]>,
    /// One receipt per transaction, in the same order.
    pub receipts: Box<[Receipt]>,
}

impl Block {
    pub fn new(
        chain_id: u64,
        header: Header,
        transactions: Vec<Transaction>,
        receipts: Vec<Receipt>,
    ) -> Self {
        Self {
            hash: header.hash(chain_id),
            header,
            transactions: transactions.into_boxed_slice(),
            receipts: receipts.into_boxed_slice(),
        }
    }

    /// Root over the hashes of `receipts`.
    pub fn receipts_root(receipts: &[Receipt]) -> Hash {
        MerkleTree::from_raw(receipts.iter().map(Receipt::hash).collect())
    }

    /// Checks that the header commits to the block's transactions and receipts.
    pub fn verify_roots(&self) -> bool {
        self.header.tx_root == MerkleTree::from_transactions(&self.transactions)
            && self.header.receipts_root == Self::receipts_root(&self.receipts)
            && self.transactions.len() == self.receipts.len()
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::TransactionPayload;
    use crate::types::address::Address;
    use crate::virtual_machine::types::{PrincipalData, Value};

    const TEST_CHAIN_ID: u64 = 832489;

    fn transfer(nonce: u64) -> Transaction {
        Transaction::new(
            TEST_CHAIN_ID,
            Address::derive(TEST_CHAIN_ID, "wallet_1"),
            nonce,
            TransactionPayload::TransferStx {
                recipient: PrincipalData::Standard(Address::derive(TEST_CHAIN_ID, "wallet_2")),
                amount: 5,
            },
            7,
            vec![],
            Value::okay(Value::Bool(true)),
            vec![],
        )
    }

    fn header(height: u64) -> Header {
        Header {
            height,
            parent: Hash::zero(),
            state_root: Hash::zero(),
            tx_root: Hash::zero(),
            receipts_root: Hash::zero(),
            cost_used: 0,
        }
    }

    #[test]
    fn header_hash_is_chain_specific() {
        let h = header(1);
        assert_eq!(h.hash(TEST_CHAIN_ID), h.hash(TEST_CHAIN_ID));
        assert_ne!(h.hash(TEST_CHAIN_ID), h.hash(TEST_CHAIN_ID + 1));
        assert_ne!(h.hash(TEST_CHAIN_ID), header(2).hash(TEST_CHAIN_ID));
    }

    #[test]
    fn verify_roots_checks_commitments() {
        let txs = vec![transfer(0), transfer(1)];
        let receipts = vec![Receipt::new(&txs[0], 7), Receipt::new(&txs[1], 14)];
        let mut h = header(1);
        h.tx_root = MerkleTree::from_transactions(&txs);
        h.receipts_root = Block::receipts_root(&receipts);

        let block = Block::new(TEST_CHAIN_ID, h.clone(), txs.clone(), receipts.clone());
        assert!(block.verify_roots());
        assert_eq!(block.hash, h.hash(TEST_CHAIN_ID));

        let tampered = Block::new(TEST_CHAIN_ID, h, txs, receipts[..1].to_vec());
        assert!(!tampered.verify_roots());
    }

    #[test]
    fn empty_block_roots_are_zero() {
        let block = Block::new(TEST_CHAIN_ID, header(3), vec![], vec![]);
        assert!(block.verify_roots());
        assert_eq!(block.height(), 3);
    }
}
