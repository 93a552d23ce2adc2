//! Transaction execution receipts.
//!
//! Each committed transaction produces a [`Receipt`] recording the execution
//! outcome. Receipts are committed atomically with their block and their
//! hashes form a Merkle tree whose root is stored in the block header.

use crate::core::transaction::Transaction;
use crate::types::encoding::Encode;
use crate::types::hash::Hash;
use crate::virtual_machine::interpreter::Event;
use crate::virtual_machine::types::Value;
use simnet_derive::BinaryCodec;

/// Record of a single transaction's execution result within a block.
#[derive(Clone, Debug, PartialEq, Eq, BinaryCodec)]
pub struct Receipt {
    /// Id of the transaction that produced this receipt.
    pub tx_id: Hash,
    /// False when the call returned an `(err ...)` response.
    pub success: bool,
    /// Cost charged to this transaction.
    pub cost: u64,
    /// Running total of cost up to and including this transaction.
    pub cumulative_cost: u64,
    /// Value returned by the call.
    pub result: Value,
    pub events: Vec<Event>,
}

impl Receipt {
    pub fn new(tx: &Transaction, cumulative_cost: u64) -> Self {
        Self {
            tx_id: tx.id,
            success: tx.succeeded(),
            cost: tx.cost,
            cumulative_cost,
            result: tx.result.clone(),
            events: tx.events.clone(),
        }
    }

    /// Computes a domain-separated hash of this receipt.
    pub fn hash(&self) -> Hash {
        let mut h = Hash::sha3();
        h.update(b"RECEIPT");
        self.encode(&mut h);
        h.finalize()
    }
}
