//! Block production: staging transactions and committing them as blocks.

use crate::core::block::{Block, Header};
use crate::core::receipt::Receipt;
use crate::core::transaction::Transaction;
use crate::core::validator::{BlockValidator, Validator};
use crate::simnet::error::SimnetError;
use crate::storage::state_store::LedgerStore;
use crate::types::hash::Hash;
use crate::types::merkle_tree::MerkleTree;
use crate::virtual_machine::state::{OverlayState, WriteSet};
use crate::{debug, info, warn};
use std::sync::Arc;

/// Phase of the block controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MiningState {
    /// Accepting staged transactions.
    Idle,
    /// Validating and applying the staged batch.
    Mining,
    /// Batch committed, block not yet exposed.
    Committed,
}

/// Owns the committed chain and the transactions staged for the next block.
///
/// Generic over the validator so tests can plug in custom rules.
pub struct BlockController<V: Validator = BlockValidator> {
    chain_id: u64,
    validator: V,
    state: MiningState,
    /// Committed blocks, genesis first.
    blocks: Vec<Arc<Block>>,
    pending: Vec<Transaction>,
}

impl BlockController<BlockValidator> {
    pub fn new(chain_id: u64, block_cost_limit: u64) -> Self {
        Self::with_validator(chain_id, BlockValidator::new(block_cost_limit))
    }
}

impl<V: Validator> BlockController<V> {
    pub fn with_validator(chain_id: u64, validator: V) -> Self {
        Self {
            chain_id,
            validator,
            state: MiningState::Idle,
            blocks: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Records the genesis block for the store's current contents.
    ///
    /// `transactions` are the deployments already installed into `store`.
    pub fn genesis(&mut self, store: &LedgerStore, transactions: Vec<Transaction>) -> Arc<Block> {
        let mut cumulative = 0;
        let receipts: Vec<Receipt> = transactions
            .iter()
            .map(|tx| {
                cumulative += tx.cost;
                Receipt::new(tx, cumulative)
            })
            .collect();
        let header = Header {
            height: store.height(),
            parent: Hash::zero(),
            state_root: store.root(),
            tx_root: MerkleTree::from_transactions(&transactions),
            receipts_root: Block::receipts_root(&receipts),
            cost_used: cumulative,
        };
        let block = Arc::new(Block::new(self.chain_id, header, transactions, receipts));
        info!(
            "Genesis block: height={} hash={} transactions={}",
            block.header.height,
            block.hash,
            block.transactions.len()
        );
        self.blocks = vec![Arc::clone(&block)];
        block
    }

    /// Stages `tx` for the next block and makes its writes visible to
    /// later mutating calls.
    pub fn stage(&mut self, store: &mut LedgerStore, tx: Transaction) {
        store.stage(&tx.writes);
        debug!(
            "Staged transaction {} ({}) from {} nonce={}",
            tx.id.short(),
            tx.payload.describe(),
            tx.sender,
            tx.nonce
        );
        self.pending.push(tx);
    }

    /// Transactions staged for the next block, in submission order.
    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn state(&self) -> MiningState {
        self.state
    }

    /// Committed block at `height`, if any.
    pub fn block(&self, height: u64) -> Option<Arc<Block>> {
        let first = self.blocks.first()?.header.height;
        let index = usize::try_from(height.checked_sub(first)?).ok()?;
        self.blocks.get(index).cloned()
    }

    /// Most recently committed block.
    pub fn tip(&self) -> Option<&Arc<Block>> {
        self.blocks.last()
    }

    /// Mines the staged transactions into a new block and commits it.
    ///
    /// On any validation failure the whole block is aborted: nothing is
    /// committed, the height is unchanged and the staged transactions are
    /// discarded.
    pub fn advance_block(&mut self, store: &mut LedgerStore) -> Result<Arc<Block>, SimnetError> {
        self.state = MiningState::Mining;
        let next = store.height().checked_add(1);
        let built = match next {
            Some(height) => self.build_block(store, height),
            None => Err("block height overflow".into()),
        };

        let (block, writes) = match built {
            Ok(built) => built,
            Err(reason) => {
                let height = next.unwrap_or(u64::MAX);
                let dropped = self.pending.len();
                store.discard_pending();
                self.pending.clear();
                self.state = MiningState::Idle;
                warn!("Mining aborted at height {height}: {reason} ({dropped} transactions dropped)");
                return Err(SimnetError::MiningAborted { height, reason });
            }
        };

        let committed = store.commit(&writes);
        debug_assert_eq!(committed, block.header.height);
        self.state = MiningState::Committed;

        let block = Arc::new(block);
        self.blocks.push(Arc::clone(&block));
        self.pending.clear();
        info!(
            "Committed block: height={} hash={} transactions={} cost={}",
            block.header.height,
            block.hash,
            block.transactions.len(),
            block.header.cost_used
        );
        self.state = MiningState::Idle;
        Ok(block)
    }

    /// Mines `count` blocks with no transactions; returns the new height.
    ///
    /// Staged transactions, if any, go into the first block.
    pub fn mine_empty_blocks(
        &mut self,
        store: &mut LedgerStore,
        count: u64,
    ) -> Result<u64, SimnetError> {
        for _ in 0..count {
            self.advance_block(store)?;
        }
        Ok(store.height())
    }

    /// Validates the staged transactions in order and assembles the block.
    fn build_block(&self, store: &LedgerStore, height: u64) -> Result<(Block, WriteSet), String> {
        let Some(parent) = self.blocks.last() else {
            return Err("no genesis block".into());
        };

        let base = store.snapshot();
        let mut block_overlay = OverlayState::new(&base);
        let mut cost_used = 0u64;
        let mut receipts = Vec::with_capacity(self.pending.len());

        for tx in &self.pending {
            self.validator
                .validate_tx(tx, &block_overlay, cost_used)
                .map_err(|e| format!("transaction {}: {e}", tx.id.short()))?;
            block_overlay.apply(&tx.writes);
            cost_used += tx.cost;
            receipts.push(Receipt::new(tx, cost_used));
        }
        let writes = block_overlay.into_writes();

        let header = Header {
            height,
            parent: parent.hash,
            state_root: store.preview_root(&writes),
            tx_root: MerkleTree::from_transactions(&self.pending),
            receipts_root: Block::receipts_root(&receipts),
            cost_used,
        };
        self.validator
            .validate_header(&header, &parent.header, parent.hash)
            .map_err(|e| e.to_string())?;

        let block = Block::new(self.chain_id, header, self.pending.clone(), receipts);
        Ok((block, writes))
    }
}
