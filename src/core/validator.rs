//! Block validation rules.
//!
//! Provides the [`Validator`] trait for custom validation strategies
//! and [`BlockValidator`] as the default implementation.

use crate::core::account::Account;
use crate::core::block::Header;
use crate::core::transaction::Transaction;
use crate::types::address::Address;
use crate::types::hash::Hash;
use crate::virtual_machine::cost::BLOCK_COST_LIMIT;
use crate::virtual_machine::state::StateRead;
use crate::virtual_machine::types::PrincipalData;
use simnet_derive::Error;
use std::error::Error;
use std::fmt::Debug;

/// Checks applied while a block is being mined.
pub trait Validator: Send + Sync {
    type Error: Debug + Error;

    /// Validates `tx` against the block state built so far.
    ///
    /// `state` already contains the writes of every earlier transaction of
    /// the block and `cost_so_far` their summed cost.
    fn validate_tx<S: StateRead + ?Sized>(
        &self,
        tx: &Transaction,
        state: &S,
        cost_so_far: u64,
    ) -> Result<(), Self::Error>;

    /// Validates a new header against its parent.
    fn validate_header(&self, header: &Header, parent: &Header, parent_hash: Hash)
    -> Result<(), Self::Error>;
}

/// Default validator.
///
/// Validates:
/// - Each sender's nonces are contiguous, starting at its ledger nonce.
/// - The block's summed cost stays within the block cost limit.
/// - Height is exactly one greater than the parent's and the parent hash matches.
#[derive(Clone, Debug)]
pub struct BlockValidator {
    pub block_cost_limit: u64,
}

impl BlockValidator {
    pub fn new(block_cost_limit: u64) -> Self {
        Self { block_cost_limit }
    }
}

impl Default for BlockValidator {
    fn default() -> Self {
        Self::new(BLOCK_COST_LIMIT)
    }
}

/// Errors that can occur during block validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockValidatorError {
    #[error("nonce gap for {sender}: expected {expected}, got {actual}")]
    NonceGap {
        sender: Address,
        expected: u64,
        actual: u64,
    },

    #[error("block cost {used} exceeds limit {limit}")]
    BlockCostExceeded { used: u64, limit: u64 },

    #[error("invalid block height: expected {expected}, got {actual}")]
    InvalidHeight { expected: u64, actual: u64 },

    #[error("parent hash mismatch")]
    ParentMismatch,

    #[error("unreadable account record for {0}")]
    CorruptAccount(Address),
}

impl Validator for BlockValidator {
    type Error = BlockValidatorError;

    fn validate_tx<S: StateRead + ?Sized>(
        &self,
        tx: &Transaction,
        state: &S,
        cost_so_far: u64,
    ) -> Result<(), Self::Error> {
        let account = Account::load(state, &PrincipalData::Standard(tx.sender))
            .map_err(|_| BlockValidatorError::CorruptAccount(tx.sender))?;
        if account.nonce() != tx.nonce {
            return Err(BlockValidatorError::NonceGap {
                sender: tx.sender,
                expected: account.nonce(),
                actual: tx.nonce,
            });
        }

        let used = cost_so_far.saturating_add(tx.cost);
        if used > self.block_cost_limit {
            return Err(BlockValidatorError::BlockCostExceeded {
                used,
                limit: self.block_cost_limit,
            });
        }
        Ok(())
    }

    fn validate_header(
        &self,
        header: &Header,
        parent: &Header,
        parent_hash: Hash,
    ) -> Result<(), Self::Error> {
        let expected = parent.height.saturating_add(1);
        if header.height != expected {
            return Err(BlockValidatorError::InvalidHeight {
                expected,
                actual: header.height,
            });
        }
        if header.parent != parent_hash {
            return Err(BlockValidatorError::ParentMismatch);
        }
        Ok(())
    }
}
