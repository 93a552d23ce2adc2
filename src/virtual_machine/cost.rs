//! Execution cost metering.

use crate::virtual_machine::errors::VMError;

/// Number of cost categories tracked by [`CostProfile`].
const COST_CATEGORY_COUNT: usize = 5;

/// Default cost budget of a single call.
pub const CALL_COST_LIMIT: u64 = 5_000_000;
/// Default cost budget shared by all transactions of a block.
pub const BLOCK_COST_LIMIT: u64 = 50_000_000;

/// Base cost of evaluating one expression node.
pub const EVAL_COST: u64 = 1;
/// Base cost of entering a function, plus [`CALL_ARG_COST`] per argument.
pub const CALL_BASE_COST: u64 = 10;
pub const CALL_ARG_COST: u64 = 2;
/// Base cost of a state read, plus one unit per byte read.
pub const READ_BASE_COST: u64 = 50;
/// Base cost of a state write, plus one unit per byte written.
pub const WRITE_BASE_COST: u64 = 100;
/// Cost of deploying a contract, plus one unit per source byte.
pub const DEPLOY_BASE_COST: u64 = 1_000;

/// Categories of cost consumption.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum CostCategory {
    /// Evaluating expression nodes.
    Evaluation = 0,
    /// Reading ledger state.
    StateRead = 1,
    /// Writing ledger state.
    StateWrite = 2,
    /// Function and contract call overhead.
    FunctionCall = 3,
    /// Building new values (lists, tuples, strings) and storing code.
    Allocation = 4,
}

impl CostCategory {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CostCategory::Evaluation => "Evaluation",
            CostCategory::StateRead => "State Read",
            CostCategory::StateWrite => "State Write",
            CostCategory::FunctionCall => "Function Call",
            CostCategory::Allocation => "Allocation",
        }
    }

    /// All categories in discriminant order.
    const ALL: [CostCategory; COST_CATEGORY_COUNT] = [
        CostCategory::Evaluation,
        CostCategory::StateRead,
        CostCategory::StateWrite,
        CostCategory::FunctionCall,
        CostCategory::Allocation,
    ];
}

/// Breakdown of cost consumption per category.
///
/// Backed by a flat array indexed by [`CostCategory`] discriminant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CostProfile {
    counts: [u64; COST_CATEGORY_COUNT],
}

impl CostProfile {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn add(&mut self, category: CostCategory, amount: u64) {
        let slot = &mut self.counts[category as usize];
        *slot = slot.saturating_add(amount);
    }

    pub fn get(&self, category: CostCategory) -> u64 {
        self.counts[category as usize]
    }

    /// Returns the total cost across all categories.
    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .fold(0u64, |acc, &v| acc.saturating_add(v))
    }

    /// Returns an iterator over all categories and their costs.
    pub fn iter(&self) -> impl Iterator<Item = (CostCategory, u64)> {
        CostCategory::ALL.into_iter().zip(self.counts)
    }
}

/// Meters cost against a fixed limit.
///
/// Charging past the limit fails with [`VMError::CostLimitExceeded`]; the
/// profile keeps the charge that crossed the limit so callers can report it.
#[derive(Clone, Debug)]
pub struct CostTracker {
    profile: CostProfile,
    used: u64,
    limit: u64,
}

impl CostTracker {
    pub fn new(limit: u64) -> Self {
        Self {
            profile: CostProfile::new(),
            used: 0,
            limit,
        }
    }

    pub fn charge(&mut self, category: CostCategory, amount: u64) -> Result<(), VMError> {
        self.profile.add(category, amount);
        self.used = self.used.saturating_add(amount);
        if self.used > self.limit {
            return Err(VMError::CostLimitExceeded {
                used: self.used,
                limit: self.limit,
            });
        }
        Ok(())
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn profile(&self) -> &CostProfile {
        &self.profile
    }
}
