//! Network initialization settings.

use crate::core::account::SeedAccount;
use crate::simnet::error::{Result, SimnetError};
use crate::types::address::Address;
use crate::utils::log::Level;
use crate::virtual_machine::cost::{BLOCK_COST_LIMIT, CALL_COST_LIMIT};
use std::collections::BTreeSet;

/// Chain id of the default development network.
pub const DEV_CHAIN_ID: u64 = 0x8000_0000;

/// Balance, in micro-STX, of every default devnet identity.
pub const DEFAULT_ACCOUNT_BALANCE: u128 = 100_000_000_000_000;

/// Name of the identity that deploys genesis contracts by default.
pub const DEFAULT_DEPLOYER: &str = "deployer";

/// Number of `wallet_N` identities in the default devnet.
pub const DEFAULT_WALLETS: usize = 8;

/// Contract deployed at genesis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenesisContract {
    pub name: String,
    pub source: String,
}

/// Settings for [`Network::new`](crate::simnet::network::Network::new).
#[derive(Clone, Debug)]
pub struct NetworkConfig {
    pub chain_id: u64,
    /// Height of the genesis block.
    pub start_height: u64,
    /// Seed identities, in the order `accounts_by_name` yields them.
    pub accounts: Vec<SeedAccount>,
    /// Account that deploys `contracts` and owns bare contract names.
    pub deployer: String,
    pub contracts: Vec<GenesisContract>,
    pub call_cost_limit: u64,
    pub block_cost_limit: u64,
    pub log_level: Level,
}

impl Default for NetworkConfig {
    /// The devnet: `deployer` and `wallet_1` … `wallet_8`, each funded with
    /// [`DEFAULT_ACCOUNT_BALANCE`].
    fn default() -> Self {
        let mut config = Self::new();
        config = config.with_account(DEFAULT_DEPLOYER, DEFAULT_ACCOUNT_BALANCE);
        for i in 1..=DEFAULT_WALLETS {
            config = config.with_account(format!("wallet_{i}"), DEFAULT_ACCOUNT_BALANCE);
        }
        config
    }
}

impl NetworkConfig {
    /// Empty configuration: no accounts and no contracts.
    pub fn new() -> Self {
        Self {
            chain_id: DEV_CHAIN_ID,
            start_height: 0,
            accounts: Vec::new(),
            deployer: DEFAULT_DEPLOYER.to_string(),
            contracts: Vec::new(),
            call_cost_limit: CALL_COST_LIMIT,
            block_cost_limit: BLOCK_COST_LIMIT,
            log_level: Level::Info,
        }
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn with_start_height(mut self, height: u64) -> Self {
        self.start_height = height;
        self
    }

    /// Adds an account with a derived address, replacing any account of the
    /// same name.
    pub fn with_account(self, name: impl Into<String>, balance: u128) -> Self {
        self.push_account(SeedAccount::new(name, balance))
    }

    /// Adds an account at a fixed address, replacing any account of the same
    /// name.
    pub fn with_account_at(self, name: impl Into<String>, address: Address, balance: u128) -> Self {
        self.push_account(SeedAccount::at(name, address, balance))
    }

    fn push_account(mut self, seed: SeedAccount) -> Self {
        match self.accounts.iter_mut().find(|a| a.name == seed.name) {
            Some(existing) => *existing = seed,
            None => self.accounts.push(seed),
        }
        self
    }

    pub fn with_deployer(mut self, name: impl Into<String>) -> Self {
        self.deployer = name.into();
        self
    }

    /// Queues a contract for deployment at genesis, in call order.
    pub fn with_contract(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.contracts.push(GenesisContract {
            name: name.into(),
            source: source.into(),
        });
        self
    }

    pub fn with_call_cost_limit(mut self, limit: u64) -> Self {
        self.call_cost_limit = limit;
        self
    }

    pub fn with_block_cost_limit(mut self, limit: u64) -> Self {
        self.block_cost_limit = limit;
        self
    }

    pub fn with_log_level(mut self, level: Level) -> Self {
        self.log_level = level;
        self
    }

    /// Checks the settings that can be checked without building the network.
    ///
    /// Account name/address clashes are detected by the registry itself.
    pub fn validate(&self) -> Result<()> {
        if self.call_cost_limit == 0 || self.block_cost_limit == 0 {
            return Err(SimnetError::InvalidConfig(
                "cost limits must be positive".into(),
            ));
        }
        if !self.contracts.is_empty() && !self.accounts.iter().any(|a| a.name == self.deployer) {
            return Err(SimnetError::InvalidConfig(format!(
                "deployer '{}' is not a configured account",
                self.deployer
            )));
        }
        let mut names = BTreeSet::new();
        for contract in &self.contracts {
            if !names.insert(contract.name.as_str()) {
                return Err(SimnetError::InvalidConfig(format!(
                    "contract '{}' is configured twice",
                    contract.name
                )));
            }
        }
        if self.start_height == u64::MAX {
            return Err(SimnetError::InvalidConfig(
                "start height leaves no room for blocks".into(),
            ));
        }
        Ok(())
    }
}
