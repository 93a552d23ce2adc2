//! Account records and the registry of named test identities.

use crate::simnet::error::SimnetError;
use crate::storage::keys::account_key;
use crate::types::address::Address;
use crate::types::encoding::{Decode, Encode};
use crate::types::hash::Hash;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::state::StateRead;
use crate::virtual_machine::types::PrincipalData;
use simnet_derive::BinaryCodec;
use std::collections::HashMap;

/// Ledger record of a principal's balance and nonce.
///
/// Principals that were never written read as the default (zero) account.
#[derive(BinaryCodec, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Account {
    /// Number of mutating calls sent by this account.
    nonce: u64,
    /// Spendable balance in micro-STX.
    balance: u128,
}

impl Account {
    /// Creates an account with the given balance and a zero nonce.
    pub fn new(balance: u128) -> Self {
        Self { nonce: 0, balance }
    }

    pub fn balance(&self) -> u128 {
        self.balance
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn increment_nonce(&mut self) {
        self.nonce = self.nonce.saturating_add(1);
    }

    /// Removes `amount` from the balance; `None` if the balance is too low.
    pub fn debit(&mut self, amount: u128) -> Option<()> {
        self.balance = self.balance.checked_sub(amount)?;
        Some(())
    }

    /// Adds `amount` to the balance; `None` on overflow.
    pub fn credit(&mut self, amount: u128) -> Option<()> {
        self.balance = self.balance.checked_add(amount)?;
        Some(())
    }

    /// Loads the account of `principal`, defaulting to an empty account.
    pub fn load<S: StateRead + ?Sized>(
        state: &S,
        principal: &PrincipalData,
    ) -> Result<Account, VMError> {
        match state.get(account_key(principal)) {
            Some(bytes) => Account::from_bytes(&bytes).map_err(|_| VMError::InvalidStateValue),
            None => Ok(Account::default()),
        }
    }

    /// Returns the `(key, encoded record)` pair for storing this account.
    pub fn entry(&self, principal: &PrincipalData) -> (Hash, Vec<u8>) {
        (account_key(principal), self.to_bytes())
    }
}

/// Seed for one named identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedAccount {
    pub name: String,
    /// Explicit address; derived from the chain id and name when absent.
    pub address: Option<Address>,
    pub balance: u128,
}

impl SeedAccount {
    pub fn new(name: impl Into<String>, balance: u128) -> Self {
        Self {
            name: name.into(),
            address: None,
            balance,
        }
    }

    pub fn at(name: impl Into<String>, address: Address, balance: u128) -> Self {
        Self {
            name: name.into(),
            address: Some(address),
            balance,
        }
    }

    /// Address this seed resolves to on chain `chain_id`.
    pub fn resolve(&self, chain_id: u64) -> Address {
        self.address
            .unwrap_or_else(|| Address::derive(chain_id, &self.name))
    }
}

/// A registered identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedAccount {
    pub name: String,
    pub address: Address,
    pub initial_balance: u128,
}

/// Named test identities, kept in seed order.
#[derive(Clone, Debug, Default)]
pub struct AccountRegistry {
    accounts: Vec<NamedAccount>,
    by_name: HashMap<String, usize>,
    by_address: HashMap<Address, usize>,
}

impl AccountRegistry {
    /// Builds the registry from seed accounts.
    ///
    /// Fails on empty names, duplicate names and duplicate addresses.
    pub fn initialize(chain_id: u64, seeds: &[SeedAccount]) -> Result<Self, SimnetError> {
        let mut registry = AccountRegistry::default();
        for seed in seeds {
            if seed.name.trim().is_empty() {
                return Err(SimnetError::InvalidConfig(
                    "account names must not be empty".into(),
                ));
            }
            let address = seed.resolve(chain_id);
            let index = registry.accounts.len();
            if registry.by_name.insert(seed.name.clone(), index).is_some() {
                return Err(SimnetError::InvalidConfig(format!(
                    "duplicate account name '{}'",
                    seed.name
                )));
            }
            if let Some(other) = registry.by_address.insert(address, index) {
                return Err(SimnetError::InvalidConfig(format!(
                    "accounts '{}' and '{}' share address {address}",
                    registry.accounts[other].name, seed.name
                )));
            }
            registry.accounts.push(NamedAccount {
                name: seed.name.clone(),
                address,
                initial_balance: seed.balance,
            });
        }
        Ok(registry)
    }

    /// Resolves a name to its address.
    pub fn lookup(&self, name: &str) -> Result<Address, SimnetError> {
        self.by_name
            .get(name)
            .map(|&i| self.accounts[i].address)
            .ok_or_else(|| SimnetError::UnknownAccount(name.to_string()))
    }

    /// Reverse lookup of a registered address.
    pub fn name_of(&self, address: &Address) -> Option<&str> {
        self.by_address
            .get(address)
            .map(|&i| self.accounts[i].name.as_str())
    }

    /// Lazily iterates `(name, address)` pairs in seed order.
    ///
    /// The iterator is `Clone`, so a consumer can restart it from the
    /// beginning at any point.
    pub fn accounts_by_name(&self) -> impl Iterator<Item = (&str, Address)> + Clone + '_ {
        self.accounts.iter().map(|a| (a.name.as_str(), a.address))
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Initial ledger entries of every registered identity.
    pub fn genesis_entries(&self) -> Vec<(Hash, Vec<u8>)> {
        self.accounts
            .iter()
            .map(|a| Account::new(a.initial_balance).entry(&PrincipalData::Standard(a.address)))
            .collect()
    }
}
