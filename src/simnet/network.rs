//! The simulated network: one owned instance wiring accounts, ledger,
//! execution and block production together.

use crate::core::account::{Account, AccountRegistry};
use crate::core::block::Block;
use crate::core::blockchain::BlockController;
use crate::core::executor::{CallOutcome, ExecutionEngine};
use crate::core::transaction::Transaction;
use crate::simnet::config::NetworkConfig;
use crate::simnet::error::{Result, SimnetError};
use crate::storage::state_store::LedgerStore;
use crate::storage::state_view::Snapshot;
use crate::types::address::Address;
use crate::types::hash::Hash;
use crate::utils::log;
use crate::virtual_machine::contract::FunctionKind;
use crate::virtual_machine::types::{ContractId, PrincipalData, Value};
use crate::info;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of a single contract call.
pub type CallResult = Result<CallOutcome>;

pub struct Network {
    chain_id: u64,
    deployer: String,
    registry: AccountRegistry,
    store: LedgerStore,
    engine: ExecutionEngine,
    controller: BlockController,
}

impl Network {
    /// Builds the network and commits its genesis block at the configured
    /// start height.
    ///
    /// Seed accounts are funded first, then every configured contract is
    /// deployed by the deployer account, in order.
    pub fn new(config: NetworkConfig) -> Result<Self> {
        log::set_max_level(config.log_level);
        config.validate()?;

        let registry = AccountRegistry::initialize(config.chain_id, &config.accounts)?;
        let mut store = LedgerStore::new(config.start_height);
        let funding: Vec<_> = registry
            .genesis_entries()
            .into_iter()
            .map(|(key, value)| (key, Some(value)))
            .collect();
        store.install_genesis(&funding);

        let engine = ExecutionEngine::new(config.chain_id, config.call_cost_limit);
        let mut deployments = Vec::with_capacity(config.contracts.len());
        if !config.contracts.is_empty() {
            let deployer = registry.lookup(&config.deployer)?;
            for contract in &config.contracts {
                let tx = engine.deploy(
                    &store,
                    config.start_height,
                    deployer,
                    &contract.name,
                    &contract.source,
                )?;
                store.install_genesis(&tx.writes);
                deployments.push(tx);
            }
        }

        let mut controller = BlockController::new(config.chain_id, config.block_cost_limit);
        controller.genesis(&store, deployments);
        info!(
            "Simulated network ready: chain_id={:#x} accounts={} contracts={}",
            config.chain_id,
            registry.len(),
            config.contracts.len()
        );

        Ok(Self {
            chain_id: config.chain_id,
            deployer: config.deployer,
            registry,
            store,
            engine,
            controller,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Every named identity, keyed by name.
    pub fn get_accounts(&self) -> BTreeMap<String, Address> {
        self.registry
            .accounts_by_name()
            .map(|(name, address)| (name.to_string(), address))
            .collect()
    }

    /// `(name, address)` pairs in seed order.
    pub fn accounts_by_name(&self) -> impl Iterator<Item = (&str, Address)> + Clone + '_ {
        self.registry.accounts_by_name()
    }

    /// Address of a named identity.
    pub fn account(&self, name: &str) -> Result<Address> {
        self.registry.lookup(name)
    }

    /// Name of a registered address.
    pub fn account_name(&self, address: &Address) -> Option<&str> {
        self.registry.name_of(address)
    }

    /// Height of the last committed block.
    pub fn block_height(&self) -> u64 {
        self.store.height()
    }

    pub fn state_root(&self) -> Hash {
        self.store.root()
    }

    /// Immutable view of committed state, safe to hand to other threads.
    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    /// Committed block at `height`.
    pub fn block(&self, height: u64) -> Option<Arc<Block>> {
        self.controller.block(height)
    }

    /// Transactions staged for the next block.
    pub fn pending_transactions(&self) -> &[Transaction] {
        self.controller.pending()
    }

    /// Resolves `ADDRESS.name`, or a bare `name` owned by the deployer.
    fn contract_id(&self, contract: &str) -> Result<ContractId> {
        if contract.contains('.') {
            return contract
                .parse()
                .map_err(|_| SimnetError::ContractNotFound(contract.to_string()));
        }
        let deployer = self.registry.lookup(&self.deployer)?;
        ContractId::new(deployer, contract)
            .map_err(|_| SimnetError::ContractNotFound(contract.to_string()))
    }

    /// Calls a read-only function against committed state.
    pub fn call_read_only_fn(
        &self,
        contract: &str,
        function: &str,
        args: Vec<Value>,
        sender: Address,
    ) -> CallResult {
        let id = self.contract_id(contract)?;
        self.engine
            .call_read_only(&self.store.snapshot(), sender, &id, function, args)
    }

    /// Calls a public function and stages the resulting transaction.
    ///
    /// The writes become visible to later mutating calls at once and to
    /// read-only calls after the next [`mine_block`](Self::mine_block).
    pub fn call_public_fn(
        &mut self,
        contract: &str,
        function: &str,
        args: Vec<Value>,
        sender: Address,
    ) -> CallResult {
        self.call_mutating(contract, function, args, sender, FunctionKind::Public)
    }

    /// Calls a private function directly, as test tooling does.
    pub fn call_private_fn(
        &mut self,
        contract: &str,
        function: &str,
        args: Vec<Value>,
        sender: Address,
    ) -> CallResult {
        self.call_mutating(contract, function, args, sender, FunctionKind::Private)
    }

    fn call_mutating(
        &mut self,
        contract: &str,
        function: &str,
        args: Vec<Value>,
        sender: Address,
        kind: FunctionKind,
    ) -> CallResult {
        let id = self.contract_id(contract)?;
        let tx = self.engine.call_public(
            &self.store,
            self.next_height()?,
            sender,
            &id,
            function,
            args,
            kind,
        )?;
        Ok(self.stage(tx))
    }

    /// Deploys a contract as `sender` in the next block.
    pub fn deploy_contract(&mut self, name: &str, source: &str, sender: Address) -> CallResult {
        let tx = self
            .engine
            .deploy(&self.store, self.next_height()?, sender, name, source)?;
        Ok(self.stage(tx))
    }

    /// Transfers micro-STX from `sender` to `recipient` in the next block.
    pub fn transfer_stx(
        &mut self,
        amount: u128,
        recipient: impl Into<PrincipalData>,
        sender: Address,
    ) -> CallResult {
        let tx = self.engine.transfer(
            &self.store,
            self.next_height()?,
            sender,
            recipient.into(),
            amount,
        )?;
        Ok(self.stage(tx))
    }

    fn stage(&mut self, tx: Transaction) -> CallOutcome {
        let outcome = CallOutcome::from(&tx);
        self.controller.stage(&mut self.store, tx);
        outcome
    }

    /// Height of the block that will include staged transactions.
    fn next_height(&self) -> Result<u64> {
        self.store.height().checked_add(1).ok_or_else(|| {
            SimnetError::InvalidConfig(format!(
                "no block can follow height {}",
                self.store.height()
            ))
        })
    }

    /// Commits the staged transactions as one block.
    ///
    /// On [`SimnetError::MiningAborted`] the height is unchanged and the
    /// staged transactions are gone.
    pub fn mine_block(&mut self) -> Result<Arc<Block>> {
        self.controller.advance_block(&mut self.store)
    }

    /// Mines `count` blocks; returns the new height.
    pub fn mine_empty_blocks(&mut self, count: u64) -> Result<u64> {
        self.controller.mine_empty_blocks(&mut self.store, count)
    }

    /// Committed value of a data var.
    pub fn get_data_var(&self, contract: &str, name: &str) -> Result<Value> {
        let id = self.contract_id(contract)?;
        self.engine.data_var(&self.store.snapshot(), &id, name)
    }

    /// Committed entry of a map.
    pub fn get_map_entry(&self, contract: &str, map: &str, key: &Value) -> Result<Option<Value>> {
        let id = self.contract_id(contract)?;
        self.engine.map_entry(&self.store.snapshot(), &id, map, key)
    }

    /// Committed account record of `principal`.
    pub fn get_account(&self, principal: impl Into<PrincipalData>) -> Result<Account> {
        Ok(Account::load(&self.store.snapshot(), &principal.into())?)
    }

    /// Committed balance of `principal`.
    pub fn get_balance(&self, principal: impl Into<PrincipalData>) -> Result<u128> {
        Ok(self.get_account(principal)?.balance())
    }
}

#[cfg(test)]
mod tests;
