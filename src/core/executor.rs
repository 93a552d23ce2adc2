//! Execution engine: resolves calls against the right ledger view and turns
//! mutating calls into transactions.
//!
//! Read-only calls run on a committed [`Snapshot`] and never produce writes.
//! Mutating calls run in a fresh buffer over the pending view; a trap drops
//! the buffer, an `(err ...)` result keeps only the sender's nonce bump.

use crate::core::account::Account;
use crate::core::transaction::{Transaction, TransactionPayload};
use crate::simnet::error::{Result, SimnetError};
use crate::storage::keys::{contract_key, data_var_key, map_entry_key};
use crate::storage::state_view::Snapshot;
use crate::types::address::Address;
use crate::types::encoding::{Decode, Encode};
use crate::types::hash::Hash;
use crate::virtual_machine::contract::{ContractCache, ContractRecord, FunctionKind, LoadedContract};
use crate::virtual_machine::cost::{CostCategory, DEPLOY_BASE_COST};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::interpreter::{Event, ExecEnv, Interpreter};
use crate::virtual_machine::state::{OverlayState, State, StateRead, WriteSet};
use crate::virtual_machine::types::{ContractId, PrincipalData, ResponseData, Value};
use crate::info;
use std::sync::Arc;

/// Result of a successful call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallOutcome {
    pub result: Value,
    pub events: Vec<Event>,
    pub cost: u64,
    /// Id of the staged transaction; `None` for read-only calls.
    pub tx_id: Option<Hash>,
}

impl From<&Transaction> for CallOutcome {
    fn from(tx: &Transaction) -> Self {
        Self {
            result: tx.result.clone(),
            events: tx.events.clone(),
            cost: tx.cost,
            tx_id: Some(tx.id),
        }
    }
}

pub struct ExecutionEngine {
    chain_id: u64,
    call_cost_limit: u64,
    contracts: ContractCache,
}

impl ExecutionEngine {
    pub fn new(chain_id: u64, call_cost_limit: u64) -> Self {
        Self {
            chain_id,
            call_cost_limit,
            contracts: ContractCache::new(),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn contracts(&self) -> &ContractCache {
        &self.contracts
    }

    fn env(&self, block_height: u64) -> ExecEnv<'_> {
        ExecEnv::new(
            self.chain_id,
            block_height,
            self.call_cost_limit,
            &self.contracts,
        )
    }

    /// Loads `contract` and checks `function` and `args` against its
    /// definition before anything executes.
    fn resolve<S: StateRead + ?Sized>(
        &self,
        state: &S,
        contract: &ContractId,
        function: &str,
        args: &[Value],
        expected: FunctionKind,
    ) -> Result<Arc<LoadedContract>> {
        let loaded = self.contracts.load(state, contract).map_err(|e| match e {
            VMError::NoSuchContract(id) => SimnetError::ContractNotFound(id),
            other => SimnetError::ExecutionTrap(other),
        })?;

        let def = loaded
            .function(function)
            .ok_or_else(|| SimnetError::FunctionNotFound {
                contract: contract.to_string(),
                function: function.to_string(),
            })?;
        if def.kind != expected {
            return Err(SimnetError::CallKindMismatch {
                function: function.to_string(),
                expected: expected.as_str(),
                actual: def.kind.as_str(),
            });
        }
        if def.params.len() != args.len() {
            return Err(SimnetError::ArityMismatch {
                function: function.to_string(),
                expected: def.params.len(),
                actual: args.len(),
            });
        }
        for (index, ((_, ty), arg)) in def.params.iter().zip(args).enumerate() {
            if !ty.admits(arg) {
                return Err(SimnetError::ArgumentTypeMismatch {
                    function: function.to_string(),
                    index,
                    expected: ty.to_string(),
                    actual: arg.to_string(),
                });
            }
        }
        Ok(loaded)
    }

    /// Runs a read-only function against committed state.
    pub fn call_read_only(
        &self,
        snapshot: &Snapshot,
        sender: Address,
        contract: &ContractId,
        function: &str,
        args: Vec<Value>,
    ) -> Result<CallOutcome> {
        let loaded = self.resolve(snapshot, contract, function, &args, FunctionKind::ReadOnly)?;
        let principal = PrincipalData::Standard(sender);

        let mut scratch = OverlayState::new(snapshot);
        let mut env = self.env(snapshot.height());
        let result = Interpreter::new(&mut scratch, &mut env).call_function(
            &loaded,
            function,
            args,
            principal.clone(),
            principal,
            true,
        )?;

        Ok(CallOutcome {
            result,
            events: env.events,
            cost: env.cost.used(),
            tx_id: None,
        })
    }

    /// Runs a public (or private) function as a transaction over `state`.
    ///
    /// `block_height` is the height the transaction will be mined at.
    #[allow(clippy::too_many_arguments)]
    pub fn call_public<S: StateRead + ?Sized>(
        &self,
        state: &S,
        block_height: u64,
        sender: Address,
        contract: &ContractId,
        function: &str,
        args: Vec<Value>,
        kind: FunctionKind,
    ) -> Result<Transaction> {
        let loaded = self.resolve(state, contract, function, &args, kind)?;
        let principal = PrincipalData::Standard(sender);
        let payload = TransactionPayload::ContractCall {
            contract: contract.clone(),
            function: function.to_string(),
            args: args.clone(),
        };

        let mut env = self.env(block_height);
        let mut buffer = OverlayState::new(state);
        let result = Interpreter::new(&mut buffer, &mut env).call_function(
            &loaded,
            function,
            args,
            principal.clone(),
            principal,
            false,
        )?;
        let writes = buffer.into_writes();

        self.finish(state, sender, payload, result, writes, env)
    }

    /// Deploys `source` as `sender.name`.
    pub fn deploy<S: StateRead + ?Sized>(
        &self,
        state: &S,
        block_height: u64,
        sender: Address,
        name: &str,
        source: &str,
    ) -> Result<Transaction> {
        let invalid = |reason: String| SimnetError::InvalidContract {
            name: name.to_string(),
            reason,
        };
        let id = ContractId::new(sender, name).map_err(|e| invalid(e.to_string()))?;
        if ContractCache::record(state, &id)?.is_some() {
            return Err(SimnetError::ContractAlreadyExists(id.to_string()));
        }
        let analysis = self.contracts.analyze(source).map_err(|e| match e {
            VMError::Parse(parse) => invalid(parse.render(name, source)),
            other => invalid(other.to_string()),
        })?;

        let principal = PrincipalData::Standard(sender);
        let mut env = self.env(block_height);
        env.cost.charge(
            CostCategory::StateWrite,
            DEPLOY_BASE_COST + source.len() as u64,
        )?;
        let mut buffer = OverlayState::new(state);
        let constants =
            Interpreter::new(&mut buffer, &mut env).initialize(&id, &analysis, principal)?;
        let record = ContractRecord {
            id: id.clone(),
            source: source.to_string(),
            constants,
            deployed_at: block_height,
        };
        buffer.push(contract_key(&id), record.to_bytes());
        let writes = buffer.into_writes();

        info!(
            "Deployed contract {id} ({} functions)",
            analysis.functions.len()
        );
        let payload = TransactionPayload::DeployContract {
            name: name.to_string(),
            source: source.to_string(),
        };
        self.finish(
            state,
            sender,
            payload,
            Value::okay(Value::Bool(true)),
            writes,
            env,
        )
    }

    /// Native STX transfer from `sender`.
    pub fn transfer<S: StateRead + ?Sized>(
        &self,
        state: &S,
        block_height: u64,
        sender: Address,
        recipient: PrincipalData,
        amount: u128,
    ) -> Result<Transaction> {
        let principal = PrincipalData::Standard(sender);
        let mut env = self.env(block_height);
        let mut buffer = OverlayState::new(state);
        let result =
            Interpreter::new(&mut buffer, &mut env).stx_transfer(amount, &principal, &recipient)?;
        let writes = buffer.into_writes();

        let payload = TransactionPayload::TransferStx { recipient, amount };
        self.finish(state, sender, payload, result, writes, env)
    }

    /// Layers the call's writes (unless it returned `(err ...)`) and the
    /// sender's nonce increment into the transaction write set.
    fn finish<S: StateRead + ?Sized>(
        &self,
        state: &S,
        sender: Address,
        payload: TransactionPayload,
        result: Value,
        writes: WriteSet,
        mut env: ExecEnv<'_>,
    ) -> Result<Transaction> {
        let principal = PrincipalData::Standard(sender);
        let nonce = Account::load(state, &principal)?.nonce();

        let mut tx_buffer = OverlayState::new(state);
        if matches!(
            result,
            Value::Response(ResponseData {
                committed: false,
                ..
            })
        ) {
            env.events.clear();
        } else {
            tx_buffer.apply(&writes);
        }

        let mut account = Account::load(&tx_buffer, &principal)?;
        account.increment_nonce();
        let (key, value) = account.entry(&principal);
        tx_buffer.push(key, value);

        Ok(Transaction::new(
            self.chain_id,
            sender,
            nonce,
            payload,
            env.cost.used(),
            tx_buffer.into_writes(),
            result,
            env.events,
        ))
    }

    /// Current value of a data var.
    pub fn data_var<S: StateRead + ?Sized>(
        &self,
        state: &S,
        contract: &ContractId,
        name: &str,
    ) -> Result<Value> {
        let loaded = self.load(state, contract)?;
        if !loaded.analysis.data_vars.contains_key(name) {
            return Err(VMError::NoSuchDataVar(name.to_string()).into());
        }
        let bytes = state
            .get(data_var_key(contract, name))
            .ok_or_else(|| VMError::NoSuchDataVar(name.to_string()))?;
        Ok(Value::from_bytes(&bytes).map_err(|_| VMError::InvalidStateValue)?)
    }

    /// Value stored under `key` in map `map`, if any.
    pub fn map_entry<S: StateRead + ?Sized>(
        &self,
        state: &S,
        contract: &ContractId,
        map: &str,
        key: &Value,
    ) -> Result<Option<Value>> {
        let loaded = self.load(state, contract)?;
        let def = loaded
            .analysis
            .maps
            .get(map)
            .ok_or_else(|| VMError::NoSuchMap(map.to_string()))?;
        if !def.key.admits(key) {
            return Err(VMError::type_error(&def.key, key).into());
        }
        state
            .get(map_entry_key(contract, map, key))
            .map(|bytes| {
                Value::from_bytes(&bytes)
                    .map_err(|_| SimnetError::from(VMError::InvalidStateValue))
            })
            .transpose()
    }

    fn load<S: StateRead + ?Sized>(
        &self,
        state: &S,
        contract: &ContractId,
    ) -> Result<Arc<LoadedContract>> {
        self.contracts.load(state, contract).map_err(|e| match e {
            VMError::NoSuchContract(id) => SimnetError::ContractNotFound(id),
            other => SimnetError::ExecutionTrap(other),
        })
    }
}
