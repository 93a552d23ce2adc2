//! Tree-walking interpreter for contract code.
//!
//! Every call runs against a [`State`] supplied by the caller, normally an
//! [`OverlayState`] that the execution engine keeps or discards as a whole.
//! Calls into other contracts through `contract-call?` get their own nested
//! overlay so an `(err ...)` result rolls back exactly that call's writes.

use crate::core::account::Account;
use crate::storage::keys::{data_var_key, map_entry_key};
use crate::types::encoding::{Decode, Encode};
use crate::types::hash::Hash;
use crate::virtual_machine::contract::{
    ContractAnalysis, ContractCache, FunctionKind, Initializer, LoadedContract,
};
use crate::virtual_machine::cost::{
    CALL_ARG_COST, CALL_BASE_COST, CostCategory, CostTracker, EVAL_COST, READ_BASE_COST,
    WRITE_BASE_COST,
};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::parser::{Expr, ExprKind};
use crate::virtual_machine::state::{OverlayState, State};
use crate::virtual_machine::types::{ContractId, PrincipalData, ResponseData, Value};
use simnet_derive::BinaryCodec;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Maximum evaluation nesting of one top-level call.
///
/// Every nested expression and every function or contract call takes one
/// level, so a self-recursive function gets roughly a third of it. Sized to
/// keep the deepest evaluation within a 2 MiB thread stack.
pub const MAX_EVAL_DEPTH: usize = 64;

/// Built-in functions and special forms.
pub const NATIVE_FUNCTIONS: &[&str] = &[
    "+", "-", "*", "/", "mod", "<", ">", "<=", ">=", "is-eq", "and", "or", "not", "if", "let",
    "begin", "asserts!", "unwrap!", "unwrap-err!", "unwrap-panic", "unwrap-err-panic", "try!",
    "match", "ok", "err", "some", "is-some", "is-none", "is-ok", "is-err", "default-to", "get",
    "tuple", "list", "len", "append", "concat", "to-int", "to-uint", "var-get", "var-set",
    "map-get?", "map-set", "map-insert", "map-delete", "stx-get-balance", "stx-transfer?",
    "print", "contract-call?", "as-contract",
];

/// Names bound by the runtime rather than by the contract.
pub const KEYWORDS: &[&str] = &["tx-sender", "contract-caller", "block-height"];

/// Natives that mutate state and are therefore banned from read-only code.
pub const WRITE_FUNCTIONS: &[&str] = &[
    "var-set",
    "map-set",
    "map-insert",
    "map-delete",
    "stx-transfer?",
];

/// `stx-transfer?` error codes.
pub const ERR_INSUFFICIENT_BALANCE: u128 = 1;
pub const ERR_SELF_TRANSFER: u128 = 2;
pub const ERR_NON_POSITIVE_AMOUNT: u128 = 3;
pub const ERR_SENDER_NOT_TX_SENDER: u128 = 4;

/// Observable side output of a call.
#[derive(Clone, Debug, PartialEq, Eq, BinaryCodec)]
pub enum Event {
    Print {
        contract: ContractId,
        value: Value,
    },
    StxTransfer {
        sender: PrincipalData,
        recipient: PrincipalData,
        amount: u128,
    },
}

/// Context shared by every frame of one top-level call.
pub struct ExecEnv<'c> {
    pub chain_id: u64,
    /// Value of the `block-height` keyword.
    pub block_height: u64,
    pub cost: CostTracker,
    pub events: Vec<Event>,
    depth: usize,
    contracts: &'c ContractCache,
}

impl<'c> ExecEnv<'c> {
    pub fn new(
        chain_id: u64,
        block_height: u64,
        cost_limit: u64,
        contracts: &'c ContractCache,
    ) -> Self {
        Self {
            chain_id,
            block_height,
            cost: CostTracker::new(cost_limit),
            events: Vec::new(),
            depth: 0,
            contracts,
        }
    }
}

struct Frame {
    contract: Arc<LoadedContract>,
    sender: PrincipalData,
    caller: PrincipalData,
    locals: Vec<(String, Value)>,
    read_only: bool,
}

/// Non-local exits while evaluating.
enum Unwind {
    Trap(VMError),
    /// Early return from the enclosing function (`asserts!`, `unwrap!`, `try!`).
    Return(Value),
}

impl From<VMError> for Unwind {
    fn from(err: VMError) -> Self {
        Unwind::Trap(err)
    }
}

type EvalResult = Result<Value, Unwind>;

pub struct Interpreter<'a, 'c> {
    state: &'a mut dyn State,
    env: &'a mut ExecEnv<'c>,
}

fn arity(name: &str, args: &[Expr], expected: usize) -> Result<(), VMError> {
    if args.len() != expected {
        return Err(VMError::ArityMismatch {
            function: name.to_string(),
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

fn at_least(name: &str, args: &[Expr], min: usize) -> Result<(), VMError> {
    if args.len() < min {
        return Err(VMError::ArityMismatch {
            function: name.to_string(),
            expected: min,
            actual: args.len(),
        });
    }
    Ok(())
}

fn symbol_arg<'e>(form: &str, expr: &'e Expr) -> Result<&'e str, VMError> {
    expr.symbol()
        .ok_or_else(|| VMError::malformed(form, format!("expected a name, got {expr}")))
}

fn expect_bool(value: Value) -> Result<bool, VMError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(VMError::type_error("bool", other.type_name())),
    }
}

fn expect_principal(value: Value) -> Result<PrincipalData, VMError> {
    match value {
        Value::Principal(p) => Ok(p),
        other => Err(VMError::type_error("principal", other.type_name())),
    }
}

fn stx_error(code: u128) -> Value {
    Value::error(Value::UInt(code))
}

impl<'a, 'c> Interpreter<'a, 'c> {
    pub fn new(state: &'a mut dyn State, env: &'a mut ExecEnv<'c>) -> Self {
        Self { state, env }
    }

    /// Calls `function` of `contract` with already-evaluated arguments.
    ///
    /// `sender` is bound to `tx-sender`; `caller` to `contract-caller`.
    /// With `read_only` set every state write traps.
    pub fn call_function(
        &mut self,
        contract: &Arc<LoadedContract>,
        function: &str,
        args: Vec<Value>,
        sender: PrincipalData,
        caller: PrincipalData,
        read_only: bool,
    ) -> Result<Value, VMError> {
        let def = contract
            .function(function)
            .ok_or_else(|| VMError::NoSuchFunction {
                contract: contract.id.to_string(),
                function: function.to_string(),
            })?;

        if self.env.depth >= MAX_EVAL_DEPTH {
            return Err(VMError::CallDepthExceeded(MAX_EVAL_DEPTH));
        }
        self.env.cost.charge(
            CostCategory::FunctionCall,
            CALL_BASE_COST + CALL_ARG_COST * args.len() as u64,
        )?;

        if args.len() != def.params.len() {
            return Err(VMError::ArityMismatch {
                function: def.name.clone(),
                expected: def.params.len(),
                actual: args.len(),
            });
        }
        let mut locals = Vec::with_capacity(args.len());
        for ((name, ty), arg) in def.params.iter().zip(args) {
            if !ty.admits(&arg) {
                return Err(VMError::type_error(ty, &arg));
            }
            locals.push((name.clone(), arg));
        }

        let mut frame = Frame {
            contract: Arc::clone(contract),
            sender,
            caller,
            locals,
            read_only: read_only || def.kind == FunctionKind::ReadOnly,
        };

        self.env.depth += 1;
        let result = self.eval(&mut frame, &def.body);
        self.env.depth -= 1;

        let value = match result {
            Ok(v) | Err(Unwind::Return(v)) => v,
            Err(Unwind::Trap(e)) => return Err(e),
        };
        if def.kind == FunctionKind::Public && !matches!(value, Value::Response(_)) {
            return Err(VMError::PublicMustReturnResponse(def.name.clone()));
        }
        Ok(value)
    }

    /// Evaluates constants and data var initial values of a new contract.
    ///
    /// Data vars are written to state; the evaluated constants are returned
    /// in definition order for the contract record.
    pub fn initialize(
        &mut self,
        id: &ContractId,
        analysis: &Arc<ContractAnalysis>,
        sender: PrincipalData,
    ) -> Result<Vec<(String, Value)>, VMError> {
        let mut constants = BTreeMap::new();
        let mut ordered = Vec::new();

        for init in &analysis.initializers {
            let mut frame = Frame {
                contract: Arc::new(LoadedContract {
                    id: id.clone(),
                    analysis: Arc::clone(analysis),
                    constants: constants.clone(),
                }),
                sender: sender.clone(),
                caller: sender.clone(),
                locals: Vec::new(),
                read_only: false,
            };
            match init {
                Initializer::Constant(name, expr) => {
                    let value = self.eval_initializer(&mut frame, expr)?;
                    constants.insert(name.clone(), value.clone());
                    ordered.push((name.clone(), value));
                }
                Initializer::DataVar(name) => {
                    let def = analysis
                        .data_vars
                        .get(name)
                        .ok_or_else(|| VMError::NoSuchDataVar(name.clone()))?;
                    let value = self.eval_initializer(&mut frame, &def.init)?;
                    if !def.ty.admits(&value) {
                        return Err(VMError::type_error(&def.ty, &value));
                    }
                    self.write_value(&frame, "define-data-var", data_var_key(id, name), &value)?;
                }
            }
        }
        Ok(ordered)
    }

    fn eval_initializer(&mut self, frame: &mut Frame, expr: &Expr) -> Result<Value, VMError> {
        match self.eval(frame, expr) {
            Ok(v) => Ok(v),
            Err(Unwind::Trap(e)) => Err(e),
            Err(Unwind::Return(_)) => Err(VMError::malformed(
                "initializer",
                "early return outside of a function",
            )),
        }
    }

    /// Moves `amount` micro-STX between principals.
    ///
    /// Returns `(ok true)` or one of the `stx-transfer?` error responses;
    /// traps only on balance overflow or corrupt state.
    pub fn stx_transfer(
        &mut self,
        amount: u128,
        sender: &PrincipalData,
        recipient: &PrincipalData,
    ) -> Result<Value, VMError> {
        if amount == 0 {
            return Ok(stx_error(ERR_NON_POSITIVE_AMOUNT));
        }
        if sender == recipient {
            return Ok(stx_error(ERR_SELF_TRANSFER));
        }

        let mut from = self.load_account(sender)?;
        if from.debit(amount).is_none() {
            return Ok(stx_error(ERR_INSUFFICIENT_BALANCE));
        }
        self.store_account(sender, &from)?;

        let mut to = self.load_account(recipient)?;
        to.credit(amount).ok_or(VMError::ArithmeticOverflow)?;
        self.store_account(recipient, &to)?;

        self.env.events.push(Event::StxTransfer {
            sender: sender.clone(),
            recipient: recipient.clone(),
            amount,
        });
        Ok(Value::okay(Value::Bool(true)))
    }

    fn load_account(&mut self, principal: &PrincipalData) -> Result<Account, VMError> {
        self.env
            .cost
            .charge(CostCategory::StateRead, READ_BASE_COST)?;
        Account::load(&*self.state, principal)
    }

    fn store_account(&mut self, principal: &PrincipalData, account: &Account) -> Result<(), VMError> {
        let (key, bytes) = account.entry(principal);
        self.env
            .cost
            .charge(CostCategory::StateWrite, WRITE_BASE_COST + bytes.len() as u64)?;
        self.state.push(key, bytes);
        Ok(())
    }

    fn read_value(&mut self, key: Hash) -> Result<Option<Value>, VMError> {
        let bytes = self.state.get(key);
        let len = bytes.as_ref().map_or(0, |b| b.len() as u64);
        self.env
            .cost
            .charge(CostCategory::StateRead, READ_BASE_COST + len)?;
        bytes
            .map(|b| Value::from_bytes(&b).map_err(|_| VMError::InvalidStateValue))
            .transpose()
    }

    fn write_value(
        &mut self,
        frame: &Frame,
        what: &'static str,
        key: Hash,
        value: &Value,
    ) -> Result<(), VMError> {
        if frame.read_only {
            return Err(VMError::WriteInReadOnly(what));
        }
        let bytes = value.to_bytes();
        self.env
            .cost
            .charge(CostCategory::StateWrite, WRITE_BASE_COST + bytes.len() as u64)?;
        self.state.push(key, bytes);
        Ok(())
    }

    fn delete_value(&mut self, frame: &Frame, what: &'static str, key: Hash) -> Result<(), VMError> {
        if frame.read_only {
            return Err(VMError::WriteInReadOnly(what));
        }
        self.env
            .cost
            .charge(CostCategory::StateWrite, WRITE_BASE_COST)?;
        self.state.delete(key);
        Ok(())
    }

    fn allocate(&mut self, value: &Value) -> Result<(), VMError> {
        self.env
            .cost
            .charge(CostCategory::Allocation, value.size())
    }

    fn eval(&mut self, frame: &mut Frame, expr: &Expr) -> EvalResult {
        if self.env.depth >= MAX_EVAL_DEPTH {
            return Err(VMError::CallDepthExceeded(MAX_EVAL_DEPTH).into());
        }
        self.env.depth += 1;
        let result = self.eval_expr(frame, expr);
        self.env.depth -= 1;
        result
    }

    fn eval_expr(&mut self, frame: &mut Frame, expr: &Expr) -> EvalResult {
        self.env.cost.charge(CostCategory::Evaluation, EVAL_COST)?;
        match &expr.kind {
            ExprKind::Literal(v) => Ok(v.clone()),
            ExprKind::ContractRef(name) => Ok(Value::Principal(PrincipalData::Contract(
                ContractId {
                    issuer: frame.contract.id.issuer,
                    name: name.clone(),
                },
            ))),
            ExprKind::Symbol(name) => Ok(self.lookup(frame, name)?),
            ExprKind::Tuple(fields) => {
                let mut entries = BTreeMap::new();
                for (name, value) in fields {
                    let value = self.eval(frame, value)?;
                    if entries.insert(name.clone(), value).is_some() {
                        return Err(VMError::DuplicateDefinition(name.clone()).into());
                    }
                }
                let tuple = Value::Tuple(entries);
                self.allocate(&tuple)?;
                Ok(tuple)
            }
            ExprKind::List(items) => {
                let Some((head, args)) = items.split_first() else {
                    return Err(VMError::malformed("expression", "empty list").into());
                };
                let name = symbol_arg("expression", head)?;
                self.apply(frame, name, args)
            }
        }
    }

    fn lookup(&self, frame: &Frame, name: &str) -> Result<Value, VMError> {
        if let Some((_, v)) = frame.locals.iter().rev().find(|(n, _)| n == name) {
            return Ok(v.clone());
        }
        match name {
            "tx-sender" => return Ok(Value::Principal(frame.sender.clone())),
            "contract-caller" => return Ok(Value::Principal(frame.caller.clone())),
            "block-height" => return Ok(Value::UInt(self.env.block_height as u128)),
            _ => {}
        }
        frame
            .contract
            .constants
            .get(name)
            .cloned()
            .ok_or_else(|| VMError::UndefinedVariable(name.to_string()))
    }

    fn eval_all(&mut self, frame: &mut Frame, args: &[Expr]) -> Result<Vec<Value>, Unwind> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(frame, arg)?);
        }
        Ok(values)
    }

    fn eval_bool(&mut self, frame: &mut Frame, expr: &Expr) -> Result<bool, Unwind> {
        let value = self.eval(frame, expr)?;
        Ok(expect_bool(value)?)
    }

    /// Evaluates `body` with `name` bound to `value`.
    fn eval_bound(&mut self, frame: &mut Frame, name: &str, value: Value, body: &Expr) -> EvalResult {
        frame.locals.push((name.to_string(), value));
        let result = self.eval(frame, body);
        frame.locals.pop();
        result
    }

    fn apply(&mut self, frame: &mut Frame, name: &str, args: &[Expr]) -> EvalResult {
        match name {
            "if" => {
                arity(name, args, 3)?;
                if self.eval_bool(frame, &args[0])? {
                    self.eval(frame, &args[1])
                } else {
                    self.eval(frame, &args[2])
                }
            }
            "and" | "or" => {
                at_least(name, args, 1)?;
                let short_on = name == "or";
                for arg in args {
                    if self.eval_bool(frame, arg)? == short_on {
                        return Ok(Value::Bool(short_on));
                    }
                }
                Ok(Value::Bool(!short_on))
            }
            "let" => self.eval_let(frame, args),
            "begin" => {
                at_least(name, args, 1)?;
                let mut last = Value::Bool(true);
                for arg in args {
                    last = self.eval(frame, arg)?;
                }
                Ok(last)
            }
            "asserts!" => {
                arity(name, args, 2)?;
                if self.eval_bool(frame, &args[0])? {
                    Ok(Value::Bool(true))
                } else {
                    let thrown = self.eval(frame, &args[1])?;
                    Err(Unwind::Return(thrown))
                }
            }
            "unwrap!" => {
                arity(name, args, 2)?;
                match self.eval(frame, &args[0])? {
                    Value::Optional(Some(v)) => Ok(*v),
                    Value::Response(ResponseData {
                        committed: true,
                        data,
                    }) => Ok(*data),
                    Value::Optional(None) | Value::Response(_) => {
                        let thrown = self.eval(frame, &args[1])?;
                        Err(Unwind::Return(thrown))
                    }
                    other => Err(VMError::type_error("optional or response", other.type_name()).into()),
                }
            }
            "unwrap-err!" => {
                arity(name, args, 2)?;
                match self.eval(frame, &args[0])? {
                    Value::Response(ResponseData {
                        committed: false,
                        data,
                    }) => Ok(*data),
                    Value::Response(_) => {
                        let thrown = self.eval(frame, &args[1])?;
                        Err(Unwind::Return(thrown))
                    }
                    other => Err(VMError::type_error("response", other.type_name()).into()),
                }
            }
            "try!" => {
                arity(name, args, 1)?;
                match self.eval(frame, &args[0])? {
                    Value::Optional(Some(v)) => Ok(*v),
                    Value::Optional(None) => Err(Unwind::Return(Value::none())),
                    Value::Response(r) if r.committed => Ok(*r.data),
                    err @ Value::Response(_) => Err(Unwind::Return(err)),
                    other => Err(VMError::type_error("optional or response", other.type_name()).into()),
                }
            }
            "match" => self.eval_match(frame, args),
            "get" => {
                arity(name, args, 2)?;
                let key = symbol_arg(name, &args[0])?;
                match self.eval(frame, &args[1])? {
                    Value::Tuple(mut entries) => entries
                        .remove(key)
                        .ok_or_else(|| VMError::malformed("get", format!("tuple has no key '{key}'")).into()),
                    Value::Optional(None) => Ok(Value::none()),
                    Value::Optional(Some(inner)) => match *inner {
                        Value::Tuple(mut entries) => entries.remove(key).map(Value::some).ok_or_else(|| {
                            VMError::malformed("get", format!("tuple has no key '{key}'")).into()
                        }),
                        other => Err(VMError::type_error("tuple", other.type_name()).into()),
                    },
                    other => Err(VMError::type_error("tuple", other.type_name()).into()),
                }
            }
            "tuple" => {
                let mut entries = BTreeMap::new();
                for field in args {
                    let Some([key, value]) = field.list() else {
                        return Err(VMError::malformed("tuple", format!("invalid field {field}")).into());
                    };
                    let key = symbol_arg(name, key)?;
                    let value = self.eval(frame, value)?;
                    if entries.insert(key.to_string(), value).is_some() {
                        return Err(VMError::DuplicateDefinition(key.to_string()).into());
                    }
                }
                let tuple = Value::Tuple(entries);
                self.allocate(&tuple)?;
                Ok(tuple)
            }
            "var-get" => {
                arity(name, args, 1)?;
                let var = symbol_arg(name, &args[0])?;
                if !frame.contract.analysis.data_vars.contains_key(var) {
                    return Err(VMError::NoSuchDataVar(var.to_string()).into());
                }
                let key = data_var_key(&frame.contract.id, var);
                Ok(self
                    .read_value(key)?
                    .ok_or_else(|| VMError::NoSuchDataVar(var.to_string()))?)
            }
            "var-set" => {
                arity(name, args, 2)?;
                let var = symbol_arg(name, &args[0])?;
                let value = self.eval(frame, &args[1])?;
                let Some(def) = frame.contract.analysis.data_vars.get(var) else {
                    return Err(VMError::NoSuchDataVar(var.to_string()).into());
                };
                if !def.ty.admits(&value) {
                    return Err(VMError::type_error(&def.ty, &value).into());
                }
                let key = data_var_key(&frame.contract.id, var);
                self.write_value(frame, "var-set", key, &value)?;
                Ok(Value::Bool(true))
            }
            "map-get?" | "map-delete" => {
                arity(name, args, 2)?;
                let map = symbol_arg(name, &args[0])?;
                let key = self.eval(frame, &args[1])?;
                let entry = self.map_entry(frame, map, &key, None)?;
                let existing = self.read_value(entry)?;
                if name == "map-get?" {
                    return Ok(Value::Optional(existing.map(Box::new)));
                }
                if existing.is_some() {
                    self.delete_value(frame, "map-delete", entry)?;
                }
                Ok(Value::Bool(existing.is_some()))
            }
            "map-set" | "map-insert" => {
                arity(name, args, 3)?;
                let map = symbol_arg(name, &args[0])?;
                let key = self.eval(frame, &args[1])?;
                let value = self.eval(frame, &args[2])?;
                let entry = self.map_entry(frame, map, &key, Some(&value))?;
                if name == "map-insert" && self.read_value(entry)?.is_some() {
                    return Ok(Value::Bool(false));
                }
                let what = if name == "map-set" { "map-set" } else { "map-insert" };
                self.write_value(frame, what, entry, &value)?;
                Ok(Value::Bool(true))
            }
            "stx-transfer?" => {
                arity(name, args, 3)?;
                let values = self.eval_all(frame, args)?;
                let mut values = values.into_iter();
                let amount = match values.next() {
                    Some(Value::UInt(amount)) => amount,
                    other => {
                        let actual = other.map_or("nothing", |v| v.type_name());
                        return Err(VMError::type_error("uint", actual).into());
                    }
                };
                let sender = expect_principal(values.next().unwrap_or(Value::Bool(false)))?;
                let recipient = expect_principal(values.next().unwrap_or(Value::Bool(false)))?;
                if frame.read_only {
                    return Err(VMError::WriteInReadOnly("stx-transfer?").into());
                }
                if amount != 0 && sender != recipient && sender != frame.sender {
                    return Ok(stx_error(ERR_SENDER_NOT_TX_SENDER));
                }
                Ok(self.stx_transfer(amount, &sender, &recipient)?)
            }
            "contract-call?" => self.eval_contract_call(frame, args),
            "as-contract" => {
                arity(name, args, 1)?;
                let me = PrincipalData::Contract(frame.contract.id.clone());
                let sender = std::mem::replace(&mut frame.sender, me.clone());
                let caller = std::mem::replace(&mut frame.caller, me);
                let result = self.eval(frame, &args[0]);
                frame.sender = sender;
                frame.caller = caller;
                result
            }
            _ if frame.contract.analysis.functions.contains_key(name) => {
                let values = self.eval_all(frame, args)?;
                let contract = Arc::clone(&frame.contract);
                Ok(self.call_function(
                    &contract,
                    name,
                    values,
                    frame.sender.clone(),
                    frame.caller.clone(),
                    frame.read_only,
                )?)
            }
            _ if NATIVE_FUNCTIONS.contains(&name) => {
                let values = self.eval_all(frame, args)?;
                Ok(self.native(frame, name, values)?)
            }
            _ => Err(VMError::UndefinedFunction(name.to_string()).into()),
        }
    }

    /// Resolves and type-checks a map entry key.
    fn map_entry(
        &self,
        frame: &Frame,
        map: &str,
        key: &Value,
        value: Option<&Value>,
    ) -> Result<Hash, VMError> {
        let def = frame
            .contract
            .analysis
            .maps
            .get(map)
            .ok_or_else(|| VMError::NoSuchMap(map.to_string()))?;
        if !def.key.admits(key) {
            return Err(VMError::type_error(&def.key, key));
        }
        if let Some(value) = value
            && !def.value.admits(value)
        {
            return Err(VMError::type_error(&def.value, value));
        }
        Ok(map_entry_key(&frame.contract.id, map, key))
    }

    fn eval_let(&mut self, frame: &mut Frame, args: &[Expr]) -> EvalResult {
        at_least("let", args, 2)?;
        let Some(bindings) = args[0].list() else {
            return Err(VMError::malformed("let", "bindings must be a list").into());
        };
        let base = frame.locals.len();
        let result = self.eval_let_body(frame, bindings, &args[1..]);
        frame.locals.truncate(base);
        result
    }

    fn eval_let_body(&mut self, frame: &mut Frame, bindings: &[Expr], body: &[Expr]) -> EvalResult {
        for binding in bindings {
            let Some([name, value]) = binding.list() else {
                return Err(VMError::malformed("let", format!("invalid binding {binding}")).into());
            };
            let name = symbol_arg("let", name)?;
            let value = self.eval(frame, value)?;
            frame.locals.push((name.to_string(), value));
        }
        let mut last = Value::Bool(true);
        for expr in body {
            last = self.eval(frame, expr)?;
        }
        Ok(last)
    }

    fn eval_match(&mut self, frame: &mut Frame, args: &[Expr]) -> EvalResult {
        let input = match args.first() {
            Some(expr) => self.eval(frame, expr)?,
            None => return Err(VMError::malformed("match", "missing input").into()),
        };
        match (input, &args[1..]) {
            (Value::Optional(v), [some_name, some_branch, none_branch]) => {
                let some_name = symbol_arg("match", some_name)?;
                match v {
                    Some(v) => self.eval_bound(frame, some_name, *v, some_branch),
                    None => self.eval(frame, none_branch),
                }
            }
            (Value::Response(r), [ok_name, ok_branch, err_name, err_branch]) => {
                let ok_name = symbol_arg("match", ok_name)?;
                let err_name = symbol_arg("match", err_name)?;
                if r.committed {
                    self.eval_bound(frame, ok_name, *r.data, ok_branch)
                } else {
                    self.eval_bound(frame, err_name, *r.data, err_branch)
                }
            }
            (Value::Optional(_) | Value::Response(_), _) => {
                Err(VMError::malformed("match", "wrong number of branches").into())
            }
            (other, _) => Err(VMError::type_error("optional or response", other.type_name()).into()),
        }
    }

    fn eval_contract_call(&mut self, frame: &mut Frame, args: &[Expr]) -> EvalResult {
        at_least("contract-call?", args, 2)?;
        let target = match self.eval(frame, &args[0])? {
            Value::Principal(PrincipalData::Contract(id)) => id,
            other => {
                return Err(VMError::type_error("contract principal", other.type_name()).into());
            }
        };
        let function = symbol_arg("contract-call?", &args[1])?;
        let values = self.eval_all(frame, &args[2..])?;

        let contract = self.env.contracts.load(&*self.state, &target)?;
        let kind = contract
            .function(function)
            .map(|def| def.kind)
            .ok_or_else(|| VMError::NoSuchFunction {
                contract: target.to_string(),
                function: function.to_string(),
            })?;
        match kind {
            FunctionKind::Private => return Err(VMError::NotCallable(function.to_string()).into()),
            FunctionKind::Public if frame.read_only => {
                return Err(VMError::WriteInReadOnly("contract-call? to a public function").into());
            }
            _ => {}
        }

        let caller = PrincipalData::Contract(frame.contract.id.clone());
        let events_before = self.env.events.len();
        let mut overlay = OverlayState::new(&*self.state);
        let result = Interpreter {
            state: &mut overlay,
            env: &mut *self.env,
        }
        .call_function(
            &contract,
            function,
            values,
            frame.sender.clone(),
            caller,
            frame.read_only,
        );
        let writes = overlay.into_writes();
        let value = result?;

        if let Value::Response(ResponseData {
            committed: false, ..
        }) = value
        {
            self.env.events.truncate(events_before);
            return Ok(value);
        }
        for (key, write) in writes {
            match write {
                Some(bytes) => self.state.push(key, bytes),
                None => self.state.delete(key),
            }
        }
        Ok(value)
    }

    /// Eagerly evaluated natives.
    fn native(&mut self, frame: &Frame, name: &str, mut values: Vec<Value>) -> Result<Value, VMError> {
        let count = values.len();
        let want = |n: usize| -> Result<(), VMError> {
            if count != n {
                return Err(VMError::ArityMismatch {
                    function: name.to_string(),
                    expected: n,
                    actual: count,
                });
            }
            Ok(())
        };

        match name {
            "+" | "-" | "*" | "/" => arithmetic(name, values),
            "mod" => {
                want(2)?;
                let b = values.pop();
                let a = values.pop();
                match (a, b) {
                    (Some(Value::Int(a)), Some(Value::Int(b))) => {
                        if b == 0 {
                            return Err(VMError::DivisionByZero);
                        }
                        a.checked_rem(b).map(Value::Int).ok_or(VMError::ArithmeticOverflow)
                    }
                    (Some(Value::UInt(a)), Some(Value::UInt(b))) => {
                        a.checked_rem(b).map(Value::UInt).ok_or(VMError::DivisionByZero)
                    }
                    (a, b) => Err(mismatch(a.as_ref(), b.as_ref())),
                }
            }
            "<" | ">" | "<=" | ">=" => {
                want(2)?;
                let b = values.pop();
                let a = values.pop();
                let ordering = match (&a, &b) {
                    (Some(Value::Int(a)), Some(Value::Int(b))) => a.cmp(b),
                    (Some(Value::UInt(a)), Some(Value::UInt(b))) => a.cmp(b),
                    (Some(Value::StringAscii(a)), Some(Value::StringAscii(b))) => a.cmp(b),
                    (Some(Value::Buffer(a)), Some(Value::Buffer(b))) => a.cmp(b),
                    _ => return Err(mismatch(a.as_ref(), b.as_ref())),
                };
                let result = match name {
                    "<" => ordering.is_lt(),
                    ">" => ordering.is_gt(),
                    "<=" => ordering.is_le(),
                    _ => ordering.is_ge(),
                };
                Ok(Value::Bool(result))
            }
            "is-eq" => {
                let Some(first) = values.first() else {
                    return Err(VMError::ArityMismatch {
                        function: name.to_string(),
                        expected: 1,
                        actual: 0,
                    });
                };
                if let Some(other) = values.iter().find(|v| v.type_name() != first.type_name()) {
                    return Err(VMError::type_error(first.type_name(), other.type_name()));
                }
                Ok(Value::Bool(values.iter().all(|v| v == first)))
            }
            "not" => {
                want(1)?;
                Ok(Value::Bool(!expect_bool(values.remove(0))?))
            }
            "ok" | "err" | "some" => {
                want(1)?;
                let inner = values.remove(0);
                Ok(match name {
                    "ok" => Value::okay(inner),
                    "err" => Value::error(inner),
                    _ => Value::some(inner),
                })
            }
            "is-some" | "is-none" => {
                want(1)?;
                match values.remove(0) {
                    Value::Optional(v) => Ok(Value::Bool(v.is_some() == (name == "is-some"))),
                    other => Err(VMError::type_error("optional", other.type_name())),
                }
            }
            "is-ok" | "is-err" => {
                want(1)?;
                match values.remove(0) {
                    Value::Response(r) => Ok(Value::Bool(r.committed == (name == "is-ok"))),
                    other => Err(VMError::type_error("response", other.type_name())),
                }
            }
            "unwrap-panic" => {
                want(1)?;
                match values.remove(0) {
                    Value::Optional(Some(v)) => Ok(*v),
                    Value::Response(r) if r.committed => Ok(*r.data),
                    other => Err(VMError::UnwrapFailure(other.to_string())),
                }
            }
            "unwrap-err-panic" => {
                want(1)?;
                match values.remove(0) {
                    Value::Response(r) if !r.committed => Ok(*r.data),
                    other => Err(VMError::UnwrapFailure(other.to_string())),
                }
            }
            "default-to" => {
                want(2)?;
                let opt = values.pop();
                let default = values.pop();
                match (default, opt) {
                    (_, Some(Value::Optional(Some(v)))) => Ok(*v),
                    (Some(default), Some(Value::Optional(None))) => Ok(default),
                    (_, other) => Err(VMError::type_error(
                        "optional",
                        other.map_or("nothing", |v| v.type_name()),
                    )),
                }
            }
            "list" => {
                if let Some(first) = values.first()
                    && let Some(other) = values.iter().find(|v| v.type_name() != first.type_name())
                {
                    return Err(VMError::type_error(first.type_name(), other.type_name()));
                }
                let list = Value::List(values);
                self.allocate(&list)?;
                Ok(list)
            }
            "len" => {
                want(1)?;
                let len = match &values[0] {
                    Value::List(items) => items.len(),
                    Value::StringAscii(s) => s.len(),
                    Value::Buffer(b) => b.len(),
                    other => return Err(VMError::type_error("sequence", other.type_name())),
                };
                Ok(Value::UInt(len as u128))
            }
            "append" => {
                want(2)?;
                let item = values.pop();
                match (values.pop(), item) {
                    (Some(Value::List(mut items)), Some(item)) => {
                        if let Some(first) = items.first()
                            && first.type_name() != item.type_name()
                        {
                            return Err(VMError::type_error(first.type_name(), item.type_name()));
                        }
                        items.push(item);
                        let list = Value::List(items);
                        self.allocate(&list)?;
                        Ok(list)
                    }
                    (other, _) => Err(VMError::type_error(
                        "list",
                        other.map_or("nothing", |v| v.type_name()),
                    )),
                }
            }
            "concat" => {
                want(2)?;
                let b = values.pop();
                let a = values.pop();
                let joined = match (a, b) {
                    (Some(Value::List(mut a)), Some(Value::List(b))) => {
                        a.extend(b);
                        Value::List(a)
                    }
                    (Some(Value::StringAscii(a)), Some(Value::StringAscii(b))) => {
                        Value::StringAscii(a + &b)
                    }
                    (Some(Value::Buffer(mut a)), Some(Value::Buffer(b))) => {
                        a.extend(b);
                        Value::Buffer(a)
                    }
                    (a, b) => return Err(mismatch(a.as_ref(), b.as_ref())),
                };
                self.allocate(&joined)?;
                Ok(joined)
            }
            "to-int" => {
                want(1)?;
                match values.remove(0) {
                    Value::UInt(v) => i128::try_from(v)
                        .map(Value::Int)
                        .map_err(|_| VMError::ArithmeticOverflow),
                    other => Err(VMError::type_error("uint", other.type_name())),
                }
            }
            "to-uint" => {
                want(1)?;
                match values.remove(0) {
                    Value::Int(v) => u128::try_from(v)
                        .map(Value::UInt)
                        .map_err(|_| VMError::ArithmeticUnderflow),
                    other => Err(VMError::type_error("int", other.type_name())),
                }
            }
            "stx-get-balance" => {
                want(1)?;
                let principal = expect_principal(values.remove(0))?;
                Ok(Value::UInt(self.load_account(&principal)?.balance()))
            }
            "print" => {
                want(1)?;
                let value = values.remove(0);
                self.env.events.push(Event::Print {
                    contract: frame.contract.id.clone(),
                    value: value.clone(),
                });
                Ok(value)
            }
            _ => Err(VMError::UndefinedFunction(name.to_string())),
        }
    }
}

fn mismatch(a: Option<&Value>, b: Option<&Value>) -> VMError {
    let name = |v: Option<&Value>| v.map_or("nothing", |v| v.type_name());
    VMError::type_error(name(a), name(b))
}

fn arithmetic(op: &str, values: Vec<Value>) -> Result<Value, VMError> {
    let Some(first) = values.first() else {
        return Err(VMError::ArityMismatch {
            function: op.to_string(),
            expected: 1,
            actual: 0,
        });
    };

    match first {
        Value::Int(_) => {
            let mut ints = Vec::with_capacity(values.len());
            for v in &values {
                ints.push(v.as_int().ok_or_else(|| VMError::type_error("int", v.type_name()))?);
            }
            if op == "-" && ints.len() == 1 {
                return ints[0].checked_neg().map(Value::Int).ok_or(VMError::ArithmeticOverflow);
            }
            let mut acc = ints[0];
            for &n in &ints[1..] {
                acc = match op {
                    "+" => acc.checked_add(n).ok_or(VMError::ArithmeticOverflow)?,
                    "-" => acc.checked_sub(n).ok_or(VMError::ArithmeticUnderflow)?,
                    "*" => acc.checked_mul(n).ok_or(VMError::ArithmeticOverflow)?,
                    _ => {
                        if n == 0 {
                            return Err(VMError::DivisionByZero);
                        }
                        acc.checked_div(n).ok_or(VMError::ArithmeticOverflow)?
                    }
                };
            }
            Ok(Value::Int(acc))
        }
        Value::UInt(_) => {
            let mut uints = Vec::with_capacity(values.len());
            for v in &values {
                uints.push(v.as_uint().ok_or_else(|| VMError::type_error("uint", v.type_name()))?);
            }
            if op == "-" && uints.len() == 1 {
                return match uints[0] {
                    0 => Ok(Value::UInt(0)),
                    _ => Err(VMError::ArithmeticUnderflow),
                };
            }
            let mut acc = uints[0];
            for &n in &uints[1..] {
                acc = match op {
                    "+" => acc.checked_add(n).ok_or(VMError::ArithmeticOverflow)?,
                    "-" => acc.checked_sub(n).ok_or(VMError::ArithmeticUnderflow)?,
                    "*" => acc.checked_mul(n).ok_or(VMError::ArithmeticOverflow)?,
                    _ => acc.checked_div(n).ok_or(VMError::DivisionByZero)?,
                };
            }
            Ok(Value::UInt(acc))
        }
        other => Err(VMError::type_error("int or uint", other.type_name())),
    }
}

#[cfg(test)]
mod tests;
