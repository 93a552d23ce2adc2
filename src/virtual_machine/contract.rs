//! Contract analysis, records and the analysis cache.
//!
//! A contract's source is parsed and analyzed once per distinct source text;
//! the resulting [`ContractAnalysis`] holds the dispatch table mapping each
//! function name to its definition and [`FunctionKind`].

use crate::storage::keys::contract_key;
use crate::types::encoding::Decode;
use crate::types::hash::Hash;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::interpreter::{KEYWORDS, NATIVE_FUNCTIONS, WRITE_FUNCTIONS};
use crate::virtual_machine::parser::{Expr, ExprKind, parse};
use crate::virtual_machine::state::StateRead;
use crate::virtual_machine::types::{ContractId, TypeSignature, Value};
use dashmap::DashMap;
use simnet_derive::BinaryCodec;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Capability tag of a contract function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    ReadOnly,
    Public,
    Private,
}

impl FunctionKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            FunctionKind::ReadOnly => "read-only",
            FunctionKind::Public => "public",
            FunctionKind::Private => "private",
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub kind: FunctionKind,
    pub params: Vec<(String, TypeSignature)>,
    pub body: Expr,
}

#[derive(Clone, Debug)]
pub struct DataVarDef {
    pub ty: TypeSignature,
    pub init: Expr,
}

#[derive(Clone, Debug)]
pub struct MapDef {
    pub key: TypeSignature,
    pub value: TypeSignature,
}

/// Deploy-time evaluation step, kept in source order.
#[derive(Clone, Debug)]
pub enum Initializer {
    Constant(String, Expr),
    DataVar(String),
}

/// Result of statically analyzing a contract.
#[derive(Clone, Debug, Default)]
pub struct ContractAnalysis {
    pub functions: BTreeMap<String, FunctionDef>,
    pub data_vars: BTreeMap<String, DataVarDef>,
    pub maps: BTreeMap<String, MapDef>,
    pub initializers: Vec<Initializer>,
}

/// Per-function facts gathered while walking bodies.
#[derive(Default)]
struct FunctionFacts {
    /// First state-writing native used directly in the body.
    direct_write: Option<String>,
    /// Functions of the same contract called from the body.
    calls: BTreeSet<String>,
}

impl ContractAnalysis {
    /// Parses and analyzes contract source.
    ///
    /// Rejects malformed definitions, duplicate or reserved names, unknown
    /// types, calls to undefined functions, and read-only functions that
    /// write state directly or through the functions they call.
    pub fn analyze(source: &str) -> Result<ContractAnalysis, VMError> {
        let exprs = parse(source)?;
        let mut analysis = ContractAnalysis::default();
        let mut names = BTreeSet::new();

        for expr in &exprs {
            let Some(items) = expr.list() else {
                return Err(VMError::malformed(
                    "top-level form",
                    format!("expected a definition, got {expr}"),
                ));
            };
            let head = expr.head().unwrap_or_default();
            match (head, items.get(1..).unwrap_or_default()) {
                ("define-constant", [name, value]) => {
                    let name = definition_name(&mut names, name)?;
                    analysis
                        .initializers
                        .push(Initializer::Constant(name, value.clone()));
                }
                ("define-data-var", [name, ty, init]) => {
                    let name = definition_name(&mut names, name)?;
                    let ty = TypeSignature::from_expr(ty)?;
                    analysis.data_vars.insert(
                        name.clone(),
                        DataVarDef {
                            ty,
                            init: init.clone(),
                        },
                    );
                    analysis.initializers.push(Initializer::DataVar(name));
                }
                ("define-map", [name, key, value]) => {
                    let name = definition_name(&mut names, name)?;
                    let def = MapDef {
                        key: TypeSignature::from_expr(key)?,
                        value: TypeSignature::from_expr(value)?,
                    };
                    analysis.maps.insert(name, def);
                }
                ("define-read-only" | "define-public" | "define-private", [signature, body]) => {
                    let kind = match head {
                        "define-read-only" => FunctionKind::ReadOnly,
                        "define-public" => FunctionKind::Public,
                        _ => FunctionKind::Private,
                    };
                    let def = function_def(&mut names, kind, signature, body)?;
                    analysis.functions.insert(def.name.clone(), def);
                }
                (
                    "define-constant" | "define-data-var" | "define-map" | "define-read-only"
                    | "define-public" | "define-private",
                    _,
                ) => {
                    return Err(VMError::malformed(head, format!("wrong number of arguments in {expr}")));
                }
                _ => {
                    return Err(VMError::malformed(
                        "top-level form",
                        format!("expected a definition, got {expr}"),
                    ));
                }
            }
        }

        analysis.check_bodies()?;
        Ok(analysis)
    }

    fn check_bodies(&self) -> Result<(), VMError> {
        for init in &self.initializers {
            let expr = match init {
                Initializer::Constant(_, expr) => expr,
                Initializer::DataVar(name) => &self.data_vars[name].init,
            };
            let mut facts = FunctionFacts::default();
            self.walk(expr, &mut facts)?;
        }

        let mut facts = BTreeMap::new();
        for (name, def) in &self.functions {
            let mut f = FunctionFacts::default();
            self.walk(&def.body, &mut f)?;
            facts.insert(name.as_str(), f);
        }

        for (name, def) in &self.functions {
            if def.kind != FunctionKind::ReadOnly {
                continue;
            }
            let mut visited = BTreeSet::new();
            if let Some(offender) = self.find_write(name, &facts, &mut visited) {
                return Err(VMError::ReadOnlyWrites {
                    function: name.clone(),
                    offender,
                });
            }
        }
        Ok(())
    }

    /// Depth-first search for a state write reachable from `name`.
    fn find_write<'f>(
        &self,
        name: &'f str,
        facts: &BTreeMap<&'f str, FunctionFacts>,
        visited: &mut BTreeSet<&'f str>,
    ) -> Option<String> {
        if !visited.insert(name) {
            return None;
        }
        let f = facts.get(name)?;
        if let Some(native) = &f.direct_write {
            return Some(native.clone());
        }
        for callee in &f.calls {
            let (callee, _) = facts.get_key_value(callee.as_str())?;
            if self.functions[*callee].kind == FunctionKind::Public {
                return Some(format!("public function {callee}"));
            }
            if let Some(offender) = self.find_write(callee, facts, visited) {
                return Some(offender);
            }
        }
        None
    }

    fn walk(&self, expr: &Expr, facts: &mut FunctionFacts) -> Result<(), VMError> {
        match &expr.kind {
            ExprKind::Tuple(fields) => {
                for (_, value) in fields {
                    self.walk(value, facts)?;
                }
                Ok(())
            }
            ExprKind::List(items) => {
                let Some((head, args)) = items.split_first() else {
                    return Err(VMError::malformed("expression", "empty list"));
                };
                let Some(name) = head.symbol() else {
                    return Err(VMError::malformed(
                        "expression",
                        format!("{expr} must start with a function name"),
                    ));
                };

                if WRITE_FUNCTIONS.contains(&name) && facts.direct_write.is_none() {
                    facts.direct_write = Some(name.to_string());
                }

                match name {
                    "let" => {
                        let Some((bindings, body)) = args.split_first() else {
                            return Err(VMError::malformed("let", "missing bindings"));
                        };
                        let Some(bindings) = bindings.list() else {
                            return Err(VMError::malformed("let", "bindings must be a list"));
                        };
                        if body.is_empty() {
                            return Err(VMError::malformed("let", "missing body"));
                        }
                        for binding in bindings {
                            match binding.list() {
                                Some([name, value]) if name.symbol().is_some() => {
                                    self.walk(value, facts)?;
                                }
                                _ => {
                                    return Err(VMError::malformed(
                                        "let",
                                        format!("invalid binding {binding}"),
                                    ));
                                }
                            }
                        }
                        self.walk_all(body, facts)
                    }
                    "tuple" => {
                        for field in args {
                            match field.list() {
                                Some([key, value]) if key.symbol().is_some() => {
                                    self.walk(value, facts)?;
                                }
                                _ => {
                                    return Err(VMError::malformed(
                                        "tuple",
                                        format!("invalid field {field}"),
                                    ));
                                }
                            }
                        }
                        Ok(())
                    }
                    _ if NATIVE_FUNCTIONS.contains(&name) => self.walk_all(args, facts),
                    _ if self.functions.contains_key(name) => {
                        facts.calls.insert(name.to_string());
                        self.walk_all(args, facts)
                    }
                    _ => Err(VMError::UndefinedFunction(name.to_string())),
                }
            }
            _ => Ok(()),
        }
    }

    fn walk_all(&self, exprs: &[Expr], facts: &mut FunctionFacts) -> Result<(), VMError> {
        for expr in exprs {
            self.walk(expr, facts)?;
        }
        Ok(())
    }
}

fn definition_name(names: &mut BTreeSet<String>, expr: &Expr) -> Result<String, VMError> {
    let Some(name) = expr.symbol() else {
        return Err(VMError::malformed(
            "definition",
            format!("expected a name, got {expr}"),
        ));
    };
    if NATIVE_FUNCTIONS.contains(&name) || KEYWORDS.contains(&name) {
        return Err(VMError::malformed(
            "definition",
            format!("'{name}' is a reserved name"),
        ));
    }
    if !names.insert(name.to_string()) {
        return Err(VMError::DuplicateDefinition(name.to_string()));
    }
    Ok(name.to_string())
}

fn function_def(
    names: &mut BTreeSet<String>,
    kind: FunctionKind,
    signature: &Expr,
    body: &Expr,
) -> Result<FunctionDef, VMError> {
    let form = match kind {
        FunctionKind::ReadOnly => "define-read-only",
        FunctionKind::Public => "define-public",
        FunctionKind::Private => "define-private",
    };
    let Some((name, params)) = signature.list().and_then(|items| items.split_first()) else {
        return Err(VMError::malformed(
            form,
            format!("expected (name (arg type) ...), got {signature}"),
        ));
    };
    let name = definition_name(names, name)?;

    let mut seen = BTreeSet::new();
    let mut typed = Vec::with_capacity(params.len());
    for param in params {
        let Some([param_name, ty]) = param.list() else {
            return Err(VMError::malformed(form, format!("invalid parameter {param}")));
        };
        let Some(param_name) = param_name.symbol() else {
            return Err(VMError::malformed(form, format!("invalid parameter {param}")));
        };
        if !seen.insert(param_name) {
            return Err(VMError::DuplicateDefinition(param_name.to_string()));
        }
        typed.push((param_name.to_string(), TypeSignature::from_expr(ty)?));
    }

    Ok(FunctionDef {
        name,
        kind,
        params: typed,
        body: body.clone(),
    })
}

/// Persisted form of a deployed contract.
#[derive(Clone, Debug, PartialEq, Eq, BinaryCodec)]
pub struct ContractRecord {
    pub id: ContractId,
    pub source: String,
    /// Constant values evaluated at deploy time, in definition order.
    pub constants: Vec<(String, Value)>,
    pub deployed_at: u64,
}

/// A deployed contract ready for execution.
#[derive(Clone, Debug)]
pub struct LoadedContract {
    pub id: ContractId,
    pub analysis: Arc<ContractAnalysis>,
    pub constants: BTreeMap<String, Value>,
}

impl LoadedContract {
    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.analysis.functions.get(name)
    }
}

/// Analyses keyed by source hash, shared across calls.
#[derive(Default)]
pub struct ContractCache {
    analyses: DashMap<Hash, Arc<ContractAnalysis>>,
}

impl ContractCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn source_hash(source: &str) -> Hash {
        Hash::tagged(b"CONTRACT_SOURCE", source)
    }

    /// Returns the analysis of `source`, analyzing it on first use.
    pub fn analyze(&self, source: &str) -> Result<Arc<ContractAnalysis>, VMError> {
        let hash = Self::source_hash(source);
        if let Some(analysis) = self.analyses.get(&hash) {
            return Ok(Arc::clone(analysis.value()));
        }
        let analysis = Arc::new(ContractAnalysis::analyze(source)?);
        self.analyses.insert(hash, Arc::clone(&analysis));
        Ok(analysis)
    }

    /// Reads the record of `id` from `state`.
    pub fn record<S: StateRead + ?Sized>(
        state: &S,
        id: &ContractId,
    ) -> Result<Option<ContractRecord>, VMError> {
        state
            .get(contract_key(id))
            .map(|bytes| ContractRecord::from_bytes(&bytes).map_err(|_| VMError::InvalidStateValue))
            .transpose()
    }

    /// Loads a deployed contract visible in `state`.
    pub fn load<S: StateRead + ?Sized>(
        &self,
        state: &S,
        id: &ContractId,
    ) -> Result<Arc<LoadedContract>, VMError> {
        let record =
            Self::record(state, id)?.ok_or_else(|| VMError::NoSuchContract(id.to_string()))?;
        let analysis = self.analyze(&record.source)?;
        Ok(Arc::new(LoadedContract {
            id: record.id,
            analysis,
            constants: record.constants.into_iter().collect(),
        }))
    }

    /// Number of distinct analyzed sources.
    pub fn len(&self) -> usize {
        self.analyses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyses.is_empty()
    }
}
