//! Runtime values and type signatures of the contract language.

use crate::types::address::Address;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::parser::{Expr, ExprKind};
use simnet_derive::BinaryCodec;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Longest accepted contract name.
pub const MAX_CONTRACT_NAME_LEN: usize = 40;
/// Upper bound for declared string, buffer and list sizes.
pub const MAX_VALUE_SIZE: u32 = 1 << 20;

/// Fully qualified contract identifier: `issuer.name`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, BinaryCodec)]
pub struct ContractId {
    pub issuer: Address,
    pub name: String,
}

impl ContractId {
    pub fn new(issuer: Address, name: impl Into<String>) -> Result<Self, VMError> {
        let name = name.into();
        if !is_valid_contract_name(&name) {
            return Err(VMError::InvalidContractName(name));
        }
        Ok(Self { issuer, name })
    }
}

/// Contract names start with a letter and use letters, digits, `-` or `_`.
pub fn is_valid_contract_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    name.len() <= MAX_CONTRACT_NAME_LEN
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.issuer, self.name)
    }
}

impl FromStr for ContractId {
    type Err = VMError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (issuer, name) = s
            .split_once('.')
            .ok_or_else(|| VMError::InvalidContractName(s.to_string()))?;
        let issuer = issuer
            .parse::<Address>()
            .map_err(|_| VMError::InvalidContractName(s.to_string()))?;
        ContractId::new(issuer, name)
    }
}

/// Principal that can hold balances and send calls.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, BinaryCodec)]
pub enum PrincipalData {
    Standard(Address),
    Contract(ContractId),
}

impl fmt::Display for PrincipalData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrincipalData::Standard(address) => write!(f, "{address}"),
            PrincipalData::Contract(id) => write!(f, "{id}"),
        }
    }
}

impl From<Address> for PrincipalData {
    fn from(address: Address) -> Self {
        PrincipalData::Standard(address)
    }
}

impl From<ContractId> for PrincipalData {
    fn from(id: ContractId) -> Self {
        PrincipalData::Contract(id)
    }
}

/// Payload of a `(ok ...)` or `(err ...)` value.
#[derive(Clone, PartialEq, Eq, Debug, BinaryCodec)]
pub struct ResponseData {
    pub committed: bool,
    pub data: Box<Value>,
}

/// A contract-language value.
#[derive(Clone, PartialEq, Eq, Debug, BinaryCodec)]
pub enum Value {
    Int(i128),
    UInt(u128),
    Bool(bool),
    Principal(PrincipalData),
    Buffer(Vec<u8>),
    StringAscii(String),
    Optional(Option<Box<Value>>),
    Response(ResponseData),
    List(Vec<Value>),
    Tuple(BTreeMap<String, Value>),
}

impl Value {
    pub fn okay(value: Value) -> Value {
        Value::Response(ResponseData {
            committed: true,
            data: Box::new(value),
        })
    }

    pub fn error(value: Value) -> Value {
        Value::Response(ResponseData {
            committed: false,
            data: Box::new(value),
        })
    }

    pub fn some(value: Value) -> Value {
        Value::Optional(Some(Box::new(value)))
    }

    pub fn none() -> Value {
        Value::Optional(None)
    }

    pub fn ascii(s: impl Into<String>) -> Value {
        Value::StringAscii(s.into())
    }

    pub fn principal(principal: impl Into<PrincipalData>) -> Value {
        Value::Principal(principal.into())
    }

    pub fn tuple<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Tuple(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns true for `(ok ...)` responses.
    pub fn is_ok_response(&self) -> bool {
        matches!(self, Value::Response(ResponseData { committed: true, .. }))
    }

    pub fn as_uint(&self) -> Option<u128> {
        match self {
            Value::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_principal(&self) -> Option<&PrincipalData> {
        match self {
            Value::Principal(p) => Some(p),
            _ => None,
        }
    }

    /// Short name of the value's type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Bool(_) => "bool",
            Value::Principal(_) => "principal",
            Value::Buffer(_) => "buff",
            Value::StringAscii(_) => "string-ascii",
            Value::Optional(_) => "optional",
            Value::Response(_) => "response",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
        }
    }

    /// Approximate in-memory size in bytes, used for allocation costs.
    pub fn size(&self) -> u64 {
        match self {
            Value::Int(_) | Value::UInt(_) => 16,
            Value::Bool(_) => 1,
            Value::Principal(PrincipalData::Standard(_)) => 20,
            Value::Principal(PrincipalData::Contract(id)) => 20 + id.name.len() as u64,
            Value::Buffer(b) => b.len() as u64,
            Value::StringAscii(s) => s.len() as u64,
            Value::Optional(v) => 1 + v.as_ref().map_or(0, |v| v.size()),
            Value::Response(r) => 1 + r.data.size(),
            Value::List(items) => items.iter().map(Value::size).sum(),
            Value::Tuple(entries) => entries
                .iter()
                .map(|(k, v)| k.len() as u64 + v.size())
                .sum(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "u{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Principal(p) => write!(f, "'{p}"),
            Value::Buffer(bytes) => {
                write!(f, "0x")?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Value::StringAscii(s) => write!(f, "{s:?}"),
            Value::Optional(None) => write!(f, "none"),
            Value::Optional(Some(v)) => write!(f, "(some {v})"),
            Value::Response(r) if r.committed => write!(f, "(ok {})", r.data),
            Value::Response(r) => write!(f, "(err {})", r.data),
            Value::List(items) => {
                write!(f, "(list")?;
                for item in items {
                    write!(f, " {item}")?;
                }
                write!(f, ")")
            }
            Value::Tuple(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Declared type of arguments, data vars and map entries.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TypeSignature {
    Int,
    UInt,
    Bool,
    Principal,
    StringAscii(u32),
    Buffer(u32),
    Optional(Box<TypeSignature>),
    Response(Box<TypeSignature>, Box<TypeSignature>),
    List(u32, Box<TypeSignature>),
    Tuple(BTreeMap<String, TypeSignature>),
}

impl TypeSignature {
    /// Returns true if `value` is a member of this type.
    ///
    /// Absent branches (`none`, the unused side of a response) are admitted
    /// by any optional or response type.
    pub fn admits(&self, value: &Value) -> bool {
        match (self, value) {
            (TypeSignature::Int, Value::Int(_))
            | (TypeSignature::UInt, Value::UInt(_))
            | (TypeSignature::Bool, Value::Bool(_))
            | (TypeSignature::Principal, Value::Principal(_)) => true,
            (TypeSignature::StringAscii(max), Value::StringAscii(s)) => {
                s.is_ascii() && s.len() <= *max as usize
            }
            (TypeSignature::Buffer(max), Value::Buffer(b)) => b.len() <= *max as usize,
            (TypeSignature::Optional(inner), Value::Optional(v)) => {
                v.as_ref().is_none_or(|v| inner.admits(v))
            }
            (TypeSignature::Response(ok, err), Value::Response(r)) => {
                if r.committed {
                    ok.admits(&r.data)
                } else {
                    err.admits(&r.data)
                }
            }
            (TypeSignature::List(max, item), Value::List(items)) => {
                items.len() <= *max as usize && items.iter().all(|v| item.admits(v))
            }
            (TypeSignature::Tuple(fields), Value::Tuple(entries)) => {
                fields.len() == entries.len()
                    && fields
                        .iter()
                        .all(|(k, ty)| entries.get(k).is_some_and(|v| ty.admits(v)))
            }
            _ => false,
        }
    }

    /// Parses a type expression such as `uint`, `(buff 32)` or `{ a: int }`.
    pub fn from_expr(expr: &Expr) -> Result<TypeSignature, VMError> {
        match &expr.kind {
            ExprKind::Symbol(name) => match name.as_str() {
                "int" => Ok(TypeSignature::Int),
                "uint" => Ok(TypeSignature::UInt),
                "bool" => Ok(TypeSignature::Bool),
                "principal" => Ok(TypeSignature::Principal),
                other => Err(VMError::UnknownType(other.to_string())),
            },
            ExprKind::Tuple(fields) => Self::tuple_from_pairs(
                fields.iter().map(|(name, ty)| (name.as_str(), ty)),
            ),
            ExprKind::List(items) => {
                let Some((head, rest)) = items.split_first() else {
                    return Err(VMError::UnknownType("()".into()));
                };
                let Some(head) = head.symbol() else {
                    return Err(VMError::UnknownType(expr.to_string()));
                };
                match (head, rest) {
                    ("string-ascii", [len]) => Ok(TypeSignature::StringAscii(Self::size(len)?)),
                    ("buff", [len]) => Ok(TypeSignature::Buffer(Self::size(len)?)),
                    ("optional", [inner]) => {
                        Ok(TypeSignature::Optional(Box::new(Self::from_expr(inner)?)))
                    }
                    ("response", [ok, err]) => Ok(TypeSignature::Response(
                        Box::new(Self::from_expr(ok)?),
                        Box::new(Self::from_expr(err)?),
                    )),
                    ("list", [len, item]) => Ok(TypeSignature::List(
                        Self::size(len)?,
                        Box::new(Self::from_expr(item)?),
                    )),
                    ("tuple", fields) => {
                        let mut pairs = Vec::with_capacity(fields.len());
                        for field in fields {
                            match field.list() {
                                Some([name, ty]) => match name.symbol() {
                                    Some(name) => pairs.push((name, ty)),
                                    None => return Err(VMError::UnknownType(field.to_string())),
                                },
                                _ => return Err(VMError::UnknownType(field.to_string())),
                            }
                        }
                        Self::tuple_from_pairs(pairs)
                    }
                    _ => Err(VMError::UnknownType(expr.to_string())),
                }
            }
            _ => Err(VMError::UnknownType(expr.to_string())),
        }
    }

    fn tuple_from_pairs<'e>(
        pairs: impl IntoIterator<Item = (&'e str, &'e Expr)>,
    ) -> Result<TypeSignature, VMError> {
        let mut fields = BTreeMap::new();
        for (name, ty) in pairs {
            if fields
                .insert(name.to_string(), Self::from_expr(ty)?)
                .is_some()
            {
                return Err(VMError::DuplicateDefinition(name.to_string()));
            }
        }
        if fields.is_empty() {
            return Err(VMError::UnknownType("empty tuple".into()));
        }
        Ok(TypeSignature::Tuple(fields))
    }

    fn size(expr: &Expr) -> Result<u32, VMError> {
        let n = match &expr.kind {
            ExprKind::Literal(Value::Int(n)) if *n >= 0 => *n as u128,
            ExprKind::Literal(Value::UInt(n)) => *n,
            _ => return Err(VMError::UnknownType(expr.to_string())),
        };
        if n > MAX_VALUE_SIZE as u128 {
            return Err(VMError::ValueTooLarge(expr.to_string()));
        }
        Ok(n as u32)
    }
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSignature::Int => write!(f, "int"),
            TypeSignature::UInt => write!(f, "uint"),
            TypeSignature::Bool => write!(f, "bool"),
            TypeSignature::Principal => write!(f, "principal"),
            TypeSignature::StringAscii(n) => write!(f, "(string-ascii {n})"),
            TypeSignature::Buffer(n) => write!(f, "(buff {n})"),
            TypeSignature::Optional(inner) => write!(f, "(optional {inner})"),
            TypeSignature::Response(ok, err) => write!(f, "(response {ok} {err})"),
            TypeSignature::List(n, item) => write!(f, "(list {n} {item})"),
            TypeSignature::Tuple(fields) => {
                write!(f, "{{")?;
                for (i, (k, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {ty}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::{Decode, Encode};
    use crate::virtual_machine::parser::parse;

    fn ty(src: &str) -> TypeSignature {
        let exprs = parse(src).expect("parse");
        TypeSignature::from_expr(&exprs[0]).expect("type")
    }

    #[test]
    fn display_uses_contract_syntax() {
        assert_eq!(Value::UInt(0).to_string(), "u0");
        assert_eq!(Value::Int(-3).to_string(), "-3");
        assert_eq!(Value::okay(Value::Bool(true)).to_string(), "(ok true)");
        assert_eq!(Value::error(Value::UInt(1)).to_string(), "(err u1)");
        assert_eq!(Value::some(Value::ascii("hi")).to_string(), "(some \"hi\")");
        assert_eq!(Value::Buffer(vec![0xde, 0xad]).to_string(), "0xdead");
        assert_eq!(
            Value::tuple([("b", Value::UInt(2)), ("a", Value::Int(1))]).to_string(),
            "{a: 1, b: u2}"
        );
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Int(2)]).to_string(),
            "(list 1 2)"
        );
    }

    #[test]
    fn type_parsing_covers_composite_forms() {
        assert_eq!(ty("uint"), TypeSignature::UInt);
        assert_eq!(ty("(string-ascii 10)"), TypeSignature::StringAscii(10));
        assert_eq!(
            ty("(response bool uint)"),
            TypeSignature::Response(Box::new(TypeSignature::Bool), Box::new(TypeSignature::UInt))
        );
        assert_eq!(ty("{ a: int, b: (buff 2) }"), ty("(tuple (a int) (b (buff 2)))"));
        assert_eq!(
            ty("(list 5 (optional principal))").to_string(),
            "(list 5 (optional principal))"
        );
    }

    #[test]
    fn unknown_types_are_rejected() {
        let exprs = parse("(map int)").expect("parse");
        assert!(matches!(
            TypeSignature::from_expr(&exprs[0]),
            Err(VMError::UnknownType(_))
        ));
        let exprs = parse("strin").expect("parse");
        assert_eq!(
            TypeSignature::from_expr(&exprs[0]),
            Err(VMError::UnknownType("strin".into()))
        );
    }

    #[test]
    fn admits_checks_bounds_and_shape() {
        assert!(ty("(string-ascii 3)").admits(&Value::ascii("abc")));
        assert!(!ty("(string-ascii 2)").admits(&Value::ascii("abc")));
        assert!(ty("(optional uint)").admits(&Value::none()));
        assert!(!ty("(optional uint)").admits(&Value::some(Value::Int(1))));
        assert!(ty("(response uint int)").admits(&Value::error(Value::Int(-1))));
        assert!(!ty("(list 1 int)").admits(&Value::List(vec![Value::Int(1), Value::Int(2)])));
        assert!(ty("{ a: int }").admits(&Value::tuple([("a", Value::Int(1))])));
        assert!(!ty("{ a: int }").admits(&Value::tuple([("b", Value::Int(1))])));
        assert!(!ty("uint").admits(&Value::Int(1)));
    }

    #[test]
    fn contract_id_parses_and_validates_names() {
        let issuer = Address::derive(1, "deployer");
        let id: ContractId = format!("{issuer}.counter").parse().expect("parse");
        assert_eq!(id, ContractId::new(issuer, "counter").expect("valid"));
        assert_eq!(id.to_string(), format!("{issuer}.counter"));

        assert!(ContractId::new(issuer, "1counter").is_err());
        assert!(ContractId::new(issuer, "").is_err());
        assert!(ContractId::new(issuer, "a".repeat(41)).is_err());
        assert!("counter".parse::<ContractId>().is_err());
    }

    #[test]
    fn values_survive_storage_encoding() {
        let value = Value::tuple([
            ("owner", Value::principal(Address::derive(1, "wallet_1"))),
            ("hits", Value::List(vec![Value::some(Value::UInt(3)), Value::none()])),
            ("status", Value::error(Value::ascii("nope"))),
        ]);
        assert_eq!(Value::from_bytes(&value.to_bytes()), Ok(value));
    }
}
