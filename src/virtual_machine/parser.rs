//! Contract source parser.
//!
//! Turns source text into s-expressions with source positions. The grammar:
//!
//! ```text
//! expr    := literal | symbol | '(' expr* ')' | '{' (name ':' expr ','?)* '}'
//! literal := 123 | -5 | u123 | true | false | none | "ascii" | 0xbeef
//!          | 'ST…  | 'ST….name | .name
//! ```
//!
//! Comments start with `;;` and run to the end of the line.

use crate::types::address::Address;
use crate::virtual_machine::errors::ParseError;
use crate::virtual_machine::types::{ContractId, PrincipalData, Value, is_valid_contract_name};
use std::fmt;

/// Maximum nesting of parentheses and braces.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Position of an expression in its source, 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExprKind {
    Literal(Value),
    Symbol(String),
    /// `.name`, a contract deployed by the same issuer as the current one.
    ContractRef(String),
    List(Vec<Expr>),
    Tuple(Vec<(String, Expr)>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn symbol(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn list(&self) -> Option<&[Expr]> {
        match &self.kind {
            ExprKind::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the head symbol of a list expression.
    pub fn head(&self) -> Option<&str> {
        self.list()?.first()?.symbol()
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(v) => write!(f, "{v}"),
            ExprKind::Symbol(s) => write!(f, "{s}"),
            ExprKind::ContractRef(name) => write!(f, ".{name}"),
            ExprKind::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            ExprKind::Tuple(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Parses a whole source file into its top-level expressions.
pub fn parse(source: &str) -> Result<Vec<Expr>, ParseError> {
    let mut parser = Parser::new(source);
    let mut exprs = Vec::new();
    loop {
        parser.skip_trivia();
        if parser.peek().is_none() {
            return Ok(exprs);
        }
        exprs.push(parser.expr(0)?);
    }
}

/// Parses a constant value such as `u1`, `(some 'ST…)` or `{ a: (list 1 2) }`.
///
/// Only literals and the constructors `ok`, `err`, `some`, `list` and
/// `tuple` are accepted; nothing is evaluated.
pub fn parse_value(source: &str) -> Result<Value, ParseError> {
    let exprs = parse(source)?;
    match exprs.as_slice() {
        [expr] => constant_value(expr),
        [] => Err(ParseError::new(1, 1, "expected a value")),
        [_, extra, ..] => Err(ParseError::new(
            extra.span.line,
            extra.span.column,
            "expected a single value",
        )),
    }
}

fn constant_value(expr: &Expr) -> Result<Value, ParseError> {
    let fail = |message: String| ParseError::new(expr.span.line, expr.span.column, message);
    match &expr.kind {
        ExprKind::Literal(v) => Ok(v.clone()),
        ExprKind::Tuple(fields) => {
            let mut entries = std::collections::BTreeMap::new();
            for (name, value) in fields {
                if entries.insert(name.clone(), constant_value(value)?).is_some() {
                    return Err(fail(format!("duplicate tuple key '{name}'")));
                }
            }
            Ok(Value::Tuple(entries))
        }
        ExprKind::List(items) => match (expr.head(), &items[..]) {
            (Some("ok"), [_, v]) => Ok(Value::okay(constant_value(v)?)),
            (Some("err"), [_, v]) => Ok(Value::error(constant_value(v)?)),
            (Some("some"), [_, v]) => Ok(Value::some(constant_value(v)?)),
            (Some("list"), [_, rest @ ..]) => Ok(Value::List(
                rest.iter().map(constant_value).collect::<Result<_, _>>()?,
            )),
            (Some("tuple"), [_, rest @ ..]) => {
                let mut entries = std::collections::BTreeMap::new();
                for field in rest {
                    let Some([name, value]) = field.list() else {
                        return Err(fail(format!("malformed tuple field {field}")));
                    };
                    let Some(name) = name.symbol() else {
                        return Err(fail(format!("malformed tuple field {field}")));
                    };
                    entries.insert(name.to_string(), constant_value(value)?);
                }
                Ok(Value::Tuple(entries))
            }
            _ => Err(fail(format!("not a constant value: {expr}"))),
        },
        _ => Err(fail(format!("not a constant value: {expr}"))),
    }
}

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    column: u32,
}

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_!?+*/<>=.".contains(c)
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
        }
    }

    fn error(&self, span: Span, message: impl Into<String>) -> ParseError {
        ParseError::new(span.line, span.column, message)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == ',' {
                self.bump();
            } else if c == ';' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    fn expr(&mut self, depth: usize) -> Result<Expr, ParseError> {
        self.skip_trivia();
        let span = self.span();
        if depth > MAX_NESTING_DEPTH {
            return Err(self.error(span, "expression nesting too deep"));
        }

        let kind = match self.peek() {
            None => return Err(self.error(span, "unexpected end of input")),
            Some('(') => {
                self.bump();
                let mut items = Vec::new();
                loop {
                    self.skip_trivia();
                    match self.peek() {
                        Some(')') => {
                            self.bump();
                            break;
                        }
                        None => return Err(self.error(span, "unclosed '('")),
                        _ => items.push(self.expr(depth + 1)?),
                    }
                }
                ExprKind::List(items)
            }
            Some('{') => {
                self.bump();
                ExprKind::Tuple(self.tuple_fields(span, depth)?)
            }
            Some(c @ (')' | '}')) => return Err(self.error(span, format!("unexpected '{c}'"))),
            Some('"') => ExprKind::Literal(Value::StringAscii(self.string(span)?)),
            Some('\'') => {
                self.bump();
                let text = self.word();
                ExprKind::Literal(Value::Principal(self.principal(span, &text)?))
            }
            Some(_) => {
                let text = self.word();
                if text.is_empty() {
                    let c = self.peek().unwrap_or(' ');
                    return Err(self.error(span, format!("unexpected character '{c}'")));
                }
                self.atom(span, text)?
            }
        };
        Ok(Expr { kind, span })
    }

    fn tuple_fields(&mut self, open: Span, depth: usize) -> Result<Vec<(String, Expr)>, ParseError> {
        let mut fields = Vec::new();
        loop {
            self.skip_trivia();
            let span = self.span();
            match self.peek() {
                Some('}') => {
                    self.bump();
                    return Ok(fields);
                }
                None => return Err(self.error(open, "unclosed '{'")),
                _ => {}
            }
            let name = self.word();
            let name = name.strip_suffix(':').map(str::to_string).unwrap_or(name);
            if name.is_empty() {
                return Err(self.error(span, "expected tuple key"));
            }
            self.skip_trivia();
            if self.peek() == Some(':') {
                self.bump();
            }
            let value = self.expr(depth + 1)?;
            fields.push((name, value));
        }
    }

    fn word(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if is_symbol_char(c) {
                out.push(c);
                self.bump();
            } else if c == ':' && !out.is_empty() {
                // tuple keys written as `key:`
                out.push(c);
                self.bump();
                break;
            } else {
                break;
            }
        }
        out
    }

    fn string(&mut self, span: Span) -> Result<String, ParseError> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error(span, "unterminated string literal")),
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    other => {
                        let c = other.unwrap_or(' ');
                        return Err(self.error(span, format!("invalid escape '\\{c}'")));
                    }
                },
                Some(c) if c.is_ascii() => out.push(c),
                Some(c) => {
                    return Err(self.error(span, format!("non-ascii character '{c}' in string")));
                }
            }
        }
    }

    fn principal(&self, span: Span, text: &str) -> Result<PrincipalData, ParseError> {
        let (address, name) = match text.split_once('.') {
            Some((address, name)) => (address, Some(name)),
            None => (text, None),
        };
        let address = address
            .parse::<Address>()
            .map_err(|e| self.error(span, format!("invalid principal '{text}': {e}")))?;
        match name {
            None => Ok(PrincipalData::Standard(address)),
            Some(name) if is_valid_contract_name(name) => Ok(PrincipalData::Contract(ContractId {
                issuer: address,
                name: name.to_string(),
            })),
            Some(name) => Err(self.error(span, format!("invalid contract name '{name}'"))),
        }
    }

    fn atom(&self, span: Span, text: String) -> Result<ExprKind, ParseError> {
        let bytes = text.as_bytes();
        let kind = match text.as_str() {
            "true" => ExprKind::Literal(Value::Bool(true)),
            "false" => ExprKind::Literal(Value::Bool(false)),
            "none" => ExprKind::Literal(Value::none()),
            _ if bytes[0] == b'.' => {
                let name = &text[1..];
                if !is_valid_contract_name(name) {
                    return Err(self.error(span, format!("invalid contract name '{name}'")));
                }
                ExprKind::ContractRef(name.to_string())
            }
            _ if text.starts_with("0x") => {
                ExprKind::Literal(Value::Buffer(self.hex(span, &text[2..])?))
            }
            _ if bytes[0] == b'u' && bytes.len() > 1 && bytes[1..].iter().all(u8::is_ascii_digit) => {
                let n = text[1..]
                    .parse::<u128>()
                    .map_err(|_| self.error(span, format!("uint literal out of range: {text}")))?;
                ExprKind::Literal(Value::UInt(n))
            }
            _ if bytes[0].is_ascii_digit()
                || (bytes[0] == b'-' && bytes.len() > 1 && bytes[1].is_ascii_digit()) =>
            {
                let n = text
                    .parse::<i128>()
                    .map_err(|_| self.error(span, format!("invalid int literal: {text}")))?;
                ExprKind::Literal(Value::Int(n))
            }
            _ => ExprKind::Symbol(text),
        };
        Ok(kind)
    }

    fn hex(&self, span: Span, digits: &str) -> Result<Vec<u8>, ParseError> {
        if digits.len() % 2 != 0 {
            return Err(self.error(span, "buffer literal needs an even number of hex digits"));
        }
        (0..digits.len())
            .step_by(2)
            .map(|i| {
                u8::from_str_radix(&digits[i..i + 2], 16)
                    .map_err(|_| self.error(span, format!("invalid hex in 0x{digits}")))
            })
            .collect()
    }
}
