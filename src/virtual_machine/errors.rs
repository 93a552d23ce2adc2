use simnet_derive::Error;

/// Source position of a parse failure, 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{line}:{column}: {message}")]
pub struct ParseError {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl ParseError {
    pub fn new(line: u32, column: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }

    /// Formats a compiler-style diagnostic pointing at the failing column.
    pub fn render(&self, file: &str, source: &str) -> String {
        use std::fmt::Write;

        let mut diag = String::new();
        let _ = writeln!(diag, "error: {}", self.message);
        let _ = writeln!(diag, " --> {file}:{}:{}", self.line, self.column);

        if let Some(raw_line) = source.lines().nth((self.line as usize).saturating_sub(1)) {
            let line_text = raw_line.trim_end_matches('\r');
            let underline = " ".repeat((self.column as usize).saturating_sub(1));
            let _ = writeln!(diag, "  |");
            let _ = writeln!(diag, "{:>4} | {}", self.line, line_text);
            let _ = writeln!(diag, "  | {}^", underline);
        }

        diag
    }
}

/// Errors raised while analyzing or executing contract code.
///
/// Analysis variants reject a contract at deploy time; the remaining
/// variants are runtime traps that abort the current call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VMError {
    #[error("parse error at {0}")]
    Parse(#[from] ParseError),
    #[error("duplicate definition of '{0}'")]
    DuplicateDefinition(String),
    #[error("unknown type '{0}'")]
    UnknownType(String),
    #[error("malformed {form}: {reason}")]
    MalformedForm { form: String, reason: String },
    #[error("call to undefined function '{0}'")]
    UndefinedFunction(String),
    #[error("read-only function '{function}' writes state through '{offender}'")]
    ReadOnlyWrites { function: String, offender: String },
    #[error("invalid contract name '{0}'")]
    InvalidContractName(String),

    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("undefined data var '{0}'")]
    NoSuchDataVar(String),
    #[error("undefined map '{0}'")]
    NoSuchMap(String),
    #[error("contract {0} does not exist")]
    NoSuchContract(String),
    #[error("function '{function}' not found in {contract}")]
    NoSuchFunction { contract: String, function: String },
    #[error("function '{0}' is private and cannot be called from outside its contract")]
    NotCallable(String),
    #[error("'{function}' expects {expected} arguments, got {actual}")]
    ArityMismatch {
        function: String,
        expected: usize,
        actual: usize,
    },
    #[error("type error: expected {expected}, got {actual}")]
    TypeError { expected: String, actual: String },
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    #[error("arithmetic underflow")]
    ArithmeticUnderflow,
    #[error("division by zero")]
    DivisionByZero,
    #[error("unwrap failed on {0}")]
    UnwrapFailure(String),
    #[error("state write '{0}' attempted in a read-only context")]
    WriteInReadOnly(&'static str),
    #[error("public function '{0}' must return a response")]
    PublicMustReturnResponse(String),
    #[error("cost limit exceeded: used {used}, limit {limit}")]
    CostLimitExceeded { used: u64, limit: u64 },
    #[error("maximum evaluation depth of {0} exceeded")]
    CallDepthExceeded(usize),
    #[error("value exceeds the declared size of {0}")]
    ValueTooLarge(String),
    #[error("invalid storage value format")]
    InvalidStateValue,
}

impl VMError {
    /// Shorthand for a [`VMError::TypeError`] from any displayable types.
    pub fn type_error(expected: impl ToString, actual: impl ToString) -> Self {
        VMError::TypeError {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn malformed(form: impl Into<String>, reason: impl Into<String>) -> Self {
        VMError::MalformedForm {
            form: form.into(),
            reason: reason.into(),
        }
    }
}
