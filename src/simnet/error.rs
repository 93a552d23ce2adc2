use crate::virtual_machine::errors::VMError;
use simnet_derive::Error;

/// Errors reported by the simulated network.
///
/// A failed call leaves committed and staged state exactly as it was before
/// the call; only [`SimnetError::InvalidConfig`] and invalid genesis
/// contracts prevent a network from being created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimnetError {
    #[error("unknown account '{0}'")]
    UnknownAccount(String),

    #[error("contract '{0}' not found")]
    ContractNotFound(String),

    #[error("function '{function}' not found in contract {contract}")]
    FunctionNotFound { contract: String, function: String },

    #[error("function '{function}' is {actual}, expected a {expected} function")]
    CallKindMismatch {
        function: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("function '{function}' expects {expected} arguments, got {actual}")]
    ArityMismatch {
        function: String,
        expected: usize,
        actual: usize,
    },

    #[error("argument {index} of '{function}' expected {expected}, got {actual}")]
    ArgumentTypeMismatch {
        function: String,
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("execution trapped: {0}")]
    ExecutionTrap(#[from] VMError),

    #[error("mining aborted at height {height}: {reason}")]
    MiningAborted { height: u64, reason: String },

    #[error("contract {0} already exists")]
    ContractAlreadyExists(String),

    #[error("invalid contract '{name}': {reason}")]
    InvalidContract { name: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type used throughout the facade.
pub type Result<T, E = SimnetError> = std::result::Result<T, E>;
