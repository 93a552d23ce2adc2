//! Deterministic simulated blockchain network.
//!
//! Provides named test accounts, a versioned ledger, a contract interpreter
//! and a block controller behind a single [`Network`] facade.

pub mod core;
pub mod simnet;
pub mod storage;
pub mod types;
pub mod utils;
pub mod virtual_machine;

pub use crate::core::executor::CallOutcome;
pub use crate::simnet::{CallResult, Network, NetworkConfig, SimnetError};
pub use crate::types::address::Address;
pub use crate::virtual_machine::types::Value;
