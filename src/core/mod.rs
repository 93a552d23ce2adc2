//! Core simulator building blocks.
//!
//! This module contains the ledger-facing pieces of the network:
//! - `Account` and `AccountRegistry`: named test identities and their ledger records
//! - `ExecutionEngine`: routes calls to the interpreter against the right view
//! - `Transaction`, `Receipt`, `Block`: staged calls and committed blocks
//! - `BlockController` and `Validator`: mining state machine and block rules

pub mod account;
pub mod block;
pub mod blockchain;
pub mod executor;
pub mod receipt;
pub mod transaction;
pub mod validator;
