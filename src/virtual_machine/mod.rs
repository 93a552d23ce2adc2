//! Contract language front end and interpreter.
//!
//! Contracts are written in a small s-expression language. Source text is
//! parsed and statically analyzed once per distinct source, then executed
//! by a tree-walking interpreter against a [`state::State`].
//!
//! # Modules
//!
//! - [`parser`]: Source text to expression trees, plus constant value parsing
//! - [`types`]: Runtime values, principals and type signatures
//! - [`contract`]: Static analysis, dispatch tables and the analysis cache
//! - [`interpreter`]: Evaluation, cross-contract calls and STX transfers
//! - [`cost`]: Execution cost accounting
//! - [`state`]: State traits and overlay state utilities
//! - [`errors`]: Parse and execution error types

pub mod contract;
pub mod cost;
pub mod errors;
pub mod interpreter;
pub mod parser;
pub mod state;
pub mod types;
