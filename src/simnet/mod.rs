//! Simulated network facade.
//!
//! - [`config`]: [`NetworkConfig`] and the devnet defaults
//! - [`network`]: [`Network`], the single owned entry point for tests and tools
//! - [`error`]: [`SimnetError`], returned by every fallible call

pub mod config;
pub mod error;
pub mod network;

pub use config::NetworkConfig;
pub use error::SimnetError;
pub use network::{CallResult, Network};
