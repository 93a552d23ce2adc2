//! Core type definitions shared by every layer of the simulator.
//!
//! - `Hash`: fixed-size 32-byte SHA3-256 hashes
//! - `Address`: 20-byte account identifiers with a checksummed text form
//! - `encoding`: deterministic binary codec used for storage and hashing
//! - `MerkleTree`: transaction and state roots

pub mod address;
pub mod encoding;
pub mod hash;
pub mod merkle_tree;
