//! Ledger storage.
//!
//! - [`keys`]: Namespaced key derivation for accounts, contracts, data vars and maps
//! - [`state_store`]: [`LedgerStore`](state_store::LedgerStore), committed state plus
//!   the staged writes of the open block
//! - [`state_view`]: [`Snapshot`](state_view::Snapshot), immutable views pinned to a commit

pub mod keys;
pub mod state_store;
pub mod state_view;
