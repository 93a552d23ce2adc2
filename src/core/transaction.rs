//! Staged mutating calls.
//!
//! A [`Transaction`] is produced by the execution engine once a mutating call
//! has run against the pending view. It carries the call's payload together
//! with its outcome and write set, so the block controller can validate and
//! replay it without re-executing contract code.

use crate::types::address::Address;
use crate::types::encoding::Encode;
use crate::types::hash::Hash;
use crate::virtual_machine::interpreter::Event;
use crate::virtual_machine::state::WriteSet;
use crate::virtual_machine::types::{ContractId, PrincipalData, ResponseData, Value};
use simnet_derive::BinaryCodec;

/// Operation a transaction performs.
#[derive(Clone, Debug, PartialEq, Eq, BinaryCodec)]
pub enum TransactionPayload {
    /// Call of a public (or, from tests, private) contract function.
    ContractCall {
        contract: ContractId,
        function: String,
        args: Vec<Value>,
    },
    /// Deployment of a new contract under the sender's address.
    DeployContract { name: String, source: String },
    /// Native STX transfer from the sender.
    TransferStx {
        recipient: PrincipalData,
        amount: u128,
    },
}

impl TransactionPayload {
    /// Short human-readable description used in logs.
    pub fn describe(&self) -> String {
        match self {
            TransactionPayload::ContractCall {
                contract, function, ..
            } => format!("call {contract}::{function}"),
            TransactionPayload::DeployContract { name, .. } => format!("deploy {name}"),
            TransactionPayload::TransferStx { recipient, amount } => {
                format!("transfer {amount} to {recipient}")
            }
        }
    }
}

/// An executed, not yet committed, mutating call.
#[derive(Clone, Debug, PartialEq, Eq, BinaryCodec)]
pub struct Transaction {
    /// Hash over chain id, sender, nonce and payload.
    pub id: Hash,
    pub sender: Address,
    /// Sender nonce the call consumed.
    pub nonce: u64,
    pub payload: TransactionPayload,
    /// Execution cost charged by the interpreter.
    pub cost: u64,
    /// Ledger writes in key order, including the sender's nonce increment.
    pub writes: WriteSet,
    /// Value returned by the call.
    pub result: Value,
    pub events: Vec<Event>,
}

impl Transaction {
    /// Computes the chain-specific transaction id.
    ///
    /// The `"TRANSACTION"` prefix and the chain id keep ids from different
    /// domains and different networks apart.
    pub fn compute_id(
        chain_id: u64,
        sender: &Address,
        nonce: u64,
        payload: &TransactionPayload,
    ) -> Hash {
        let mut h = Hash::sha3();
        h.update(b"TRANSACTION");
        chain_id.encode(&mut h);
        sender.encode(&mut h);
        nonce.encode(&mut h);
        payload.encode(&mut h);
        h.finalize()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain_id: u64,
        sender: Address,
        nonce: u64,
        payload: TransactionPayload,
        cost: u64,
        writes: WriteSet,
        result: Value,
        events: Vec<Event>,
    ) -> Self {
        Self {
            id: Self::compute_id(chain_id, &sender, nonce, &payload),
            sender,
            nonce,
            payload,
            cost,
            writes,
            result,
            events,
        }
    }

    /// False when the call returned an `(err ...)` response.
    pub fn succeeded(&self) -> bool {
        !matches!(
            self.result,
            Value::Response(ResponseData {
                committed: false,
                ..
            })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> TransactionPayload {
        TransactionPayload::TransferStx {
            recipient: PrincipalData::Standard(Address::derive(1, "wallet_2")),
            amount: 10,
        }
    }

    fn tx(nonce: u64, result: Value) -> Transaction {
        Transaction::new(
            1,
            Address::derive(1, "wallet_1"),
            nonce,
            payload(),
            0,
            vec![],
            result,
            vec![],
        )
    }

    #[test]
    fn id_binds_chain_sender_nonce_and_payload() {
        let sender = Address::derive(1, "wallet_1");
        let base = Transaction::compute_id(1, &sender, 0, &payload());
        assert_eq!(base, Transaction::compute_id(1, &sender, 0, &payload()));
        assert_ne!(base, Transaction::compute_id(2, &sender, 0, &payload()));
        assert_ne!(base, Transaction::compute_id(1, &sender, 1, &payload()));
        assert_ne!(
            base,
            Transaction::compute_id(1, &Address::derive(1, "wallet_2"), 0, &payload())
        );
    }

    #[test]
    fn outcome_does_not_change_id() {
        let ok = tx(3, Value::okay(Value::Bool(true)));
        let err = tx(3, Value::error(Value::UInt(1)));
        assert_eq!(ok.id, err.id);
        assert!(ok.succeeded());
        assert!(!err.succeeded());
    }

    #[test]
    fn describe_names_the_operation() {
        let call = TransactionPayload::ContractCall {
            contract: ContractId::new(Address::derive(1, "deployer"), "counter").expect("valid"),
            function: "increment".into(),
            args: vec![],
        };
        assert!(call.describe().ends_with(".counter::increment"));
        assert!(payload().describe().starts_with("transfer 10 to ST"));
    }
}
