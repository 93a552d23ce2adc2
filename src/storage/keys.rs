//! Namespaced ledger keys.
//!
//! Every key is a SHA3 hash over a domain tag followed by the encoded
//! identifier, so records of different kinds can never collide.

use crate::types::encoding::Encode;
use crate::types::hash::Hash;
use crate::virtual_machine::types::{ContractId, PrincipalData, Value};

const ACCOUNT_TAG: &[u8] = b"ACCOUNT";
const CONTRACT_TAG: &[u8] = b"CONTRACT";
const DATA_VAR_TAG: &[u8] = b"DATA_VAR";
const MAP_ENTRY_TAG: &[u8] = b"MAP_ENTRY";

/// Key of the account record (balance and nonce) of a principal.
pub fn account_key(principal: &PrincipalData) -> Hash {
    match principal {
        PrincipalData::Standard(address) => Hash::tagged(ACCOUNT_TAG, address),
        PrincipalData::Contract(id) => Hash::tagged(ACCOUNT_TAG, id),
    }
}

/// Key of a contract record.
pub fn contract_key(id: &ContractId) -> Hash {
    Hash::tagged(CONTRACT_TAG, id)
}

/// Key of a contract data var.
pub fn data_var_key(id: &ContractId, name: &str) -> Hash {
    let mut h = Hash::sha3();
    h.update(DATA_VAR_TAG);
    id.encode(&mut h);
    name.encode(&mut h);
    h.finalize()
}

/// Key of a map entry, derived from the encoded map key value.
pub fn map_entry_key(id: &ContractId, map: &str, key: &Value) -> Hash {
    let mut h = Hash::sha3();
    h.update(MAP_ENTRY_TAG);
    id.encode(&mut h);
    map.encode(&mut h);
    key.encode(&mut h);
    h.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::address::Address;

    fn counter() -> ContractId {
        ContractId::new(Address::derive(1, "deployer"), "counter").expect("valid")
    }

    #[test]
    fn keys_are_domain_separated() {
        let id = counter();
        let keys = [
            account_key(&PrincipalData::Contract(id.clone())),
            contract_key(&id),
            data_var_key(&id, "counter"),
            map_entry_key(&id, "counter", &Value::UInt(0)),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn data_var_keys_are_scoped_by_contract() {
        let a = counter();
        let b = ContractId::new(Address::derive(1, "wallet_1"), "counter").expect("valid");
        assert_ne!(data_var_key(&a, "n"), data_var_key(&b, "n"));
        assert_eq!(data_var_key(&a, "n"), data_var_key(&counter(), "n"));
    }

    #[test]
    fn map_keys_depend_on_key_value() {
        let id = counter();
        assert_ne!(
            map_entry_key(&id, "m", &Value::UInt(1)),
            map_entry_key(&id, "m", &Value::Int(1))
        );
    }
}
