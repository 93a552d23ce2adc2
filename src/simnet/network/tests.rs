use super::*;
use crate::simnet::config::{DEFAULT_ACCOUNT_BALANCE, DEV_CHAIN_ID};
use crate::utils::log::Level;
use crate::utils::test_utils::utils::{COUNTER_SOURCE, counter_network, devnet_config, wallet};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::interpreter::Event;

fn deployer(network: &Network) -> Address {
    network.account("deployer").expect("devnet deployer")
}

fn counter(network: &Network) -> Value {
    network
        .call_read_only_fn("counter", "get-counter", vec![], wallet(network, 1))
        .expect("read-only call")
        .result
}

// ==================== Genesis ====================

#[test]
fn devnet_starts_at_height_zero_with_funded_wallets() {
    let network = Network::new(devnet_config()).expect("devnet");
    assert_eq!(network.block_height(), 0);

    let accounts = network.get_accounts();
    assert_eq!(accounts.len(), 9);
    let wallet_1 = accounts["wallet_1"];
    assert_eq!(network.account("wallet_1"), Ok(wallet_1));
    assert_eq!(network.account_name(&wallet_1), Some("wallet_1"));
    assert_eq!(network.get_balance(wallet_1), Ok(DEFAULT_ACCOUNT_BALANCE));
    assert_eq!(network.get_account(wallet_1).expect("account").nonce(), 0);

    let ordered: Vec<_> = network.accounts_by_name().map(|(name, _)| name).collect();
    assert_eq!(ordered.first(), Some(&"deployer"));
    assert_eq!(ordered.last(), Some(&"wallet_8"));
}

#[test]
fn genesis_block_records_deployments() {
    let network = counter_network();
    let genesis = network.block(0).expect("genesis");
    assert_eq!(genesis.height(), 0);
    assert_eq!(genesis.header.parent, Hash::zero());
    assert_eq!(genesis.header.state_root, network.state_root());
    assert_eq!(genesis.transactions.len(), 1);
    assert!(genesis.verify_roots());
    assert!(network.block(1).is_none());
}

#[test]
fn start_height_is_configurable() {
    let mut network =
        Network::new(devnet_config().with_start_height(100)).expect("devnet");
    assert_eq!(network.block_height(), 100);
    assert!(network.block(100).is_some());
    assert!(network.block(0).is_none());
    network.mine_block().expect("mine");
    assert_eq!(network.block_height(), 101);
}

#[test]
fn empty_config_builds_empty_network() {
    let network = Network::new(NetworkConfig::new().with_log_level(Level::Off)).expect("empty");
    assert!(network.get_accounts().is_empty());
    assert_eq!(network.block_height(), 0);
    assert_eq!(
        network.account("wallet_1"),
        Err(SimnetError::UnknownAccount("wallet_1".into()))
    );
}

#[test]
fn invalid_genesis_configuration_is_rejected() {
    assert!(matches!(
        Network::new(devnet_config().with_contract("broken", "(define-public (f)")),
        Err(SimnetError::InvalidContract { .. })
    ));
    assert!(matches!(
        Network::new(devnet_config().with_deployer("nobody").with_contract("c", COUNTER_SOURCE)),
        Err(SimnetError::InvalidConfig(_))
    ));
    let shared = Address::derive(DEV_CHAIN_ID, "wallet_1");
    assert!(matches!(
        Network::new(devnet_config().with_account_at("alias", shared, 1)),
        Err(SimnetError::InvalidConfig(_))
    ));
}

// ==================== Read-only calls ====================

#[test]
fn counter_starts_at_zero() {
    let network = counter_network();
    assert_eq!(counter(&network), Value::UInt(0));
}

#[test]
fn read_only_calls_leave_state_unchanged() {
    let network = counter_network();
    let root = network.state_root();
    let snapshot = network.snapshot();
    for _ in 0..3 {
        let outcome = network
            .call_read_only_fn("counter", "get-counter", vec![], wallet(&network, 2))
            .expect("call");
        assert_eq!(outcome.tx_id, None);
    }
    assert_eq!(network.state_root(), root);
    assert_eq!(network.snapshot().len(), snapshot.len());
    assert!(network.pending_transactions().is_empty());
    assert_eq!(network.block_height(), 0);
}

#[test]
fn contract_can_be_named_by_full_identifier() {
    let network = counter_network();
    let full = format!("{}.counter", deployer(&network));
    let outcome = network
        .call_read_only_fn(&full, "get-counter", vec![], wallet(&network, 1))
        .expect("call");
    assert_eq!(outcome.result, Value::UInt(0));
}

#[test]
fn unknown_contracts_and_functions_are_distinct_errors() {
    let network = counter_network();
    let sender = wallet(&network, 1);
    assert!(matches!(
        network.call_read_only_fn("nope", "get-counter", vec![], sender),
        Err(SimnetError::ContractNotFound(_))
    ));
    assert!(matches!(
        network.call_read_only_fn("not.an.id", "get-counter", vec![], sender),
        Err(SimnetError::ContractNotFound(_))
    ));
    assert!(matches!(
        network.call_read_only_fn("counter", "missing", vec![], sender),
        Err(SimnetError::FunctionNotFound { .. })
    ));
    assert!(matches!(
        network.call_read_only_fn("counter", "increment", vec![], sender),
        Err(SimnetError::CallKindMismatch { .. })
    ));
}

// ==================== Public calls and mining ====================

#[test]
fn increment_is_invisible_until_mined() {
    let mut network = counter_network();
    let sender = wallet(&network, 1);

    let outcome = network
        .call_public_fn("counter", "increment", vec![], sender)
        .expect("call");
    assert_eq!(outcome.result, Value::okay(Value::UInt(1)));
    assert!(outcome.tx_id.is_some());
    assert_eq!(
        outcome.events,
        vec![Event::Print {
            contract: format!("{}.counter", deployer(&network))
                .parse()
                .expect("valid id"),
            value: Value::UInt(1)
        }]
    );

    assert_eq!(counter(&network), Value::UInt(0));
    assert_eq!(network.pending_transactions().len(), 1);

    let block = network.mine_block().expect("mine");
    assert_eq!(block.height(), 1);
    assert_eq!(network.block_height(), 1);
    assert_eq!(counter(&network), Value::UInt(1));
    assert_eq!(network.get_data_var("counter", "counter"), Ok(Value::UInt(1)));
    assert!(network.pending_transactions().is_empty());
}

#[test]
fn staged_writes_are_visible_to_later_public_calls() {
    let mut network = counter_network();
    let a = wallet(&network, 1);
    let b = wallet(&network, 2);

    network.call_public_fn("counter", "increment", vec![], a).expect("first");
    let second = network
        .call_public_fn("counter", "increment", vec![], b)
        .expect("second");
    assert_eq!(second.result, Value::okay(Value::UInt(2)));

    let block = network.mine_block().expect("mine");
    assert_eq!(block.transactions.len(), 2);
    assert_eq!(block.receipts[1].cumulative_cost, block.header.cost_used);
    assert_eq!(counter(&network), Value::UInt(2));
}

#[test]
fn nonce_increments_once_per_call() {
    let mut network = counter_network();
    let sender = wallet(&network, 3);

    network.call_public_fn("counter", "increment", vec![], sender).expect("call");
    network.call_public_fn("counter", "increment", vec![], sender).expect("call");
    assert_eq!(network.get_account(sender).expect("account").nonce(), 0);

    let block = network.mine_block().expect("mine");
    assert_eq!(block.transactions[0].nonce, 0);
    assert_eq!(block.transactions[1].nonce, 1);
    assert_eq!(network.get_account(sender).expect("account").nonce(), 2);
}

#[test]
fn err_response_rolls_back_writes_but_consumes_nonce() {
    let mut network = counter_network();
    let sender = wallet(&network, 1);

    let outcome = network
        .call_public_fn("counter", "add", vec![Value::UInt(0)], sender)
        .expect("call");
    assert_eq!(outcome.result, Value::error(Value::UInt(1)));
    assert_eq!(network.pending_transactions().len(), 1);

    network.mine_block().expect("mine");
    assert_eq!(counter(&network), Value::UInt(0));
    assert_eq!(network.get_account(sender).expect("account").nonce(), 1);
    assert!(!network.block(1).expect("block").receipts[0].success);
}

#[test]
fn trap_discards_the_call_entirely() {
    let mut network = counter_network();
    let sender = wallet(&network, 1);

    assert_eq!(
        network.call_public_fn("counter", "explode", vec![], sender),
        Err(SimnetError::ExecutionTrap(VMError::DivisionByZero))
    );
    assert!(network.pending_transactions().is_empty());

    network.mine_block().expect("mine");
    assert_eq!(network.get_account(sender).expect("account").nonce(), 0);
}

#[test]
fn private_functions_are_reachable_only_through_private_entry() {
    let mut network = counter_network();
    let sender = wallet(&network, 1);
    assert!(matches!(
        network.call_public_fn("counter", "reset", vec![], sender),
        Err(SimnetError::CallKindMismatch { .. })
    ));
    let outcome = network
        .call_private_fn("counter", "reset", vec![], sender)
        .expect("private call");
    assert_eq!(outcome.result, Value::okay(Value::Bool(true)));
}

#[test]
fn argument_checks_happen_before_execution() {
    let mut network = counter_network();
    let sender = wallet(&network, 1);
    assert!(matches!(
        network.call_public_fn("counter", "add", vec![], sender),
        Err(SimnetError::ArityMismatch { .. })
    ));
    assert!(matches!(
        network.call_public_fn("counter", "add", vec![Value::Int(1)], sender),
        Err(SimnetError::ArgumentTypeMismatch { .. })
    ));
    assert!(network.pending_transactions().is_empty());
}

#[test]
fn height_advances_by_one_per_mine() {
    let mut network = counter_network();
    for expected in 1..=3 {
        network.mine_block().expect("mine");
        assert_eq!(network.block_height(), expected);
    }
    assert_eq!(network.mine_empty_blocks(4), Ok(7));
    let tip = network.block(7).expect("tip");
    assert_eq!(tip.header.parent, network.block(6).expect("parent").hash);
}

#[test]
fn aborted_mining_leaves_height_and_state_unchanged() {
    let mut network = Network::new(
        devnet_config()
            .with_contract("counter", COUNTER_SOURCE)
            .with_block_cost_limit(1),
    )
    .expect("devnet");
    let sender = wallet(&network, 1);
    let root = network.state_root();

    network
        .call_public_fn("counter", "increment", vec![], sender)
        .expect("call fits the call limit");
    assert!(matches!(
        network.mine_block(),
        Err(SimnetError::MiningAborted { height: 1, .. })
    ));

    assert_eq!(network.block_height(), 0);
    assert_eq!(network.state_root(), root);
    assert!(network.pending_transactions().is_empty());
    assert_eq!(counter(&network), Value::UInt(0));

    // Staged writes are gone too, so the next call starts from committed state.
    let retry = network
        .call_public_fn("counter", "increment", vec![], sender)
        .expect("call");
    assert_eq!(retry.result, Value::okay(Value::UInt(1)));
}

#[test]
fn mining_past_the_last_height_aborts_cleanly() {
    let mut network = Network::new(
        devnet_config()
            .with_contract("counter", COUNTER_SOURCE)
            .with_start_height(u64::MAX - 1),
    )
    .expect("devnet");
    let sender = wallet(&network, 1);

    let block = network.mine_block().expect("last representable height");
    assert_eq!(block.height(), u64::MAX);
    let root = network.state_root();

    assert!(matches!(
        network.call_public_fn("counter", "increment", vec![], sender),
        Err(SimnetError::InvalidConfig(_))
    ));
    let recipient = wallet(&network, 2);
    assert!(matches!(
        network.transfer_stx(1, recipient, sender),
        Err(SimnetError::InvalidConfig(_))
    ));
    assert!(matches!(
        network.mine_block(),
        Err(SimnetError::MiningAborted { height: u64::MAX, .. })
    ));
    assert_eq!(
        network.mine_empty_blocks(1),
        Err(SimnetError::MiningAborted {
            height: u64::MAX,
            reason: "block height overflow".into(),
        })
    );

    assert_eq!(network.block_height(), u64::MAX);
    assert_eq!(network.state_root(), root);
    assert!(network.pending_transactions().is_empty());
    // Read-only calls still see committed state.
    assert_eq!(counter(&network), Value::UInt(0));
}

#[test]
fn deep_recursion_is_reported_as_a_trap() {
    let source = r#"
        (define-read-only (countdown (n uint))
            (if (is-eq n u0) u0 (countdown (- n u1))))
    "#;
    let network =
        Network::new(devnet_config().with_contract("countdown", source)).expect("devnet");
    let sender = wallet(&network, 1);

    let shallow = network
        .call_read_only_fn("countdown", "countdown", vec![Value::UInt(10)], sender)
        .expect("shallow recursion");
    assert_eq!(shallow.result, Value::UInt(0));
    assert!(matches!(
        network.call_read_only_fn("countdown", "countdown", vec![Value::UInt(1_000)], sender),
        Err(SimnetError::ExecutionTrap(VMError::CallDepthExceeded(_)))
    ));
}

// ==================== Determinism ====================

#[test]
fn identical_configs_produce_identical_networks() {
    let mut a = counter_network();
    let mut b = counter_network();
    assert_eq!(a.get_accounts(), b.get_accounts());
    assert_eq!(a.state_root(), b.state_root());

    for network in [&mut a, &mut b] {
        let sender = wallet(network, 4);
        let recipient = wallet(network, 5);
        network
            .call_public_fn("counter", "add", vec![Value::UInt(7)], sender)
            .expect("call");
        network
            .transfer_stx(500, recipient, sender)
            .expect("transfer");
    }

    let block_a = a.mine_block().expect("mine");
    let block_b = b.mine_block().expect("mine");
    assert_eq!(block_a.hash, block_b.hash);
    assert_eq!(a.state_root(), b.state_root());
    assert_eq!(counter(&a), counter(&b));
}

#[test]
fn chain_id_changes_addresses() {
    let dev = Network::new(devnet_config()).expect("devnet");
    let other = Network::new(devnet_config().with_chain_id(1)).expect("other chain");
    assert_ne!(dev.get_accounts()["wallet_1"], other.get_accounts()["wallet_1"]);
}

// ==================== Deployments and transfers ====================

#[test]
fn deployed_contract_is_callable_after_mining() {
    let mut network = counter_network();
    let sender = wallet(&network, 2);
    let source = "(define-read-only (answer) u42)";

    network.deploy_contract("oracle", source, sender).expect("deploy");
    let full = format!("{sender}.oracle");
    assert!(matches!(
        network.call_read_only_fn(&full, "answer", vec![], sender),
        Err(SimnetError::ContractNotFound(_))
    ));

    network.mine_block().expect("mine");
    let outcome = network
        .call_read_only_fn(&full, "answer", vec![], sender)
        .expect("call");
    assert_eq!(outcome.result, Value::UInt(42));

    assert!(matches!(
        network.deploy_contract("oracle", source, sender),
        Err(SimnetError::ContractAlreadyExists(_))
    ));
}

#[test]
fn stx_transfer_moves_balance_on_commit() {
    let mut network = counter_network();
    let from = wallet(&network, 1);
    let to = wallet(&network, 2);

    let outcome = network.transfer_stx(1_000, to, from).expect("transfer");
    assert_eq!(outcome.result, Value::okay(Value::Bool(true)));
    assert_eq!(network.get_balance(to), Ok(DEFAULT_ACCOUNT_BALANCE));

    network.mine_block().expect("mine");
    assert_eq!(network.get_balance(from), Ok(DEFAULT_ACCOUNT_BALANCE - 1_000));
    assert_eq!(network.get_balance(to), Ok(DEFAULT_ACCOUNT_BALANCE + 1_000));
}

#[test]
fn failed_transfer_returns_error_code() {
    let mut network = counter_network();
    let from = wallet(&network, 1);
    let outcome = network
        .transfer_stx(DEFAULT_ACCOUNT_BALANCE + 1, wallet(&network, 2), from)
        .expect("transfer");
    assert_eq!(outcome.result, Value::error(Value::UInt(1)));

    let outcome = network.transfer_stx(5, from, from).expect("transfer");
    assert_eq!(outcome.result, Value::error(Value::UInt(2)));
}

#[test]
fn map_entries_are_queryable() {
    let source = r#"
        (define-map scores principal uint)
        (define-public (score (n uint)) (begin (map-set scores tx-sender n) (ok n)))
    "#;
    let mut network =
        Network::new(devnet_config().with_contract("scores", source)).expect("devnet");
    let sender = wallet(&network, 6);
    let key = Value::principal(sender);

    network
        .call_public_fn("scores", "score", vec![Value::UInt(9)], sender)
        .expect("call");
    assert_eq!(network.get_map_entry("scores", "scores", &key), Ok(None));

    network.mine_block().expect("mine");
    assert_eq!(
        network.get_map_entry("scores", "scores", &key),
        Ok(Some(Value::UInt(9)))
    );
}

#[test]
fn snapshots_can_be_shared_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Snapshot>();

    let mut network = counter_network();
    let before = network.snapshot();
    network
        .call_public_fn("counter", "increment", vec![], wallet(&network, 1))
        .expect("call");
    network.mine_block().expect("mine");

    let handle = std::thread::spawn(move || (before.height(), before.len()));
    let (height, _) = handle.join().expect("thread");
    assert_eq!(height, 0);
    assert_eq!(network.snapshot().height(), 1);
}
