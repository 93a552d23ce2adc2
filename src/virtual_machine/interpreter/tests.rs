use super::*;
use crate::storage::keys::contract_key;
use crate::types::address::Address;
use crate::virtual_machine::contract::ContractRecord;
use crate::virtual_machine::cost::CALL_COST_LIMIT;
use crate::virtual_machine::state::tests::TestState;
use crate::virtual_machine::state::StateRead;

const CHAIN_ID: u64 = 1;

fn deployer() -> PrincipalData {
    PrincipalData::Standard(Address::derive(CHAIN_ID, "deployer"))
}

fn wallet() -> PrincipalData {
    PrincipalData::Standard(Address::derive(CHAIN_ID, "wallet_1"))
}

fn other() -> PrincipalData {
    PrincipalData::Standard(Address::derive(CHAIN_ID, "wallet_2"))
}

struct Harness {
    state: TestState,
    cache: ContractCache,
    limit: u64,
}

impl Harness {
    fn new() -> Self {
        let (key, bytes) = Account::new(1_000).entry(&wallet());
        Self {
            state: TestState::with_data(vec![(key, bytes)]),
            cache: ContractCache::new(),
            limit: CALL_COST_LIMIT,
        }
    }

    fn deploy(&mut self, name: &str, source: &str) -> Arc<LoadedContract> {
        let id = ContractId::new(Address::derive(CHAIN_ID, "deployer"), name).expect("valid name");
        let analysis = self.cache.analyze(source).expect("contract analyzes");
        let mut env = ExecEnv::new(CHAIN_ID, 1, CALL_COST_LIMIT, &self.cache);
        let constants = Interpreter::new(&mut self.state, &mut env)
            .initialize(&id, &analysis, deployer())
            .expect("initializers run");
        let record = ContractRecord {
            id: id.clone(),
            source: source.to_string(),
            constants,
            deployed_at: 1,
        };
        self.state.push(contract_key(&id), record.to_bytes());
        self.cache.load(&self.state, &id).expect("contract loads")
    }

    fn run(
        &mut self,
        contract: &Arc<LoadedContract>,
        function: &str,
        args: Vec<Value>,
        read_only: bool,
    ) -> (Result<Value, VMError>, Vec<Event>) {
        let mut env = ExecEnv::new(CHAIN_ID, 1, self.limit, &self.cache);
        let result = Interpreter::new(&mut self.state, &mut env).call_function(
            contract,
            function,
            args,
            wallet(),
            wallet(),
            read_only,
        );
        (result, env.events)
    }

    fn call(&mut self, contract: &Arc<LoadedContract>, function: &str, args: Vec<Value>) -> Value {
        self.run(contract, function, args, false)
            .0
            .expect("call succeeds")
    }

    fn call_err(&mut self, contract: &Arc<LoadedContract>, function: &str, args: Vec<Value>) -> VMError {
        self.run(contract, function, args, false)
            .0
            .expect_err("call traps")
    }

    fn balance(&self, principal: &PrincipalData) -> u128 {
        Account::load(&self.state, principal).expect("account").balance()
    }
}

// ==================== Arithmetic ====================

const MATH: &str = r#"
    (define-read-only (calc) (+ u1 (* u2 u3)))
    (define-read-only (neg) (- 5))
    (define-read-only (remainder) (mod 17 5))
    (define-read-only (overflow) (* u340282366920938463463374607431768211455 u2))
    (define-read-only (underflow) (- u1 u2))
    (define-read-only (div-zero) (/ u1 u0))
    (define-read-only (mixed) (+ u1 1))
    (define-read-only (compare) (and (< 1 2) (>= u3 u3) (not (is-eq u1 u2))))
"#;

#[test]
fn arithmetic_evaluates() {
    let mut h = Harness::new();
    let math = h.deploy("math", MATH);
    assert_eq!(h.call(&math, "calc", vec![]), Value::UInt(7));
    assert_eq!(h.call(&math, "neg", vec![]), Value::Int(-5));
    assert_eq!(h.call(&math, "remainder", vec![]), Value::Int(2));
    assert_eq!(h.call(&math, "compare", vec![]), Value::Bool(true));
}

#[test]
fn arithmetic_errors_trap() {
    let mut h = Harness::new();
    let math = h.deploy("math", MATH);
    assert_eq!(h.call_err(&math, "overflow", vec![]), VMError::ArithmeticOverflow);
    assert_eq!(h.call_err(&math, "underflow", vec![]), VMError::ArithmeticUnderflow);
    assert_eq!(h.call_err(&math, "div-zero", vec![]), VMError::DivisionByZero);
    assert!(matches!(
        h.call_err(&math, "mixed", vec![]),
        VMError::TypeError { .. }
    ));
}

// ==================== Data vars and maps ====================

const COUNTER: &str = r#"
    (define-data-var counter uint u0)
    (define-read-only (get-counter) (var-get counter))
    (define-public (increment)
      (begin
        (var-set counter (+ (var-get counter) u1))
        (ok (var-get counter))))
    (define-public (bad) u1)
"#;

#[test]
fn data_var_round_trips_through_state() {
    let mut h = Harness::new();
    let counter = h.deploy("counter", COUNTER);
    assert_eq!(h.call(&counter, "get-counter", vec![]), Value::UInt(0));
    assert_eq!(h.call(&counter, "increment", vec![]), Value::okay(Value::UInt(1)));
    assert_eq!(h.call(&counter, "increment", vec![]), Value::okay(Value::UInt(2)));
    assert_eq!(h.call(&counter, "get-counter", vec![]), Value::UInt(2));
}

#[test]
fn writes_trap_in_read_only_context() {
    let mut h = Harness::new();
    let counter = h.deploy("counter", COUNTER);
    let (result, _) = h.run(&counter, "increment", vec![], true);
    assert_eq!(result, Err(VMError::WriteInReadOnly("var-set")));
    assert_eq!(h.call(&counter, "get-counter", vec![]), Value::UInt(0));
}

#[test]
fn public_function_must_return_response() {
    let mut h = Harness::new();
    let counter = h.deploy("counter", COUNTER);
    assert_eq!(
        h.call_err(&counter, "bad", vec![]),
        VMError::PublicMustReturnResponse("bad".into())
    );
}

#[test]
fn map_insert_and_delete_report_presence() {
    let mut h = Harness::new();
    let store = h.deploy(
        "store",
        r#"
            (define-map m uint uint)
            (define-public (ins (k uint)) (ok (map-insert m k u1)))
            (define-public (del (k uint)) (ok (map-delete m k)))
        "#,
    );
    let yes = Value::okay(Value::Bool(true));
    let no = Value::okay(Value::Bool(false));
    assert_eq!(h.call(&store, "ins", vec![Value::UInt(1)]), yes);
    assert_eq!(h.call(&store, "ins", vec![Value::UInt(1)]), no);
    assert_eq!(h.call(&store, "del", vec![Value::UInt(1)]), yes);
    assert_eq!(h.call(&store, "del", vec![Value::UInt(1)]), no);
}

#[test]
fn map_key_type_is_checked() {
    let mut h = Harness::new();
    let store = h.deploy(
        "store",
        r#"
            (define-map m uint uint)
            (define-public (wrong) (ok (map-set m 1 u1)))
        "#,
    );
    assert!(matches!(
        h.call_err(&store, "wrong", vec![]),
        VMError::TypeError { .. }
    ));
}

// ==================== Control flow ====================

const FLOW: &str = r#"
    (define-map balances principal uint)
    (define-read-only (lookup (who principal)) (map-get? balances who))
    (define-public (set-balance (amount uint)) (ok (map-set balances tx-sender amount)))
    (define-read-only (must (who principal)) (ok (unwrap! (map-get? balances who) (err u404))))
    (define-read-only (describe (who principal))
      (match (map-get? balances who) found (+ found u1) u0))
    (define-private (first-step (x uint)) (if (> x u0) (ok x) (err u7)))
    (define-public (chained (x uint)) (begin (try! (first-step x)) (ok u99)))
    (define-public (guarded (n uint)) (begin (asserts! (> n u10) (err u1)) (ok n)))
    (define-read-only (scoped) (let ((a u1) (b (+ a u1))) (+ a b)))
    (define-read-only (point) (get y {x: 1, y: 2}))
    (define-read-only (boom) (unwrap-panic (map-get? balances tx-sender)))
"#;

#[test]
fn optional_helpers_follow_map_contents() {
    let mut h = Harness::new();
    let flow = h.deploy("flow", FLOW);
    let me = Value::Principal(wallet());

    assert_eq!(h.call(&flow, "lookup", vec![me.clone()]), Value::none());
    assert_eq!(h.call(&flow, "must", vec![me.clone()]), Value::error(Value::UInt(404)));
    assert_eq!(h.call(&flow, "describe", vec![me.clone()]), Value::UInt(0));

    assert_eq!(
        h.call(&flow, "set-balance", vec![Value::UInt(5)]),
        Value::okay(Value::Bool(true))
    );
    assert_eq!(h.call(&flow, "lookup", vec![me.clone()]), Value::some(Value::UInt(5)));
    assert_eq!(h.call(&flow, "must", vec![me.clone()]), Value::okay(Value::UInt(5)));
    assert_eq!(h.call(&flow, "describe", vec![me]), Value::UInt(6));
}

#[test]
fn early_returns_stop_at_function_boundary() {
    let mut h = Harness::new();
    let flow = h.deploy("flow", FLOW);
    assert_eq!(h.call(&flow, "chained", vec![Value::UInt(0)]), Value::error(Value::UInt(7)));
    assert_eq!(h.call(&flow, "chained", vec![Value::UInt(1)]), Value::okay(Value::UInt(99)));
    assert_eq!(h.call(&flow, "guarded", vec![Value::UInt(5)]), Value::error(Value::UInt(1)));
    assert_eq!(h.call(&flow, "guarded", vec![Value::UInt(11)]), Value::okay(Value::UInt(11)));
}

#[test]
fn let_and_tuples_bind_values() {
    let mut h = Harness::new();
    let flow = h.deploy("flow", FLOW);
    assert_eq!(h.call(&flow, "scoped", vec![]), Value::UInt(3));
    assert_eq!(h.call(&flow, "point", vec![]), Value::Int(2));
}

#[test]
fn unwrap_panic_traps_on_none() {
    let mut h = Harness::new();
    let flow = h.deploy("flow", FLOW);
    assert!(matches!(
        h.call_err(&flow, "boom", vec![]),
        VMError::UnwrapFailure(_)
    ));
}

#[test]
fn arguments_are_checked() {
    let mut h = Harness::new();
    let flow = h.deploy("flow", FLOW);
    assert_eq!(
        h.call_err(&flow, "guarded", vec![]),
        VMError::ArityMismatch {
            function: "guarded".into(),
            expected: 1,
            actual: 0
        }
    );
    assert!(matches!(
        h.call_err(&flow, "guarded", vec![Value::Int(5)]),
        VMError::TypeError { .. }
    ));
    assert!(matches!(
        h.call_err(&flow, "missing", vec![]),
        VMError::NoSuchFunction { .. }
    ));
}

// ==================== Initialization ====================

#[test]
fn initializers_run_in_order() {
    let mut h = Harness::new();
    let source = r#"
        (define-constant BASE u10)
        (define-constant DOUBLE (* BASE u2))
        (define-data-var level uint DOUBLE)
        (define-read-only (get-level) (var-get level))
    "#;
    let levels = h.deploy("levels", source);
    assert_eq!(levels.constants["DOUBLE"], Value::UInt(20));
    assert_eq!(h.call(&levels, "get-level", vec![]), Value::UInt(20));

    let record = ContractCache::record(&h.state, &levels.id)
        .expect("readable")
        .expect("present");
    assert_eq!(
        record.constants,
        vec![("BASE".to_string(), Value::UInt(10)), ("DOUBLE".to_string(), Value::UInt(20))]
    );
}

// ==================== Limits ====================

#[test]
fn cost_limit_traps() {
    let mut h = Harness::new();
    let math = h.deploy("math", MATH);
    h.limit = 5;
    assert!(matches!(
        h.call_err(&math, "calc", vec![]),
        VMError::CostLimitExceeded { .. }
    ));
}

#[test]
fn unbounded_recursion_hits_depth_limit() {
    let mut h = Harness::new();
    let spin = h.deploy(
        "spin",
        r#"
            (define-private (spin (n uint)) (spin (+ n u1)))
            (define-public (start) (spin u0))
        "#,
    );
    assert_eq!(
        h.call_err(&spin, "start", vec![]),
        VMError::CallDepthExceeded(MAX_EVAL_DEPTH)
    );
}

const COUNTDOWN: &str = r#"
    (define-read-only (countdown (n uint))
        (if (is-eq n u0) u0 (countdown (- n u1))))
"#;

#[test]
fn recursion_within_depth_budget_completes() {
    let mut h = Harness::new();
    let countdown = h.deploy("countdown", COUNTDOWN);
    // Each level nests the `if`, the recursive call form and the call itself.
    let deepest = (MAX_EVAL_DEPTH / 3 - 1) as u128;
    assert_eq!(
        h.call(&countdown, "countdown", vec![Value::UInt(deepest)]),
        Value::UInt(0)
    );
}

#[test]
fn deep_recursion_traps_instead_of_exhausting_the_stack() {
    let mut h = Harness::new();
    let countdown = h.deploy("countdown", COUNTDOWN);
    assert_eq!(
        h.call_err(&countdown, "countdown", vec![Value::UInt(MAX_EVAL_DEPTH as u128)]),
        VMError::CallDepthExceeded(MAX_EVAL_DEPTH)
    );
    assert_eq!(
        h.call_err(&countdown, "countdown", vec![Value::UInt(100_000)]),
        VMError::CallDepthExceeded(MAX_EVAL_DEPTH)
    );
    // The budget is released after a trap.
    assert_eq!(
        h.call(&countdown, "countdown", vec![Value::UInt(3)]),
        Value::UInt(0)
    );
}

#[test]
fn deeply_nested_expression_traps() {
    let mut h = Harness::new();
    let source = format!(
        "(define-read-only (nested) {}u1{})",
        "(+ u1 ".repeat(MAX_EVAL_DEPTH),
        ")".repeat(MAX_EVAL_DEPTH)
    );
    let nested = h.deploy("nested", &source);
    assert_eq!(
        h.call_err(&nested, "nested", vec![]),
        VMError::CallDepthExceeded(MAX_EVAL_DEPTH)
    );
}

// ==================== Cross-contract calls ====================

const VAULT: &str = r#"
    (define-data-var total uint u0)
    (define-public (deposit (n uint))
      (begin
        (var-set total (+ (var-get total) n))
        (print n)
        (if (> n u100) (err u1) (ok (var-get total)))))
    (define-read-only (get-total) (var-get total))
    (define-read-only (who-called) contract-caller)
    (define-read-only (who-sent) tx-sender)
    (define-private (secret) u1)
"#;

const ROUTER: &str = r#"
    (define-public (forward (n uint)) (contract-call? .vault deposit n))
    (define-read-only (ask-caller) (contract-call? .vault who-called))
    (define-read-only (ask-sender) (contract-call? .vault who-sent))
    (define-read-only (sneaky) (contract-call? .vault deposit u1))
    (define-public (poke) (contract-call? .vault secret))
    (define-read-only (me) (as-contract tx-sender))
"#;

#[test]
fn contract_call_commits_ok_results() {
    let mut h = Harness::new();
    let vault = h.deploy("vault", VAULT);
    let router = h.deploy("router", ROUTER);

    let (result, events) = h.run(&router, "forward", vec![Value::UInt(5)], false);
    assert_eq!(result, Ok(Value::okay(Value::UInt(5))));
    assert_eq!(
        events,
        vec![Event::Print {
            contract: vault.id.clone(),
            value: Value::UInt(5)
        }]
    );
    assert_eq!(h.call(&vault, "get-total", vec![]), Value::UInt(5));
}

#[test]
fn contract_call_rolls_back_err_results() {
    let mut h = Harness::new();
    let vault = h.deploy("vault", VAULT);
    let router = h.deploy("router", ROUTER);

    h.call(&router, "forward", vec![Value::UInt(5)]);
    let (result, events) = h.run(&router, "forward", vec![Value::UInt(500)], false);
    assert_eq!(result, Ok(Value::error(Value::UInt(1))));
    assert!(events.is_empty());
    assert_eq!(h.call(&vault, "get-total", vec![]), Value::UInt(5));
}

#[test]
fn contract_call_rebinds_caller_but_not_sender() {
    let mut h = Harness::new();
    h.deploy("vault", VAULT);
    let router = h.deploy("router", ROUTER);

    assert_eq!(
        h.call(&router, "ask-caller", vec![]),
        Value::Principal(PrincipalData::Contract(router.id.clone()))
    );
    assert_eq!(h.call(&router, "ask-sender", vec![]), Value::Principal(wallet()));
    assert_eq!(
        h.call(&router, "me", vec![]),
        Value::Principal(PrincipalData::Contract(router.id.clone()))
    );
}

#[test]
fn contract_call_respects_visibility() {
    let mut h = Harness::new();
    h.deploy("vault", VAULT);
    let router = h.deploy("router", ROUTER);

    assert!(matches!(
        h.call_err(&router, "sneaky", vec![]),
        VMError::WriteInReadOnly(_)
    ));
    assert_eq!(
        h.call_err(&router, "poke", vec![]),
        VMError::NotCallable("secret".into())
    );
}

#[test]
fn contract_call_to_missing_contract_traps() {
    let mut h = Harness::new();
    let orphan = h.deploy(
        "orphan",
        "(define-public (go) (contract-call? .nowhere run))",
    );
    assert!(matches!(
        h.call_err(&orphan, "go", vec![]),
        VMError::NoSuchContract(_)
    ));
}

// ==================== STX transfers ====================

const BANK: &str = r#"
    (define-public (pay (amount uint) (to principal)) (stx-transfer? amount tx-sender to))
    (define-public (steal (from principal)) (stx-transfer? u10 from tx-sender))
    (define-read-only (balance-of (who principal)) (stx-get-balance who))
"#;

#[test]
fn stx_transfer_error_codes() {
    let mut h = Harness::new();
    let bank = h.deploy("bank", BANK);
    let to_other = Value::Principal(other());

    assert_eq!(
        h.call(&bank, "pay", vec![Value::UInt(0), to_other.clone()]),
        stx_error(ERR_NON_POSITIVE_AMOUNT)
    );
    assert_eq!(
        h.call(&bank, "pay", vec![Value::UInt(10), Value::Principal(wallet())]),
        stx_error(ERR_SELF_TRANSFER)
    );
    assert_eq!(
        h.call(&bank, "pay", vec![Value::UInt(5_000), to_other.clone()]),
        stx_error(ERR_INSUFFICIENT_BALANCE)
    );
    assert_eq!(
        h.call(&bank, "steal", vec![to_other]),
        stx_error(ERR_SENDER_NOT_TX_SENDER)
    );
    assert_eq!(h.balance(&wallet()), 1_000);
}

#[test]
fn stx_transfer_moves_balance() {
    let mut h = Harness::new();
    let bank = h.deploy("bank", BANK);

    let (result, events) = h.run(
        &bank,
        "pay",
        vec![Value::UInt(250), Value::Principal(other())],
        false,
    );
    assert_eq!(result, Ok(Value::okay(Value::Bool(true))));
    assert_eq!(
        events,
        vec![Event::StxTransfer {
            sender: wallet(),
            recipient: other(),
            amount: 250
        }]
    );
    assert_eq!(h.balance(&wallet()), 750);
    assert_eq!(h.balance(&other()), 250);
    assert_eq!(
        h.call(&bank, "balance-of", vec![Value::Principal(other())]),
        Value::UInt(250)
    );
}

#[test]
fn failed_transfer_writes_nothing() {
    let mut h = Harness::new();
    let bank = h.deploy("bank", BANK);
    let key = crate::storage::keys::account_key(&other());
    h.call(&bank, "pay", vec![Value::UInt(5_000), Value::Principal(other())]);
    assert_eq!(h.state.get(key), None);
}
