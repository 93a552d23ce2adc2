//! Command-line front end for the simulated network.
//!
//! Deploys contract files at genesis on the devnet, optionally runs one call
//! and prints its result.
//!
//! # Usage
//! ```text
//! simnet <contract.clar>... [OPTIONS]
//! ```
//!
//! # Arguments
//! - `contract.clar`: Contract source; the file stem is the contract name
//!
//! # Options
//! - `--sender <name>`: Devnet identity sending the call (defaults to `wallet_1`)
//! - `--call <contract> <function> [args...]`: Function to call; arguments are
//!   literal values such as `u5`, `"hi"` or `(some 1)`
//! - `--public`: Call a public function instead of a read-only one
//! - `--mine`: Mine a block after the call
//!
//! # Examples
//! ```text
//! simnet counter.clar --call counter get-counter
//! simnet counter.clar --call counter increment --public --mine
//! ```

use simnet::core::executor::CallOutcome;
use simnet::simnet::config::NetworkConfig;
use simnet::simnet::network::Network;
use simnet::virtual_machine::parser::parse_value;
use simnet::virtual_machine::types::Value;
use simnet::{error, info};
use std::env;
use std::fs;
use std::path::Path;
use std::process;

struct Call {
    contract: String,
    function: String,
    args: Vec<String>,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let mut files: Vec<&str> = Vec::new();
    let mut sender = "wallet_1";
    let mut call: Option<Call> = None;
    let mut public = false;
    let mut mine = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--sender" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("--sender requires an argument");
                    process::exit(1);
                }
                sender = args[i].as_str();
                i += 1;
            }
            "--call" => {
                if i + 2 >= args.len() {
                    eprintln!("--call requires a contract and a function");
                    process::exit(1);
                }
                let contract = args[i + 1].clone();
                let function = args[i + 2].clone();
                i += 3;
                let mut call_args = Vec::new();
                while i < args.len() && !args[i].starts_with("--") {
                    call_args.push(args[i].clone());
                    i += 1;
                }
                call = Some(Call {
                    contract,
                    function,
                    args: call_args,
                });
            }
            "--public" => {
                public = true;
                i += 1;
            }
            "--mine" => {
                mine = true;
                i += 1;
            }
            other if other.starts_with("--") => {
                eprintln!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
            path => {
                files.push(path);
                i += 1;
            }
        }
    }

    let mut config = NetworkConfig::default();
    for path in &files {
        let source = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to read {}: {}", path, e);
                process::exit(1);
            }
        };
        let name = Path::new(path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(*path)
            .to_string();
        config = config.with_contract(name, source);
    }

    let mut network = match Network::new(config) {
        Ok(n) => n,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let sender_address = match network.account(sender) {
        Ok(a) => a,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    if let Some(call) = call {
        let mut values = Vec::with_capacity(call.args.len());
        for raw in &call.args {
            match parse_value(raw) {
                Ok(v) => values.push(v),
                Err(e) => {
                    error!("Invalid argument '{}': {}", raw, e);
                    process::exit(1);
                }
            }
        }

        let outcome = if public {
            network.call_public_fn(&call.contract, &call.function, values, sender_address)
        } else {
            network.call_read_only_fn(&call.contract, &call.function, values, sender_address)
        };
        match outcome {
            Ok(outcome) => print_outcome(&outcome),
            Err(e) => {
                error!("{e}");
                process::exit(1);
            }
        }
    }

    if mine {
        match network.mine_block() {
            Ok(block) => info!(
                "Mined block {} ({} transactions, cost {})",
                block.height(),
                block.transactions.len(),
                block.header.cost_used
            ),
            Err(e) => {
                error!("{e}");
                process::exit(1);
            }
        }
    }

    println!("block height: {}", network.block_height());
}

fn print_outcome(outcome: &CallOutcome) {
    println!("result: {}", outcome.result);
    println!("cost:   {}", outcome.cost);
    if let Some(id) = outcome.tx_id {
        println!("tx:     {}", id);
    }
    for event in &outcome.events {
        println!("event:  {:?}", event);
    }
    if let Value::Response(response) = &outcome.result
        && !response.committed
    {
        println!("(call returned err: writes rolled back)");
    }
}

const USAGE: &str = "\
Simulated blockchain network

USAGE:
    {program} <contract.clar>... [OPTIONS]

ARGS:
    <contract.clar>    Contract source deployed at genesis, named after the file stem

OPTIONS:
    --sender <name>                      Devnet identity sending the call (default: wallet_1)
    --call <contract> <function> [args]  Function to call with literal arguments
    --public                             Call a public function (default: read-only)
    --mine                               Mine a block after the call
    -h, --help                           Print this help message

ENVIRONMENT:
    SIMNET_LOG    Minimum log level: debug, info, warn, error or off

EXAMPLES:
    {program} counter.clar --call counter get-counter
    {program} counter.clar --call counter add u5 --public --mine
";

/// Prints usage information to stderr.
fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
