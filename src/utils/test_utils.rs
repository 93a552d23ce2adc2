//! Shared fixtures for network-level tests.

#[cfg(test)]
pub mod utils {
    use crate::simnet::config::NetworkConfig;
    use crate::simnet::network::Network;
    use crate::types::address::Address;
    use crate::utils::log::Level;

    /// Counter contract used across the network scenarios.
    pub const COUNTER_SOURCE: &str = r#"
        (define-data-var counter uint u0)
        (define-read-only (get-counter) (var-get counter))
        (define-public (increment)
          (begin
            (var-set counter (+ (var-get counter) u1))
            (print (var-get counter))
            (ok (var-get counter))))
        (define-public (add (n uint))
          (begin
            (asserts! (> n u0) (err u1))
            (var-set counter (+ (var-get counter) n))
            (ok (var-get counter))))
        (define-public (explode) (ok (/ (var-get counter) u0)))
        (define-private (reset) (begin (var-set counter u0) (ok true)))
    "#;

    /// Devnet configuration with logging silenced.
    pub fn devnet_config() -> NetworkConfig {
        NetworkConfig::default().with_log_level(Level::Off)
    }

    /// Devnet with `counter` deployed at genesis.
    pub fn counter_network() -> Network {
        Network::new(devnet_config().with_contract("counter", COUNTER_SOURCE))
            .expect("devnet builds")
    }

    pub fn wallet(network: &Network, n: usize) -> Address {
        network
            .account(&format!("wallet_{n}"))
            .expect("devnet wallet")
    }
}
