use anyhow::{Context, Result};
use ic_api_types::ContractAddress;
use ic_chain_client::Endpoint;
use std::time::Duration;

/// Contracts-enabled public nodes tried when no endpoint list is configured.
pub const DEFAULT_ENDPOINTS: [&str; 3] = [
    "wss://rpc.shibuya.astar.network",
    "wss://shibuya.public.blastapi.io",
    "wss://contracts-rococo-rpc.polkadot.io",
];

pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(3_000);
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(8_000);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(2_000);
pub const DEFAULT_APP_NAME: &str = "ink-counter";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoints: Vec<Endpoint>,
    /// Upper bound on the whole resolution pass during `initialize()`.
    pub init_timeout: Duration,
    /// Bound on each read or submission once connected.
    pub call_timeout: Duration,
    /// Flat wait between a submission acknowledgement and the refresh query.
    pub settle_delay: Duration,
    /// Deployed counter contract; `None` forces simulated mode.
    pub contract: Option<ContractAddress>,
    pub app_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoint::list(DEFAULT_ENDPOINTS, DEFAULT_ATTEMPT_TIMEOUT),
            init_timeout: DEFAULT_INIT_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            contract: None,
            app_name: DEFAULT_APP_NAME.to_owned(),
        }
    }
}

impl ClientConfig {
    /// Reads `COUNTER_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let attempt_timeout = millis(get("COUNTER_ATTEMPT_TIMEOUT_MS"), "COUNTER_ATTEMPT_TIMEOUT_MS")?
            .unwrap_or(DEFAULT_ATTEMPT_TIMEOUT);

        let endpoints = match get("COUNTER_RPC_ENDPOINTS") {
            Some(raw) => Endpoint::list(
                raw.split(',').map(str::trim).filter(|url| !url.is_empty()),
                attempt_timeout,
            ),
            None => Endpoint::list(DEFAULT_ENDPOINTS, attempt_timeout),
        };

        Ok(Self {
            endpoints,
            init_timeout: millis(get("COUNTER_INIT_TIMEOUT_MS"), "COUNTER_INIT_TIMEOUT_MS")?
                .unwrap_or(DEFAULT_INIT_TIMEOUT),
            call_timeout: millis(get("COUNTER_CALL_TIMEOUT_MS"), "COUNTER_CALL_TIMEOUT_MS")?
                .unwrap_or(DEFAULT_CALL_TIMEOUT),
            settle_delay: millis(get("COUNTER_SETTLE_DELAY_MS"), "COUNTER_SETTLE_DELAY_MS")?
                .unwrap_or(DEFAULT_SETTLE_DELAY),
            contract: get("COUNTER_CONTRACT_ADDRESS").map(ContractAddress),
            app_name: get("COUNTER_APP_NAME").unwrap_or_else(|| DEFAULT_APP_NAME.to_owned()),
        })
    }

    /// Configuration that never leaves simulated mode.
    pub fn simulated() -> Self {
        Self {
            endpoints: Vec::new(),
            contract: None,
            ..Self::default()
        }
    }
}

fn millis(raw: Option<String>, key: &str) -> Result<Option<Duration>> {
    raw.map(|value| {
        value
            .parse::<u64>()
            .map(Duration::from_millis)
            .with_context(|| format!("{key} must be an integer number of milliseconds, got {value:?}"))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_public_endpoints() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.endpoints.len(), 3);
        assert_eq!(config.endpoints[0].url, "wss://rpc.shibuya.astar.network");
        assert_eq!(config.endpoints[0].timeout, DEFAULT_ATTEMPT_TIMEOUT);
        assert_eq!(config.settle_delay, DEFAULT_SETTLE_DELAY);
        assert_eq!(config.call_timeout, DEFAULT_CALL_TIMEOUT);
        assert_eq!(config.contract, None);
        assert_eq!(config.app_name, "ink-counter");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("COUNTER_RPC_ENDPOINTS", " ws://a:9944 , ,http://b:9933 "),
            ("COUNTER_ATTEMPT_TIMEOUT_MS", "500"),
            ("COUNTER_INIT_TIMEOUT_MS", "1500"),
            ("COUNTER_CALL_TIMEOUT_MS", "750"),
            ("COUNTER_SETTLE_DELAY_MS", "0"),
            ("COUNTER_CONTRACT_ADDRESS", "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY"),
            ("COUNTER_APP_NAME", "demo"),
        ]))
        .unwrap();

        assert_eq!(
            config.endpoints,
            Endpoint::list(["ws://a:9944", "http://b:9933"], Duration::from_millis(500))
        );
        assert_eq!(config.init_timeout, Duration::from_millis(1500));
        assert_eq!(config.call_timeout, Duration::from_millis(750));
        assert_eq!(config.settle_delay, Duration::ZERO);
        assert_eq!(
            config.contract,
            Some(ContractAddress("5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY".to_owned()))
        );
        assert_eq!(config.app_name, "demo");
    }

    #[test]
    fn blank_contract_address_means_simulation() {
        let config = ClientConfig::from_lookup(lookup(&[("COUNTER_CONTRACT_ADDRESS", "   ")])).unwrap();
        assert_eq!(config.contract, None);
    }

    #[test]
    fn malformed_durations_are_errors() {
        assert!(ClientConfig::from_lookup(lookup(&[("COUNTER_SETTLE_DELAY_MS", "soon")])).is_err());
    }
}
