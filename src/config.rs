use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::time::Duration;

/// Networks the service knows how to reach, with their chain ids.
pub const SUPPORTED_NETWORKS: &[(&str, u64)] = &[
    ("ethereum", 1),
    ("polygon", 137),
    ("arbitrum", 42161),
    ("bsc", 56),
];

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Testnet,
    Production,
}

#[derive(Debug, Clone)]
pub struct NetworkEndpoint {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,

    // Chain data provider
    pub networks: BTreeMap<String, NetworkEndpoint>,
    pub wss_endpoint: Option<String>,
    pub stream_network: String,
    pub api_key: Option<String>,

    // Request pipeline
    pub requests_per_second: u32,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
    pub rate_limit_pause: Duration,
    pub fee_cache_ttl: Duration,
    pub fee_refresh_interval: Duration,

    // Notifier
    pub target_gas_price_gwei: Option<f64>,
    pub notify_tolerance_gwei: f64,
    pub notify_cooldown: Duration,
    pub notify_min_savings_eth: f64,

    // Analysis
    pub synthetic_fee_fallback: bool,

    // Swap routing
    pub aggregator_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = Self::parse_environment(lookup("ENVIRONMENT"))?;

        let mut networks = BTreeMap::new();
        for (name, chain_id) in SUPPORTED_NETWORKS {
            let var = format!("{}_RPC_URL", name.to_uppercase());
            if let Some(rpc_url) = lookup(&var).filter(|v| !v.trim().is_empty()) {
                networks.insert(
                    name.to_string(),
                    NetworkEndpoint {
                        name: name.to_string(),
                        chain_id: *chain_id,
                        rpc_url,
                    },
                );
            }
        }

        let config = Self {
            environment,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 8080)?,

            networks,
            wss_endpoint: lookup("WSS_ENDPOINT").filter(|v| !v.trim().is_empty()),
            stream_network: lookup("STREAM_NETWORK")
                .map(|n| n.to_lowercase())
                .unwrap_or_else(|| "ethereum".to_string()),
            api_key: lookup("API_KEY").filter(|v| !v.trim().is_empty()),

            requests_per_second: parse_or(&lookup, "REQUESTS_PER_SECOND", 120)?,
            retry_attempts: parse_or(&lookup, "RETRY_ATTEMPTS", 3)?,
            retry_base_delay: Duration::from_millis(parse_or(&lookup, "RETRY_BASE_DELAY_MS", 1000)?),
            rate_limit_pause: Duration::from_millis(parse_or(&lookup, "RATE_LIMIT_PAUSE_MS", 1000)?),
            fee_cache_ttl: Duration::from_secs(parse_or(&lookup, "FEE_CACHE_TTL_SECS", 12)?),
            fee_refresh_interval: Duration::from_secs(parse_or(&lookup, "FEE_REFRESH_SECS", 12)?),

            target_gas_price_gwei: lookup("TARGET_GAS_PRICE_GWEI")
                .map(|v| v.parse::<f64>())
                .transpose()
                .context("Invalid TARGET_GAS_PRICE_GWEI")?,
            notify_tolerance_gwei: parse_or(&lookup, "NOTIFY_TOLERANCE_GWEI", 0.5)?,
            notify_cooldown: Duration::from_secs(parse_or(&lookup, "NOTIFY_COOLDOWN_SECS", 60)?),
            notify_min_savings_eth: parse_or(&lookup, "NOTIFY_MIN_SAVINGS_ETH", 0.001)?,

            synthetic_fee_fallback: Self::parse_switch(lookup("SYNTHETIC_FEE_FALLBACK"))?,

            aggregator_url: lookup("AGGREGATOR_URL")
                .unwrap_or_else(|| "https://api.odos.xyz".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn parse_environment(value: Option<String>) -> Result<Environment> {
        let env = value.unwrap_or_else(|| "development".to_string());

        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testnet" | "test" => Ok(Environment::Testnet),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    fn parse_switch(value: Option<String>) -> Result<bool> {
        match value.as_deref().map(str::to_lowercase).as_deref() {
            None | Some("off") | Some("false") | Some("0") => Ok(false),
            Some("on") | Some("true") | Some("1") => Ok(true),
            Some(other) => bail!("Invalid SYNTHETIC_FEE_FALLBACK: {}", other),
        }
    }

    pub fn chain_id(&self, network: &str) -> Option<u64> {
        self.networks.get(network).map(|n| n.chain_id)
    }

    fn validate(&self) -> Result<()> {
        if self.networks.is_empty() {
            bail!("At least one <NETWORK>_RPC_URL is required (e.g. ETHEREUM_RPC_URL)");
        }

        for endpoint in self.networks.values() {
            if !endpoint.rpc_url.starts_with("http") {
                bail!(
                    "{}_RPC_URL must be HTTP(S) URL",
                    endpoint.name.to_uppercase()
                );
            }
        }

        if let Some(wss) = &self.wss_endpoint {
            if !(wss.starts_with("ws://") || wss.starts_with("wss://")) {
                bail!("WSS_ENDPOINT must be a ws:// or wss:// URL");
            }
        }

        if self.requests_per_second == 0 {
            bail!("REQUESTS_PER_SECOND must be greater than zero");
        }
        if self.retry_attempts == 0 {
            bail!("RETRY_ATTEMPTS must be at least 1");
        }
        if self.notify_tolerance_gwei < 0.0 {
            bail!("NOTIFY_TOLERANCE_GWEI must not be negative");
        }

        tracing::info!(
            "Configuration validated for {:?} environment ({} network(s))",
            self.environment,
            self.networks.len()
        );

        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", key)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_provider_quota() {
        let config = Config::from_lookup(lookup_from(&[(
            "ETHEREUM_RPC_URL",
            "https://eth.example.com",
        )]))
        .unwrap();

        assert_eq!(config.requests_per_second, 120);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_base_delay, Duration::from_millis(1000));
        assert_eq!(config.notify_cooldown, Duration::from_secs(60));
        assert_eq!(config.notify_tolerance_gwei, 0.5);
        assert!(!config.synthetic_fee_fallback);
        assert_eq!(config.chain_id("ethereum"), Some(1));
        assert!(config.wss_endpoint.is_none());
    }

    #[test]
    fn requires_at_least_one_endpoint() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("RPC_URL"));
    }

    #[test]
    fn rejects_non_websocket_stream_endpoint() {
        let result = Config::from_lookup(lookup_from(&[
            ("POLYGON_RPC_URL", "https://polygon.example.com"),
            ("WSS_ENDPOINT", "https://not-a-socket.example.com"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn parses_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("ARBITRUM_RPC_URL", "https://arb.example.com"),
            ("REQUESTS_PER_SECOND", "25"),
            ("TARGET_GAS_PRICE_GWEI", "0.2"),
            ("SYNTHETIC_FEE_FALLBACK", "on"),
            ("STREAM_NETWORK", "Arbitrum"),
        ]))
        .unwrap();

        assert_eq!(config.requests_per_second, 25);
        assert_eq!(config.target_gas_price_gwei, Some(0.2));
        assert!(config.synthetic_fee_fallback);
        assert_eq!(config.stream_network, "arbitrum");
        assert!(config.networks.contains_key("arbitrum"));
        assert!(!config.networks.contains_key("ethereum"));
    }

    #[test]
    fn zero_budget_is_rejected() {
        let result = Config::from_lookup(lookup_from(&[
            ("ETHEREUM_RPC_URL", "https://eth.example.com"),
            ("REQUESTS_PER_SECOND", "0"),
        ]));
        assert!(result.is_err());
    }
}
