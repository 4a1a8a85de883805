use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fee conditions read from a chain endpoint at one point in time.
///
/// `base_fee_per_gas` is `None` exactly when the endpoint does not expose an
/// EIP-1559 base fee (pre-London or non-standard chains).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSnapshot {
    pub base_fee_per_gas: Option<f64>,
    pub max_priority_fee_per_gas: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

impl FeeSnapshot {
    pub fn supports_eip1559(&self) -> bool {
        self.base_fee_per_gas.is_some()
    }
}

/// Base fee statistics over a window of recent blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeHistoryStats {
    pub average_base_fee: f64,
    pub min_base_fee: f64,
    pub max_base_fee: f64,
    pub weighted_base_fee: f64,
    pub confidence: f64, // 0.0-1.0
    pub blocks_sampled: usize,
    pub latest_block: u64,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceLevel {
    Low,
    Medium,
    High,
}

/// Gwei boundaries for one network, always `low < medium < high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GasThresholds {
    low: f64,
    medium: f64,
    high: f64,
}

impl GasThresholds {
    pub fn new(low: f64, medium: f64, high: f64) -> Result<Self> {
        if !(low < medium && medium < high) {
            bail!(
                "gas thresholds must satisfy low < medium < high (got {}, {}, {})",
                low,
                medium,
                high
            );
        }
        Ok(Self { low, medium, high })
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn classify(&self, gas_price_gwei: f64) -> PriceLevel {
        if gas_price_gwei <= self.low {
            PriceLevel::Low
        } else if gas_price_gwei <= self.medium {
            PriceLevel::Medium
        } else {
            PriceLevel::High
        }
    }
}

#[derive(Debug, Clone)]
pub struct GasThresholdTable {
    entries: HashMap<String, GasThresholds>,
}

impl GasThresholdTable {
    pub const FALLBACK_NETWORK: &'static str = "ethereum";

    /// Thresholds for `network`, or the Ethereum entry when it is unknown.
    pub fn for_network(&self, network: &str) -> GasThresholds {
        self.entries
            .get(&network.to_lowercase())
            .or_else(|| self.entries.get(Self::FALLBACK_NETWORK))
            .copied()
            .unwrap_or(ETHEREUM_THRESHOLDS)
    }
}

const ETHEREUM_THRESHOLDS: GasThresholds = GasThresholds {
    low: 20.0,
    medium: 40.0,
    high: 60.0,
};

impl Default for GasThresholdTable {
    fn default() -> Self {
        let mut entries = HashMap::new();
        entries.insert("ethereum".to_string(), ETHEREUM_THRESHOLDS);
        entries.insert(
            "polygon".to_string(),
            GasThresholds { low: 50.0, medium: 100.0, high: 200.0 },
        );
        entries.insert(
            "arbitrum".to_string(),
            GasThresholds { low: 0.1, medium: 0.3, high: 0.5 },
        );
        Self { entries }
    }
}
