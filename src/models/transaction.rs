use ethers::types::{Address, Bytes, Transaction, H256, U256};
use ethers::utils::format_units;
use serde::{Deserialize, Serialize};

/// A transaction under analysis, with fee fields normalized to Gwei.
///
/// Constructed per analysis call or per stream event and never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTransaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<H256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    /// Legacy gas price in Gwei.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<f64>,
    /// EIP-1559 fee cap in Gwei.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    /// Value in wei.
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default = "default_network")]
    pub network: String,
}

fn default_network() -> String {
    "ethereum".to_string()
}

impl CandidateTransaction {
    /// A plain value transfer with nothing but a destination, used as the
    /// reference transaction for fee monitoring.
    pub fn transfer(to: Address, value: U256, network: &str) -> Self {
        Self {
            hash: None,
            from: None,
            to: Some(to),
            gas_price: None,
            max_fee_per_gas: None,
            gas_limit: None,
            value,
            data: Bytes::default(),
            network: network.to_string(),
        }
    }

    /// Normalize a transaction fetched from the chain.
    pub fn from_pending(tx: &Transaction, network: &str) -> Self {
        Self {
            hash: Some(tx.hash),
            from: Some(tx.from),
            to: tx.to,
            gas_price: tx.gas_price.and_then(wei_to_gwei),
            max_fee_per_gas: tx.max_fee_per_gas.and_then(wei_to_gwei),
            gas_limit: u64::try_from(tx.gas).ok(),
            value: tx.value,
            data: tx.input.clone(),
            network: network.to_string(),
        }
    }

    /// The price the sender is offering, preferring an explicit legacy price.
    pub fn stated_gas_price(&self) -> Option<f64> {
        self.gas_price.or(self.max_fee_per_gas)
    }
}

pub fn wei_to_gwei(wei: U256) -> Option<f64> {
    format_units(wei, "gwei").ok()?.parse().ok()
}
