use ethers::types::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputToken {
    pub token_address: Address,
    /// Amount in the token's base units, as a decimal string.
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputToken {
    pub token_address: Address,
    pub proportion: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub chain_id: u64,
    pub input_tokens: Vec<InputToken>,
    pub output_tokens: Vec<OutputToken>,
    pub user_addr: Address,
    pub slippage_limit_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    #[serde(default)]
    pub gwei_per_gas: Option<f64>,
    #[serde(default)]
    pub gas_estimate: Option<f64>,
    #[serde(default)]
    pub out_amounts: Vec<String>,
    #[serde(default)]
    pub path_id: Option<String>,
}
