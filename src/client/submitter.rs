use crate::models::AnalysisResult;
use anyhow::{Context, Result};
use ethers::{
    prelude::*,
    providers::{Http, Provider},
    types::{transaction::eip2718::TypedTransaction, Address, U256},
    utils::parse_units,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ERC-20 surface needed for stablecoin transfers
abigen!(
    IERC20,
    r#"[
        function transfer(address to, uint256 amount) external returns (bool)
        function balanceOf(address account) external view returns (uint256)
        function decimals() external view returns (uint8)
    ]"#
);

/// Fees to submit with, in Gwei, derived from an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecommendedFees {
    Eip1559 {
        max_fee_per_gas: f64,
        max_priority_fee_per_gas: f64,
    },
    Legacy {
        gas_price: f64,
    },
}

impl RecommendedFees {
    /// Use the EIP-1559 pair when the analysis suggested one, otherwise the
    /// cheaper of the current price and the aggregator's quoted price.
    pub fn from_analysis(result: &AnalysisResult) -> Self {
        let analysis = &result.gas_analysis;
        match analysis.recommended_fees {
            Some(fees) if result.has_eip1559_suggestion() => RecommendedFees::Eip1559 {
                max_fee_per_gas: fees.total(),
                max_priority_fee_per_gas: fees.priority_fee,
            },
            _ => {
                let gas_price = match analysis.aggregator_gas_price {
                    Some(quoted) if quoted > 0.0 => analysis.current_gas_price.min(quoted),
                    _ => analysis.current_gas_price,
                };
                RecommendedFees::Legacy { gas_price }
            }
        }
    }
}

pub fn gwei_to_wei(gwei: f64) -> Result<U256> {
    let units = parse_units(format!("{:.9}", gwei), "gwei")
        .with_context(|| format!("Invalid gas price: {} gwei", gwei))?;
    Ok(units.into())
}

/// A native value transfer priced with `fees`.
pub fn native_transfer(to: Address, value: U256, fees: &RecommendedFees) -> Result<TypedTransaction> {
    let tx = match *fees {
        RecommendedFees::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => Eip1559TransactionRequest::new()
            .to(to)
            .value(value)
            .max_fee_per_gas(gwei_to_wei(max_fee_per_gas)?)
            .max_priority_fee_per_gas(gwei_to_wei(max_priority_fee_per_gas)?)
            .into(),
        RecommendedFees::Legacy { gas_price } => TransactionRequest::new()
            .to(to)
            .value(value)
            .gas_price(gwei_to_wei(gas_price)?)
            .into(),
    };
    Ok(tx)
}

pub struct TransactionSubmitter {
    provider: Arc<SignerMiddleware<Provider<Http>, LocalWallet>>,
}

impl TransactionSubmitter {
    pub fn new(rpc_url: &str, private_key: &str, chain_id: u64) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .with_context(|| format!("Invalid RPC URL: {}", rpc_url))?;

        let wallet = private_key
            .parse::<LocalWallet>()
            .context("Invalid private key")?
            .with_chain_id(chain_id);

        Ok(Self {
            provider: Arc::new(SignerMiddleware::new(provider, wallet)),
        })
    }

    pub fn address(&self) -> Address {
        self.provider.address()
    }

    pub async fn submit_native(
        &self,
        to: Address,
        value: U256,
        fees: &RecommendedFees,
    ) -> Result<TransactionReceipt> {
        tracing::info!("Sending {} wei to {:?} with {:?}", value, to, fees);

        let tx = native_transfer(to, value, fees)?;
        let pending = self
            .provider
            .send_transaction(tx, None)
            .await
            .context("Failed to send transaction")?;

        self.confirm(pending).await
    }

    /// Transfer `amount` (human units, e.g. "12.5") of an ERC-20 token.
    pub async fn submit_stablecoin(
        &self,
        token: Address,
        to: Address,
        amount: &str,
        fees: &RecommendedFees,
    ) -> Result<TransactionReceipt> {
        let erc20 = IERC20::new(token, self.provider.clone());
        let decimals = erc20.decimals().call().await.context("Failed to read token decimals")?;
        let amount_units: U256 = parse_units(amount.trim(), decimals as u32)
            .with_context(|| format!("Invalid token amount: {}", amount))?
            .into();

        let balance = erc20.balance_of(self.address()).call().await?;
        if balance < amount_units {
            anyhow::bail!("Insufficient token balance: {} < {}", balance, amount_units);
        }

        tracing::info!("Sending {} of token {:?} to {:?} with {:?}", amount, token, to, fees);

        let mut call = erc20.transfer(to, amount_units);
        match *fees {
            RecommendedFees::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                if let TypedTransaction::Eip1559(inner) = &mut call.tx {
                    inner.max_fee_per_gas = Some(gwei_to_wei(max_fee_per_gas)?);
                    inner.max_priority_fee_per_gas = Some(gwei_to_wei(max_priority_fee_per_gas)?);
                }
            }
            RecommendedFees::Legacy { gas_price } => {
                call = call.legacy().gas_price(gwei_to_wei(gas_price)?);
            }
        }

        let pending = call.send().await.context("Failed to send token transfer")?;
        self.confirm(pending).await
    }

    async fn confirm(
        &self,
        pending: PendingTransaction<'_, Http>,
    ) -> Result<TransactionReceipt> {
        tracing::info!("Transaction {:?} sent, waiting for confirmation...", *pending);

        let receipt = pending
            .await
            .context("Failed to get transaction receipt")?
            .ok_or_else(|| anyhow::anyhow!("Transaction dropped"))?;

        if receipt.status != Some(1.into()) {
            anyhow::bail!("Transaction {:?} failed onchain", receipt.transaction_hash);
        }

        tracing::info!("Transaction confirmed: {:?}", receipt.transaction_hash);
        Ok(receipt)
    }
}
