use crate::{
    error::GasSaverError,
    models::{FeeHistoryStats, FeeSnapshot},
    services::{retry::RetryPolicy, rpc_queue::RateLimitedRequestQueue},
};
use chrono::Utc;
use moka::future::Cache;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const SNAPSHOT_KEY: &str = "fee:snapshot";

/// Parse a hex wei quantity (`"0x6fc23ac00"`) into Gwei. Anything that is not
/// a hex string counts as unavailable.
pub fn parse_hex_gwei(value: &Value) -> Option<f64> {
    let raw = value.as_str()?;
    let digits = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X"))?;
    let wei = u128::from_str_radix(digits, 16).ok()?;
    Some(wei as f64 / 1e9)
}

fn parse_hex_u64(value: &Value) -> Option<u64> {
    let raw = value.as_str()?;
    u64::from_str_radix(raw.trim_start_matches("0x"), 16).ok()
}

/// Current fee conditions for one network, read through its request queue.
pub struct FeeHistorySource {
    network: String,
    queue: Arc<RateLimitedRequestQueue>,
    retry: RetryPolicy,
    cache: Cache<&'static str, FeeSnapshot>,
}

impl FeeHistorySource {
    pub fn new(
        network: &str,
        queue: Arc<RateLimitedRequestQueue>,
        retry: RetryPolicy,
        cache_ttl: Duration,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(cache_ttl)
            .build();

        Self {
            network: network.to_string(),
            queue,
            retry,
            cache,
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn queue(&self) -> &Arc<RateLimitedRequestQueue> {
        &self.queue
    }

    /// Base fee and priority fee, each independently `None` when the
    /// endpoint cannot supply it. Served from a short-lived cache.
    pub async fn snapshot(&self) -> FeeSnapshot {
        if let Some(cached) = self.cache.get(SNAPSHOT_KEY).await {
            tracing::debug!("Returning cached fee snapshot for {}", self.network);
            return cached;
        }
        self.refresh().await
    }

    /// Bypass the cache and read fresh values.
    pub async fn refresh(&self) -> FeeSnapshot {
        let (base_fee_per_gas, max_priority_fee_per_gas) =
            tokio::join!(self.base_fee(), self.max_priority_fee());

        let snapshot = FeeSnapshot {
            base_fee_per_gas,
            max_priority_fee_per_gas,
            observed_at: Utc::now(),
        };
        self.cache.insert(SNAPSHOT_KEY, snapshot.clone()).await;

        tracing::debug!(
            "Fee snapshot for {}: base={:?} gwei, priority={:?} gwei",
            self.network,
            snapshot.base_fee_per_gas,
            snapshot.max_priority_fee_per_gas
        );

        snapshot
    }

    /// `eth_gasPrice` in Gwei. Transient failures are retried with backoff;
    /// once the budget is spent there is nothing to analyze against.
    pub async fn gas_price(&self) -> Result<f64, GasSaverError> {
        let raw = self
            .retry
            .run("eth_gasPrice", || self.queue.gas_price())
            .await
            .map_err(|e| {
                GasSaverError::Analysis(format!(
                    "no gas price obtainable for {}: {}",
                    self.network, e
                ))
            })?;

        parse_hex_gwei(&raw).ok_or_else(|| {
            GasSaverError::Analysis(format!(
                "unparseable eth_gasPrice result for {}: {}",
                self.network, raw
            ))
        })
    }

    pub async fn base_fee(&self) -> Option<f64> {
        let block = self
            .retry
            .run("eth_getBlockByNumber", || self.queue.get_block_by_number("latest", false))
            .await;

        match block {
            Ok(block) => block.get("baseFeePerGas").and_then(parse_hex_gwei),
            Err(e) => {
                tracing::warn!("Base fee unavailable for {}: {}", self.network, e);
                None
            }
        }
    }

    pub async fn max_priority_fee(&self) -> Option<f64> {
        match self
            .retry
            .run("eth_maxPriorityFeePerGas", || self.queue.max_priority_fee_per_gas())
            .await
        {
            Ok(raw) => parse_hex_gwei(&raw),
            Err(e) => {
                tracing::warn!("Priority fee unavailable for {}: {}", self.network, e);
                None
            }
        }
    }

    /// Base fee statistics over the last `blocks` blocks.
    pub async fn history(&self, blocks: u64) -> Result<FeeHistoryStats, GasSaverError> {
        let latest_raw = self
            .retry
            .run("eth_blockNumber", || self.queue.block_number())
            .await?;
        let latest = parse_hex_u64(&latest_raw).ok_or_else(|| {
            GasSaverError::Analysis(format!("unparseable eth_blockNumber result: {}", latest_raw))
        })?;

        let start = latest.saturating_sub(blocks.saturating_sub(1));
        let mut base_fees = Vec::new();
        for number in start..=latest {
            let tag = format!("0x{:x}", number);
            match self.queue.get_block_by_number(&tag, false).await {
                Ok(block) => {
                    if let Some(fee) = block.get("baseFeePerGas").and_then(parse_hex_gwei) {
                        base_fees.push(fee);
                    }
                }
                Err(e) => tracing::warn!("Error fetching block {}: {}", number, e),
            }
        }

        calculate_history(&base_fees, latest).ok_or_else(|| {
            GasSaverError::Analysis(format!(
                "no base fee data in the last {} blocks of {}",
                blocks, self.network
            ))
        })
    }
}

/// Statistics over base fees ordered oldest to newest.
pub fn calculate_history(base_fees: &[f64], latest_block: u64) -> Option<FeeHistoryStats> {
    if base_fees.is_empty() {
        return None;
    }

    let n = base_fees.len();
    let average = base_fees.iter().sum::<f64>() / n as f64;
    let min = base_fees.iter().copied().fold(f64::INFINITY, f64::min);
    let max = base_fees.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let weights = generate_exponential_weights(n);
    let weighted: f64 = base_fees
        .iter()
        .zip(weights.iter())
        .map(|(fee, weight)| fee * weight)
        .sum();

    Some(FeeHistoryStats {
        average_base_fee: average,
        min_base_fee: min,
        max_base_fee: max,
        weighted_base_fee: weighted,
        confidence: calculate_confidence(base_fees, weighted),
        blocks_sampled: n,
        latest_block,
        computed_at: Utc::now(),
    })
}

fn generate_exponential_weights(n: usize) -> Vec<f64> {
    let decay: f64 = 0.95;
    let weights: Vec<f64> = (0..n)
        .rev() // Most recent gets the highest weight
        .map(|i| decay.powi(i as i32))
        .collect();

    let sum: f64 = weights.iter().sum();
    weights.iter().map(|w| w / sum).collect()
}

fn calculate_confidence(base_fees: &[f64], mean: f64) -> f64 {
    if base_fees.len() < 2 || mean <= 0.0 {
        return 0.5;
    }

    let variance: f64 = base_fees
        .iter()
        .map(|fee| {
            let diff = fee - mean;
            diff * diff
        })
        .sum::<f64>()
        / base_fees.len() as f64;

    // Lower spread relative to the mean means higher confidence
    let confidence = 1.0 / (1.0 + variance.sqrt() / mean);
    confidence.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_hex_wei_into_gwei() {
        assert_eq!(parse_hex_gwei(&json!("0x6fc23ac00")), Some(30.0));
        assert_eq!(parse_hex_gwei(&json!("0x77359400")), Some(2.0));
    }

    #[test]
    fn bad_quantities_are_unavailable() {
        assert_eq!(parse_hex_gwei(&json!(null)), None);
        assert_eq!(parse_hex_gwei(&json!("30")), None);
        assert_eq!(parse_hex_gwei(&json!("0xnothex")), None);
        assert_eq!(parse_hex_gwei(&json!(30)), None);
    }

    #[test]
    fn history_weights_recent_blocks_more() {
        let stats = calculate_history(&[10.0, 10.0, 10.0, 40.0], 100).unwrap();
        assert_eq!(stats.average_base_fee, 17.5);
        assert_eq!(stats.min_base_fee, 10.0);
        assert_eq!(stats.max_base_fee, 40.0);
        assert!(stats.weighted_base_fee > stats.average_base_fee);
        assert!(stats.confidence > 0.0 && stats.confidence < 1.0);
        assert_eq!(stats.blocks_sampled, 4);
    }

    #[test]
    fn flat_history_is_fully_confident() {
        let stats = calculate_history(&[25.0; 10], 7).unwrap();
        assert!((stats.weighted_base_fee - 25.0).abs() < 1e-9);
        assert!((stats.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_history_has_no_stats() {
        assert!(calculate_history(&[], 1).is_none());
    }
}
