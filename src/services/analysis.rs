//! Gas price classification and EIP-1559 savings analysis.
//!
//! [`GasAnalysisEngine::evaluate`] is a pure function of a transaction and the
//! market conditions observed for it. [`GasAnalyzer`] gathers those conditions
//! from the network's fee source and hands them to the engine.

use crate::{
    error::GasSaverError,
    models::{
        AnalysisResult, CandidateTransaction, DefaultsApplied, Eip1559Fees, FeeSnapshot, FeeSource,
        GasAnalysis, GasThresholdTable, PotentialSavings, PriceLevel, Suggestion,
    },
    services::chain::ChainRegistry,
};
use futures::future::try_join_all;

/// Placeholder gas limit for transactions that do not state one. This is the
/// cost of a bare value transfer, not an estimate; contract calls will use
/// more, so results built on it are flagged in [`DefaultsApplied`].
pub const DEFAULT_GAS_LIMIT: u64 = 21_000;
/// Priority fee assumed when the endpoint does not report one.
pub const DEFAULT_PRIORITY_FEE_GWEI: f64 = 2.0;
/// Upper bound on next-block base fee growth (12.5% per block).
pub const BASE_FEE_MAX_INCREASE: f64 = 1.125;
/// Upper bound on base fee growth in absolute Gwei.
pub const BASE_FEE_MAX_STEP_GWEI: f64 = 2.0;
/// Priority fee shave applied to the reported tip.
pub const PRIORITY_FEE_SHAVE: f64 = 0.9;

/// Substitute fees for networks that report no base fee.
///
/// The ratios are a heuristic without protocol backing, so the fallback is
/// off unless explicitly enabled and its results are labelled
/// [`FeeSource::Synthetic`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyntheticFeePolicy {
    Disabled,
    Enabled { base_ratio: f64, priority_ratio: f64 },
}

impl SyntheticFeePolicy {
    pub fn enabled() -> Self {
        SyntheticFeePolicy::Enabled {
            base_ratio: 0.9,
            priority_ratio: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeePolicy {
    pub default_gas_limit: u64,
    pub default_priority_fee: f64,
    pub base_fee_max_increase: f64,
    pub base_fee_max_step: f64,
    pub priority_fee_shave: f64,
    pub synthetic: SyntheticFeePolicy,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            default_gas_limit: DEFAULT_GAS_LIMIT,
            default_priority_fee: DEFAULT_PRIORITY_FEE_GWEI,
            base_fee_max_increase: BASE_FEE_MAX_INCREASE,
            base_fee_max_step: BASE_FEE_MAX_STEP_GWEI,
            priority_fee_shave: PRIORITY_FEE_SHAVE,
            synthetic: SyntheticFeePolicy::Disabled,
        }
    }
}

impl FeePolicy {
    /// Bounded fee pair: the base fee can grow at most by the protocol step,
    /// the tip is shaved but never raised.
    pub fn candidate_fees(&self, base_fee: f64, priority_fee: f64) -> Eip1559Fees {
        Eip1559Fees {
            base_fee: (base_fee * self.base_fee_max_increase).min(base_fee + self.base_fee_max_step),
            priority_fee: (priority_fee * self.priority_fee_shave).min(priority_fee),
        }
    }
}

/// Everything the engine needs to know about the network, captured up front.
#[derive(Debug, Clone)]
pub struct MarketConditions {
    pub snapshot: FeeSnapshot,
    /// `eth_gasPrice`, needed only when the transaction states no price.
    pub network_gas_price: Option<f64>,
    /// `gweiPerGas` from a swap-routing quote, when one was requested.
    pub aggregator_gas_price: Option<f64>,
}

impl MarketConditions {
    pub fn from_snapshot(snapshot: FeeSnapshot) -> Self {
        Self {
            snapshot,
            network_gas_price: None,
            aggregator_gas_price: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GasAnalysisEngine {
    thresholds: GasThresholdTable,
    policy: FeePolicy,
}

impl GasAnalysisEngine {
    pub fn new(thresholds: GasThresholdTable, policy: FeePolicy) -> Self {
        Self { thresholds, policy }
    }

    pub fn evaluate(
        &self,
        tx: &CandidateTransaction,
        network: &str,
        market: &MarketConditions,
    ) -> Result<AnalysisResult, GasSaverError> {
        let mut defaults = DefaultsApplied::default();

        let current_gas_price = match tx.stated_gas_price() {
            Some(price) => price,
            None => {
                defaults.network_gas_price = true;
                market.network_gas_price.ok_or_else(|| {
                    GasSaverError::Analysis(
                        "transaction states no gas price and no network gas price is available"
                            .to_string(),
                    )
                })?
            }
        };
        if !current_gas_price.is_finite() || current_gas_price < 0.0 {
            return Err(GasSaverError::Analysis(format!(
                "invalid gas price: {}",
                current_gas_price
            )));
        }

        let gas_limit = match tx.gas_limit {
            Some(limit) => limit,
            None => {
                defaults.gas_limit = true;
                self.policy.default_gas_limit
            }
        };

        let price_level = self.thresholds.for_network(network).classify(current_gas_price);

        let mut suggestions = Vec::new();
        if price_level == PriceLevel::High {
            suggestions.push(Suggestion::delay());
        }

        let snapshot = &market.snapshot;
        let (base_fee, fee_source) = match (snapshot.base_fee_per_gas, self.policy.synthetic) {
            (Some(base_fee), _) => (Some(base_fee), FeeSource::Reported),
            (None, SyntheticFeePolicy::Enabled { base_ratio, .. }) => {
                (Some(current_gas_price * base_ratio), FeeSource::Synthetic)
            }
            (None, SyntheticFeePolicy::Disabled) => (None, FeeSource::Unavailable),
        };

        let mut recommended_fees = None;
        let mut potential_savings = None;
        if let Some(base_fee) = base_fee {
            let priority_fee = match (snapshot.max_priority_fee_per_gas, self.policy.synthetic) {
                (Some(fee), _) => fee,
                (None, SyntheticFeePolicy::Enabled { priority_ratio, .. })
                    if fee_source == FeeSource::Synthetic =>
                {
                    current_gas_price * priority_ratio
                }
                _ => {
                    defaults.priority_fee = true;
                    self.policy.default_priority_fee
                }
            };

            let fees = self.policy.candidate_fees(base_fee, priority_fee);
            if current_gas_price > fees.total() {
                let gwei = current_gas_price - fees.total();
                potential_savings = Some(PotentialSavings {
                    gwei,
                    eth: gwei * gas_limit as f64 / 1e9,
                });
                suggestions.push(Suggestion::eip1559(&fees));
            }
            recommended_fees = Some(fees);
        }

        Ok(AnalysisResult {
            timestamp: snapshot.observed_at,
            network: network.to_string(),
            transaction: tx.clone(),
            gas_analysis: GasAnalysis {
                current_gas_price,
                gas_limit,
                base_fee_per_gas: snapshot.base_fee_per_gas,
                max_priority_fee_per_gas: snapshot.max_priority_fee_per_gas,
                price_level,
                estimated_cost: current_gas_price * gas_limit as f64 / 1e9,
                potential_savings,
                recommended_fees,
                fee_source,
                aggregator_gas_price: market.aggregator_gas_price,
            },
            suggestions,
            defaults,
        })
    }
}

/// Collects market conditions for a network and runs the engine.
pub struct GasAnalyzer {
    engine: GasAnalysisEngine,
    registry: ChainRegistry,
}

impl GasAnalyzer {
    pub fn new(engine: GasAnalysisEngine, registry: ChainRegistry) -> Self {
        Self { engine, registry }
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    pub async fn analyze(
        &self,
        tx: &CandidateTransaction,
        network: &str,
    ) -> Result<AnalysisResult, GasSaverError> {
        self.analyze_with_quote(tx, network, None).await
    }

    pub async fn analyze_with_quote(
        &self,
        tx: &CandidateTransaction,
        network: &str,
        aggregator_gas_price: Option<f64>,
    ) -> Result<AnalysisResult, GasSaverError> {
        let source = self.registry.get(network)?;
        let snapshot = source.snapshot().await;

        let network_gas_price = match tx.stated_gas_price() {
            Some(_) => None,
            None => Some(source.gas_price().await?),
        };

        let market = MarketConditions {
            snapshot,
            network_gas_price,
            aggregator_gas_price,
        };
        let result = self.engine.evaluate(tx, network, &market)?;

        tracing::debug!(
            "Analyzed {:?} on {}: {:.2} gwei ({:?}), {} suggestion(s)",
            tx.hash,
            network,
            result.gas_analysis.current_gas_price,
            result.gas_analysis.price_level,
            result.suggestions.len()
        );

        Ok(result)
    }

    /// Analyze several candidates; the first failure aborts the batch.
    pub async fn batch_analyze(
        &self,
        txs: &[CandidateTransaction],
        network: &str,
    ) -> Result<Vec<AnalysisResult>, GasSaverError> {
        try_join_all(txs.iter().map(|tx| self.analyze(tx, network))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ethers::types::{Address, U256};

    fn snapshot(base_fee: Option<f64>, priority_fee: Option<f64>) -> FeeSnapshot {
        FeeSnapshot {
            base_fee_per_gas: base_fee,
            max_priority_fee_per_gas: priority_fee,
            observed_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    fn tx(gas_price: Option<f64>, gas_limit: Option<u64>) -> CandidateTransaction {
        let mut tx = CandidateTransaction::transfer(Address::repeat_byte(0x42), U256::zero(), "ethereum");
        tx.gas_price = gas_price;
        tx.gas_limit = gas_limit;
        tx
    }

    fn evaluate(tx: &CandidateTransaction, snapshot: FeeSnapshot) -> AnalysisResult {
        GasAnalysisEngine::default()
            .evaluate(tx, "ethereum", &MarketConditions::from_snapshot(snapshot))
            .unwrap()
    }

    #[test]
    fn eip1559_savings_scenario() {
        let result = evaluate(&tx(Some(50.0), Some(21_000)), snapshot(Some(30.0), Some(2.0)));

        let fees = result.gas_analysis.recommended_fees.unwrap();
        assert!((fees.base_fee - 32.0).abs() < 1e-9);
        assert!((fees.priority_fee - 1.8).abs() < 1e-9);
        assert!((fees.total() - 33.8).abs() < 1e-9);

        assert!(result.has_eip1559_suggestion());
        let savings = result.gas_analysis.potential_savings.unwrap();
        assert!((savings.gwei - 16.2).abs() < 1e-9);
        assert!((savings.eth - 16.2 * 21_000.0 / 1e9).abs() < 1e-15);
        assert_eq!(result.gas_analysis.fee_source, FeeSource::Reported);
    }

    #[test]
    fn high_price_suggests_delay() {
        let result = evaluate(&tx(Some(65.0), Some(21_000)), snapshot(None, None));

        assert_eq!(result.gas_analysis.price_level, PriceLevel::High);
        assert!(result
            .suggestions
            .iter()
            .any(|s| matches!(s, Suggestion::Delay { .. })));
    }

    #[test]
    fn missing_base_fee_skips_eip1559_math() {
        for price in [1.0, 35.0, 65.0, 500.0] {
            let result = evaluate(&tx(Some(price), None), snapshot(None, Some(2.0)));
            assert!(!result.has_eip1559_suggestion());
            assert!(result.gas_analysis.potential_savings.is_none());
            assert!(result.gas_analysis.recommended_fees.is_none());
            assert_eq!(result.gas_analysis.fee_source, FeeSource::Unavailable);
        }
    }

    #[test]
    fn savings_present_iff_eip1559_suggested() {
        for price in [10.0, 33.8, 33.81, 45.0, 90.0] {
            let result = evaluate(&tx(Some(price), Some(50_000)), snapshot(Some(30.0), Some(2.0)));
            assert_eq!(
                result.gas_analysis.potential_savings.is_some(),
                result.has_eip1559_suggestion(),
                "price {}",
                price
            );
        }
    }

    #[test]
    fn cost_uses_gas_limit() {
        let result = evaluate(&tx(Some(40.0), Some(100_000)), snapshot(Some(30.0), Some(2.0)));
        assert!((result.gas_analysis.estimated_cost - 0.004).abs() < 1e-12);
        assert_eq!(result.gas_analysis.price_level, PriceLevel::Medium);
    }

    #[test]
    fn defaults_are_reported() {
        let result = evaluate(&tx(Some(50.0), None), snapshot(Some(30.0), None));

        assert_eq!(result.gas_analysis.gas_limit, DEFAULT_GAS_LIMIT);
        assert!(result.defaults.gas_limit);
        assert!(result.defaults.priority_fee);
        assert!(!result.defaults.network_gas_price);
        // Default 2 gwei tip shaved to 1.8
        let fees = result.gas_analysis.recommended_fees.unwrap();
        assert!((fees.priority_fee - 1.8).abs() < 1e-9);
    }

    #[test]
    fn falls_back_to_network_price() {
        let market = MarketConditions {
            snapshot: snapshot(Some(30.0), Some(2.0)),
            network_gas_price: Some(25.0),
            aggregator_gas_price: Some(24.0),
        };
        let result = GasAnalysisEngine::default()
            .evaluate(&tx(None, Some(21_000)), "ethereum", &market)
            .unwrap();

        assert_eq!(result.gas_analysis.current_gas_price, 25.0);
        assert!(result.defaults.network_gas_price);
        assert_eq!(result.gas_analysis.aggregator_gas_price, Some(24.0));
    }

    #[test]
    fn no_price_anywhere_is_an_analysis_error() {
        let err = GasAnalysisEngine::default()
            .evaluate(
                &tx(None, None),
                "ethereum",
                &MarketConditions::from_snapshot(snapshot(Some(30.0), Some(2.0))),
            )
            .unwrap_err();
        assert!(matches!(err, GasSaverError::Analysis(_)));
    }

    #[test]
    fn evaluation_is_idempotent() {
        let tx = tx(Some(72.5), Some(65_000));
        let first = evaluate(&tx, snapshot(Some(41.0), Some(1.5)));
        let second = evaluate(&tx, snapshot(Some(41.0), Some(1.5)));
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn synthetic_fallback_is_labelled() {
        let engine = GasAnalysisEngine::new(
            GasThresholdTable::default(),
            FeePolicy {
                synthetic: SyntheticFeePolicy::enabled(),
                ..Default::default()
            },
        );
        let result = engine
            .evaluate(
                &tx(Some(300.0), Some(21_000)),
                "polygon",
                &MarketConditions::from_snapshot(snapshot(None, None)),
            )
            .unwrap();

        assert_eq!(result.gas_analysis.fee_source, FeeSource::Synthetic);
        assert!(!result.defaults.priority_fee);
        // base min(270 * 1.125, 272) = 272, tip 30 * 0.9 = 27
        let fees = result.gas_analysis.recommended_fees.unwrap();
        assert!((fees.base_fee - 272.0).abs() < 1e-9);
        assert!((fees.priority_fee - 27.0).abs() < 1e-9);
        assert!(result.has_eip1559_suggestion());
        assert!((result.gas_analysis.potential_savings.unwrap().gwei - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_network_uses_ethereum_thresholds() {
        let result = GasAnalysisEngine::default()
            .evaluate(
                &tx(Some(65.0), None),
                "fantom",
                &MarketConditions::from_snapshot(snapshot(None, None)),
            )
            .unwrap();
        assert_eq!(result.gas_analysis.price_level, PriceLevel::High);
        assert_eq!(result.network, "fantom");
    }
}
