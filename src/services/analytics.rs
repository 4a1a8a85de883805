use crate::models::{AnalysisResult, GasAnalysis, Stats, Suggestion};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Process-wide counters for the stats endpoint and dashboard.
pub struct Analytics {
    analyses_total: AtomicU64,
    suggestions_total: AtomicU64,
    eip1559_suggestions: AtomicU64,
    notifications_total: AtomicU64,
    // f64 bit pattern
    potential_savings_eth: AtomicU64,
    start_time: Instant,
}

impl Default for Analytics {
    fn default() -> Self {
        Self::new()
    }
}

impl Analytics {
    pub fn new() -> Self {
        Self {
            analyses_total: AtomicU64::new(0),
            suggestions_total: AtomicU64::new(0),
            eip1559_suggestions: AtomicU64::new(0),
            notifications_total: AtomicU64::new(0),
            potential_savings_eth: AtomicU64::new(0f64.to_bits()),
            start_time: Instant::now(),
        }
    }

    pub fn record_analysis(&self, result: &AnalysisResult) {
        self.record(&result.gas_analysis, &result.suggestions);

        tracing::debug!(
            "Analysis recorded for {} with {} suggestion(s)",
            result.network,
            result.suggestions.len()
        );
    }

    pub fn record(&self, analysis: &GasAnalysis, suggestions: &[Suggestion]) {
        self.analyses_total.fetch_add(1, Ordering::SeqCst);
        self.suggestions_total
            .fetch_add(suggestions.len() as u64, Ordering::SeqCst);

        if suggestions.iter().any(Suggestion::is_eip1559) {
            self.eip1559_suggestions.fetch_add(1, Ordering::SeqCst);
        }

        if let Some(savings) = analysis.potential_savings {
            let _ = self.potential_savings_eth.fetch_update(
                Ordering::SeqCst,
                Ordering::SeqCst,
                |bits| Some((f64::from_bits(bits) + savings.eth).to_bits()),
            );
        }
    }

    pub fn record_notification(&self) {
        self.notifications_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get_stats(&self) -> Stats {
        Stats {
            analyses_total: self.analyses_total.load(Ordering::SeqCst),
            suggestions_total: self.suggestions_total.load(Ordering::SeqCst),
            eip1559_suggestions: self.eip1559_suggestions.load(Ordering::SeqCst),
            notifications_total: self.notifications_total.load(Ordering::SeqCst),
            potential_savings_eth: f64::from_bits(self.potential_savings_eth.load(Ordering::SeqCst)),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::analysis::{GasAnalysisEngine, MarketConditions};
    use crate::models::{CandidateTransaction, FeeSnapshot};
    use chrono::Utc;
    use ethers::types::{Address, U256};

    #[test]
    fn counts_analyses_and_savings() {
        let engine = GasAnalysisEngine::default();
        let mut tx = CandidateTransaction::transfer(Address::zero(), U256::zero(), "ethereum");
        tx.gas_price = Some(50.0);
        let market = MarketConditions::from_snapshot(FeeSnapshot {
            base_fee_per_gas: Some(30.0),
            max_priority_fee_per_gas: Some(2.0),
            observed_at: Utc::now(),
        });
        let result = engine.evaluate(&tx, "ethereum", &market).unwrap();

        let analytics = Analytics::new();
        analytics.record_analysis(&result);
        analytics.record_analysis(&result);
        analytics.record_notification();

        let stats = analytics.get_stats();
        assert_eq!(stats.analyses_total, 2);
        assert_eq!(stats.eip1559_suggestions, 2);
        assert_eq!(stats.notifications_total, 1);
        let per_tx = result.gas_analysis.potential_savings.unwrap().eth;
        assert!((stats.potential_savings_eth - 2.0 * per_tx).abs() < 1e-12);
    }
}
