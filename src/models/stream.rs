use crate::models::{AnalysisResult, CandidateTransaction, GasAnalysis, Suggestion};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Optimization {
    pub suggestions: Vec<Suggestion>,
}

/// One observed pending transaction, with its analysis when it succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEntry {
    #[serde(flatten)]
    pub transaction: CandidateTransaction,
    pub observed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimization: Option<Optimization>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_analysis: Option<GasAnalysis>,
}

impl StreamEntry {
    pub fn analyzed(result: AnalysisResult, observed_at: DateTime<Utc>) -> Self {
        Self {
            transaction: result.transaction,
            observed_at,
            optimization: Some(Optimization {
                suggestions: result.suggestions,
            }),
            gas_analysis: Some(result.gas_analysis),
        }
    }

    pub fn raw(transaction: CandidateTransaction, observed_at: DateTime<Utc>) -> Self {
        Self {
            transaction,
            observed_at,
            optimization: None,
            gas_analysis: None,
        }
    }

    pub fn is_optimizable(&self) -> bool {
        self.optimization
            .as_ref()
            .map(|o| !o.suggestions.is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Idle,
    Connected,
    Disconnected { last_error: Option<String> },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamStats {
    pub total_transactions: usize,
    pub average_gas_price: Option<f64>,
    pub optimizable_transactions: usize,
}
