use crate::models::{CandidateTransaction, PriceLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

/// Actionable advice attached to an analysis. Severity only drives styling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Suggestion {
    Delay {
        message: String,
        severity: Severity,
    },
    Eip1559 {
        message: String,
        severity: Severity,
        base_fee: f64,
        priority_fee: f64,
    },
}

impl Suggestion {
    pub fn delay() -> Self {
        Suggestion::Delay {
            message: "Gas prices are high. Consider delaying non-urgent transactions.".to_string(),
            severity: Severity::High,
        }
    }

    pub fn eip1559(fees: &Eip1559Fees) -> Self {
        Suggestion::Eip1559 {
            message: format!(
                "Consider using EIP-1559 with base fee of {:.2} Gwei and priority fee of {:.2} Gwei",
                fees.base_fee, fees.priority_fee
            ),
            severity: Severity::Medium,
            base_fee: fees.base_fee,
            priority_fee: fees.priority_fee,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Suggestion::Delay { message, .. } | Suggestion::Eip1559 { message, .. } => message,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Suggestion::Delay { severity, .. } | Suggestion::Eip1559 { severity, .. } => *severity,
        }
    }

    pub fn is_eip1559(&self) -> bool {
        matches!(self, Suggestion::Eip1559 { .. })
    }
}

/// Upper-bound EIP-1559 fee pair, in Gwei.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Eip1559Fees {
    pub base_fee: f64,
    pub priority_fee: f64,
}

impl Eip1559Fees {
    pub fn total(&self) -> f64 {
        self.base_fee + self.priority_fee
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PotentialSavings {
    pub gwei: f64,
    pub eth: f64,
}

/// Where the base fee used for EIP-1559 math came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeSource {
    Reported,
    Synthetic,
    Unavailable,
}

/// Which placeholder defaults were substituted for missing inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultsApplied {
    /// The 21000-unit transfer placeholder stood in for the gas limit.
    pub gas_limit: bool,
    /// The default priority fee stood in for `eth_maxPriorityFeePerGas`.
    pub priority_fee: bool,
    /// The gas price was read from the network instead of the transaction.
    pub network_gas_price: bool,
}

impl DefaultsApplied {
    pub fn any(&self) -> bool {
        self.gas_limit || self.priority_fee || self.network_gas_price
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasAnalysis {
    pub current_gas_price: f64,
    pub gas_limit: u64,
    pub base_fee_per_gas: Option<f64>,
    pub max_priority_fee_per_gas: Option<f64>,
    pub price_level: PriceLevel,
    pub estimated_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub potential_savings: Option<PotentialSavings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_fees: Option<Eip1559Fees>,
    pub fee_source: FeeSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregator_gas_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub timestamp: DateTime<Utc>,
    pub network: String,
    pub transaction: CandidateTransaction,
    pub gas_analysis: GasAnalysis,
    pub suggestions: Vec<Suggestion>,
    pub defaults: DefaultsApplied,
}

impl AnalysisResult {
    pub fn has_eip1559_suggestion(&self) -> bool {
        self.suggestions.iter().any(Suggestion::is_eip1559)
    }
}
