use crate::models::Severity;
use chrono::{DateTime, Utc};
use ethers::types::TxHash;
use serde::{Deserialize, Serialize};

/// Raised when the network price reaches the user's target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub title: String,
    pub message: String,
    pub current_gas_price: f64,
    pub target_gas_price: f64,
    pub recommended_gas_price: f64,
    pub potential_savings_eth: f64,
    pub fired_at: DateTime<Utc>,
}

/// First suggestion of a stream entry that had any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionNotice {
    pub transaction_hash: Option<TxHash>,
    pub message: String,
    pub severity: Severity,
    /// 0.0 when the entry carried no savings estimate.
    pub savings_eth: f64,
    pub observed_at: DateTime<Utc>,
}

/// Latest stream entry whose savings were worth acting on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentOptimization {
    pub current_gas_price: f64,
    pub recommended_gas_price: f64,
    pub potential_savings_eth: f64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TargetPrice {
    pub target_gwei: Option<f64>,
}
