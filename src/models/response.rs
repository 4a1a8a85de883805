use crate::models::ConnectionStatus;
use crate::services::rpc_queue::{QueueState, QueueStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: DateTime<Utc>,
    pub data_source: String,
    pub request_id: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, data_source: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now(),
            data_source: data_source.into(),
            request_id: Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct NetworkHealth {
    pub network: String,
    pub queue_state: QueueState,
    pub queue: QueueStats,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub networks: Vec<NetworkHealth>,
    pub stream: ConnectionStatus,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Stats {
    pub analyses_total: u64,
    pub suggestions_total: u64,
    pub eip1559_suggestions: u64,
    pub notifications_total: u64,
    pub potential_savings_eth: f64,
}
