use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum GasSaverError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Configuration error: no RPC endpoint configured for network '{0}'")]
    MissingNetwork(String),

    #[error("Transient RPC error after {attempts} attempt(s): {message}")]
    TransientRpc { message: String, attempts: u32 },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Stream event error: {0}")]
    StreamEvent(String),

    #[error("Aggregator error: {0}")]
    Aggregator(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
}

impl GasSaverError {
    /// Errors worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, GasSaverError::TransientRpc { .. })
    }

    pub fn missing_network(network: &str) -> Self {
        GasSaverError::MissingNetwork(network.to_lowercase())
    }

    fn remediation(&self) -> Option<String> {
        match self {
            GasSaverError::MissingNetwork(network) => Some(format!(
                "Configure endpoint for network {0}: set {0}_RPC_URL and restart",
                network.to_uppercase()
            )),
            GasSaverError::ConfigError(_) => {
                Some("Check the service environment variables and restart".to_string())
            }
            GasSaverError::TransientRpc { .. } => {
                Some("The chain endpoint is unavailable, retry shortly".to_string())
            }
            _ => None,
        }
    }

    fn retry_count(&self) -> Option<u32> {
        match self {
            GasSaverError::TransientRpc { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub retryable: bool,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl IntoResponse for GasSaverError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();

        let (status, error_code) = match &self {
            GasSaverError::ConfigError(_) | GasSaverError::MissingNetwork(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "CONFIGURATION_ERROR")
            }
            GasSaverError::TransientRpc { .. } => (StatusCode::BAD_GATEWAY, "UPSTREAM_UNAVAILABLE"),
            GasSaverError::Rpc { .. } => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            GasSaverError::Analysis(_) => (StatusCode::UNPROCESSABLE_ENTITY, "ANALYSIS_FAILED"),
            GasSaverError::Aggregator(_) => (StatusCode::BAD_GATEWAY, "AGGREGATOR_ERROR"),
            GasSaverError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            error_code: error_code.to_string(),
            retryable: self.is_transient(),
            timestamp: Utc::now(),
            request_id,
            retry_count: self.retry_count(),
            remediation: self.remediation(),
        };

        tracing::error!(
            error = ?self,
            error_code = error_code,
            "Request failed"
        );

        (status, Json(body)).into_response()
    }
}
