use crate::{
    error::GasSaverError,
    models::{QuoteRequest, QuoteResponse},
};
use std::time::Duration;

const QUOTE_PATH: &str = "/sor/quote/v2";

/// Client for the swap-routing aggregator's quote API.
#[derive(Clone)]
pub struct AggregatorClient {
    base_url: String,
    client: reqwest::Client,
}

impl AggregatorClient {
    pub fn new(base_url: &str) -> Result<Self, GasSaverError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GasSaverError::ConfigError(format!("aggregator client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, GasSaverError> {
        if request.chain_id == 0 {
            return Err(GasSaverError::InvalidInput("quote requires a chain id".to_string()));
        }
        if request.input_tokens.is_empty() || request.output_tokens.is_empty() {
            return Err(GasSaverError::InvalidInput(
                "quote requires input and output tokens".to_string(),
            ));
        }

        let response = self
            .client
            .post(format!("{}{}", self.base_url, QUOTE_PATH))
            .json(request)
            .send()
            .await
            .map_err(|e| GasSaverError::Aggregator(format!("quote request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Aggregator rejected quote: {} {}", status, body);
            return Err(GasSaverError::Aggregator(format!(
                "quote rejected with {}: {}",
                status, body
            )));
        }

        let quote: QuoteResponse = response
            .json()
            .await
            .map_err(|e| GasSaverError::Aggregator(format!("malformed quote: {}", e)))?;

        tracing::debug!(
            "Quote on chain {}: {:?} gwei/gas, path {:?}",
            request.chain_id,
            quote.gwei_per_gas,
            quote.path_id
        );

        Ok(quote)
    }
}
