use crate::{
    config::SUPPORTED_NETWORKS,
    error::GasSaverError,
    models::{
        AnalysisResult, ApiResponse, CandidateTransaction, FeeHistoryStats, FeeSnapshot,
        NotificationEvent, QuoteRequest, QuoteResponse,
    },
    services::{
        AggregatorClient, Analytics, GasAnalyzer, OptimizationNotifier, PendingTransactionStream,
        SharedTarget, StreamBuffer,
    },
};
use axum::{
    extract::{FromRef, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

const DEFAULT_HISTORY_BLOCKS: u64 = 10;
const MAX_HISTORY_BLOCKS: u64 = 100;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub analyzer: Arc<GasAnalyzer>,
    pub aggregator: Arc<AggregatorClient>,
    pub analytics: Arc<Analytics>,
    pub notifier: Arc<OptimizationNotifier>,
    pub target: SharedTarget,
    pub buffer: Arc<StreamBuffer>,
    pub stream: Option<Arc<PendingTransactionStream>>,
    pub notifications: broadcast::Sender<NotificationEvent>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    /// Defaults to the transaction's own network.
    pub network: Option<String>,
    pub transaction: CandidateTransaction,
}

#[derive(Debug, Deserialize)]
pub struct BatchAnalyzeRequest {
    pub network: String,
    pub transactions: Vec<CandidateTransaction>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub blocks: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SwapQuoteRequest {
    pub network: String,
    pub quote: QuoteRequest,
    /// Analyzed against the quote's gas price when present.
    pub transaction: Option<CandidateTransaction>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SwapQuoteResult {
    pub quote: QuoteResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
}

pub async fn analyze_transaction(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<ApiResponse<AnalysisResult>>, GasSaverError> {
    let network = request
        .network
        .unwrap_or_else(|| request.transaction.network.clone());

    let result = state.analyzer.analyze(&request.transaction, &network).await?;
    state.analytics.record_analysis(&result);

    Ok(Json(ApiResponse::ok(result, network)))
}

pub async fn batch_analyze(
    State(state): State<AppState>,
    Json(request): Json<BatchAnalyzeRequest>,
) -> Result<Json<ApiResponse<Vec<AnalysisResult>>>, GasSaverError> {
    if request.transactions.is_empty() {
        return Err(GasSaverError::InvalidInput("no transactions to analyze".to_string()));
    }

    let results = state
        .analyzer
        .batch_analyze(&request.transactions, &request.network)
        .await?;
    for result in &results {
        state.analytics.record_analysis(result);
    }

    Ok(Json(ApiResponse::ok(results, request.network)))
}

pub async fn fee_snapshot(
    State(state): State<AppState>,
    Path(network): Path<String>,
) -> Result<Json<ApiResponse<FeeSnapshot>>, GasSaverError> {
    let source = state.analyzer.registry().get(&network)?;
    let snapshot = source.snapshot().await;

    Ok(Json(ApiResponse::ok(snapshot, network)))
}

pub async fn fee_history(
    State(state): State<AppState>,
    Path(network): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<FeeHistoryStats>>, GasSaverError> {
    let blocks = query.blocks.unwrap_or(DEFAULT_HISTORY_BLOCKS);
    if blocks == 0 || blocks > MAX_HISTORY_BLOCKS {
        return Err(GasSaverError::InvalidInput(format!(
            "blocks must be between 1 and {}",
            MAX_HISTORY_BLOCKS
        )));
    }

    let source = state.analyzer.registry().get(&network)?;
    let stats = source.history(blocks).await?;

    Ok(Json(ApiResponse::ok(stats, network)))
}

pub async fn swap_quote(
    State(state): State<AppState>,
    Json(request): Json<SwapQuoteRequest>,
) -> Result<Json<ApiResponse<SwapQuoteResult>>, GasSaverError> {
    let network = request.network.to_lowercase();
    let mut quote_request = request.quote;
    if quote_request.chain_id == 0 {
        quote_request.chain_id = SUPPORTED_NETWORKS
            .iter()
            .find(|(name, _)| *name == network)
            .map(|(_, chain_id)| *chain_id)
            .ok_or_else(|| GasSaverError::InvalidInput(format!("unknown network: {}", network)))?;
    }

    let quote = state.aggregator.quote(&quote_request).await?;

    let analysis = match request.transaction {
        Some(tx) => {
            let result = state
                .analyzer
                .analyze_with_quote(&tx, &network, quote.gwei_per_gas)
                .await?;
            state.analytics.record_analysis(&result);
            Some(result)
        }
        None => None,
    };

    Ok(Json(ApiResponse::ok(
        SwapQuoteResult { quote, analysis },
        state.aggregator.base_url().to_string(),
    )))
}
