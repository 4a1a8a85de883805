mod common;

use axum::{
    routing::{get, post, put},
    Router,
};
use common::{analyzer_for, healthy_chain, MockTransport};
use gas_saver::{
    error::ErrorResponse,
    handlers::*,
    models::{AnalysisResult, ApiResponse, HealthStatus, StreamEntry, TargetPrice},
    services::{AggregatorClient, Analytics, OptimizationNotifier, StreamBuffer},
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

async fn spawn_app(aggregator_url: &str) -> String {
    let (notifications, _) = broadcast::channel(8);
    let state = AppState {
        analyzer: analyzer_for("ethereum", MockTransport::new(healthy_chain)),
        aggregator: Arc::new(AggregatorClient::new(aggregator_url).unwrap()),
        analytics: Arc::new(Analytics::new()),
        notifier: Arc::new(OptimizationNotifier::default()),
        target: Arc::new(RwLock::new(None)),
        buffer: Arc::new(StreamBuffer::default()),
        stream: None,
        notifications,
    };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/api/gas/analyze", post(analyze_transaction))
        .route("/api/gas/snapshot/:network", get(fee_snapshot))
        .route("/api/swap/quote", post(swap_quote))
        .route("/api/stream/recent", get(recent_transactions))
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/target", put(set_target))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn analyze_endpoint_returns_suggestions() {
    let base = spawn_app("http://127.0.0.1:9").await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/gas/analyze", base))
        .json(&json!({
            "network": "ethereum",
            "transaction": { "to": "0x4242424242424242424242424242424242424242", "gas_price": 50.0 }
        }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let body: ApiResponse<AnalysisResult> = response.json().await.unwrap();
    assert!(body.success);
    assert!(body.data.has_eip1559_suggestion());
    assert!(body.data.defaults.gas_limit);

    let stats: serde_json::Value = client
        .get(format!("{}/stats", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["analyses_total"], json!(1));
}

#[tokio::test]
async fn unconfigured_network_explains_remediation() {
    let base = spawn_app("http://127.0.0.1:9").await;

    let response = reqwest::Client::new()
        .get(format!("{}/api/gas/snapshot/polygon", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);

    let body: ErrorResponse = response.json().await.unwrap();
    assert_eq!(body.error_code, "CONFIGURATION_ERROR");
    assert!(!body.retryable);
    assert!(body.remediation.unwrap().contains("POLYGON_RPC_URL"));
}

#[tokio::test]
async fn target_price_round_trips_through_notifications() {
    let base = spawn_app("http://127.0.0.1:9").await;
    let client = reqwest::Client::new();

    let rejected = client
        .put(format!("{}/api/notifications/target", base))
        .json(&json!({ "target_gwei": -1.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), 400);

    let accepted: ApiResponse<TargetPrice> = client
        .put(format!("{}/api/notifications/target", base))
        .json(&json!({ "target_gwei": 25.5 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(accepted.data.target_gwei, Some(25.5));

    let view: ApiResponse<NotificationsView> = client
        .get(format!("{}/api/notifications", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view.data.target_gwei, Some(25.5));
    assert!(view.data.recent.is_empty());
    assert!(view.data.suggestions.is_empty());
    assert!(view.data.current_optimization.is_none());
}

#[tokio::test]
async fn health_reports_queues_without_stream() {
    let base = spawn_app("http://127.0.0.1:9").await;
    let client = reqwest::Client::new();

    let health: HealthStatus = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.networks.len(), 1);
    assert_eq!(health.networks[0].network, "ethereum");

    let recent: ApiResponse<Vec<StreamEntry>> = client
        .get(format!("{}/api/stream/recent", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(recent.data.is_empty());
}

#[tokio::test]
async fn swap_quote_feeds_aggregator_price_into_analysis() {
    let mut aggregator = mockito::Server::new_async().await;
    aggregator
        .mock("POST", "/sor/quote/v2")
        .match_body(mockito::Matcher::PartialJson(json!({ "chainId": 1 })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"gweiPerGas": 22.0, "outAmounts": ["1000"]}"#)
        .create_async()
        .await;
    let base = spawn_app(&aggregator.url()).await;

    let body: serde_json::Value = reqwest::Client::new()
        .post(format!("{}/api/swap/quote", base))
        .json(&json!({
            "network": "ethereum",
            "quote": {
                "chainId": 0,
                "inputTokens": [{ "tokenAddress": "0x1111111111111111111111111111111111111111", "amount": "1000000" }],
                "outputTokens": [{ "tokenAddress": "0x2222222222222222222222222222222222222222", "proportion": 1.0 }],
                "userAddr": "0x3333333333333333333333333333333333333333",
                "slippageLimitPercent": 0.3
            },
            "transaction": { "gas_price": 50.0 }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["data"]["quote"]["gweiPerGas"], json!(22.0));
    assert_eq!(
        body["data"]["analysis"]["gas_analysis"]["aggregator_gas_price"],
        json!(22.0)
    );
}
