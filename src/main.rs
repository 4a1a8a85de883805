use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use gas_saver::{
    config::Config,
    handlers::*,
    services::{monitor, *},
};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting gas-saver v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {:?}", config.environment);
    tracing::info!(
        "Networks: {:?}, {} req/s per endpoint",
        config.networks.keys().collect::<Vec<_>>(),
        config.requests_per_second
    );

    // Initialize services
    let registry = ChainRegistry::from_config(&config)?;
    let policy = FeePolicy {
        synthetic: if config.synthetic_fee_fallback {
            tracing::warn!("Synthetic fee fallback enabled; results on networks without a base fee are estimates");
            SyntheticFeePolicy::enabled()
        } else {
            SyntheticFeePolicy::Disabled
        },
        ..Default::default()
    };
    let engine = GasAnalysisEngine::new(Default::default(), policy);
    let analyzer = Arc::new(GasAnalyzer::new(engine, registry.clone()));
    let aggregator = Arc::new(AggregatorClient::new(&config.aggregator_url)?);
    let analytics = Arc::new(Analytics::new());
    let notifier = Arc::new(OptimizationNotifier::new(NotifierPolicy {
        min_savings_eth: config.notify_min_savings_eth,
        tolerance_gwei: config.notify_tolerance_gwei,
        cooldown: config.notify_cooldown,
    }));
    let target: SharedTarget = Arc::new(RwLock::new(config.target_gas_price_gwei));
    let (notifications, _) = broadcast::channel(64);
    let buffer = Arc::new(StreamBuffer::default());
    let retry = RetryPolicy::new(config.retry_attempts, config.retry_base_delay);

    // Background tasks
    monitor::spawn_fee_ticker(registry.clone(), config.fee_refresh_interval);

    let stream = match &config.wss_endpoint {
        Some(wss_url) => {
            let queue = registry.get(&config.stream_network)?.queue().clone();
            let source = Arc::new(ChainPendingSource::new(wss_url, &config.stream_network, queue));
            let stream = Arc::new(PendingTransactionStream::new(
                source,
                analyzer.clone(),
                &config.stream_network,
                buffer.clone(),
            ));

            monitor::spawn_notifier(
                &stream,
                notifier.clone(),
                target.clone(),
                analytics.clone(),
                notifications.clone(),
            );
            monitor::spawn_stream(stream.clone(), retry.clone());
            Some(stream)
        }
        None => {
            tracing::warn!("WSS_ENDPOINT not set, pending transaction stream disabled");
            None
        }
    };

    // Build application state
    let app_state = AppState {
        analyzer,
        aggregator,
        analytics,
        notifier,
        target,
        buffer,
        stream,
        notifications,
    };

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/ws/dashboard", get(websocket_handler))
        .route("/api/gas/analyze", post(analyze_transaction))
        .route("/api/gas/batch", post(batch_analyze))
        .route("/api/gas/snapshot/:network", get(fee_snapshot))
        .route("/api/gas/history/:network", get(fee_history))
        .route("/api/swap/quote", post(swap_quote))
        .route("/api/stream/recent", get(recent_transactions))
        .route("/api/stream/stats", get(stream_stats))
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/target", axum::routing::put(set_target))
        .with_state(app_state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("WebSocket dashboard: ws://{}/ws/dashboard", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl+c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down gracefully...");
}
