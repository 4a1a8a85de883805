use crate::{
    handlers::AppState,
    models::{ConnectionStatus, HealthStatus, NetworkHealth},
};
use axum::{extract::State, Json};
use chrono::Utc;

pub async fn health_check(
    State(state): State<AppState>,
) -> Json<HealthStatus> {
    let networks: Vec<NetworkHealth> = state
        .analyzer
        .registry()
        .sources()
        .map(|source| NetworkHealth {
            network: source.network().to_string(),
            queue_state: source.queue().state(),
            queue: source.queue().stats(),
        })
        .collect();

    let stream = state
        .stream
        .as_ref()
        .map(|s| s.status())
        .unwrap_or(ConnectionStatus::Idle);

    let status = if networks.is_empty() {
        "unhealthy"
    } else if matches!(stream, ConnectionStatus::Disconnected { .. }) {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        networks,
        stream,
        uptime_seconds: state.analytics.uptime_seconds(),
        timestamp: Utc::now(),
    })
}
