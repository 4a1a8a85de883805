use crate::{
    error::GasSaverError,
    handlers::AppState,
    models::{ApiResponse, CurrentOptimization, NotificationEvent, SuggestionNotice, TargetPrice},
};
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationsView {
    pub target_gwei: Option<f64>,
    pub last_notified_at: Option<DateTime<Utc>>,
    /// Target match alerts, newest first.
    pub recent: Vec<NotificationEvent>,
    /// Suggestions seen on the stream, newest first.
    pub suggestions: Vec<SuggestionNotice>,
    pub current_optimization: Option<CurrentOptimization>,
}

pub async fn list_notifications(
    State(state): State<AppState>,
) -> Json<ApiResponse<NotificationsView>> {
    let view = NotificationsView {
        target_gwei: *state.target.read().await,
        last_notified_at: state.notifier.last_notified_at(),
        recent: state.notifier.recent(),
        suggestions: state.notifier.suggestions(),
        current_optimization: state.notifier.current_optimization(Utc::now()),
    };
    Json(ApiResponse::ok(view, "notifier"))
}

/// Set or clear (`null`) the price the notifier watches for.
pub async fn set_target(
    State(state): State<AppState>,
    Json(request): Json<TargetPrice>,
) -> Result<Json<ApiResponse<TargetPrice>>, GasSaverError> {
    if let Some(target) = request.target_gwei {
        if !target.is_finite() || target < 0.0 {
            return Err(GasSaverError::InvalidInput(format!(
                "target gas price must be a non-negative number, got {}",
                target
            )));
        }
    }

    *state.target.write().await = request.target_gwei;
    tracing::info!("Notification target set to {:?} gwei", request.target_gwei);

    Ok(Json(ApiResponse::ok(request, "notifier")))
}
